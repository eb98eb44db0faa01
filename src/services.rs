//! Service detection based on well-known port numbers.
//!
//! The table is a sorted constant, so lookups are a binary search over
//! read-only data with no initialization step.

/// Name reported for ports missing from the table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Well-known ports and their service names, sorted by port.
const PORT_SERVICES: &[(u16, &str)] = &[
    (7, "Echo"),
    (20, "FTP-Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP-Client"),
    (69, "TFTP"),
    (79, "Finger"),
    (80, "HTTP"),
    (88, "Kerberos"),
    (110, "POP3"),
    (111, "RPCBind"),
    (119, "NNTP"),
    (123, "NTP"),
    (135, "MSRPC"),
    (137, "NetBIOS-NS"),
    (138, "NetBIOS-DGM"),
    (139, "NetBIOS-SSN"),
    (143, "IMAP"),
    (161, "SNMP"),
    (162, "SNMP-Trap"),
    (179, "BGP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (500, "ISAKMP"),
    (514, "Syslog"),
    (515, "LPD"),
    (548, "AFP"),
    (554, "RTSP"),
    (587, "Submission"),
    (631, "IPP"),
    (636, "LDAPS"),
    (873, "Rsync"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1080, "SOCKS"),
    (1194, "OpenVPN"),
    (1433, "MSSQL"),
    (1521, "Oracle"),
    (1723, "PPTP"),
    (1883, "MQTT"),
    (2049, "NFS"),
    (2375, "Docker"),
    (2376, "Docker-TLS"),
    (3000, "Grafana"),
    (3128, "Squid"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5060, "SIP"),
    (5432, "PostgreSQL"),
    (5672, "AMQP"),
    (5900, "VNC"),
    (5984, "CouchDB"),
    (6379, "Redis"),
    (6443, "Kubernetes-API"),
    (6667, "IRC"),
    (8000, "HTTP-Alt"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
    (8888, "HTTP-Alt"),
    (9000, "CSlistener"),
    (9090, "Prometheus"),
    (9092, "Kafka"),
    (9200, "Elasticsearch"),
    (9418, "Git"),
    (10000, "Webmin"),
    (11211, "Memcached"),
    (27017, "MongoDB"),
];

/// Look up the probable service name for a given port.
///
/// Returns `None` if the port is not in the well-known services table.
pub fn get_service_name(port: u16) -> Option<&'static str> {
    PORT_SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .ok()
        .map(|i| PORT_SERVICES[i].1)
}

/// Service name for a port, falling back to [`UNKNOWN_SERVICE`].
pub fn get_service_description(port: u16) -> &'static str {
    get_service_name(port).unwrap_or(UNKNOWN_SERVICE)
}
