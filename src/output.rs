//! Terminal rendering of scan events and results.
//!
//! Live output is driven by [`ScanEvent`]s: a progress bar, plus a line per
//! open port as it is found. The final table and the JSON document are
//! rendered from the finished session's [`ScanReport`].

use crate::engine::{ScanEvent, ScanReport};
use crate::osfp::{FingerprintSource, OsFingerprint};
use crate::scanner::{PortStatus, ProbeOutcome};
use console::{style, Style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::mpsc;

const RULE: &str = "═══════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "───────────────────────────────────────────────────────────────";

/// What the live renderer shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveOptions {
    /// Draw the progress bar and per-port lines.
    pub interactive: bool,
    /// Also report ports whose probe failed.
    pub show_errors: bool,
}

/// Render events until every sender is gone.
///
/// Returns the OS fingerprint, if one arrived.
pub async fn render_events(
    mut events: mpsc::UnboundedReceiver<ScanEvent>,
    options: LiveOptions,
) -> Option<OsFingerprint> {
    let mut bar: Option<ProgressBar> = None;
    let mut fingerprint = None;

    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::Started {
                target,
                technique,
                total,
                ..
            } => {
                if options.interactive {
                    print_scan_header(target.host(), &technique.to_string(), total);
                    bar = Some(progress_bar(total as u64));
                }
            }
            ScanEvent::Progress(snapshot) => {
                if let Some(bar) = &bar {
                    bar.set_position(snapshot.completed as u64);
                    bar.set_message(format!("{:.0} ports/s", snapshot.rate));
                }
            }
            ScanEvent::Outcome(outcome) => {
                if let Some(bar) = &bar {
                    bar.inc(1);
                    if is_interesting(outcome.status) {
                        bar.println(format_found(&outcome));
                    }
                }
            }
            ScanEvent::Error(message) => {
                if options.show_errors {
                    match &bar {
                        Some(bar) => bar.println(format!(
                            "{} {}",
                            style("Warning:").yellow().bold(),
                            message
                        )),
                        None => print_warning(&message),
                    }
                }
            }
            ScanEvent::Finished { stopped, .. } => {
                if let Some(bar) = bar.take() {
                    if stopped {
                        bar.abandon_with_message("stopped");
                    } else {
                        bar.finish_and_clear();
                    }
                }
            }
            ScanEvent::OsFingerprint(fp) => fingerprint = Some(fp),
        }
    }

    fingerprint
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    if let Ok(template) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        bar.set_style(template.progress_chars("=>-"));
    }
    bar
}

/// Statuses worth a live line.
fn is_interesting(status: PortStatus) -> bool {
    matches!(
        status,
        PortStatus::Open | PortStatus::OpenFiltered | PortStatus::Unfiltered
    )
}

fn status_style(status: PortStatus) -> Style {
    match status {
        PortStatus::Open => Style::new().green().bold(),
        PortStatus::OpenFiltered | PortStatus::Unfiltered => Style::new().green(),
        PortStatus::Closed => Style::new().red(),
        PortStatus::Filtered => Style::new().yellow(),
        PortStatus::Error => Style::new().magenta(),
    }
}

fn format_found(outcome: &ProbeOutcome) -> String {
    let mut line = format!(
        "  {} {:>5}/{}  {}  {}",
        style("Discovered").dim(),
        outcome.port,
        outcome.protocol.to_lowercase(),
        status_style(outcome.status).apply_to(outcome.status),
        outcome.service
    );
    if let Some(banner) = &outcome.banner {
        line.push_str(&format!("  {}", style(truncate_string(banner, 50)).dim()));
    }
    line
}

/// Print a scan header before scanning begins.
pub fn print_scan_header(target: &str, technique: &str, ports: usize) {
    eprintln!();
    eprintln!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("cyberscan").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{} Technique: {}", style("•").dim(), style(technique).yellow());
    eprintln!("{} Target: {}", style("•").dim(), style(target).white().bold());
    eprintln!(
        "{} Scanning {} ports...",
        style("•").dim(),
        style(ports).white().bold()
    );
    eprintln!();
}

/// Print the final result table.
pub fn print_summary(
    report: &ScanReport,
    fingerprint: Option<&OsFingerprint>,
    show_closed: bool,
) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_summary(&mut out, report, fingerprint, show_closed)
}

fn write_summary(
    out: &mut impl Write,
    report: &ScanReport,
    fingerprint: Option<&OsFingerprint>,
    show_closed: bool,
) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(
        out,
        "                    {} Scan Results",
        style("cyberscan").cyan().bold()
    )?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    writeln!(out, "  {} {}", style("Target:").bold(), report.target)?;
    writeln!(out, "  {} {}", style("Technique:").bold(), report.technique)?;
    writeln!(out, "  {} {}", style("Timing:").bold(), report.timing)?;
    writeln!(out, "  {} {}", style("Scan ID:").bold(), report.id.short())?;
    writeln!(out)?;

    let verb = if report.stopped { "stopped after" } else { "scanned in" };
    writeln!(
        out,
        "  {} {}/{} ports {} {:.2}s",
        style("Statistics:").bold(),
        report.completed,
        report.ports_scanned,
        verb,
        report.duration_ms as f64 / 1000.0
    )?;
    writeln!(
        out,
        "               {} open, {} open|filtered, {} unfiltered, {} closed, {} filtered, {} errors",
        style(report.open).green().bold(),
        style(report.open_filtered).green(),
        style(report.unfiltered).green(),
        style(report.closed).red(),
        style(report.filtered).yellow(),
        style(report.errors).magenta()
    )?;
    writeln!(out)?;

    let rows: Vec<&ProbeOutcome> = report
        .outcomes
        .iter()
        .filter(|o| show_closed || o.status != PortStatus::Closed)
        .collect();

    if rows.is_empty() {
        writeln!(out, "  {}", style("No ports to display.").dim())?;
    } else {
        writeln!(out, "  {}", style(THIN_RULE).dim())?;
        writeln!(
            out,
            "  {:>9}  {:^14}  {:<18}  {}",
            style("PORT").bold(),
            style("STATE").bold(),
            style("SERVICE").bold(),
            style("BANNER").bold()
        )?;
        writeln!(out, "  {}", style(THIN_RULE).dim())?;

        for outcome in rows {
            let banner = outcome
                .banner
                .as_deref()
                .or(outcome.detail.as_deref())
                .map(|b| truncate_string(b, 35))
                .unwrap_or_default();

            writeln!(
                out,
                "  {:>9}  {:^14}  {:<18}  {}",
                format!("{}/{}", outcome.port, outcome.protocol.to_lowercase()),
                status_style(outcome.status).apply_to(outcome.status.to_string()),
                outcome.service,
                style(banner).dim()
            )?;
        }

        writeln!(out, "  {}", style(THIN_RULE).dim())?;
    }

    if let Some(fp) = fingerprint {
        writeln!(out)?;
        let label = match fp.source {
            FingerprintSource::Tool => "OS detection:",
            FingerprintSource::Heuristic => "OS guess:",
            FingerprintSource::Unavailable => "OS detection:",
        };
        writeln!(out, "  {}", style(label).bold())?;
        for line in fp.output.lines() {
            writeln!(out, "    {}", line)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", style(RULE).cyan())?;
    writeln!(out)?;

    Ok(())
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    #[serde(flatten)]
    report: &'a ScanReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    os_fingerprint: Option<&'a OsFingerprint>,
}

/// Render the report as a JSON document.
pub fn to_json(report: &ScanReport, fingerprint: Option<&OsFingerprint>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonDocument {
        report,
        os_fingerprint: fingerprint,
    })
}

/// Print the report as JSON on stdout.
pub fn print_json(report: &ScanReport, fingerprint: Option<&OsFingerprint>) -> io::Result<()> {
    let json = to_json(report, fingerprint).map_err(io::Error::other)?;
    println!("{}", json);
    Ok(())
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print an informational message.
pub fn print_info(msg: &str) {
    eprintln!("{} {}", style("Info:").cyan().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScanFlags, ScanSession, SessionConfig};
    use crate::scanner::ScanTechnique;
    use crate::timing::TimingProfile;
    use crate::types::{Port, PortSet, ScanId, Target};
    use std::sync::Arc;
    use std::time::Duration;

    fn finished_report() -> ScanReport {
        let config = Arc::new(SessionConfig {
            id: ScanId::new(),
            target: Target::parse("scanme.example.org").unwrap(),
            ports: PortSet::parse("22,80").unwrap(),
            technique: ScanTechnique::Connect,
            timing: TimingProfile::Normal,
            policy: TimingProfile::Normal.policy_for(ScanTechnique::Connect, 2),
            flags: ScanFlags::default(),
        });
        let mut session = ScanSession::new(config);
        session.apply(
            ProbeOutcome::new(Port::new(22).unwrap(), PortStatus::Open, Duration::from_millis(3))
                .with_banner(Some("SSH-2.0-OpenSSH_9.6".to_string())),
        );
        session.apply(ProbeOutcome::new(
            Port::new(80).unwrap(),
            PortStatus::Closed,
            Duration::from_millis(1),
        ));
        session.finish(false);
        session.report()
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
    }

    #[test]
    fn test_summary_hides_closed_ports() {
        console::set_colors_enabled(false);
        let report = finished_report();

        let mut buf = Vec::new();
        write_summary(&mut buf, &report, None, false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("22/tcp"));
        assert!(text.contains("SSH-2.0-OpenSSH_9.6"));
        assert!(!text.contains("80/tcp"));

        let mut buf = Vec::new();
        write_summary(&mut buf, &report, None, true).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("80/tcp"));
    }

    #[test]
    fn test_json_document() {
        let report = finished_report();
        let fp = OsFingerprint {
            source: FingerprintSource::Heuristic,
            exit_code: None,
            output: "Linux/Unix (guessed from open ports)".to_string(),
        };

        let value: serde_json::Value =
            serde_json::from_str(&to_json(&report, Some(&fp)).unwrap()).unwrap();
        assert_eq!(value["target"], "scanme.example.org");
        assert_eq!(value["open"], 1);
        assert_eq!(value["outcomes"][0]["banner"], "SSH-2.0-OpenSSH_9.6");
        assert_eq!(value["os_fingerprint"]["source"], "heuristic");

        let bare: serde_json::Value =
            serde_json::from_str(&to_json(&report, None).unwrap()).unwrap();
        assert!(bare.get("os_fingerprint").is_none());
    }
}
