//! Scan command implementation.

use crate::cli::Cli;
use crate::config::AppSettings;
use crate::engine::{Orchestrator, ScanFlags, ScanRequest};
use crate::error::{CliError, CliResult};
use crate::output::{self, LiveOptions};
use tracing::{debug, info};

/// Build the scan request from the command line and settings.
fn build_request(cli: &Cli, target: String, settings: &AppSettings) -> ScanRequest {
    let ports = cli
        .ports
        .clone()
        .unwrap_or_else(|| settings.default_ports.clone());

    ScanRequest::new(target, ports)
        .technique(cli.technique.unwrap_or(settings.default_technique))
        .timing(cli.timing.unwrap_or(settings.default_timing))
        .flags(ScanFlags {
            service_detection: cli.service_detection,
            os_detection: cli.os_detection,
            aggressive: cli.aggressive,
        })
}

fn load_settings(cli: &Cli) -> CliResult<AppSettings> {
    let settings = match &cli.config {
        Some(path) => AppSettings::load_from(path)?,
        None => AppSettings::load()?,
    };
    debug!(?settings, "effective settings");
    Ok(settings)
}

pub(super) async fn execute(cli: Cli) -> CliResult<()> {
    if cli.init_config {
        let path = match &cli.config {
            Some(path) => {
                AppSettings::default().save_to(path)?;
                path.clone()
            }
            None => AppSettings::default().save()?,
        };
        output::print_info(&format!("Settings written to {}", path.display()));
        return Ok(());
    }

    let target = cli
        .target
        .clone()
        .ok_or_else(|| CliError::Other("no target given".to_string()))?;
    let settings = load_settings(&cli)?;
    let request = build_request(&cli, target, &settings);

    let mut orchestrator = Orchestrator::new(settings.engine_config());
    let printer = tokio::spawn(output::render_events(
        orchestrator.subscribe(),
        LiveOptions {
            interactive: !cli.json && !cli.quiet,
            show_errors: cli.verbose > 0,
        },
    ));

    orchestrator.start(request).await?;

    let stop = orchestrator.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping scan");
            stop.stop();
        }
    });

    let session = orchestrator
        .wait()
        .await
        .ok_or_else(|| CliError::Other("scan ended without a result".to_string()))?;
    interrupt.abort();

    // The printer ends once the engine and any pending OS fingerprint are gone.
    drop(orchestrator);
    let fingerprint = printer.await.unwrap_or_default();

    let report = session.report();
    if cli.json {
        output::print_json(&report, fingerprint.as_ref())?;
    } else if !cli.quiet {
        output::print_summary(&report, fingerprint.as_ref(), cli.show_closed)?;
    } else {
        for outcome in report.outcomes.iter().filter(|o| o.is_open()) {
            println!("{}/{}", outcome.port, outcome.protocol.to_lowercase());
        }
    }

    if report.stopped {
        output::print_warning("scan was interrupted; results are partial");
    }

    Ok(())
}
