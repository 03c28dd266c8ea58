use offerwatch_lib::bus::event_types::{
    affects_busy_indicator, triggers_metrics_refresh, EVENT_CHANNEL_STATE_CHANGED,
    EVENT_IMPORT_FAILED, EVENT_NOTIFICATION_RECEIVED,
};
use offerwatch_lib::config::ConfigError;
use offerwatch_lib::metrics::aggregate::{quick_summary, status_distribution};
use offerwatch_lib::metrics::{format_currency, format_percent, AnalyticsSnapshot, LoadRequest};
use offerwatch_lib::poller::StartOutcome;
use offerwatch_lib::{init_tracing, AppError, Session, SessionContext, SyncConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Options {
    import: bool,
    year: Option<i32>,
    user: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        eprintln!("offerwatch failed: {error}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(None);
        }
        if arg == "--import" {
            options.import = true;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--year=") {
            options.year = Some(parse_year(value)?);
            continue;
        }
        if arg == "--year" {
            let value = args
                .next()
                .ok_or_else(|| "--year requires a value".to_string())?;
            options.year = Some(parse_year(&value)?);
            continue;
        }
        if let Some(value) = arg.strip_prefix("--user=") {
            options.user = Some(value.to_string());
            continue;
        }
        if arg == "--user" {
            options.user = Some(
                args.next()
                    .ok_or_else(|| "--user requires a value".to_string())?,
            );
            continue;
        }
        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }
    Ok(Some(options))
}

fn parse_year(value: &str) -> Result<i32, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid --year value '{value}'"))
}

async fn run() -> Result<(), AppError> {
    let Some(options) = parse_args().map_err(AppError::Other)? else {
        return Ok(());
    };

    let config = SyncConfig::from_env()?;
    let token = config
        .token
        .clone()
        .ok_or(ConfigError::Missing("OFFERWATCH_TOKEN"))?;
    let user = options.user.clone().unwrap_or_else(|| "dashboard".to_string());
    let session = Session::connect(&config, SessionContext::new(user, token))?;
    let mut events = session.bus().subscribe();

    session.start();
    match session.poller().resume().await {
        Ok(StartOutcome::Started) => info!("resumed polling of running import"),
        Ok(_) => {}
        Err(error) => warn!(%error, "could not check import status"),
    }
    if options.import {
        match session.poller().start().await {
            Ok(outcome) => info!(?outcome, "import requested"),
            Err(error) => warn!(%error, "import request failed"),
        }
    }
    if let Some(year) = options.year {
        print_summary(&session.loader().load(&LoadRequest::for_year(year)).await);
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(event) if event.is(EVENT_NOTIFICATION_RECEIVED) => {
                    info!(
                        message = %event.payload["message"].as_str().unwrap_or_default(),
                        unread = %event.payload["unread"],
                        "notification"
                    );
                }
                Ok(event) if event.is(EVENT_CHANNEL_STATE_CHANGED) => {
                    info!(
                        state = %event.payload["state"],
                        attempts = session.channel().connect_attempts(),
                        "channel"
                    );
                }
                Ok(event) if event.is(EVENT_IMPORT_FAILED) => {
                    warn!(error = %event.payload["error"], "import failed");
                }
                Ok(event) if affects_busy_indicator(&event) => {
                    info!(
                        event = %event.event_type,
                        busy = session.poller().state().is_busy(),
                        "import"
                    );
                }
                Ok(event) if triggers_metrics_refresh(&event) => {
                    if let Some(year) = options.year {
                        print_summary(&session.loader().load(&LoadRequest::for_year(year)).await);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    session.shutdown();
    Ok(())
}

fn print_summary(snapshot: &AnalyticsSnapshot) {
    let totals = snapshot.totals();
    let quick = quick_summary(&snapshot.stats);

    println!("KPI summary {}", snapshot.year);
    println!("  requests:       {}", totals.requests);
    println!("  accepted:       {}", totals.accepted);
    println!("  success rate:   {}", format_percent(totals.success_rate));
    println!("  order value:    {}", format_currency(totals.order_value));
    println!("  average offer:  {}", format_currency(quick.average_value));
    for (status, count) in status_distribution(&snapshot.stats) {
        println!("  {status:?}: {count}");
    }
    for phase in &snapshot.workflow_timing {
        println!(
            "  phase {}: avg {:.1}h, {} bottlenecks / {} steps",
            phase.phase, phase.avg_duration_hours, phase.bottleneck_count, phase.total_steps
        );
    }
    for failure in &snapshot.failures {
        println!("  unavailable: {} ({})", failure.source, failure.message);
    }
}

fn print_help() {
    println!("Offer dashboard live-sync client");
    println!();
    println!("Usage:");
    println!("  offerwatch [options]");
    println!();
    println!("Options:");
    println!("  --import          Trigger an email import at startup");
    println!("  --year <y>        Print the KPI summary for a year, refreshed after imports");
    println!("  --user <name>     Username shown in logs (default: dashboard)");
    println!();
    println!("Environment:");
    println!("  OFFERWATCH_API_URL, OFFERWATCH_WS_URL, OFFERWATCH_TOKEN,");
    println!("  OFFERWATCH_RECONNECT_SECS, OFFERWATCH_POLL_SECS,");
    println!("  OFFERWATCH_POLL_MAX_FAILURES, OFFERWATCH_TIMEOUT_SECS,");
    println!("  OFFERWATCH_CONNECT_TIMEOUT_SECS, RUST_LOG");
}
