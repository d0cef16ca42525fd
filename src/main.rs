use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use authwatch::alerter::AlertManager;
use authwatch::config::{Config, FirewallConfig};
use authwatch::monitor::Monitor;
use authwatch::tailer::{self, LogTailer};
use authwatch::types::Alert;

#[derive(Parser, Debug)]
#[command(name = "authwatch", about = "Real-time log anomaly detector")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log files to monitor
    #[arg(long, num_args = 1..)]
    logs: Vec<String>,

    /// Monitor all standard Linux log files present on this host
    #[arg(long)]
    all: bool,

    /// Sliding time window in minutes
    #[arg(short, long)]
    window: Option<u32>,

    /// Error count that triggers an anomaly
    #[arg(short, long)]
    threshold: Option<usize>,

    /// Automatically block brute force ips
    #[arg(long)]
    auto_block: bool,

    /// Export alert history to this JSON file on exit
    #[arg(long)]
    export: Option<String>,

    /// Read existing file content instead of starting at the end
    #[arg(long)]
    from_start: bool,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("authwatch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    apply_overrides(&cli, &mut config);
    config.validate()?;

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    // Initialize logging
    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %config.agent.hostname,
        window_minutes = config.detector.window_minutes,
        "Starting authwatch"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Agent terminated with error");
        return Err(e);
    }

    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if !cli.logs.is_empty() {
        config.sources.paths = cli.logs.clone();
    }
    config.sources.all |= cli.all;
    config.sources.from_start |= cli.from_start;
    if let Some(window) = cli.window {
        config.detector.window_minutes = window;
    }
    if let Some(threshold) = cli.threshold {
        config.detector.error_threshold = threshold;
    }
    if cli.auto_block {
        config.alerting.firewall.get_or_insert_with(FirewallConfig::default).enabled = true;
    }
    if cli.export.is_some() {
        config.alerting.export_path = cli.export.clone();
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.agent.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let sources = tailer::resolve_sources(&config.sources);
    if sources.is_empty() {
        bail!("No valid log files to monitor; pass --logs <paths> or --all");
    }

    // Initialize alerter
    let mut alerter = AlertManager::new(&config.alerting)?;

    let (alert_tx, mut alert_rx) = mpsc::channel::<Alert>(1_000);
    let poll_interval = Duration::from_millis(config.sources.poll_interval_ms);
    let stats_interval = Duration::from_secs(config.sources.stats_interval_secs);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One monitor per source, nothing shared between them
    let mut monitors = tokio::task::JoinSet::new();
    for path in sources {
        let tailer = match LogTailer::open(&path, config.sources.from_start).await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping source");
                continue;
            }
        };
        let monitor = Monitor::new(path.display().to_string(), &config.detector)?;
        let tx = alert_tx.clone();
        let hostname = config.agent.hostname.clone();

        monitors.spawn(watch_source(
            tailer,
            monitor,
            tx,
            hostname,
            Intervals { poll: poll_interval, stats: stats_interval },
            shutdown_rx.clone(),
        ));
    }
    drop(alert_tx);

    if monitors.is_empty() {
        bail!("No log files could be opened");
    }
    info!(sources = monitors.len(), "Monitoring logs, press Ctrl+C or send SIGTERM to stop");

    // Spawn alerter task
    let alert_task = tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            if let Err(e) = alerter.dispatch(alert).await {
                error!(error = %e, "Alert dispatch failed");
            }
        }
        alerter
    });

    // Wait for shutdown signal
    shutdown_signal().await?;
    info!("Received shutdown signal, stopping monitors");

    let _ = shutdown_tx.send(true);
    while let Some(joined) = monitors.join_next().await {
        match joined {
            Ok(monitor) => log_statistics(&monitor, "Final statistics"),
            Err(e) => warn!(error = %e, "Monitor task failed"),
        }
    }
    let alerter = alert_task.await.context("Alert task failed")?;

    info!(total = alerter.history_len(), "Alert summary");
    for alert in alerter.recent(3) {
        info!(kind = %alert.kind, source = %alert.source, at = %alert.timestamp, "Recent alert");
    }

    if let Some(ref path) = config.alerting.export_path {
        alerter.export(path).await?;
        info!(path = %path, alerts = alerter.history_len(), "Exported alert history");
    }

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for Ctrl-C")?,
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

    Ok(())
}

struct Intervals {
    poll: Duration,
    stats: Duration,
}

fn log_statistics(monitor: &Monitor, label: &str) {
    let s = monitor.statistics();
    info!(
        source = %monitor.source(),
        total_events = s.total_events,
        levels = ?s.level_counts,
        unique_ips = s.distinct_ips,
        unique_users = s.distinct_users,
        window_minutes = s.window_minutes,
        lines = monitor.lines_seen(),
        "{}", label
    );
}

/// Drain one source: poll for lines, classify, forward alerts, log stats.
///
/// Returns the monitor once shutdown is signalled or the alert channel closes.
async fn watch_source(
    mut tailer: LogTailer,
    mut monitor: Monitor,
    tx: mpsc::Sender<Alert>,
    hostname: String,
    intervals: Intervals,
    mut shutdown: watch::Receiver<bool>,
) -> Monitor {
    let mut poll = tokio::time::interval(intervals.poll);
    let mut stats = tokio::time::interval(intervals.stats);
    stats.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return monitor,
            _ = poll.tick() => {
                let lines = match tailer.read_lines().await {
                    Ok(lines) => lines,
                    Err(e) => {
                        warn!(path = %tailer.path().display(), error = %e, "Read failed");
                        continue;
                    }
                };
                for line in lines {
                    for finding in monitor.ingest(&line) {
                        let alert = Alert::from_finding(finding, monitor.source(), &hostname);
                        if tx.send(alert).await.is_err() {
                            return monitor; // Channel closed
                        }
                    }
                }
            }
            _ = stats.tick() => log_statistics(&monitor, "Statistics"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authwatch::config::DetectorConfig;
    use authwatch::types::AnomalyKind;
    use std::io::Write;

    fn intervals() -> Intervals {
        Intervals { poll: Duration::from_millis(10), stats: Duration::from_secs(60) }
    }

    #[tokio::test]
    async fn watcher_hands_back_monitor_on_shutdown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(file, "2024-01-15 10:30:0{} ERROR payment backend unreachable", i).unwrap();
        }
        file.flush().unwrap();

        let tailer = LogTailer::open(file.path(), true).await.unwrap();
        let monitor = Monitor::new("app.log", &DetectorConfig::default()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(watch_source(tailer, monitor, tx, "host-a".into(), intervals(), shutdown_rx));

        let alert = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(alert.kind, AnomalyKind::ErrorThreshold);

        shutdown_tx.send(true).unwrap();
        let monitor = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(monitor.statistics().total_events, 5);
        assert_eq!(monitor.lines_seen(), 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_resolves_shutdown_signal() {
        // Keep a handler installed so the signal never hits the default action
        let _guard = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).unwrap();

        let waiter = tokio::spawn(shutdown_signal());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap().unwrap();
    }
}
