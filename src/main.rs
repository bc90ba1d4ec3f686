//! idlewatchd - user daemon that reports idle episodes by email.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use idlewatchd::config::Config;
use idlewatchd::idle::{IdleSampler, SystemSampler};
use idlewatchd::lifecycle::{self, ExitGuard, LifecycleEvent};
use idlewatchd::logging;
use idlewatchd::monitor::IdleMonitor;
use idlewatchd::notify::{DryRunNotifier, Notifier, SmtpNotifier};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Idle monitor daemon.
///
/// Sends one email per idle episode and on service start/stop/crash.
#[derive(Parser, Debug)]
#[command(name = "idlewatchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log notifications instead of mailing them).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the current idle time in seconds and exit.
    #[arg(long)]
    oneshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    if args.dry_run {
        config.dry_run = true;
    }

    logging::init(&args.log_level, config.log_file.as_deref())?;
    info!("idlewatchd v{} starting", env!("CARGO_PKG_VERSION"));

    if args.oneshot {
        let sampler = SystemSampler::detect().await;
        let sample = sampler.sample().await;
        println!("{} {}", sampler.backend_name(), sample.as_secs());
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;
    info!("Configuration loaded (dry_run={})", config.dry_run);

    run_daemon(config).await
}

/// Build the notifier selected by the configuration.
fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    if config.dry_run {
        return Ok(Arc::new(DryRunNotifier));
    }
    let smtp = config.smtp.as_ref().context("No [smtp] section configured")?;
    let notifier = SmtpNotifier::from_config(smtp).context("Failed to initialize SMTP notifier")?;
    Ok(Arc::new(notifier))
}

/// Run the monitor until SIGINT/SIGTERM.
async fn run_daemon(config: Config) -> Result<()> {
    let machine = config.machine_name();
    let notifier = build_notifier(&config)?;

    lifecycle::install_panic_hook(Arc::clone(&notifier), machine.clone());
    let mut exit_guard = ExitGuard::new(Arc::clone(&notifier), machine.clone());

    let sampler = SystemSampler::detect().await;

    {
        let notifier = Arc::clone(&notifier);
        let machine = machine.clone();
        tokio::task::spawn_blocking(move || {
            lifecycle::notify(notifier.as_ref(), &machine, &LifecycleEvent::Started);
        })
        .await
        .context("Start notification task failed")?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(cancel.clone()));

    IdleMonitor::new(sampler, notifier, machine, &config)
        .run(cancel)
        .await;

    exit_guard.disarm();
    info!("idlewatchd stopped");
    Ok(())
}

/// Cancel `token` on the first SIGINT or SIGTERM.
async fn wait_for_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c().await;
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl-C");
    }

    token.cancel();
}

/// Resolve on Ctrl-C.
async fn ctrl_c() {
    signal_or_pending(tokio::signal::ctrl_c()).await;
}

/// Resolve when `signal` fires. If the listener failed to register, never
/// resolve, so the daemon keeps running instead of stopping straight away.
async fn signal_or_pending(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
