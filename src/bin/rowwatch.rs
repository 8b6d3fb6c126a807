use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};

use rowwatch::alerting::MonitorService;
use rowwatch::config::{AppConfig, ConfigError};
use rowwatch::db::PostgresRowSource;
use rowwatch::logging::init_logging;
use rowwatch::notifications::{AlertContext, NotificationService};
use rowwatch::scheduler::Scheduler;
use rowwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to an optional TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

fn enabled(flag: bool) -> &'static str {
    if flag { "Enabled" } else { "Disabled" }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            error!("Failed to load configuration: {}", e);
            if let ConfigError::MissingEmailFields(fields) = &e {
                error!("Please set the following environment variables:");
                for field in fields {
                    error!("  - {}", field);
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_logging(config.log_dir.as_deref());
    info!(version = VERSION, "Starting rowwatch.");
    if let Some(path) = &config.missing_config_file {
        warn!(path = %path, "Config file not found, using environment and defaults.");
    }

    let source = PostgresRowSource::new(&config.database);
    let notifications = NotificationService::from_config(&config);
    let mut monitor = MonitorService::new(
        config.monitor.clone(),
        AlertContext::from_config(&config),
        Box::new(source),
        notifications,
    );

    if args.once {
        let outcome = monitor.run_check().await;
        info!(?outcome, "Single check finished.");
        return ExitCode::SUCCESS;
    }

    println!(
        "Starting PostgreSQL database monitor (checking every {} minutes)...",
        config.monitor.check_interval_minutes
    );
    println!("Email notifications: {}", enabled(config.monitor.enable_email));
    println!("Console notifications: {}", enabled(config.monitor.enable_console));
    println!("Press Ctrl+C to stop");

    let scheduler = Scheduler::every_minutes(config.monitor.check_interval_minutes);
    scheduler.run(&mut monitor, shutdown_signal()).await;

    println!("\nMonitor stopped");
    ExitCode::SUCCESS
}
