mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use captchapool_core::{
    load_config, validate_config, Config, Gateway, SanitizedConfig, Solver, TwoCaptchaGateway,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet if the config failed to load.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("CAPTCHAPOOL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("captchapool.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!(version = VERSION, "Configuration loaded from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    info!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "Effective configuration"
    );

    // Create gateway
    let gateway: Arc<dyn Gateway> = Arc::new(TwoCaptchaGateway::new(
        config.api_key.clone(),
        config.gateway.clone(),
    ));
    info!("Using gateway: {} at {}", gateway.name(), config.gateway.base_url);

    // Create solver, checking the account first if configured
    let solver = Solver::builder(gateway, config.task.clone())
        .mode(config.mode)
        .config(config.pool.clone())
        .verify_account(config.gateway.verify_account)
        .build()
        .await
        .context("Failed to create solver")?;

    let mut output = solver.start().context("Failed to start solver")?;

    let mut shutdown = std::pin::pin!(shutdown_signal());
    let mut stopping = false;
    let mut solutions_open = true;
    let mut errors_open = true;

    // Fixed mode ends when the channels close. Persistent mode runs until a
    // shutdown signal, after which the solver is closed and the channels drain.
    while solutions_open || errors_open {
        tokio::select! {
            solution = output.solutions.recv(), if solutions_open => match solution {
                Some(solution) => println!("{}", solution),
                None => solutions_open = false,
            },
            error = output.errors.recv(), if errors_open => match error {
                Some(error) => warn!(stage = %error.stage(), "Solver reported: {}", error),
                None => errors_open = false,
            },
            _ = &mut shutdown, if !stopping => {
                info!("Shutdown signal received, stopping solver");
                stopping = true;
                solver.close();
            }
        }
    }

    solver.wait().await;

    let stats = solver.stats();
    info!(
        solved = stats.tasks_solved,
        failed = stats.tasks_failed,
        "Solver finished"
    );
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?
    );

    if config.metrics.dump_on_exit {
        eprint!("{}", metrics::encode_metrics());
    }

    Ok(())
}

/// Initialize tracing. Logs go to stderr so stdout carries only solutions.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
