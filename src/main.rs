use anyhow::Context;
use clap::Parser;
use digitscope::adapters::start_api_server;
use digitscope::cli::{Cli, Commands};
use digitscope::config::{AppConfig, LoggingConfig};
use digitscope::services::InferenceService;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli.command);

    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("invalid config: {}", e);
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    match cli.command {
        Commands::Serve { .. } => run_serve(config).await,
        #[cfg(feature = "train")]
        Commands::Train { .. } => run_train(config).await,
    }
}

fn apply_overrides(config: &mut AppConfig, command: &Commands) {
    match command {
        Commands::Serve { port, host, model } => {
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(model) = model {
                config.model.artifact_path = model.clone();
            }
        }
        #[cfg(feature = "train")]
        Commands::Train {
            data_dir,
            output,
            epochs,
            batch_size,
        } => {
            if let Some(dir) = data_dir {
                config.training.dataset = digitscope::config::DatasetSource::Idx;
                config.training.data_dir = Some(dir.clone());
            }
            if let Some(output) = output {
                config.model.artifact_path = output.clone();
            }
            if let Some(epochs) = epochs {
                config.training.epochs = *epochs;
            }
            if let Some(batch_size) = batch_size {
                config.training.batch_size = *batch_size;
            }
        }
    }
}

async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    let artifact = config.model.artifact_path.clone();
    // Load failures are fatal: never accept requests without a model
    let inference = tokio::task::spawn_blocking(move || InferenceService::load(&artifact))
        .await
        .context("model loader task failed")?
        .with_context(|| {
            format!(
                "failed to load model artifact {} (run `digitscope train` first)",
                config.model.artifact_path.display()
            )
        })?;

    start_api_server(&config.server, Arc::new(inference), shutdown_signal()).await?;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "train")]
async fn run_train(config: AppConfig) -> anyhow::Result<()> {
    let artifact = config.model.artifact_path.clone();
    let training = config.training.clone();

    let summary = tokio::task::spawn_blocking(move || {
        digitscope::training::run(&training, &artifact)
    })
    .await
    .context("training task failed")?
    .context("training failed; no artifact was written")?;

    let (loss, accuracy) = summary
        .test
        .map(|t| (t.loss, t.accuracy))
        .unwrap_or((f32::NAN, f32::NAN));
    info!(
        test_loss = loss,
        test_accuracy = accuracy,
        path = %config.model.artifact_path.display(),
        "training complete"
    );
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
