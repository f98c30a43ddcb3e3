use augur::adapters::{InMemoryRepository, KalshiGateway, PostgresRepository};
use augur::config::{AppConfig, LoggingConfig};
use augur::error::Result;
use augur::exchange::{MarketGateway, PaperGateway};
use augur::persistence::Repository;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},augur=debug,sqlx=warn", logging.level))
    });

    let log_dir = std::env::var("AUGUR_LOG_DIR").unwrap_or_else(|_| "logs".to_string());

    // `rolling::daily` panics if it can't create the first file, so check writability
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".augur_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "augur.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Process-lifetime guard
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let (json_layer, text_layer) = if logging.json {
        (
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/augur.log", log_dir);
    }
}

pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

/// PostgreSQL when `database.url` is set, in-memory otherwise
pub async fn build_repository(config: &AppConfig) -> Result<Arc<dyn Repository>> {
    match config.database.url.as_deref() {
        Some(url) => {
            let store = PostgresRepository::new(url, config.database.max_connections).await?;
            info!("Using PostgreSQL repository");
            Ok(Arc::new(store))
        }
        None => {
            warn!("database.url not set; using in-memory repository, state is lost on exit");
            Ok(Arc::new(InMemoryRepository::new()))
        }
    }
}

pub fn build_gateway(
    config: &AppConfig,
    paper: bool,
    repository: Arc<dyn Repository>,
) -> Result<Arc<dyn MarketGateway>> {
    if !paper {
        let gateway = KalshiGateway::new(&config.exchange, config.engine.dry_run, repository)?;
        return Ok(Arc::new(gateway));
    }

    let gateway = match &config.exchange.paper_markets_file {
        Some(path) => PaperGateway::from_json_file(path, repository)?,
        None => {
            warn!("No paper market file configured; paper book starts empty");
            PaperGateway::new(repository, Vec::new())
        }
    };
    Ok(Arc::new(gateway))
}

pub async fn shutdown_signal() {
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
}
