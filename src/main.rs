use std::process;

use tokio::net::TcpListener;
use tracing_subscriber::{
    fmt::{writer::BoxMakeWriter, Layer},
    layer::SubscriberExt,
    EnvFilter, Registry,
};

use siroy_storefront::config::Config;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(1);
        }
    };

    // add tracing layer
    let file_appender = tracing_appender::rolling::never(".", &config.log_file);
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // json into the log file, plain text on stdout
    let file_layer = Layer::new()
        .json()
        .with_writer(BoxMakeWriter::new(move || file_writer.clone()));
    let stdout_layer = Layer::new().with_writer(BoxMakeWriter::new(move || stdout_writer.clone()));

    let subscriber = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .with(stdout_layer);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global subscriber: {err}");
        process::exit(1);
    }

    if config.uses_fallback_secret() {
        tracing::warn!("JWT_SECRET is not set, falling back to an insecure default");
    }

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => {
            tracing::info!("Listening on port: {}", config.port);
            listener
        }
        Err(err) => {
            tracing::error!("Failed to bind to port: {}", err);
            process::exit(1);
        }
    };

    let router = match siroy_storefront::app(&config) {
        Ok(router) => {
            tracing::info!("Routes constructed successfully");
            router
        }
        Err(err) => {
            tracing::error!("Failed to construct routes: {}", err);
            process::exit(1);
        }
    };

    //start the http service
    let http_service = axum::serve(listener, router);
    if let Err(err) = http_service.await {
        tracing::error!("Failed to start server: {}", err);
        process::exit(1);
    }
}
