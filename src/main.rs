use std::io;
use std::path::Path;

use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};

use block_server::app_state::AppState;
use block_server::config::{AppConfig, LoggingConfig};
use block_server::gateway;

fn init_logging(logging: &LoggingConfig, debug: bool) {
    let config_file = Path::new(&logging.config_file);
    if config_file.exists() {
        match log4rs::init_file(config_file, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Failed to load {}: {}, falling back to env_logger", config_file.display(), e),
        }
    }
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let mut config = AppConfig::load_from(&AppConfig::config_path())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    config.apply_env_overrides();
    init_logging(&config.logging, config.server.debug);

    if config.server.debug {
        warn!("Debug mode: running a single worker");
    }
    let workers = config.server.effective_workers();
    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::from_config(config).map_err(io::Error::other)?;
    let data = web::Data::new(state);
    info!("Starting block server on {}:{} with {} workers", host, port, workers);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(data.clone())
            .configure(gateway::configure)
    })
    .workers(workers)
    .bind((host.as_str(), port))?
    .run()
    .await
}
