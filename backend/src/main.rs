use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use log::info;

use decision_backend::config::ServerConfig;
use decision_backend::inference::ModelHandle;
use decision_backend::{cors, routes, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let config = ServerConfig::parse();
    info!("🚀 Starting decision backend v{}", env!("CARGO_PKG_VERSION"));

    // The server never binds if the model cannot be loaded.
    let model = ModelHandle::load(&config.model_path)
        .with_context(|| format!("cannot load model from {}", config.model_path.display()))?;
    info!("✅ Model loaded, inputs: {:?}", model.input_names());

    let state = web::Data::new(AppState::new(model));
    let bind_address = config.bind_address();
    let workers = config.worker_count();
    let origins = config.allowed_origins.clone();

    info!("🌐 Listening on http://{}", bind_address);
    info!("👷 Workers: {}", workers);
    info!("🔒 Allowed origins: {:?}", origins);
    info!("🔧 Endpoints:");
    info!("   GET  /         - health check");
    info!("   POST /predict  - single prediction");

    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .workers(workers)
    .bind(&bind_address)
    .with_context(|| format!("cannot bind {bind_address}"))?
    .run()
    .await
    .context("server terminated with an error")?;

    Ok(())
}
