pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod routes;

use std::sync::Arc;

use actix_cors::Cors;

use inference::Classifier;

/// Per-process application context handed to every request handler.
///
/// Holds the model loaded at startup; nothing in here changes afterwards.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(model: impl Classifier + 'static) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

/// CORS policy: only the listed origins, any method or header, credentials allowed.
pub fn cors(allowed_origins: &[String]) -> Cors {
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}
