use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse, Responder};
use log::{debug, error, warn};
use serde_json::{Map, Value};

use crate::error::ServingError;
use crate::models::{ErrorBody, FeatureRecord, HealthResponse, PredictionResponse};
use crate::AppState;

/// Upper bound on a `/predict` body. The payload is three numbers.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

#[get("/")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse::running())
}

#[post("/predict")]
pub async fn predict(
    state: web::Data<AppState>,
    body: web::Json<Map<String, Value>>,
) -> Result<HttpResponse, ServingError> {
    let record = FeatureRecord::from_fields(&body).map_err(|errors| {
        warn!("Rejected prediction request: {:?}", errors);
        ServingError::Validation(errors)
    })?;

    let model = Arc::clone(&state.model);
    let prediction = web::block(move || model.predict(&record))
        .await
        .map_err(|e| {
            error!("Blocking pool error: {}", e);
            ServingError::WorkerUnavailable
        })?
        .map_err(|e| {
            error!("Prediction failed for {:?}: {}", record, e);
            ServingError::Inference(e)
        })?;

    debug!("Predicted label {} for {:?}", prediction.label, record);
    Ok(HttpResponse::Ok().json(PredictionResponse::from(prediction)))
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ErrorBody::new("not found"))
}

/// JSON extractor settings: small bodies only, and payload errors answered in
/// the same shape as every other error.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| {
            warn!("Malformed request body: {}", err);
            ServingError::MalformedBody(err.to_string()).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(health)
        .service(predict)
        .default_service(web::to(not_found));
}
