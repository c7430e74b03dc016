use std::path::PathBuf;

use actix_web::http::Uri;
use clap::Parser;

/// Startup configuration. Every flag can also be supplied through the
/// environment variable named next to it.
#[derive(Debug, Clone, Parser)]
#[command(name = "decision-backend", version, about = "Serve the pathway decision model over HTTP")]
pub struct ServerConfig {
    /// Path to the ONNX model artifact.
    #[arg(long, env = "MODEL_PATH", default_value = "uk_decision_model.onnx")]
    pub model_path: PathBuf,

    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8001)]
    pub port: u16,

    /// Number of HTTP workers; defaults to the number of CPUs.
    #[arg(long, env = "WORKERS")]
    pub workers: Option<usize>,

    /// Origins allowed to call the API from a browser (comma separated).
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        value_parser = parse_origin,
        default_values_t = default_origins()
    )]
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.filter(|w| *w > 0).unwrap_or_else(num_cpus::get)
    }
}

pub fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:8080".to_string(),
    ]
}

/// Accept only `scheme://host[:port]`, parsed the same way actix-cors parses
/// allowed origins so a bad value fails here instead of in every worker.
fn parse_origin(raw: &str) -> Result<String, String> {
    let origin = raw.trim().trim_end_matches('/');
    if origin == "*" {
        return Err("wildcard origin cannot be combined with credentials".to_string());
    }
    let uri = origin
        .parse::<Uri>()
        .map_err(|e| format!("origin {origin:?} is not a valid URI: {e}"))?;
    if !matches!(uri.scheme_str(), Some("http" | "https")) {
        return Err(format!("origin {origin:?} must start with http:// or https://"));
    }
    if uri.host().map_or(true, str::is_empty) || uri.path_and_query().is_some_and(|p| p.as_str() != "/") {
        return Err(format!("origin {origin:?} must be scheme://host[:port]"));
    }
    Ok(origin.to_string())
}
