use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/download`
#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequest<'a> {
    pub url: &'a str,
}

/// Response from the resolver. `links` is kept as a raw JSON map so entry
/// order survives and odd values can be skipped instead of failing the
/// whole decode.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub links: Option<Map<String, Value>>,
}

/// Error body the resolver sends alongside a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Configuration for the resolver client
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/download".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}
