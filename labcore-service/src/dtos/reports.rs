use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AmendReportRequest {
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ShareUrlQuery {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    600
}

#[derive(Debug, Serialize)]
pub struct ShareUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ShareReportRequest {
    #[validate(length(min = 1, max = 32))]
    pub channel: String,
    #[validate(length(max = 255))]
    pub shared_with: Option<String>,
}
