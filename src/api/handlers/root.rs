//! Undocumented root endpoint, handy for load balancer probes.

use axum::response::IntoResponse;
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    axum::Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
