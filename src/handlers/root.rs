// handlers/root.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Monk Realtime Gateway",
            "version": version,
            "description": "Authorization gateway for realtime channels on the Monk platform",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "authenticate": "/realtime/authenticate, /realtime/:tenant/authenticate, /realtime/:tenant/:project/authenticate",
                "subscriptions": "/realtime/subscribe, /realtime/unsubscribe, /realtime/subscribers",
                "delivery": "/realtime/filter-message, /realtime/broadcast",
                "connections": "/realtime/heartbeat, /realtime/disconnect",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.gateway.health().await {
        Ok(report) => (StatusCode::OK, Json(json!({ "success": true, "data": report }))),
        Err(e) => {
            let mut body = e.to_json();
            body["data"] = json!({ "status": "degraded", "timestamp": chrono::Utc::now() });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body))
        }
    }
}
