// handlers/realtime/mod.rs - POST /realtime/<endpoint> RPC handlers

mod authenticate;
mod connection;
mod delivery;
mod subscription;

pub use authenticate::{authenticate, authenticate_project, authenticate_tenant};
pub use connection::{disconnect, heartbeat};
pub use delivery::{broadcast, filter_message};
pub use subscription::{subscribe, subscribers, unsubscribe};

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::GatewayError;

/// Decode a JSON body. An empty body is the all-absent request, so the
/// field-level checks report what is missing.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| GatewayError::missing_fields(format!("Invalid request body: {}", e)))
}
