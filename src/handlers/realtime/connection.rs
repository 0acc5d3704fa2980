// handlers/realtime/connection.rs - heartbeat, disconnect

use axum::{body::Bytes, extract::State};

use crate::app::AppState;
use crate::gateway::requests::{DisconnectResponse, HeartbeatResponse, RawConnectionRef};
use crate::middleware::{ApiResponse, ApiResult};

/// POST /realtime/heartbeat
pub async fn heartbeat(State(state): State<AppState>, body: Bytes) -> ApiResult<HeartbeatResponse> {
    let raw: RawConnectionRef = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.heartbeat(raw.validate()?).await?))
}

/// POST /realtime/disconnect (idempotent)
pub async fn disconnect(State(state): State<AppState>, body: Bytes) -> ApiResult<DisconnectResponse> {
    let raw: RawConnectionRef = super::parse_body(&body)?;
    let (raw_id, connection_id) = raw.validate_lenient()?;
    Ok(ApiResponse::success(state.gateway.disconnect(raw_id, connection_id).await?))
}
