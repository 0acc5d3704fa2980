// handlers/realtime/delivery.rs - filter-message, broadcast

use axum::{body::Bytes, extract::State};

use crate::app::AppState;
use crate::gateway::requests::{BroadcastResponse, FilterMessageResponse, RawBroadcast, RawFilterMessage};
use crate::middleware::{ApiResponse, ApiResult};

/// POST /realtime/filter-message
///
/// Called once per candidate recipient of a change event. Success returns
/// the payload redacted for that connection; any error means drop.
pub async fn filter_message(State(state): State<AppState>, body: Bytes) -> ApiResult<FilterMessageResponse> {
    let raw: RawFilterMessage = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.filter_message(raw.validate()?).await?))
}

/// POST /realtime/broadcast
/// `{ "channel", "payload", "options"?: { "connection_id" } }`
pub async fn broadcast(State(state): State<AppState>, body: Bytes) -> ApiResult<BroadcastResponse> {
    let raw: RawBroadcast = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.broadcast(raw.validate()?).await?))
}
