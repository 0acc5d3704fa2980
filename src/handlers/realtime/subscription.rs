// handlers/realtime/subscription.rs - subscribe, unsubscribe, subscribers

use axum::{body::Bytes, extract::State};

use crate::app::AppState;
use crate::gateway::requests::{
    RawSubscribe, RawSubscribers, RawUnsubscribe, SubscribeResponse, SubscribersResponse, UnsubscribeResponse,
};
use crate::middleware::{ApiResponse, ApiResult};

/// POST /realtime/subscribe
/// `{ "connection_id", "channel": "table:activities", "filters"?, "event_types"? }`
pub async fn subscribe(State(state): State<AppState>, body: Bytes) -> ApiResult<SubscribeResponse> {
    let raw: RawSubscribe = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.subscribe(raw.validate()?).await?))
}

/// POST /realtime/unsubscribe
pub async fn unsubscribe(State(state): State<AppState>, body: Bytes) -> ApiResult<UnsubscribeResponse> {
    let raw: RawUnsubscribe = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.unsubscribe(raw.validate()?).await?))
}

/// POST /realtime/subscribers
/// `{ "channel", "operation"? }` → live connections subscribed to the channel
pub async fn subscribers(State(state): State<AppState>, body: Bytes) -> ApiResult<SubscribersResponse> {
    let raw: RawSubscribers = super::parse_body(&body)?;
    Ok(ApiResponse::success(state.gateway.subscribers(raw.validate()?).await?))
}
