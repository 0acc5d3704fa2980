use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::gateway::RealtimeGateway;
use crate::handlers::{realtime, root};

#[derive(Clone)]
pub struct AppState {
    pub gateway: RealtimeGateway,
}

pub fn app(gateway: RealtimeGateway, request_timeout: Duration) -> Router {
    Router::new()
        // Public
        .route("/", get(root::root))
        .route("/health", get(root::health))
        .merge(realtime_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(AppState { gateway })
}

fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/realtime/authenticate", post(realtime::authenticate))
        .route("/realtime/:tenant/authenticate", post(realtime::authenticate_tenant))
        .route("/realtime/:tenant/:project/authenticate", post(realtime::authenticate_project))
        .route("/realtime/subscribe", post(realtime::subscribe))
        .route("/realtime/unsubscribe", post(realtime::unsubscribe))
        .route("/realtime/subscribers", post(realtime::subscribers))
        .route("/realtime/filter-message", post(realtime::filter_message))
        .route("/realtime/broadcast", post(realtime::broadcast))
        .route("/realtime/heartbeat", post(realtime::heartbeat))
        .route("/realtime/disconnect", post(realtime::disconnect))
}
