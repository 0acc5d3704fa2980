// handlers/realtime/authenticate.rs - POST /realtime[/:tenant[/:project]]/authenticate

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::app::AppState;
use crate::gateway::requests::{AuthenticateResponse, RawAuthenticate};
use crate::middleware::{ApiResponse, ApiResult, HeaderCredentials};

/**
 * Resolve a credential into a registered connection.
 *
 * Credentials come from `Authorization: Bearer` / `X-API-Key` or the
 * `access_token` / `apikey` body fields; headers win. Tenant and project
 * hints come from the path or the body; the path wins.
 *
 * ```json
 * { "tenant": "tenant_acme", "project": "project_crm", "socket_id": "s-1",
 *   "ip": "10.0.0.1", "user_agent": "Mozilla/5.0" }
 * ```
 */
pub async fn authenticate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<AuthenticateResponse> {
    run(state, headers, body, None, None).await
}

pub async fn authenticate_tenant(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AuthenticateResponse> {
    run(state, headers, body, Some(tenant), None).await
}

pub async fn authenticate_project(
    State(state): State<AppState>,
    Path((tenant, project)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AuthenticateResponse> {
    run(state, headers, body, Some(tenant), Some(project)).await
}

async fn run(
    state: AppState,
    headers: HeaderMap,
    body: Bytes,
    path_tenant: Option<String>,
    path_project: Option<String>,
) -> ApiResult<AuthenticateResponse> {
    let mut raw: RawAuthenticate = super::parse_body(&body)?;

    let (token, api_key) = HeaderCredentials::from_headers(&headers).overlay(raw.access_token.take(), raw.apikey.take());
    raw.access_token = token;
    raw.apikey = api_key;
    raw.tenant = path_tenant.or(raw.tenant);
    raw.project = path_project.or(raw.project);

    let response = state.gateway.authenticate(raw.validate()?).await?;
    Ok(ApiResponse::success(response))
}
