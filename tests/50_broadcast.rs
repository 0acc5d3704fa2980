mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::ALICE;

#[tokio::test]
async fn server_broadcast_is_accepted() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) = common::post(
        server,
        "/realtime/broadcast",
        None,
        json!({ "channel": "broadcast:announcements", "payload": { "text": "maintenance at 5" } }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "channel": "broadcast:announcements", "broadcasted": true }));
    Ok(())
}

#[tokio::test]
async fn client_broadcast_requires_channel_access() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(ALICE, "tenant_acme", Some("project_crm"));
    let conn = common::connect(server, &token, json!({})).await?;

    let (status, _) = common::post(
        server,
        "/realtime/broadcast",
        None,
        json!({ "channel": "presence:lobby", "payload": { "online": true }, "options": { "connection_id": conn } }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::post(
        server,
        "/realtime/broadcast",
        None,
        json!({ "channel": "broadcast:ops", "payload": {}, "options": { "connection_id": conn } }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCESS_DENIED");

    let (status, _) = common::post(
        server,
        "/realtime/broadcast",
        None,
        json!({
            "channel": "broadcast:lobby",
            "payload": {},
            "options": { "connection_id": Uuid::new_v4().to_string() }
        }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn broadcast_requires_channel_and_payload() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) = common::post(server, "/realtime/broadcast", None, json!({ "payload": {} })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELDS");

    let (status, _) =
        common::post(server, "/realtime/broadcast", None, json!({ "channel": "broadcast:lobby" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
