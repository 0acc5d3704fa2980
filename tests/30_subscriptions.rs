mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{ALICE, BOB};

#[tokio::test]
async fn subscribe_grants_and_denies_by_channel() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(ALICE, "tenant_acme", Some("project_crm"));
    let conn = common::connect(server, &token, json!({})).await?;

    let (status, body) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:activities", "event_types": ["INSERT", "update"] }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["subscribed"], true);
    assert_eq!(body["data"]["event_types"], json!(["INSERT", "UPDATE"]));

    // Policy maps activity_log to the activities entity
    let (status, _) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:activity_log" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    for channel in ["table:contacts", "broadcast:ops", "presence:ops", "custom:finance", "mystery:x"] {
        let (status, body) = common::post(
            server,
            "/realtime/subscribe",
            None,
            json!({ "connection_id": conn, "channel": channel }),
        )
        .await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "channel {}", channel);
        assert_eq!(body["code"], "ACCESS_DENIED");
    }

    for channel in ["presence:lobby", "broadcast:lobby", "custom:ops"] {
        let (status, _) = common::post(
            server,
            "/realtime/subscribe",
            None,
            json!({ "connection_id": conn, "channel": channel }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK, "channel {}", channel);
    }
    Ok(())
}

#[tokio::test]
async fn subscribe_field_and_connection_errors() -> Result<()> {
    let server = common::ensure_server().await?;

    let (status, body) = common::post(server, "/realtime/subscribe", None, json!({ "channel": "table:a" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELDS");

    let (status, body) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": Uuid::new_v4().to_string(), "channel": "table:activities" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");

    let token = common::token(BOB, "tenant_globex", None);
    let conn = common::connect(server, &token, json!({})).await?;
    let (status, body) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:orders", "filters": { "total": { "$regex": "x" } } }),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELDS");
    Ok(())
}

#[tokio::test]
async fn filters_on_redacted_fields_are_refused() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(ALICE, "tenant_acme", Some("project_crm"));
    let conn = common::connect(server, &token, json!({})).await?;

    for filters in [json!({ "password": { "$gte": "m" } }), json!({ "ssn": "123-45-6789" })] {
        let (status, body) = common::post(
            server,
            "/realtime/subscribe",
            None,
            json!({ "connection_id": conn, "channel": "table:activities", "filters": filters }),
        )
        .await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "ACCESS_DENIED");
    }

    // per-table sensitive field, but only on the table that declares it
    let (status, _) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:activity_log", "filters": { "ip_address": "10.0.0.1" } }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:activities", "filters": { "ip_address": "10.0.0.1" } }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn unsubscribe_twice_succeeds() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(BOB, "tenant_globex", None);
    let conn = common::connect(server, &token, json!({})).await?;

    common::post(server, "/realtime/subscribe", None, json!({ "connection_id": conn, "channel": "table:orders" }))
        .await?;

    for _ in 0..2 {
        let (status, body) = common::post(
            server,
            "/realtime/unsubscribe",
            None,
            json!({ "connection_id": conn, "channel": "table:orders" }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["unsubscribed"], true);
    }

    let (status, _) = common::post(
        server,
        "/realtime/unsubscribe",
        None,
        json!({ "connection_id": Uuid::new_v4().to_string(), "channel": "table:orders" }),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn subscribers_lists_by_channel_and_operation() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(BOB, "tenant_globex", None);
    let conn = common::connect(server, &token, json!({})).await?;

    common::post(
        server,
        "/realtime/subscribe",
        None,
        json!({ "connection_id": conn, "channel": "table:invoices", "event_types": ["DELETE"] }),
    )
    .await?;

    let (_, body) =
        common::post(server, "/realtime/subscribers", None, json!({ "channel": "table:invoices" })).await?;
    let ids: Vec<_> = body["data"]["connections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["connection_id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&conn));

    let (_, body) = common::post(
        server,
        "/realtime/subscribers",
        None,
        json!({ "channel": "table:invoices", "operation": "INSERT" }),
    )
    .await?;
    assert!(!body["data"]["connections"].as_array().unwrap().iter().any(|c| c["connection_id"] == conn.as_str()));
    Ok(())
}

#[tokio::test]
async fn heartbeat_and_disconnect() -> Result<()> {
    let server = common::ensure_server().await?;
    let token = common::token(BOB, "tenant_globex", None);
    let conn = common::connect(server, &token, json!({})).await?;
    common::post(server, "/realtime/subscribe", None, json!({ "connection_id": conn, "channel": "table:orders" }))
        .await?;

    let (status, body) = common::post(server, "/realtime/heartbeat", None, json!({ "connection_id": conn })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "connected");

    for _ in 0..2 {
        let (status, body) =
            common::post(server, "/realtime/disconnect", None, json!({ "connection_id": conn })).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["disconnected"], true);
    }

    let (status, body) = common::post(server, "/realtime/heartbeat", None, json!({ "connection_id": conn })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");

    // subscriptions went with the connection
    let (_, body) = common::post(server, "/realtime/subscribers", None, json!({ "channel": "table:orders" })).await?;
    assert!(!body["data"]["connections"].as_array().unwrap().iter().any(|c| c["connection_id"] == conn.as_str()));

    let (status, _) = common::post(server, "/realtime/disconnect", None, json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
