#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

use monk_realtime::auth::{generate_jwt, Claims};

pub const JWT_SECRET: &str = "integration-test-secret";

/// Edit in acme, read member of acme/crm, full in globex
pub const ALICE: &str = "6f1c1a8e-3a50-4d7e-9a4e-0b7c9b2f1a11";
/// Read in globex only
pub const BOB: &str = "0d8e4c7b-1111-4a2b-8c3d-9e8f7a6b5c4d";
/// Root in acme
pub const ROOT: &str = "2b9c4e1a-7d3f-4a58-b6e2-91c0d8f4a7e3";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_monk-realtime"));
        cmd.arg("serve")
            .env("APP_ENV", "development")
            .env("REALTIME_PORT", port.to_string())
            .env("REALTIME_STORE", "memory")
            .env("REALTIME_DIRECTORY_FILE", format!("{}/directory.yaml", fixtures))
            .env("REALTIME_POLICY_FILE", format!("{}/policy.yaml", fixtures))
            .env("SECURITY_JWT_SECRET", JWT_SECRET)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Session token for `user` scoped to `tenant` (and optionally `project`)
pub fn token(user: &str, tenant: &str, project: Option<&str>) -> String {
    let claims = Claims::new(
        tenant.to_string(),
        project.map(str::to_string),
        "test-user".to_string(),
        Uuid::parse_str(user).expect("valid user id"),
        chrono::Duration::hours(1),
    );
    generate_jwt(JWT_SECRET, &claims).expect("token")
}

pub fn expired_token(user: &str, tenant: &str) -> String {
    let claims = Claims::new(
        tenant.to_string(),
        None,
        "test-user".to_string(),
        Uuid::parse_str(user).expect("valid user id"),
        chrono::Duration::hours(-2),
    );
    generate_jwt(JWT_SECRET, &claims).expect("token")
}

/// POST a JSON body and return status plus decoded envelope
pub async fn post(server: &TestServer, path: &str, bearer: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
    let client = reqwest::Client::new();
    let mut req = client.post(server.url(path)).json(&body);
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }
    let res = req.send().await?;
    let status = res.status();
    let body = res.json::<Value>().await?;
    Ok((status, body))
}

/// Authenticate and return the new connection id
pub async fn connect(server: &TestServer, bearer: &str, body: Value) -> Result<String> {
    let (status, body) = post(server, "/realtime/authenticate", Some(bearer), body).await?;
    anyhow::ensure!(status == StatusCode::OK, "authenticate failed: {} {}", status, body);
    body["data"]["connection_id"].as_str().map(str::to_string).context("missing connection_id")
}

pub fn short_id(long: &str) -> String {
    monk_realtime::identity::scope::ScopeId::tenant(long)
        .expect("valid tenant id")
        .as_str()
        .to_string()
}
