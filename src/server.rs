//! Wiring: builds the gateway and its collaborators from configuration

use anyhow::{bail, Context};
use std::sync::Arc;

use crate::config::{AppConfig, StoreKind};
use crate::database::{DatabaseManager, PoolSettings};
use crate::gateway::broadcast::{MemoryBroadcastSink, PgNotifySink};
use crate::gateway::{GatewayServices, RealtimeGateway};
use crate::permissions::policy::RealtimePolicy;
use crate::registry::{PgRegistry, Registries};
use crate::services::{DirectoryService, JwtAuthService, PgApiKeyStore, PgProjectService, PgTenantService};
use crate::sweeper::SweepSettings;

/// A built gateway plus the resources its owner must manage
pub struct Runtime {
    pub gateway: RealtimeGateway,
    pub databases: Option<DatabaseManager>,
    pub sweep: SweepSettings,
}

impl Runtime {
    pub async fn shutdown(&self) {
        if let Some(databases) = &self.databases {
            databases.close_all().await;
        }
    }
}

pub fn sweep_settings(config: &AppConfig) -> SweepSettings {
    let realtime = &config.realtime;
    SweepSettings {
        stale_after: chrono::Duration::seconds(realtime.stale_after_secs as i64),
        heartbeat_timeout: chrono::Duration::seconds(realtime.heartbeat_timeout_secs as i64),
        interval: std::time::Duration::from_secs(realtime.sweep_interval_secs.max(1)),
    }
}

pub fn database_manager(config: &AppConfig) -> anyhow::Result<DatabaseManager> {
    let settings = PoolSettings {
        max_connections: config.database.max_connections,
        acquire_timeout: std::time::Duration::from_secs(config.database.connection_timeout),
    };
    DatabaseManager::new(&config.database.url, settings).context("invalid database configuration")
}

fn load_policy(config: &AppConfig) -> anyhow::Result<RealtimePolicy> {
    match &config.realtime.policy_file {
        Some(path) => {
            let policy = RealtimePolicy::load(path)?;
            tracing::info!("Loaded realtime policy from {} ({} table rules)", path, policy.tables.len());
            Ok(policy)
        }
        None => Ok(RealtimePolicy::default()),
    }
}

pub async fn build(config: &AppConfig) -> anyhow::Result<Runtime> {
    if config.security.jwt_secret.is_empty() {
        bail!("SECURITY_JWT_SECRET must be set");
    }
    let policy = load_policy(config)?;
    let audit = config.security.enable_audit_logging;

    let (gateway, databases) = match config.realtime.store {
        StoreKind::Memory => {
            let directory = match &config.realtime.directory_file {
                Some(path) => Arc::new(DirectoryService::load(path)?),
                None => {
                    tracing::warn!("No REALTIME_DIRECTORY_FILE set; every credential will be denied");
                    Arc::new(DirectoryService::default())
                }
            };
            let services = GatewayServices {
                auth: Arc::new(JwtAuthService::new(config.security.jwt_secret.clone(), directory.clone())),
                tenants: directory.clone(),
                projects: directory,
                registries: Registries::memory(),
                sink: Arc::new(MemoryBroadcastSink::default()),
                policy,
            };
            (RealtimeGateway::new(services, audit), None)
        }
        StoreKind::Postgres => {
            let databases = database_manager(config)?;
            let main_pool = databases.main_pool().await.context("failed to connect to system database")?;

            let registry = PgRegistry::new(main_pool.clone());
            registry.ensure_schema().await.context("failed to prepare registry schema")?;

            let services = GatewayServices {
                auth: Arc::new(JwtAuthService::new(
                    config.security.jwt_secret.clone(),
                    Arc::new(PgApiKeyStore::new(main_pool.clone())),
                )),
                tenants: Arc::new(PgTenantService::new(main_pool.clone())),
                projects: Arc::new(PgProjectService::new(databases.clone(), main_pool.clone())),
                registries: Registries::postgres(registry),
                sink: Arc::new(PgNotifySink::new(main_pool, config.realtime.notify_channel.clone())),
                policy,
            };
            (RealtimeGateway::new(services, audit), Some(databases))
        }
    };

    tracing::info!("Realtime gateway ready ({:?} store, {:?})", config.realtime.store, config.environment);
    Ok(Runtime { gateway, databases, sweep: sweep_settings(config) })
}
