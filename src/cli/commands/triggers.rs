use serde_json::json;

use crate::cli::utils::{output_failure, output_success};
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::triggers;
use crate::identity::scope::ScopeId;
use crate::server;

pub async fn handle(config: &AppConfig, tenant: &str, tables: &[String], output_format: OutputFormat) -> anyhow::Result<()> {
    let tenant = ScopeId::tenant(tenant)?;
    let databases = server::database_manager(config)?;
    let pool = databases.tenant_pool(&tenant).await?;

    let report = triggers::inspect(&pool, &tenant.database_name(), tables).await?;
    databases.close_all().await;

    if report.is_complete() {
        return output_success(
            &output_format,
            &format!("{}: all {} tables publish realtime changes", report.database, report.covered_tables.len()),
            Some(json!(report)),
        );
    }

    let message = if report.function_installed {
        format!("{}: tables without trigger: {}", report.database, report.missing_tables.join(", "))
    } else {
        format!("{}: function {} is not installed", report.database, triggers::NOTIFY_FUNCTION)
    };
    output_failure(&output_format, &message, Some(json!(report)))?;
    anyhow::bail!("realtime triggers incomplete in {}", report.database)
}
