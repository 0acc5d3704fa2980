use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::{server, sweeper};

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let runtime = server::build(config).await?;
    let report = sweeper::sweep_once(runtime.gateway.registries().connections.as_ref(), &runtime.sweep).await?;
    runtime.shutdown().await;

    output_success(
        &output_format,
        &format!("Marked {} connections stale, removed {}", report.marked_stale, report.removed),
        Some(json!(report)),
    )
}
