//! Read-only inspection of the change-notification triggers in a tenant
//! database. The triggers themselves are installed by the platform's
//! migrations; the gateway only reports on them.

use serde::Serialize;
use sqlx::PgPool;

/// Trigger function that publishes row changes via `pg_notify`
pub const NOTIFY_FUNCTION: &str = "realtime_notify_change";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TriggerReport {
    pub database: String,
    pub function_installed: bool,
    pub covered_tables: Vec<String>,
    pub missing_tables: Vec<String>,
}

impl TriggerReport {
    pub fn is_complete(&self) -> bool {
        self.function_installed && self.missing_tables.is_empty()
    }
}

/// Check the notify function and which of `tables` carry a trigger calling
/// it. An empty `tables` inspects every ordinary table in `public`.
pub async fn inspect(pool: &PgPool, database: &str, tables: &[String]) -> Result<TriggerReport, sqlx::Error> {
    let (function_installed,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = $1)")
            .bind(NOTIFY_FUNCTION)
            .fetch_one(pool)
            .await?;

    let tables: Vec<String> = if tables.is_empty() {
        sqlx::query_as::<_, (String,)>(
            "SELECT tablename FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename",
        )
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(t,)| t)
        .collect()
    } else {
        tables.to_vec()
    };

    let covered: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT c.relname
        FROM pg_trigger t
        JOIN pg_class c ON c.oid = t.tgrelid
        JOIN pg_proc p ON p.oid = t.tgfoid
        WHERE NOT t.tgisinternal AND p.proname = $1 AND c.relname = ANY($2)
        "#,
    )
    .bind(NOTIFY_FUNCTION)
    .bind(&tables)
    .fetch_all(pool)
    .await?;

    Ok(partition(database, function_installed, tables, covered.into_iter().map(|(t,)| t).collect()))
}

fn partition(database: &str, function_installed: bool, tables: Vec<String>, covered: Vec<String>) -> TriggerReport {
    let (covered_tables, missing_tables) = tables.into_iter().partition(|t| covered.contains(t));

    TriggerReport { database: database.to_string(), function_installed, covered_tables, missing_tables }
}
