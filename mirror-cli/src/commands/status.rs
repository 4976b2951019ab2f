//! `mirror status` — phase and trigger visibility across source records.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use mirror_core::conditions::{
    ConditionStatus, CHECK_LATEST_VERSION_TIME, LAST_APPLIED_CONFIGURATION_TIME,
};
use mirror_core::{store, CapiProvider, Phase, TemplateRegistry};

use super::{format_age, GlobalArgs};

/// Arguments for `mirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show records in this namespace.
    #[arg(long)]
    pub namespace: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.root()?;

        let mut sources = store::list_sources_at(&root)
            .with_context(|| format!("failed to list sources under {}", root.display()))?;
        if let Some(namespace) = &self.namespace {
            sources.retain(|s| s.key().namespace == *namespace);
        }

        let rows = build_rows(&sources, TemplateRegistry::builtin(), Utc::now());
        if self.json {
            print_json(&rows)?;
            return Ok(());
        }

        print_table(&root, rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRow {
    namespace: String,
    name: String,
    #[serde(rename = "type")]
    provider_type: String,
    kind: Option<String>,
    phase: Phase,
    version: String,
    installed_version: Option<String>,
    last_rollout: Option<DateTime<Utc>>,
    last_version_check: Option<DateTime<Utc>>,
    #[serde(skip)]
    last_rollout_age: String,
    #[serde(skip)]
    last_version_check_age: String,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "provider")]
    provider: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "installed")]
    installed: String,
    #[tabled(rename = "last rollout")]
    last_rollout: String,
    #[tabled(rename = "version check")]
    last_version_check: String,
}

fn build_rows(
    sources: &[CapiProvider],
    registry: &TemplateRegistry,
    now: DateTime<Utc>,
) -> Vec<ProviderRow> {
    sources
        .iter()
        .map(|source| {
            let key = source.key();
            let conditions = &source.status.provider.conditions;
            let last_rollout = conditions
                .get(LAST_APPLIED_CONFIGURATION_TIME)
                .filter(|c| c.status == ConditionStatus::True)
                .map(|c| c.last_transition_time);
            let last_version_check = conditions
                .get(CHECK_LATEST_VERSION_TIME)
                .filter(|c| c.status == ConditionStatus::True)
                .map(|c| c.last_transition_time);

            ProviderRow {
                namespace: key.namespace,
                name: key.name,
                provider_type: source.spec.provider_type.to_string(),
                kind: registry
                    .resolve(&source.spec.provider_type.0)
                    .map(|p| p.kind.kind_name().to_string()),
                phase: source.status.phase,
                version: source.spec.provider.version.clone(),
                installed_version: source.status.provider.installed_version.clone(),
                last_rollout_age: age_or_never(last_rollout, now),
                last_version_check_age: age_or_never(last_version_check, now),
                last_rollout,
                last_version_check,
            }
        })
        .collect()
}

fn age_or_never(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    timestamp
        .map(|t| format!("{} ago", format_age(t, now)))
        .unwrap_or_else(|| "never".to_string())
}

fn print_json(rows: &[ProviderRow]) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(rows).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(root: &Path, rows: Vec<ProviderRow>) {
    let ready = rows.iter().filter(|r| r.phase == Phase::Ready).count();
    let failed = rows.iter().filter(|r| r.phase == Phase::Failed).count();
    println!(
        "Mirror v{} | {} providers | {} ready | {} failed",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        ready,
        failed,
    );

    if rows.is_empty() {
        println!("No CAPIProvider records under {}.", root.display());
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            provider: format!("{}/{}", row.namespace, row.name),
            kind: row
                .kind
                .unwrap_or_else(|| format!("unknown type '{}'", row.provider_type)),
            phase: phase_label(row.phase),
            version: if row.version.is_empty() {
                "latest".to_string()
            } else {
                row.version
            },
            installed: row.installed_version.unwrap_or_else(|| "-".to_string()),
            last_rollout: row.last_rollout_age,
            last_version_check: row.last_version_check_age,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn phase_label(phase: Phase) -> String {
    match phase {
        Phase::Ready => "Ready".green().bold().to_string(),
        Phase::Failed => "Failed".red().bold().to_string(),
        Phase::Provisioning => "Provisioning".yellow().to_string(),
    }
}
