//! `mirror sync` — one reconciliation pass over one or every source record.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use mirror_core::{ObjectKey, TemplateRegistry};
use mirror_sync::pipeline::{self, ReconcileResult, SyncScope};

use super::{runtime, GlobalArgs};

/// Arguments for `mirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source record to sync, as `namespace/name` or a bare name in `default`.
    pub provider: Option<ObjectKey>,

    /// Sync every source record in the store.
    #[arg(long, conflicts_with = "provider")]
    pub all: bool,

    /// Print the changes a pass would make without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.root()?;
        let config = global.load_config(&root)?;

        let scope = match (self.all, self.provider) {
            (true, _) => SyncScope::All,
            (false, Some(key)) => SyncScope::Provider(key),
            (false, None) => bail!("provide a provider as namespace/name or use --all"),
        };

        let results = runtime()?
            .block_on(pipeline::run(
                &root,
                &scope,
                TemplateRegistry::builtin(),
                &config,
                self.dry_run,
            ))
            .context("sync failed")?;

        if results.is_empty() {
            println!("No CAPIProvider records under {}.", root.display());
            return Ok(());
        }

        for result in &results {
            print_result(result, self.dry_run);
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            bail!("{failed} of {} provider(s) failed to sync", results.len());
        }
        Ok(())
    }
}

fn print_result(result: &ReconcileResult, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let kind = result
        .kind
        .map(|k| k.kind_name().to_string())
        .unwrap_or_else(|| "-".to_string());

    match &result.error {
        None => println!(
            "{prefix}{} {} → {kind} ({})",
            "✓".green(),
            result.key,
            result.phase
        ),
        Some(e) => println!("{prefix}{} {}: {e}", "✗".red(), result.key),
    }

    for diff in &result.diffs {
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
    }
}
