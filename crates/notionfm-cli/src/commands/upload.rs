//! Upload command - Send local files to a Notion page
//!
//! Every path becomes one upload task. Tasks run on a bounded worker pool;
//! Ctrl-C stops new tasks from starting while in-flight uploads finish.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use notionfm_core::domain::UploadProgress;
use notionfm_transfer::orchestrator::{TransferTotals, UploadOrchestrator, UploadResult};
use notionfm_transfer::session::ProgressCallback;
use tracing::{info, warn};

use super::{parse_page, Context};
use crate::output::{format_bytes, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Files to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Destination page id
    #[arg(long)]
    pub page: String,

    /// Files uploaded at the same time (defaults to `upload.concurrency`)
    #[arg(long)]
    pub concurrency: Option<u32>,
}

impl UploadCommand {
    pub async fn execute(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let page = parse_page(&self.page)?;
        let concurrency = self.concurrency.unwrap_or(ctx.config.upload.concurrency).max(1);

        let mut orchestrator = UploadOrchestrator::from_config(ctx.remote_store()?, &ctx.config.upload);
        if !ctx.quiet {
            let json = format.is_json();
            let callback: ProgressCallback = Arc::new(move |p: &UploadProgress| {
                get_formatter(json).progress(p);
            });
            orchestrator = orchestrator.with_progress(callback);
        }
        let orchestrator = Arc::new(orchestrator);

        let stopper = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted: finishing in-flight uploads, cancelling the rest");
                    orchestrator.stop();
                }
            }
        });

        info!(files = self.paths.len(), page = %page, concurrency, "Starting upload");
        let results = orchestrator
            .submit(self.paths.clone(), &page, concurrency as usize)
            .await;
        stopper.abort();

        let totals = orchestrator.totals();
        let failed = results.iter().filter(|r| !r.is_success()).count();

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": failed == 0,
                "page": page.as_str(),
                "files": results.iter().map(result_json).collect::<Vec<_>>(),
                "totals": totals_json(&totals),
            }));
        } else {
            for result in &results {
                match (&result.outcome, &result.error) {
                    (Some(outcome), _) => {
                        formatter.success(&format!(
                            "{} ({}, upload {})",
                            result.path.display(),
                            format_bytes(outcome.bytes_sent),
                            outcome.upload_id
                        ));
                        if outcome.retries > 0 || outcome.recoveries > 0 {
                            formatter.info(&format!(
                                "retries: {}, session recoveries: {}",
                                outcome.retries, outcome.recoveries
                            ));
                        }
                    }
                    (None, error) => formatter.error(&format!(
                        "{}: {}",
                        result.path.display(),
                        error.as_deref().unwrap_or("unknown error")
                    )),
                }
            }
            formatter.info("");
            formatter.info(&format!(
                "{} uploaded, {} failed, {} in {:.1}s ({}/s)",
                totals.completed,
                totals.failed,
                format_bytes(totals.bytes_transferred),
                totals.elapsed().as_secs_f64(),
                format_bytes(totals.throughput() as u64)
            ));
        }

        if failed > 0 {
            bail!("{} of {} uploads failed", failed, results.len());
        }
        Ok(())
    }
}

fn result_json(result: &UploadResult) -> serde_json::Value {
    let mut value = serde_json::json!({
        "task_id": result.task_id.to_string(),
        "path": result.path.display().to_string(),
        "status": result.status,
        "error": result.error,
    });
    if let Some(outcome) = &result.outcome {
        value["upload_id"] = serde_json::json!(outcome.upload_id.as_str());
        value["bytes_sent"] = serde_json::json!(outcome.bytes_sent);
        value["sessions_created"] = serde_json::json!(outcome.sessions_created);
        value["retries"] = serde_json::json!(outcome.retries);
        value["recoveries"] = serde_json::json!(outcome.recoveries);
    }
    value
}

fn totals_json(totals: &TransferTotals) -> serde_json::Value {
    serde_json::json!({
        "total_files": totals.total_files,
        "completed": totals.completed,
        "failed": totals.failed,
        "bytes_transferred": totals.bytes_transferred,
        "peak_in_flight": totals.peak_in_flight,
        "elapsed_secs": totals.elapsed().as_secs_f64(),
        "bytes_per_sec": totals.throughput(),
    })
}
