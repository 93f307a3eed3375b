//! Command handlers.

use crate::cli::{Cli, Commands, StartArgs};
use colored::{ColoredString, Colorize};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use pc_core::config::loader::validate;
use pc_core::config::{load_config, ProjectLayout};
use pc_core::state::StateManager;
use pc_core::steps::{StepContext, StepRegistry, StubInference};
use pc_core::store::{
    FsExecutionStore, FsObjectStore, FsRecordStore, ObjectStore, RecordStore,
};
use pc_protocol::workflow_models::{
    ExecutionInput, ExecutionStatus, ExecutionSummary, WorkflowExecution,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// The orchestrator and stores of one project root.
struct Workspace {
    manager: StateManager,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
}

impl Workspace {
    async fn open(root: &Path, execution_timeout_secs: Option<u64>) -> Result<Self> {
        let mut config = load_config(root).await?;
        if let Some(secs) = execution_timeout_secs {
            config.execution_timeout_secs = secs;
            validate(&config).map_err(|reason| eyre!("Invalid --execution-timeout-secs: {reason}"))?;
        }

        let layout = ProjectLayout::new(root);
        let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(layout.objects_dir()));
        let records: Arc<dyn RecordStore> = Arc::new(FsRecordStore::new(layout.records_dir()));
        let executions = Arc::new(FsExecutionStore::new(layout.executions_dir()));

        let (events_tx, _) = broadcast::channel(256);
        let manager = StateManager::new(
            config,
            StepRegistry::builtin(Arc::new(StubInference::new())),
            StepContext::new(Arc::clone(&objects), Arc::clone(&records)),
            executions,
            events_tx,
        )
        .map_err(|e| eyre!("{e:#}"))?;

        Ok(Self {
            manager,
            objects,
            records,
        })
    }

    async fn upload(&self, start: &StartArgs) -> Result<()> {
        let Some(path) = &start.image else {
            return Ok(());
        };
        let body = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("Failed to read image {}", path.display()))?;
        self.objects
            .put(&start.object_key, body)
            .await
            .wrap_err_with(|| format!("Failed to upload {}", start.object_key))?;
        tracing::info!(object_key = %start.object_key, "Uploaded image");
        Ok(())
    }

    async fn after_start(&self, execution_id: Uuid, start: &StartArgs) -> Result<ExitCode> {
        if !start.wait {
            if start.json {
                println!(
                    "{}",
                    serde_json::json!({ "executionId": execution_id.to_string() })
                );
            } else {
                println!("Started execution {}", execution_id.to_string().as_str().bold());
            }
            // The run stops with this process; the record stays RUNNING
            eprintln!(
                "{} execution {execution_id} only advances while a process drives it; \
                 pass --wait, or run `product-catalog resume` before its deadline",
                "Note:".yellow()
            );
            return Ok(ExitCode::SUCCESS);
        }

        let execution = self
            .manager
            .wait_for_execution(execution_id)
            .await
            .map_err(|e| eyre!("{e:#}"))?
            .ok_or_else(|| eyre!("Execution {execution_id} disappeared"))?;
        print_execution(&execution, start.json)?;
        Ok(exit_code(execution.status))
    }
}

/// Run one command and report how the process should exit.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let workspace = Workspace::open(&cli.root, cli.execution_timeout_secs).await?;

    match cli.command {
        Commands::Catalog {
            start,
            human_model_image_key,
        } => {
            workspace.upload(&start).await?;
            let input = ExecutionInput {
                object_key: start.object_key.clone(),
                product_id: start.product_id.clone(),
                human_model_image_key,
            };
            let execution_id = workspace
                .manager
                .start_catalog_workflow(input)
                .await
                .map_err(|e| eyre!("{e:#}"))?;
            workspace.after_start(execution_id, &start).await
        }
        Commands::Attribution { start } => {
            workspace.upload(&start).await?;
            let execution_id = workspace
                .manager
                .start_attribution_workflow(start.object_key.clone(), start.product_id.clone())
                .await
                .map_err(|e| eyre!("{e:#}"))?;
            workspace.after_start(execution_id, &start).await
        }
        Commands::Status { execution_id, json } => {
            let Some(execution) = workspace
                .manager
                .get_execution(execution_id)
                .await
                .map_err(|e| eyre!("{e:#}"))?
            else {
                bail!("Execution {execution_id} not found");
            };
            print_execution(&execution, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::List { json } => {
            let summaries = workspace
                .manager
                .list_executions()
                .await
                .map_err(|e| eyre!("{e:#}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("No executions");
            } else {
                for summary in &summaries {
                    print_summary(summary);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Draft { product_id } => {
            let Some(draft) = workspace.records.get(&product_id).await? else {
                bail!("No draft for product {product_id}");
            };
            println!("{}", serde_json::to_string_pretty(&draft)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resume { json } => {
            let recovered = workspace
                .manager
                .recover()
                .await
                .map_err(|e| eyre!("{e:#}"))?;
            if recovered.is_empty() && !json {
                println!("Nothing to resume");
                return Ok(ExitCode::SUCCESS);
            }

            let mut finished = Vec::with_capacity(recovered.len());
            for execution_id in recovered {
                if let Some(execution) = workspace
                    .manager
                    .wait_for_execution(execution_id)
                    .await
                    .map_err(|e| eyre!("{e:#}"))?
                {
                    finished.push(execution);
                }
            }

            if json {
                let summaries: Vec<_> = finished.iter().map(WorkflowExecution::summary).collect();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for execution in &finished {
                    print_summary(&execution.summary());
                }
            }

            let all_succeeded = finished
                .iter()
                .all(|e| e.status == ExecutionStatus::Succeeded);
            Ok(if all_succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn exit_code(status: ExecutionStatus) -> ExitCode {
    match status {
        ExecutionStatus::Failed | ExecutionStatus::TimedOut => ExitCode::FAILURE,
        ExecutionStatus::Running | ExecutionStatus::Succeeded => ExitCode::SUCCESS,
    }
}

fn paint(status: ExecutionStatus) -> ColoredString {
    let text = status.to_string();
    let text = text.as_str();
    match status {
        ExecutionStatus::Running => text.cyan(),
        ExecutionStatus::Succeeded => text.green(),
        ExecutionStatus::Failed => text.red(),
        ExecutionStatus::TimedOut => text.yellow(),
    }
}

fn print_summary(summary: &ExecutionSummary) {
    println!(
        "{}  {:<20} {:<12} {}",
        summary.execution_id,
        summary.topology.to_string(),
        summary.product_id,
        paint(summary.status)
    );
}

fn print_execution(execution: &WorkflowExecution, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(execution)?);
        return Ok(());
    }

    println!(
        "{} {} ({}) for product {}",
        "Execution".bold(),
        execution.execution_id,
        execution.topology,
        execution.input.product_id
    );
    println!("  Status:  {}", paint(execution.status));
    if let Some(reason) = execution.reason {
        println!("  Reason:  {reason}");
    }
    if let Some(error) = &execution.error {
        println!("  Error:   {error}");
    }
    println!("  Started: {}", execution.started_at.to_rfc3339());
    if let Some(ended_at) = execution.ended_at {
        println!("  Ended:   {}", ended_at.to_rfc3339());
    }

    println!("  History:");
    for attempt in &execution.history {
        let detail = attempt.error.as_deref().unwrap_or_default();
        println!(
            "    {:<20} #{:<2} {:<8} {}",
            attempt.step_name.to_string(),
            attempt.attempt_number,
            format!("{:?}", attempt.outcome),
            detail.dimmed()
        );
    }
    Ok(())
}
