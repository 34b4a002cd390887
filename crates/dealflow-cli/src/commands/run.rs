//! `dealflow run` — drive one analysis workflow interactively.
//!
//! Starts a workflow on an in-process orchestrator, prints streamed progress
//! to the terminal, and prompts for the continue / refine / skip decision at
//! every review gate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use dialoguer::{Input, Select};
use tokio::sync::broadcast;

use dealflow_core::agents::{AgentRegistry, ScriptedAgent};
use dealflow_core::events::WorkflowEvent;
use dealflow_core::llm::ChatClient;
use dealflow_core::models::company::{CompanyProfile, DocumentKind, SourceDocument};
use dealflow_core::models::workflow::StepName;
use dealflow_core::{Orchestrator, OrchestratorConfig};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    company: String,
    website: String,
    sector: String,
    region: String,
    hq: Option<String>,
    documents: Vec<String>,
    offline: bool,
) -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealflow_core=warn".into()),
        )
        .init();

    let registry = if offline {
        scripted_registry()
    } else {
        AgentRegistry::llm(Arc::new(ChatClient::from_env()))
    };
    let orchestrator = Arc::new(Orchestrator::new(registry, OrchestratorConfig::default()));

    let profile = CompanyProfile {
        company_name: company,
        website,
        sector,
        region,
        hq_location: hq,
    };
    let source_documents = load_documents(&documents)?;

    let started = orchestrator
        .start(profile, source_documents)
        .await
        .map_err(|e| e.to_string())?;
    let id = started.workflow_id.clone();

    println!(
        "{} {}",
        style("Workflow").bold(),
        style(&started.workflow_id).dim()
    );
    println!(
        "{} {}",
        style("Steps:").bold(),
        started
            .step_sequence
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(" → ")
    );
    println!();

    let mut events = orchestrator
        .subscribe(&id)
        .await
        .map_err(|e| e.to_string())?;

    loop {
        match events.recv().await {
            Ok(WorkflowEvent::Status { message }) => {
                println!("{}", style(format!("  {}", message)).dim());
            }
            Ok(WorkflowEvent::Chunk { text, .. }) => {
                print!("{}", text);
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            Ok(WorkflowEvent::StepComplete { step, attempt }) => {
                println!();
                review_step(&orchestrator, &id, step, attempt).await?;
            }
            Ok(WorkflowEvent::Error { step, message }) => {
                println!(
                    "{}",
                    style(format!("{} failed: {}", step.label(), message)).red()
                );
                recover_step(&orchestrator, &id, step).await?;
            }
            Ok(WorkflowEvent::Cancelled) => {
                println!("{}", style("Workflow cancelled").yellow());
                break;
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }

    // Final summary; the workflow may already be evicted after a cancel
    if let Ok(snapshot) = orchestrator.inspect(&id).await {
        println!();
        println!("{}", style("Final status").bold());
        for step in &snapshot.steps {
            println!(
                "  {:<22} {:<16} attempt {}",
                step.name.label(),
                step.status.as_str(),
                step.attempt
            );
        }
        if let Ok(memo) = orchestrator.artifact(&id, StepName::Memo).await {
            if let Some(draft) = memo.current.payload.as_memo() {
                println!();
                println!("{}", style("IC Memo draft").bold());
                println!("{}", draft.memo_content);
            }
        }
    }

    Ok(())
}

/// Prompt the reviewer at a completed step's gate and apply the decision.
async fn review_step(
    orchestrator: &Arc<Orchestrator>,
    workflow_id: &str,
    step: StepName,
    attempt: u32,
) -> Result<(), String> {
    let choice = prompt_select(
        format!(
            "{} ready for review (attempt {})",
            step.label(),
            attempt
        ),
        &["Continue", "Refine", "Skip", "Cancel"],
    )
    .await?;

    match choice {
        0 => {
            if orchestrator
                .approve(workflow_id)
                .await
                .map_err(|e| e.to_string())?
                .is_none()
            {
                println!("{}", style("All steps complete").green());
            }
        }
        1 => {
            let feedback = prompt_feedback().await?;
            orchestrator
                .refine(workflow_id, &feedback)
                .await
                .map_err(|e| e.to_string())?;
        }
        2 => {
            if orchestrator
                .skip(workflow_id)
                .await
                .map_err(|e| e.to_string())?
                .is_none()
            {
                println!("{}", style("All steps complete").green());
            }
        }
        _ => {
            orchestrator
                .cancel(workflow_id)
                .await
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Prompt after a failed step: refine with guidance, or abandon.
async fn recover_step(
    orchestrator: &Arc<Orchestrator>,
    workflow_id: &str,
    step: StepName,
) -> Result<(), String> {
    let choice = prompt_select(
        format!("{} failed — retry with guidance?", step.label()),
        &["Refine with feedback", "Cancel workflow"],
    )
    .await?;

    if choice == 0 {
        let feedback = prompt_feedback().await?;
        orchestrator
            .refine(workflow_id, &feedback)
            .await
            .map_err(|e| e.to_string())?;
    } else {
        orchestrator
            .cancel(workflow_id)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn prompt_select(prompt: String, items: &[&str]) -> Result<usize, String> {
    let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        Select::new()
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

async fn prompt_feedback() -> Result<String, String> {
    tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("Feedback for the next attempt")
            .interact_text()
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

fn load_documents(paths: &[String]) -> Result<Vec<SourceDocument>, String> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;
        let filename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        let kind = match Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("pdf") => DocumentKind::Pdf,
            Some("xls") | Some("xlsx") | Some("csv") => DocumentKind::Excel,
            Some("ppt") | Some("pptx") => DocumentKind::Powerpoint,
            Some("doc") | Some("docx") => DocumentKind::Word,
            _ => DocumentKind::Text,
        };
        documents.push(SourceDocument {
            filename,
            kind,
            text,
        });
    }
    Ok(documents)
}

fn scripted_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for step in [
        StepName::Research,
        StepName::DataRoom,
        StepName::RiskScan,
        StepName::Memo,
    ] {
        registry.register(
            step,
            Arc::new(
                ScriptedAgent::new(step)
                    .with_chunks(vec![
                        format!("[offline] {} finding one. ", step.label()),
                        format!("[offline] {} finding two.\n", step.label()),
                    ])
                    .with_delay(Duration::from_millis(300)),
            ),
        );
    }
    registry
}
