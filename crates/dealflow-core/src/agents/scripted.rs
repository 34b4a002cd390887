//! Scripted step agent — produces canned artifacts without a provider.
//!
//! Used by the test suite (where it injects artificial delay and scripted
//! failures) and by the CLI's offline mode. The artifact it produces embeds
//! any reviewer feedback so a refine attempt is distinguishable from the
//! original.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ServerError;
use crate::models::artifact::{
    DataRoomDigest, MemoDraft, OpenQuestion, ReportSection, ResearchReport, RiskFinding,
    RiskReport, StepArtifact,
};
use crate::models::workflow::StepName;

use super::{ProgressSink, StepAgent, StepContext};

pub struct ScriptedAgent {
    step: StepName,
    chunks: Vec<String>,
    /// Pause before each chunk, to widen the window in which overlapping
    /// executions would be observable.
    delay: Duration,
    /// Attempt numbers that fail with a generation error.
    failing_attempts: Vec<u32>,
}

impl ScriptedAgent {
    pub fn new(step: StepName) -> Self {
        Self {
            step,
            chunks: vec![format!("{} output", step.label())],
            delay: Duration::ZERO,
            failing_attempts: Vec::new(),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<String>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the given attempt numbers with a generation error.
    pub fn failing_on(mut self, attempts: Vec<u32>) -> Self {
        self.failing_attempts = attempts;
        self
    }

    fn artifact(&self, ctx: &StepContext, body: String) -> StepArtifact {
        let now = Utc::now();
        match self.step {
            StepName::Research => StepArtifact::Research(ResearchReport {
                sections: vec![ReportSection {
                    title: "Company Overview".to_string(),
                    content: body,
                    sources: vec![],
                }],
                generated_at: now,
            }),
            StepName::DataRoom => StepArtifact::DataRoom(DataRoomDigest {
                files_processed: ctx.documents.len(),
                qualitative_summary: body,
                quantitative_findings: vec![],
                generated_at: now,
            }),
            StepName::RiskScan => StepArtifact::RiskScan(RiskReport {
                top_risks: vec![RiskFinding {
                    category: "Market & Competition Risk".to_string(),
                    risk: body,
                    severity: "Medium".to_string(),
                    evidence: "scripted".to_string(),
                    source: "scripted".to_string(),
                    potential_impact: None,
                    mitigant: None,
                }],
                open_questions: vec![OpenQuestion {
                    category: "Market & Competition".to_string(),
                    question: "What is the competitive moat?".to_string(),
                    context: None,
                    priority: "High".to_string(),
                    suggested_dd: None,
                }],
                data_quality_issues: vec![],
                generated_at: now,
            }),
            StepName::Memo => StepArtifact::Memo(MemoDraft {
                memo_content: body,
                sources_used: ctx.prior.keys().map(|s| s.as_str().to_string()).collect(),
                generated_at: now,
            }),
        }
    }
}

#[async_trait]
impl StepAgent for ScriptedAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        sink.status(format!("Running {}...", self.step.label())).await?;

        let mut body = String::new();
        for chunk in &self.chunks {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            sink.chunk(chunk.clone()).await?;
            body.push_str(chunk);
        }

        if self.failing_attempts.contains(&ctx.attempt) {
            return Err(ServerError::Generation(format!(
                "Scripted failure on attempt {}",
                ctx.attempt
            )));
        }

        if let Some(feedback) = ctx.feedback.as_deref() {
            body.push_str(" [refined: ");
            body.push_str(feedback);
            body.push(']');
        }

        Ok(self.artifact(ctx, body))
    }
}
