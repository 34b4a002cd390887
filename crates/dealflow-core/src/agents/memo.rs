//! IC memo drafter agent — synthesizes all upstream artifacts into a
//! first-draft Investment Committee memo.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ServerError;
use crate::llm::ChatClient;
use crate::models::artifact::{MemoDraft, StepArtifact};
use crate::models::workflow::StepName;

use super::{feedback_instruction, ProgressSink, StepAgent, StepContext};

/// Per-source character budget when assembling the memo context.
const MAX_CHARS_PER_SOURCE: usize = 12_000;

const SYSTEM_PROMPT: &str = "You are an expert investment analyst drafting Investment Committee (IC) memos for a VC/PE firm.\n\
Your role is to synthesize all available intelligence into a professional, actionable IC memo.\n\
\n\
CRITICAL REQUIREMENTS:\n\
1. Every factual claim MUST be cited (source: document name, or \"Public research\")\n\
2. Write in professional, investment-grade prose\n\
3. Be balanced — highlight both opportunities AND risks\n\
4. Make a clear recommendation (Proceed to DD / Pass / Hold)\n\
5. Use specific numbers and data points, with citations\n\
6. Flag any data gaps or inconsistencies";

const REQUIRED_SECTIONS: &str = "REQUIRED SECTIONS (in order):\n\
1. Executive Summary — thesis, key highlights, financial snapshot, recommendation overview\n\
2. Company Overview\n\
3. Market Overview — size, growth, dynamics, drivers, risks\n\
4. Competition & MOAT\n\
5. Business Model & Unit Economics\n\
6. Financial Performance (mark N/A if no data room)\n\
7. Investment Highlights — top 3-5 reasons to invest, each with evidence\n\
8. Investment Risks & Mitigants — top 5 material risks with mitigants and severity\n\
9. Recommendation & Next Steps — Proceed to DD / Pass / Hold with rationale and key DD items\n\
10. Appendix Notes — data sources used, assumptions, inconsistencies, information gaps";

pub struct MemoDrafterAgent {
    client: Arc<ChatClient>,
}

impl MemoDrafterAgent {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepAgent for MemoDrafterAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        sink.status("Preparing context from all agent outputs...").await?;

        let mut context_parts = vec![format!(
            "Company: {}\nSector: {}\nRegion: {}\nWebsite: {}",
            ctx.company.company_name, ctx.company.sector, ctx.company.region, ctx.company.website
        )];
        let mut sources_used = Vec::new();

        if let Some(research) = ctx.prior.get(&StepName::Research).and_then(|a| a.as_research()) {
            sources_used.push(StepName::Research.as_str().to_string());
            context_parts.push("## DEEP RESEARCH".to_string());
            for section in &research.sections {
                context_parts.push(format!(
                    "### {}\n{}",
                    section.title,
                    clamp(&section.content, MAX_CHARS_PER_SOURCE)
                ));
            }
        }

        if let Some(digest) = ctx.prior.get(&StepName::DataRoom).and_then(|a| a.as_data_room()) {
            sources_used.push(StepName::DataRoom.as_str().to_string());
            context_parts.push(format!(
                "## DATA ROOM ({} files)\n{}\n{}",
                digest.files_processed,
                clamp(&digest.qualitative_summary, MAX_CHARS_PER_SOURCE),
                digest
                    .quantitative_findings
                    .iter()
                    .map(|f| format!("- {}", f))
                    .collect::<Vec<_>>()
                    .join("\n")
            ));
        }

        if let Some(risks) = ctx.prior.get(&StepName::RiskScan).and_then(|a| a.as_risk_scan()) {
            sources_used.push(StepName::RiskScan.as_str().to_string());
            context_parts.push("## RISK SCAN".to_string());
            for risk in &risks.top_risks {
                context_parts.push(format!(
                    "- [{}] {}: {} (evidence: {}; source: {})",
                    risk.severity, risk.category, risk.risk, risk.evidence, risk.source
                ));
            }
            for question in &risks.open_questions {
                context_parts.push(format!(
                    "- Open question [{}]: {}",
                    question.priority, question.question
                ));
            }
        }

        let user_prompt = format!(
            "Draft a comprehensive Investment Committee memo for {}.\n\n\
             Use ALL available intelligence below. Where a source is missing, mark the \
             affected sections N/A rather than inventing content.\n\n\
             {}\n\n\
             {}{}",
            ctx.company.company_name,
            context_parts.join("\n\n"),
            REQUIRED_SECTIONS,
            feedback_instruction(ctx.feedback.as_deref())
        );

        sink.status("Drafting IC memo...").await?;
        let memo_content = self.client.complete(SYSTEM_PROMPT, &user_prompt).await?;
        sink.chunk(memo_content.clone()).await?;

        Ok(StepArtifact::Memo(MemoDraft {
            memo_content,
            sources_used,
            generated_at: Utc::now(),
        }))
    }
}

fn clamp(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
