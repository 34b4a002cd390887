//! Risk scanner agent — flags material risks across all gathered intelligence.
//!
//! Consumes whatever upstream artifacts exist (a skipped research or
//! data-room step simply contributes nothing) and produces validated risks,
//! open diligence questions, and data-quality issues, each tied to evidence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::ServerError;
use crate::llm::ChatClient;
use crate::models::artifact::{
    DataQualityIssue, OpenQuestion, RiskFinding, RiskReport, StepArtifact,
};
use crate::models::workflow::StepName;

use super::{feedback_instruction, ProgressSink, StepAgent, StepContext};

/// Per-section character budget when assembling the analysis context.
const MAX_CHARS_PER_SECTION: usize = 10_000;

const SYSTEM_PROMPT: &str = "You are an expert investment risk analyst conducting due diligence for a VC/PE firm.\n\
Your role is to identify material risks, anomalies, and red flags that could impact investment decisions.\n\
\n\
CRITICAL RULES:\n\
1. ONLY flag risks that have EVIDENCE in the provided intelligence\n\
2. Do NOT make up or infer risks without supporting data\n\
3. Every risk must be cited to specific sources\n\
4. Distinguish VALIDATED risks (evidence exists) from OPEN QUESTIONS (needs further DD)\n\
5. Be specific — vague concerns are not helpful";

/// Shape of the model's JSON reply (mirrors the prompt contract below).
#[derive(Debug, Deserialize)]
struct RiskPayload {
    #[serde(default)]
    top_risks: Vec<RiskItem>,
    #[serde(default)]
    open_questions: Vec<QuestionItem>,
    #[serde(default)]
    data_quality_issues: Vec<QualityItem>,
}

#[derive(Debug, Deserialize)]
struct RiskItem {
    category: String,
    risk: String,
    severity: String,
    evidence: String,
    source: String,
    potential_impact: Option<String>,
    mitigant: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    category: String,
    question: String,
    context: Option<String>,
    priority: String,
    suggested_dd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QualityItem {
    issue: String,
    description: String,
    sources: String,
    recommendation: String,
}

pub struct RiskScannerAgent {
    client: Arc<ChatClient>,
}

impl RiskScannerAgent {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepAgent for RiskScannerAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        sink.status("Preparing context from all sources...").await?;
        let context = build_intelligence_context(ctx);

        let user_prompt = format!(
            "Analyze the following intelligence for {} and identify material risks.\n\n\
             {}\n\n\
             Scan for risks across these categories:\n\
             1. Market & Competition Risk: market size concerns, competitive threats, positioning weaknesses\n\
             2. Customer & Revenue Risk: concentration risk, churn, contract terms, revenue quality\n\
             3. Business Model & Monetization: margin issues, unit economics, scalability constraints\n\
             4. Financial Risks: burn rate, runway, working capital, revenue/margin shifts\n\
             5. Team & Governance: management gaps, turnover, cap table issues, founder control\n\
             6. Legal & Regulatory: compliance gaps, litigation, regulatory exposure\n\n\
             Return a JSON object:\n\
             {{\n\
               \"top_risks\": [{{\"category\": \"...\", \"risk\": \"...\", \"severity\": \"High|Medium|Low\", \"evidence\": \"...\", \"source\": \"...\", \"potential_impact\": \"...\", \"mitigant\": \"...\"}}],\n\
               \"open_questions\": [{{\"category\": \"...\", \"question\": \"...\", \"context\": \"...\", \"priority\": \"High|Medium|Low\", \"suggested_dd\": \"...\"}}],\n\
               \"data_quality_issues\": [{{\"issue\": \"...\", \"description\": \"...\", \"sources\": \"...\", \"recommendation\": \"...\"}}]\n\
             }}\n\n\
             REQUIREMENTS:\n\
             - Include 5-10 top risks (prioritize by severity and potential impact)\n\
             - Include 5-10 open questions for further DD\n\
             - Flag any data inconsistencies or quality issues\n\
             - Every item MUST have specific evidence and source citations\n\
             - If no risks found in a category, omit it (don't create placeholder risks){}",
            ctx.company.company_name,
            context,
            feedback_instruction(ctx.feedback.as_deref())
        );

        sink.status("Analyzing for risks and anomalies...").await?;
        let value = self.client.complete_json(SYSTEM_PROMPT, &user_prompt).await?;
        let payload: RiskPayload = serde_json::from_value(value)
            .map_err(|e| ServerError::Generation(format!("Unexpected risk analysis shape: {}", e)))?;

        sink.status(format!(
            "Identified {} risks, {} open questions",
            payload.top_risks.len(),
            payload.open_questions.len()
        )).await?;
        for risk in &payload.top_risks {
            sink.chunk(format!(
                "- [{}] {} — {}\n",
                risk.severity, risk.category, risk.risk
            )).await?;
        }

        Ok(StepArtifact::RiskScan(RiskReport {
            top_risks: payload
                .top_risks
                .into_iter()
                .map(|r| RiskFinding {
                    category: r.category,
                    risk: r.risk,
                    severity: r.severity,
                    evidence: r.evidence,
                    source: r.source,
                    potential_impact: r.potential_impact,
                    mitigant: r.mitigant,
                })
                .collect(),
            open_questions: payload
                .open_questions
                .into_iter()
                .map(|q| OpenQuestion {
                    category: q.category,
                    question: q.question,
                    context: q.context,
                    priority: q.priority,
                    suggested_dd: q.suggested_dd,
                })
                .collect(),
            data_quality_issues: payload
                .data_quality_issues
                .into_iter()
                .map(|i| DataQualityIssue {
                    issue: i.issue,
                    description: i.description,
                    sources: i.sources,
                    recommendation: i.recommendation,
                })
                .collect(),
            generated_at: Utc::now(),
        }))
    }
}

/// Assemble the risk-scan context from whatever upstream intelligence is
/// available. Missing artifacts (skipped steps) are noted as unavailable
/// rather than failing the scan.
fn build_intelligence_context(ctx: &StepContext) -> String {
    let mut parts = vec![format!("Company: {}", ctx.company.company_name)];

    match ctx.prior.get(&StepName::Research).and_then(|a| a.as_research()) {
        Some(research) => {
            parts.push("## PUBLIC INTELLIGENCE (Deep Research)".to_string());
            for section in &research.sections {
                let content = clamp(&section.content, MAX_CHARS_PER_SECTION);
                parts.push(format!("### {}\n{}", section.title, content));
            }
        }
        None => parts.push("## PUBLIC INTELLIGENCE: not available".to_string()),
    }

    match ctx.prior.get(&StepName::DataRoom).and_then(|a| a.as_data_room()) {
        Some(digest) => {
            parts.push("## PRIVATE INTELLIGENCE (Data Room)".to_string());
            parts.push(clamp(&digest.qualitative_summary, MAX_CHARS_PER_SECTION).to_string());
            for finding in &digest.quantitative_findings {
                parts.push(format!("- {}", finding));
            }
        }
        None => parts.push("## PRIVATE INTELLIGENCE: not available".to_string()),
    }

    parts.join("\n\n")
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::company::CompanyProfile;
    use std::collections::HashMap;

    #[test]
    fn test_context_marks_missing_sources_unavailable() {
        let ctx = StepContext {
            company: CompanyProfile {
                company_name: "Bizzi".to_string(),
                website: "https://bizzi.vn".to_string(),
                sector: "SaaS".to_string(),
                region: "Vietnam".to_string(),
                hq_location: None,
            },
            documents: vec![],
            prior: HashMap::new(),
            feedback: None,
            attempt: 1,
        };
        let context = build_intelligence_context(&ctx);
        assert!(context.contains("PUBLIC INTELLIGENCE: not available"));
        assert!(context.contains("PRIVATE INTELLIGENCE: not available"));
    }
}
