//! Deep research agent — drafts the public-intelligence report.
//!
//! Generates the three report sections one at a time (company overview
//! first, then competitive context, then the broader market), emitting each
//! finished section as a chunk on the progress stream.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ServerError;
use crate::llm::ChatClient;
use crate::models::artifact::{ReportSection, ResearchReport, StepArtifact};

use super::{feedback_instruction, ProgressSink, StepAgent, StepContext};

const SYSTEM_PROMPT: &str = "You are a world-class investment analyst producing investor-grade research.\n\
Your analysis must be:\n\
1. Factual and data-driven with specific numbers where possible\n\
2. Professional and concise\n\
3. Focused on investment implications\n\
4. Explicit about uncertainty — never invent figures\n\
End the section with a 'Sources:' list of any URLs you relied on, one per line.";

pub struct DeepResearchAgent {
    client: Arc<ChatClient>,
}

impl DeepResearchAgent {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }

    async fn generate_section(
        &self,
        title: &str,
        user_prompt: String,
        sink: &ProgressSink,
    ) -> Result<ReportSection, ServerError> {
        sink.status(format!("Drafting {}...", title)).await?;
        let content = self.client.complete(SYSTEM_PROMPT, &user_prompt).await?;
        sink.chunk(format!("## {}\n\n{}\n\n", title, content)).await?;
        let sources = extract_sources(&content);
        Ok(ReportSection {
            title: title.to_string(),
            content,
            sources,
        })
    }
}

#[async_trait]
impl StepAgent for DeepResearchAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        let company = &ctx.company;
        let feedback = feedback_instruction(ctx.feedback.as_deref());

        sink.status(format!(
            "Researching {} ({} / {})...",
            company.company_name, company.sector, company.region
        )).await?;

        // Company first — it anchors the other two sections.
        let company_section = self
            .generate_section(
                "Company Overview",
                format!(
                    "Write a Company/Team Overview for {} ({}), a {} company in {}.\n\n\
                     Address:\n\
                     1. What the company does — product, customers, and the pain point it solves\n\
                     2. Founding team and key executives, with relevant track record\n\
                     3. Known traction metrics, funding history, and recent newsrun\n\
                     Flag anything you could not verify as unknown.{}",
                    company.company_name, company.website, company.sector, company.region, feedback
                ),
                sink,
            )
            .await?;

        let competitor_section = self
            .generate_section(
                "Competitor Overview",
                format!(
                    "Write a Competitor Overview for {} in the {} sector ({}).\n\n\
                     Address:\n\
                     1. Identification & scope — closest competitors and substitutes, regional and global, and why they are comparable\n\
                     2. Positioning & differentiation — how {} compares on scale, strategy, and business model\n\
                     3. MOAT analysis — potential durable advantages (data assets, brand, workflow lock-in, network density, partnerships)\n\
                     Focus on investment-relevant insights.{}",
                    company.company_name, company.sector, company.region, company.company_name, feedback
                ),
                sink,
            )
            .await?;

        let market_section = self
            .generate_section(
                "Market Overview",
                format!(
                    "Provide market context for evaluating {} in the {} sector in {}.\n\n\
                     Address:\n\
                     1. Market size & growth — current size and CAGR, with sources\n\
                     2. Market dynamics & structure — winner-takes-most or room for multiple players; network effects or economies of scale\n\
                     3. Key drivers & risks — and how they affect {}'s opportunity\n\
                     4. Outcome potential — can a leader reach $100M+ revenue and $1B+ valuation, and why now\n\
                     Skip generic business-model descriptions.{}",
                    company.company_name, company.sector, company.region, company.company_name, feedback
                ),
                sink,
            )
            .await?;

        Ok(StepArtifact::Research(ResearchReport {
            sections: vec![company_section, competitor_section, market_section],
            generated_at: Utc::now(),
        }))
    }
}

/// Pull URLs out of a generated section so renderers can list references.
fn extract_sources(content: &str) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for token in content.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != ':');
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            if !sources.iter().any(|s| s == trimmed) {
                sources.push(trimmed.to_string());
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sources_dedupes() {
        let content = "Strong growth (https://example.com/report). \
                       Sources:\nhttps://example.com/report\nhttps://news.test/item";
        let sources = extract_sources(content);
        assert_eq!(
            sources,
            vec![
                "https://example.com/report".to_string(),
                "https://news.test/item".to_string()
            ]
        );
    }
}
