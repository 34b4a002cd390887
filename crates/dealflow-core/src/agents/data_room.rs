//! Data room agent — digests the supplied deal documents.
//!
//! Documents arrive with their text already extracted (parsing is the
//! caller's concern). The agent condenses them into a qualitative summary
//! plus a list of quantitative findings for the downstream risk scan and
//! memo steps.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::ServerError;
use crate::llm::ChatClient;
use crate::models::artifact::{DataRoomDigest, StepArtifact};
use crate::models::company::SourceDocument;

use super::{feedback_instruction, ProgressSink, StepAgent, StepContext};

/// Per-document character budget when assembling the analysis context.
const MAX_CHARS_PER_DOCUMENT: usize = 10_000;

const SYSTEM_PROMPT: &str = "You are an investment analyst processing a deal data room.\n\
Extract only what the documents actually say. Cite the source filename for every finding.\n\
Respond with a JSON object:\n\
{\n\
  \"qualitative_summary\": \"prose summary of the business, team, product, and contracts\",\n\
  \"quantitative_findings\": [\"one finding per entry, each with its figure and source filename\"]\n\
}";

/// Shape of the model's JSON reply.
#[derive(Debug, Deserialize)]
struct DigestPayload {
    #[serde(default)]
    qualitative_summary: String,
    #[serde(default)]
    quantitative_findings: Vec<String>,
}

pub struct DataRoomAgent {
    client: Arc<ChatClient>,
}

impl DataRoomAgent {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StepAgent for DataRoomAgent {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError> {
        if ctx.documents.is_empty() {
            return Err(ServerError::Generation(
                "Data room step invoked without source documents".to_string(),
            ));
        }

        sink.status(format!(
            "Analyzing {} data room file(s)...",
            ctx.documents.len()
        )).await?;

        let context = build_document_context(&ctx.documents);
        let user_prompt = format!(
            "Company: {}\n\nData room documents:\n{}{}",
            ctx.company.company_name,
            context,
            feedback_instruction(ctx.feedback.as_deref())
        );

        sink.status("Extracting qualitative and quantitative data...").await?;
        let value = self.client.complete_json(SYSTEM_PROMPT, &user_prompt).await?;
        let payload: DigestPayload = serde_json::from_value(value)
            .map_err(|e| ServerError::Generation(format!("Unexpected digest shape: {}", e)))?;

        sink.chunk(format!("{}\n\n", payload.qualitative_summary)).await?;
        for finding in &payload.quantitative_findings {
            sink.chunk(format!("- {}\n", finding)).await?;
        }

        Ok(StepArtifact::DataRoom(DataRoomDigest {
            files_processed: ctx.documents.len(),
            qualitative_summary: payload.qualitative_summary,
            quantitative_findings: payload.quantitative_findings,
            generated_at: Utc::now(),
        }))
    }
}

fn build_document_context(documents: &[SourceDocument]) -> String {
    let mut parts = Vec::with_capacity(documents.len());
    for doc in documents {
        let text = if doc.text.len() > MAX_CHARS_PER_DOCUMENT {
            // Truncate on a char boundary
            let mut end = MAX_CHARS_PER_DOCUMENT;
            while !doc.text.is_char_boundary(end) {
                end -= 1;
            }
            &doc.text[..end]
        } else {
            &doc.text
        };
        parts.push(format!(
            "--- {} ({}) ---\n{}\n",
            doc.filename,
            doc.kind.as_str(),
            text
        ));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::company::DocumentKind;

    #[test]
    fn test_context_truncates_long_documents() {
        let doc = SourceDocument {
            filename: "deck.pdf".to_string(),
            kind: DocumentKind::Pdf,
            text: "x".repeat(MAX_CHARS_PER_DOCUMENT * 2),
        };
        let context = build_document_context(&[doc]);
        assert!(context.contains("deck.pdf (pdf)"));
        assert!(context.len() < MAX_CHARS_PER_DOCUMENT + 200);
    }
}
