use serde::{Deserialize, Serialize};

/// Structured company information supplied when a workflow is started.
///
/// Dealflow does not parse free-form prompts — callers provide the company
/// profile already structured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub company_name: String,
    pub website: String,
    pub sector: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hq_location: Option<String>,
}

/// Source file category for a data-room document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Excel,
    Powerpoint,
    Word,
    Text,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Excel => "excel",
            DocumentKind::Powerpoint => "powerpoint",
            DocumentKind::Word => "word",
            DocumentKind::Text => "text",
        }
    }
}

/// A data-room document supplied at workflow start.
///
/// File parsing happens upstream — documents arrive here with their text
/// already extracted, and flow through the pipeline as opaque payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub filename: String,
    pub kind: DocumentKind,
    pub text: String,
}
