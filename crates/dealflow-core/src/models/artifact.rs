//! Step artifact payloads.
//!
//! Each pipeline step produces one artifact shape; the `StepArtifact` union
//! is tagged by step name so downstream consumers can match on exactly the
//! variant their upstream step produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::workflow::StepName;

/// One titled section of a research report, with cited sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub title: String,
    pub content: String,
    pub sources: Vec<String>,
}

/// Output of the deep-research step: company, competitor, and market
/// sections in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub sections: Vec<ReportSection>,
    pub generated_at: DateTime<Utc>,
}

/// Output of the data-room step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRoomDigest {
    pub files_processed: usize,
    pub qualitative_summary: String,
    pub quantitative_findings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// A validated risk with evidence and source citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFinding {
    pub category: String,
    pub risk: String,
    pub severity: String,
    pub evidence: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_impact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigant: Option<String>,
}

/// An area requiring further due diligence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenQuestion {
    pub category: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_dd: Option<String>,
}

/// An inconsistency between intelligence sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityIssue {
    pub issue: String,
    pub description: String,
    pub sources: String,
    pub recommendation: String,
}

/// Output of the risk-scan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskReport {
    pub top_risks: Vec<RiskFinding>,
    pub open_questions: Vec<OpenQuestion>,
    #[serde(default)]
    pub data_quality_issues: Vec<DataQualityIssue>,
    pub generated_at: DateTime<Utc>,
}

/// Output of the memo-draft step: the full memo body plus which upstream
/// sources fed into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoDraft {
    pub memo_content: String,
    pub sources_used: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// The artifact produced by one step, tagged by step name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step")]
pub enum StepArtifact {
    #[serde(rename = "research")]
    Research(ResearchReport),
    #[serde(rename = "data-room")]
    DataRoom(DataRoomDigest),
    #[serde(rename = "risk-scan")]
    RiskScan(RiskReport),
    #[serde(rename = "memo")]
    Memo(MemoDraft),
}

impl StepArtifact {
    /// The step this artifact belongs to.
    pub fn step(&self) -> StepName {
        match self {
            StepArtifact::Research(_) => StepName::Research,
            StepArtifact::DataRoom(_) => StepName::DataRoom,
            StepArtifact::RiskScan(_) => StepName::RiskScan,
            StepArtifact::Memo(_) => StepName::Memo,
        }
    }

    pub fn as_research(&self) -> Option<&ResearchReport> {
        match self {
            StepArtifact::Research(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_data_room(&self) -> Option<&DataRoomDigest> {
        match self {
            StepArtifact::DataRoom(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_risk_scan(&self) -> Option<&RiskReport> {
        match self {
            StepArtifact::RiskScan(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_memo(&self) -> Option<&MemoDraft> {
        match self {
            StepArtifact::Memo(m) => Some(m),
            _ => None,
        }
    }
}

/// One stored generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAttempt {
    pub attempt: u32,
    pub payload: StepArtifact,
    pub created_at: DateTime<Utc>,
}

/// The current artifact for a step plus the history of attempts it
/// superseded. An artifact slot is all-or-nothing per attempt — a failed
/// generation never writes here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVersions {
    pub current: ArtifactAttempt,
    #[serde(default)]
    pub history: Vec<ArtifactAttempt>,
}

impl ArtifactVersions {
    /// Store the first successful attempt for a step. `attempt` is the
    /// workflow's attempt counter, which also counts failed attempts.
    pub fn new(payload: StepArtifact, attempt: u32) -> Self {
        Self {
            current: ArtifactAttempt {
                attempt,
                payload,
                created_at: Utc::now(),
            },
            history: Vec::new(),
        }
    }

    /// Replace the current payload with a refined one, retaining the prior
    /// attempt in history.
    pub fn supersede(&mut self, payload: StepArtifact, attempt: u32) {
        let prior = std::mem::replace(
            &mut self.current,
            ArtifactAttempt {
                attempt,
                payload,
                created_at: Utc::now(),
            },
        );
        self.history.push(prior);
    }

    pub fn attempt(&self) -> u32 {
        self.current.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memo(text: &str) -> StepArtifact {
        StepArtifact::Memo(MemoDraft {
            memo_content: text.to_string(),
            sources_used: vec![],
            generated_at: Utc::now(),
        })
    }

    #[test]
    fn test_supersede_keeps_history() {
        let mut versions = ArtifactVersions::new(memo("first draft"), 1);
        assert_eq!(versions.attempt(), 1);
        assert!(versions.history.is_empty());

        versions.supersede(memo("second draft"), 2);
        assert_eq!(versions.attempt(), 2);
        assert_eq!(versions.history.len(), 1);
        assert_eq!(versions.history[0].attempt, 1);
        assert_eq!(
            versions.history[0].payload.as_memo().unwrap().memo_content,
            "first draft"
        );
        assert_eq!(
            versions.current.payload.as_memo().unwrap().memo_content,
            "second draft"
        );
    }

    #[test]
    fn test_artifact_serde_tag_matches_step_name() {
        let artifact = memo("draft");
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["step"], "memo");

        let back: StepArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back.step(), StepName::Memo);
    }
}
