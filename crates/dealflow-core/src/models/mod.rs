pub mod artifact;
pub mod company;
pub mod workflow;

pub use artifact::{
    ArtifactAttempt, ArtifactVersions, DataQualityIssue, DataRoomDigest, MemoDraft, OpenQuestion,
    ReportSection, ResearchReport, RiskFinding, RiskReport, StepArtifact,
};
pub use company::{CompanyProfile, DocumentKind, SourceDocument};
pub use workflow::{StepName, StepSnapshot, StepStatus, WorkflowSnapshot, WorkflowSummary};
