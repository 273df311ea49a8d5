use chrono::{DateTime, Utc};
use serde::Serialize;

/// One applicant as read from the people table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub closure_classification: Option<String>,
    pub created: DateTime<Utc>,
    /// Fields the dashboard does not interpret.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Person {
    pub fn recognized_status(&self) -> Option<Status> {
        self.status.as_deref().and_then(Status::parse)
    }

    pub fn closure(&self) -> Option<ClosureBucket> {
        match self.recognized_status() {
            Some(Status::Closed) => Some(ClosureBucket::classify(
                self.closure_classification.as_deref(),
            )),
            _ => None,
        }
    }

    /// True once the person has made it past initial screening, including
    /// people closed after a call or after onboarding.
    pub fn has_qualified(&self) -> bool {
        match self.recognized_status() {
            Some(Status::Closed) => self
                .closure()
                .map(|bucket| bucket != ClosureBucket::BeforeQualification)
                .unwrap_or(false),
            Some(status) => status.is_qualified(),
            None => false,
        }
    }
}

/// One observed status transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunnelEvent {
    pub id: String,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub person_id: Option<String>,
}

impl FunnelEvent {
    pub fn reached(&self, status: Status) -> bool {
        self.to_status.as_deref().and_then(Status::parse) == Some(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Status {
    New,
    Unassessed,
    Lead,
    WaitingOnReply,
    CallUpcoming,
    CallCompleted,
    Onboarded,
    Paused,
    Closed,
}

impl Status {
    pub const ALL: [Status; 9] = [
        Status::New,
        Status::Unassessed,
        Status::Lead,
        Status::WaitingOnReply,
        Status::CallUpcoming,
        Status::CallCompleted,
        Status::Onboarded,
        Status::Paused,
        Status::Closed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::New => "New",
            Status::Unassessed => "Unassessed",
            Status::Lead => "Lead",
            Status::WaitingOnReply => "Waiting on Reply",
            Status::CallUpcoming => "Call Upcoming",
            Status::CallCompleted => "Call Completed",
            Status::Onboarded => "Onboarded",
            Status::Paused => "Paused",
            Status::Closed => "Closed",
        }
    }

    pub fn parse(value: &str) -> Option<Status> {
        let value = value.trim();
        Status::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(value))
    }

    /// Open statuses past initial screening. `Closed` is decided per person.
    pub fn is_qualified(self) -> bool {
        !matches!(self, Status::New | Status::Unassessed | Status::Closed)
    }
}

/// Where a closed person left the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClosureBucket {
    BeforeQualification,
    AfterCall,
    AfterOnboarding,
}

impl ClosureBucket {
    pub fn classify(classification: Option<&str>) -> ClosureBucket {
        let text = classification.unwrap_or_default().to_lowercase();
        if text.contains("after call") {
            ClosureBucket::AfterCall
        } else if text.contains("after onboard") {
            ClosureBucket::AfterOnboarding
        } else {
            ClosureBucket::BeforeQualification
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageCategory {
    Active,
    Closed,
    Paused,
}

/// Node of the funnel diagram. The set is closed; the diagram topology
/// never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FlowStage {
    Applications,
    Unassessed,
    ClosedRejected,
    Qualified,
    WaitingOnReply,
    CallUpcoming,
    CallCompleted,
    Onboarded,
    Paused,
}

impl FlowStage {
    pub const ALL: [FlowStage; 9] = [
        FlowStage::Applications,
        FlowStage::Unassessed,
        FlowStage::ClosedRejected,
        FlowStage::Qualified,
        FlowStage::WaitingOnReply,
        FlowStage::CallUpcoming,
        FlowStage::CallCompleted,
        FlowStage::Onboarded,
        FlowStage::Paused,
    ];

    /// Display name, category and layout depth.
    const fn attributes(self) -> (&'static str, StageCategory, u8) {
        match self {
            FlowStage::Applications => ("Applications", StageCategory::Active, 0),
            FlowStage::Unassessed => ("Unassessed", StageCategory::Active, 1),
            FlowStage::ClosedRejected => ("Closed/Rejected", StageCategory::Closed, 3),
            FlowStage::Qualified => ("Qualified", StageCategory::Active, 1),
            FlowStage::WaitingOnReply => ("Waiting on Reply", StageCategory::Active, 2),
            FlowStage::CallUpcoming => ("Call Upcoming", StageCategory::Active, 2),
            FlowStage::CallCompleted => ("Call Completed", StageCategory::Active, 2),
            FlowStage::Onboarded => ("Onboarded", StageCategory::Active, 3),
            FlowStage::Paused => ("Paused", StageCategory::Paused, 3),
        }
    }

    pub fn name(self) -> &'static str {
        self.attributes().0
    }

    pub fn category(self) -> StageCategory {
        self.attributes().1
    }

    pub fn depth(self) -> u8 {
        self.attributes().2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowNode {
    pub name: &'static str,
    pub category: StageCategory,
    pub depth: u8,
}

impl From<FlowStage> for FlowNode {
    fn from(stage: FlowStage) -> Self {
        FlowNode {
            name: stage.name(),
            category: stage.category(),
            depth: stage.depth(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEdge {
    pub source: &'static str,
    pub target: &'static str,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

#[cfg(test)]
impl FlowGraph {
    pub fn edge(&self, source: FlowStage, target: FlowStage) -> Option<&FlowEdge> {
        self.edges
            .iter()
            .find(|edge| edge.source == source.name() && edge.target == target.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureReason {
    pub reason: String,
    pub count: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyCohort {
    pub week_start: DateTime<Utc>,
    pub created: usize,
    pub qualified: usize,
    pub qualified_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recency {
    pub last_application: Option<String>,
    pub last_onboarded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_people: usize,
    pub qualified: usize,
    pub qualification_rate: u32,
    pub onboarded: usize,
    pub onboarding_rate: u32,
    pub status_breakdown: Vec<StatusCount>,
    pub weekly: WeeklyCohort,
    pub recency: Recency,
    pub closure_reasons: Vec<ClosureReason>,
}
