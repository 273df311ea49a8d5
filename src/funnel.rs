use std::collections::{BTreeMap, HashMap};

use crate::error::FunnelError;
use crate::models::{ClosureBucket, FlowEdge, FlowGraph, FlowNode, FlowStage, Person, Status};

/// Status tally plus the derived figures the diagram is drawn from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelCounts {
    /// Status label to count. Recognised statuses use their canonical label,
    /// anything else its trimmed raw text, and a missing status "".
    pub by_label: BTreeMap<String, usize>,
    by_status: HashMap<Status, usize>,
    pub total: usize,
    pub closed_initially: usize,
    pub closed_after_call: usize,
    pub closed_after_onboarding: usize,
}

impl FunnelCounts {
    pub fn tally(people: &[Person]) -> Self {
        let mut counts = FunnelCounts {
            total: people.len(),
            ..Default::default()
        };

        for person in people {
            let recognized = person.recognized_status();
            let label = match recognized {
                Some(status) => status.label(),
                None => person.status.as_deref().unwrap_or_default().trim(),
            };
            *counts.by_label.entry(label.to_string()).or_insert(0) += 1;

            let Some(status) = recognized else {
                continue;
            };
            *counts.by_status.entry(status).or_insert(0) += 1;

            match person.closure() {
                Some(ClosureBucket::AfterCall) => counts.closed_after_call += 1,
                Some(ClosureBucket::AfterOnboarding) => counts.closed_after_onboarding += 1,
                Some(ClosureBucket::BeforeQualification) => counts.closed_initially += 1,
                None => {}
            }
        }

        counts
    }

    pub fn count(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    fn sum(&self, statuses: &[Status]) -> usize {
        statuses.iter().map(|status| self.count(*status)).sum()
    }

    /// People who passed initial screening, rebuilt from where they sit now.
    pub fn qualified(&self) -> usize {
        Status::ALL
            .into_iter()
            .filter(|status| status.is_qualified())
            .map(|status| self.count(status))
            .sum::<usize>()
            + self.closed_after_call
            + self.closed_after_onboarding
    }

    pub fn unassessed(&self) -> usize {
        self.sum(&[Status::New, Status::Unassessed])
    }

    pub fn awaiting_reply(&self) -> usize {
        self.sum(&[Status::Lead, Status::WaitingOnReply])
    }

    /// Everyone whose call has happened, wherever they went afterwards.
    pub fn call_completed(&self) -> usize {
        self.sum(&[Status::CallCompleted, Status::Onboarded, Status::Paused])
            + self.closed_after_call
            + self.closed_after_onboarding
    }

    pub fn onboarded(&self) -> usize {
        self.count(Status::Onboarded) + self.closed_after_onboarding
    }

    fn edge_weights(&self) -> [(FlowStage, FlowStage, usize); 9] {
        use FlowStage::*;

        [
            (Applications, Unassessed, self.unassessed()),
            (Applications, Qualified, self.qualified()),
            (Applications, ClosedRejected, self.closed_initially),
            (Qualified, WaitingOnReply, self.awaiting_reply()),
            (Qualified, CallUpcoming, self.count(Status::CallUpcoming)),
            (Qualified, CallCompleted, self.call_completed()),
            (CallCompleted, Onboarded, self.onboarded()),
            (CallCompleted, Paused, self.count(Status::Paused)),
            (CallCompleted, ClosedRejected, self.closed_after_call),
        ]
    }
}

/// Builds the funnel diagram from the current people snapshot.
///
/// An empty snapshot is an error rather than an empty graph so callers never
/// render "nothing loaded" as "nobody applied".
pub fn build_flow_graph(people: &[Person]) -> Result<FlowGraph, FunnelError> {
    if people.is_empty() {
        return Err(FunnelError::NoData);
    }

    let counts = FunnelCounts::tally(people);
    Ok(graph_from_counts(&counts))
}

pub fn graph_from_counts(counts: &FunnelCounts) -> FlowGraph {
    let nodes = FlowStage::ALL.into_iter().map(FlowNode::from).collect();
    let edges = counts
        .edge_weights()
        .into_iter()
        .filter(|(_, _, weight)| *weight > 0)
        .map(|(source, target, weight)| FlowEdge {
            source: source.name(),
            target: target.name(),
            weight: weight as u64,
        })
        .collect();

    FlowGraph { nodes, edges }
}
