use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::RefreshError;
use crate::funnel;
use crate::metrics;
use crate::models::{DashboardMetrics, FlowGraph};
use crate::store::RecordSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPhase {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Everything derived from one successful fetch.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub metrics: DashboardMetrics,
    pub graph: FlowGraph,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardState {
    pub phase: RefreshPhase,
    pub snapshot: Option<DashboardSnapshot>,
    pub last_error: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            phase: RefreshPhase::Idle,
            snapshot: None,
            last_error: None,
        }
    }
}

impl DashboardState {
    pub fn begin(&mut self) {
        self.phase = RefreshPhase::Loading;
    }

    /// Replaces metrics and graph together.
    pub fn apply(&mut self, snapshot: DashboardSnapshot) {
        self.phase = RefreshPhase::Ready;
        self.snapshot = Some(snapshot);
        self.last_error = None;
    }

    /// Records the failure. The previous snapshot is kept for the next
    /// successful cycle to replace.
    pub fn fail(&mut self, message: String) {
        self.phase = RefreshPhase::Error;
        self.last_error = Some(message);
    }
}

pub type SharedDashboard = Arc<RwLock<DashboardState>>;

/// One refresh cycle: both collections or nothing.
pub async fn run_cycle(
    source: &dyn RecordSource,
    now: DateTime<Utc>,
) -> Result<DashboardSnapshot, RefreshError> {
    let (people, events) = tokio::try_join!(source.fetch_people(), source.fetch_funnel_events())?;

    let graph = funnel::build_flow_graph(&people)?;
    let metrics = metrics::compute_metrics(&people, &events, now);

    Ok(DashboardSnapshot {
        metrics,
        graph,
        last_updated: now,
    })
}

/// Runs one cycle and records the outcome in `state`.
#[cfg(test)]
pub async fn refresh_once(source: &dyn RecordSource, state: &RwLock<DashboardState>) {
    state.write().await.begin();
    let outcome = run_cycle(source, Utc::now()).await;
    record(state, outcome).await;
}

async fn record(state: &RwLock<DashboardState>, outcome: Result<DashboardSnapshot, RefreshError>) {
    let mut state = state.write().await;
    match outcome {
        Ok(snapshot) => {
            info!(
                people = snapshot.metrics.total_people,
                edges = snapshot.graph.edges.len(),
                "Dashboard refreshed"
            );
            state.apply(snapshot);
        }
        Err(e) => {
            error!("Dashboard refresh failed: {}", e);
            state.fail(e.to_string());
        }
    }
}

/// Background polling loop. Dropping the handle does not stop it; call
/// [`RefreshTask::shutdown`].
pub struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Refreshes immediately, then once per `every`.
    pub fn spawn(
        source: Arc<dyn RecordSource>,
        state: SharedDashboard,
        every: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!("Starting dashboard refresh (interval: {}s)", every.as_secs());

        let handle = tokio::spawn(async move {
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                state.write().await.begin();
                let outcome = tokio::select! {
                    _ = token.cancelled() => None,
                    outcome = run_cycle(source.as_ref(), Utc::now()) => Some(outcome),
                };

                match outcome {
                    Some(outcome) if !token.is_cancelled() => record(&state, outcome).await,
                    _ => {
                        debug!("Discarding refresh result after cancellation");
                        break;
                    }
                }
            }

            info!("Dashboard refresh stopped");
        });

        Self { cancel, handle }
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Refresh task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{FlowStage, FunnelEvent, Person};
    use crate::store::stub::{event, person, StubSource};
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    fn scenario_source() -> StubSource {
        let now = Utc::now();
        let mut people = Vec::new();
        for i in 0..20 {
            people.push(person(&format!("n{i}"), Some("New"), None, now));
        }
        for i in 0..10 {
            people.push(person(&format!("l{i}"), Some("Lead"), None, now));
        }
        for i in 0..15 {
            people.push(person(&format!("o{i}"), Some("Onboarded"), None, now));
        }
        for i in 0..10 {
            people.push(person(&format!("a{i}"), Some("Closed"), Some("After Call"), now));
        }
        for i in 0..45 {
            people.push(person(&format!("c{i}"), Some("Closed"), Some("Rejected"), now));
        }
        let events = vec![event("e1", "Call Completed", "Onboarded", now)];
        StubSource::new(people, events)
    }

    #[tokio::test]
    async fn cycle_builds_graph_and_metrics() {
        let source = scenario_source();
        let snapshot = run_cycle(&source, Utc::now()).await.unwrap();

        assert_eq!(snapshot.metrics.total_people, 100);
        let edge = snapshot
            .graph
            .edge(FlowStage::Applications, FlowStage::ClosedRejected)
            .unwrap();
        assert_eq!(edge.weight, 45);
        assert_eq!(snapshot.metrics.recency.last_onboarded.as_deref(), Some("0s ago"));
    }

    #[tokio::test]
    async fn failed_event_fetch_keeps_previous_snapshot() {
        let state = RwLock::new(DashboardState::default());
        let mut source = scenario_source();
        refresh_once(&source, &state).await;

        let before = state.read().await.snapshot.clone().unwrap();
        assert_eq!(state.read().await.phase, RefreshPhase::Ready);

        source.events_error = Some("events table unavailable".into());
        source.people.lock().unwrap().truncate(3);
        refresh_once(&source, &state).await;

        let after = state.read().await;
        assert_eq!(after.phase, RefreshPhase::Error);
        assert!(after.last_error.as_deref().unwrap().contains("events table unavailable"));
        let kept = after.snapshot.as_ref().unwrap();
        assert_eq!(kept.metrics, before.metrics);
        assert_eq!(kept.last_updated, before.last_updated);
    }

    #[tokio::test]
    async fn empty_people_fails_the_cycle() {
        let source = StubSource::new(Vec::new(), Vec::new());
        let err = run_cycle(&source, Utc::now()).await.unwrap_err();
        assert!(matches!(err, RefreshError::Funnel(_)));
    }

    /// Answers nothing for people until dropped.
    struct StalledSource {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl RecordSource for StalledSource {
        async fn fetch_people(&self) -> Result<Vec<Person>, StoreError> {
            self.started.notify_one();
            std::future::pending().await
        }

        async fn fetch_funnel_events(&self) -> Result<Vec<FunnelEvent>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_field(
            &self,
            person_id: &str,
            _field: &str,
            _value: Value,
        ) -> Result<Person, StoreError> {
            Err(StoreError::NotFound {
                target: person_id.to_string(),
                message: "NOT_FOUND".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn shutdown_discards_the_cycle_in_flight() {
        let state: SharedDashboard = Arc::default();
        let started = Arc::new(Notify::new());
        let source: Arc<dyn RecordSource> = Arc::new(StalledSource {
            started: started.clone(),
        });
        let task = RefreshTask::spawn(source, state.clone(), Duration::from_secs(3600));

        started.notified().await;
        assert_eq!(state.read().await.phase, RefreshPhase::Loading);

        tokio::time::timeout(Duration::from_secs(5), task.shutdown())
            .await
            .expect("refresh task should stop while a fetch is pending");

        let state = state.read().await;
        assert_ne!(state.phase, RefreshPhase::Ready);
        assert!(state.snapshot.is_none());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn task_loads_immediately_and_stops_on_shutdown() {
        let state: SharedDashboard = Arc::default();
        let source: Arc<dyn RecordSource> = Arc::new(scenario_source());
        let task = RefreshTask::spawn(source, state.clone(), Duration::from_secs(3600));

        for _ in 0..100 {
            if state.read().await.phase == RefreshPhase::Ready {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.read().await.phase, RefreshPhase::Ready);

        tokio::time::timeout(Duration::from_secs(5), task.shutdown())
            .await
            .expect("refresh task should stop promptly");
    }
}
