//! Execution Timeline
//!
//! Records when the top-level steps of a run start and finish so the engine
//! can report per-step durations and which steps were abandoned on timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step handed to a worker
    Started,
    /// Step finished successfully
    Completed,
    /// Step finished with a failure
    Failed,
    /// Step was still running when the run timed out
    Abandoned,
}

impl EventType {
    fn label(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub step_id: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Ordered record of step events for one workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step_id: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            step_id: step_id.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Time since the timeline was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Steps that were started, in start order.
    pub fn started_steps(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Started)
            .map(|e| e.step_id.as_str())
            .collect()
    }

    /// Final event recorded for a step, if it got past `Started`.
    pub fn outcome(&self, step_id: &str) -> Option<EventType> {
        self.events
            .iter()
            .rev()
            .find(|e| e.step_id == step_id && e.event_type != EventType::Started)
            .map(|e| e.event_type)
    }

    /// Wall time of every step that reached an outcome.
    pub fn durations(&self) -> HashMap<String, Duration> {
        let mut starts: HashMap<&str, Instant> = HashMap::new();
        let mut durations = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    starts.insert(&event.step_id, event.timestamp);
                }
                _ => {
                    if let Some(start) = starts.get(event.step_id.as_str()) {
                        durations.insert(
                            event.step_id.clone(),
                            event.timestamp.duration_since(*start),
                        );
                    }
                }
            }
        }

        durations
    }

    /// One line per step with its outcome and duration, in start order.
    pub fn summary(&self) -> String {
        let durations = self.durations();
        let mut output = String::from("Step timeline:\n");

        for step_id in self.started_steps() {
            let outcome = self
                .outcome(step_id)
                .map_or("running", |event| event.label());
            match durations.get(step_id) {
                Some(duration) => output.push_str(&format!(
                    "  {:24} {:10} {} ms\n",
                    step_id,
                    outcome,
                    duration.as_millis()
                )),
                None => output.push_str(&format!("  {:24} {}\n", step_id, outcome)),
            }
        }

        output.push_str(&format!("Total: {} ms", self.elapsed().as_millis()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}
