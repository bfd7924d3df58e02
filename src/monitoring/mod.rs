//! Monitoring Module
//!
//! - [`ExecutionTimeline`]: Step start/end events of a workflow run

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
