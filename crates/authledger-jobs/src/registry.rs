//! Dispatch of decoded job payloads to their processors.

use std::collections::HashMap;
use std::sync::Arc;

use authledger_store::DataTracker;

use crate::error::JobError;
use crate::job::{JobKind, JobPayload};

/// Handles payloads of the job types it is registered for.
pub trait Processor: Send + Sync {
    fn process(&self, payload: &JobPayload) -> Result<(), JobError>;
}

/// Maps job types to processors.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<JobKind, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` for `kind`, replacing any earlier one.
    pub fn register(&mut self, kind: JobKind, processor: Arc<dyn Processor>) -> &mut Self {
        self.processors.insert(kind, processor);
        self
    }

    /// Registry with authentication events fanned out to `trackers`.
    pub fn for_trackers(trackers: Vec<Arc<dyn DataTracker>>) -> Self {
        let mut registry = Self::new();
        registry.register(
            JobKind::AuthenticationEvent,
            Arc::new(TrackerFanout::new(trackers)),
        );
        registry
    }

    /// Runs the processor registered for the payload's type.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NoProcessor` if nothing is registered, or the
    /// processor's own error.
    pub fn dispatch(&self, payload: &JobPayload) -> Result<(), JobError> {
        let kind = payload.kind();
        let processor = self
            .processors
            .get(&kind)
            .ok_or(JobError::NoProcessor(kind))?;
        processor.process(payload)
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.processors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Feeds authentication events to every tracker in order.
///
/// Stops at the first failing tracker; trackers before it keep the event.
pub struct TrackerFanout {
    trackers: Vec<Arc<dyn DataTracker>>,
}

impl TrackerFanout {
    pub fn new(trackers: Vec<Arc<dyn DataTracker>>) -> Self {
        Self { trackers }
    }
}

impl Processor for TrackerFanout {
    fn process(&self, payload: &JobPayload) -> Result<(), JobError> {
        match payload {
            JobPayload::AuthenticationEvent(event) => {
                for tracker in &self.trackers {
                    tracker.process(event)?;
                }
                Ok(())
            }
        }
    }
}
