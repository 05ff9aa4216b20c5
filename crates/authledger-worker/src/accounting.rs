//! Entry point for recorded authentications.
//!
//! [`Accounting`] turns a raw state into an [`AuthenticationEvent`] and
//! either writes it to every configured tracker right away or queues it
//! for the job runner, depending on the processing type.

use std::sync::Arc;

use authledger_db::Connections;
use authledger_jobs::{JobError, JobPayload, JobsStore, ProcessorRegistry};
use authledger_store::{build_provider, build_tracker, DataProvider, DataTracker, StoreError};
use authledger_types::{AuthenticationEvent, State, StateError};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AccountingConfig, ProcessingType};

/// Errors surfaced while handling an authentication.
#[derive(Debug, Error)]
pub enum AccountingError {
    /// The state does not describe a complete authentication.
    #[error("invalid authentication state: {0}")]
    State(#[from] StateError),

    /// A tracker failed to record the event.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event could not be queued.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// What happened to a handled authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written to every tracker.
    Recorded,
    /// Queued as the job with this id.
    Queued(i64),
}

enum Dispatch {
    Synchronous,
    Asynchronous(JobsStore),
}

/// Dispatches authentication events to the configured trackers.
pub struct Accounting {
    user_id_attribute_name: String,
    trackers: Vec<Arc<dyn DataTracker>>,
    provider: Arc<dyn DataProvider>,
    dispatch: Dispatch,
}

impl Accounting {
    /// Builds the trackers, the read-side provider and, for asynchronous
    /// processing, the job store, all over `connections`.
    pub fn new(config: &AccountingConfig, connections: Connections) -> Self {
        let trackers = config
            .tracker_kinds()
            .into_iter()
            .map(|kind| build_tracker(kind, connections.clone()))
            .collect();

        let dispatch = match config.processing_type {
            ProcessingType::Synchronous => Dispatch::Synchronous,
            ProcessingType::Asynchronous => Dispatch::Asynchronous(JobsStore::new(connections.clone())),
        };

        Self {
            user_id_attribute_name: config.user_id_attribute_name.clone(),
            trackers,
            provider: build_provider(config.default_tracker, connections),
            dispatch,
        }
    }

    pub fn trackers(&self) -> &[Arc<dyn DataTracker>] {
        &self.trackers
    }

    /// Provider backed by the default tracker.
    pub fn provider(&self) -> Arc<dyn DataProvider> {
        Arc::clone(&self.provider)
    }

    /// The job store, when processing is asynchronous.
    pub fn jobs_store(&self) -> Option<&JobsStore> {
        match &self.dispatch {
            Dispatch::Synchronous => None,
            Dispatch::Asynchronous(store) => Some(store),
        }
    }

    /// Registry that feeds queued events to this instance's trackers.
    pub fn processor_registry(&self) -> ProcessorRegistry {
        ProcessorRegistry::for_trackers(self.trackers.clone())
    }

    /// Whether any tracker or the job store still needs setup.
    pub fn needs_setup(&self) -> Result<bool, AccountingError> {
        for tracker in &self.trackers {
            if tracker.needs_setup()? {
                return Ok(true);
            }
        }
        match self.jobs_store() {
            Some(store) => Ok(store.needs_setup()?),
            None => Ok(false),
        }
    }

    /// Runs setup for every tracker and, when asynchronous, the job store.
    pub fn run_setup(&self) -> Result<(), AccountingError> {
        for tracker in &self.trackers {
            tracker.run_setup()?;
        }
        if let Some(store) = self.jobs_store() {
            store.run_setup()?;
        }
        Ok(())
    }

    /// Resolves `state` and records or queues the resulting event.
    ///
    /// # Errors
    ///
    /// Returns `AccountingError::State` for an incomplete state, and the
    /// store or job error if recording or queueing fails.
    pub fn handle(&self, state: &Value) -> Result<Outcome, AccountingError> {
        let state = State::from_value(state)?;
        let event = AuthenticationEvent::from_state(state, &self.user_id_attribute_name)?;
        self.dispatch(event)
    }

    /// Records or queues an already resolved event.
    pub fn dispatch(&self, event: AuthenticationEvent) -> Result<Outcome, AccountingError> {
        match &self.dispatch {
            Dispatch::Synchronous => {
                for tracker in &self.trackers {
                    tracker.process(&event)?;
                }
                Ok(Outcome::Recorded)
            }
            Dispatch::Asynchronous(store) => {
                let job_id = store.enqueue(&JobPayload::from(event))?;
                Ok(Outcome::Queued(job_id))
            }
        }
    }
}

impl std::fmt::Debug for Accounting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accounting")
            .field("user_id_attribute_name", &self.user_id_attribute_name)
            .field("trackers", &self.trackers.len())
            .field("asynchronous", &self.jobs_store().is_some())
            .finish()
    }
}
