// src/notify/mod.rs

//! Transition notification dispatch.
//!
//! - [`TransitionListener`] is the sink a job calls, synchronously, for every
//!   state change it makes.
//! - [`TransitionListenerRegistry`] routes a transition to the one listener
//!   registered for its destination state.
//! - [`TransitionListenerSet`] fans a transition out to several listeners so
//!   they can share a destination state.
//! - [`idempotent`] wraps a listener so that replayed transitions run it at
//!   most once.
//! - [`builder`] assembles a registry from configured `(state, listener)` pairs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::state::{Job, State, Transition};

pub mod builder;
pub mod idempotent;

pub use builder::RegistryBuilder;
pub use idempotent::{
    idempotency_key, FileIdempotentStore, IdempotentListener, IdempotentStore,
    MemoryIdempotentStore, DEFAULT_STORE_CAPACITY,
};

/// Receives state changes from jobs.
///
/// Called while the job's mutation lock is held: implementations may read the
/// job's accessors but must not call its mutating entry points.
pub trait TransitionListener: Send + Sync {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()>;
}

/// Listener that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl TransitionListener for NoopListener {
    fn on_transition(&self, _job: &Job, _transition: &Transition) -> Result<()> {
        Ok(())
    }
}

/// Routes transitions by destination state.
#[derive(Default)]
pub struct TransitionListenerRegistry {
    by_to_state: HashMap<State, Arc<dyn TransitionListener>>,
}

impl fmt::Debug for TransitionListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<_> = self.by_to_state.keys().map(|s| s.as_str()).collect();
        states.sort_unstable();
        f.debug_struct("TransitionListenerRegistry")
            .field("states", &states)
            .finish()
    }
}

impl TransitionListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for transitions into `to_state`, returning the
    /// listener it replaces, if any.
    pub fn register(
        &mut self,
        to_state: State,
        listener: Arc<dyn TransitionListener>,
    ) -> Option<Arc<dyn TransitionListener>> {
        self.by_to_state.insert(to_state, listener)
    }

    pub fn unregister(&mut self, to_state: State) -> Option<Arc<dyn TransitionListener>> {
        self.by_to_state.remove(&to_state)
    }

    pub fn has_listener(&self, to_state: State) -> bool {
        self.by_to_state.contains_key(&to_state)
    }

    pub fn is_empty(&self) -> bool {
        self.by_to_state.is_empty()
    }
}

impl TransitionListener for TransitionListenerRegistry {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        match self.by_to_state.get(&transition.to) {
            Some(listener) => listener.on_transition(job, transition),
            None => {
                debug!(
                    correlation_id = %job.correlation_id(),
                    to = %transition.to,
                    "no listener registered for destination state"
                );
                Ok(())
            }
        }
    }
}

/// Invokes each delegate in registration order; the first error stops the
/// fan-out and is returned.
#[derive(Default)]
pub struct TransitionListenerSet {
    listeners: Vec<Arc<dyn TransitionListener>>,
}

impl TransitionListenerSet {
    pub fn new(listeners: Vec<Arc<dyn TransitionListener>>) -> Self {
        Self { listeners }
    }

    pub fn push(&mut self, listener: Arc<dyn TransitionListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl TransitionListener for TransitionListenerSet {
    fn on_transition(&self, job: &Job, transition: &Transition) -> Result<()> {
        for listener in &self.listeners {
            listener.on_transition(job, transition)?;
        }
        Ok(())
    }
}
