// src/notify/builder.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::state::State;

use super::idempotent::{IdempotentListener, IdempotentStore};
use super::{TransitionListener, TransitionListenerRegistry, TransitionListenerSet};

/// Collects `(destination state, listener)` pairs and turns them into a
/// [`TransitionListenerRegistry`].
///
/// - A state with a single listener gets that listener directly.
/// - A state with several listeners gets a [`TransitionListenerSet`] that
///   calls them in the order they were added.
/// - With [`RegistryBuilder::idempotent`], every per-state listener is wrapped
///   in an [`IdempotentListener`] sharing the given store.
#[derive(Default)]
pub struct RegistryBuilder {
    to_state: BTreeMap<State, Vec<Arc<dyn TransitionListener>>>,
    idempotent_store: Option<Arc<dyn IdempotentStore>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, to_state: State, listener: Arc<dyn TransitionListener>) -> Self {
        self.add(to_state, listener);
        self
    }

    pub fn add(&mut self, to_state: State, listener: Arc<dyn TransitionListener>) {
        self.to_state.entry(to_state).or_default().push(listener);
    }

    pub fn idempotent(mut self, store: Arc<dyn IdempotentStore>) -> Self {
        self.idempotent_store = Some(store);
        self
    }

    pub fn build(self) -> TransitionListenerRegistry {
        let mut registry = TransitionListenerRegistry::new();

        for (state, mut listeners) in self.to_state {
            let count = listeners.len();
            let listener: Arc<dyn TransitionListener> = match listeners.len() {
                0 => continue,
                1 => listeners.remove(0),
                _ => Arc::new(TransitionListenerSet::new(listeners)),
            };

            let listener: Arc<dyn TransitionListener> = match &self.idempotent_store {
                Some(store) => Arc::new(IdempotentListener::new(listener, Arc::clone(store))),
                None => listener,
            };

            debug!(
                to = %state,
                listeners = count,
                idempotent = self.idempotent_store.is_some(),
                "registered transition listener"
            );
            registry.register(state, listener);
        }

        registry
    }
}
