//! Run-level container accumulating finished result ids.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::ids;
use crate::model::{Container, TestResult};

#[derive(Debug)]
struct State {
    container: Container,
    /// Ids already in `container.children`.
    recorded: HashSet<String>,
}

/// Serializes appends to the run container.
#[derive(Debug)]
pub struct ContainerAggregator {
    state: Mutex<State>,
}

impl ContainerAggregator {
    /// Open a container for a run named `suite`, started now.
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                container: Container {
                    id: ids::new_id(),
                    name: suite.into(),
                    children: Vec::new(),
                    start: ids::now_ms(),
                    stop: 0,
                },
                recorded: HashSet::new(),
            }),
        }
    }

    /// Record a closed result. A result id already present is not appended
    /// again; returns whether the id was added.
    pub fn add_finished_result(&self, result: &TestResult) -> bool {
        let mut state = self.lock();
        if !state.recorded.insert(result.id.clone()) {
            warn!(result = result.id.as_str(), "result already recorded in container");
            return false;
        }
        state.container.children.push(result.id.clone());
        true
    }

    /// Set the stop timestamp unless already set, and return a snapshot.
    pub fn finish(&self) -> Container {
        let mut state = self.lock();
        if state.container.stop == 0 {
            state.container.stop = ids::now_ms();
        }
        state.container.clone()
    }

    /// Current state of the container.
    pub fn snapshot(&self) -> Container {
        self.lock().container.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
