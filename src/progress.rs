//! Progress reporting: a narrow, out-of-core collaborator (spec.md §1)
//! carried as ambient CLI polish. The Orchestrator never requires a
//! listener; `on_progress` is an optional callback.

use crate::orchestrator::State;

#[derive(Debug, Clone)]
pub struct Progress {
    pub state: State,
    pub chunks_completed: u64,
    pub chunks_total: u64,
}

pub type ProgressCallback<'a> = dyn FnMut(Progress) + 'a;
