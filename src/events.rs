use std::path::PathBuf;
use std::time::Duration;

use crate::plot_info::PlotInfo;

/// The finite set of events the refresh loop emits to its observer. Emitted
/// synchronously on the loop thread; `Started` precedes any `BatchProcessed`
/// within a cycle, which precede at most one `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshEvent {
    Started,
    BatchProcessed,
    Done,
}

/// Aggregate result carried alongside a `RefreshEvent`. For `Started`, only
/// `remaining` is meaningful; for `BatchProcessed`, `loaded`/`processed`/
/// `duration`/`remaining` describe that single batch; for `Done`, `loaded` and
/// `removed` are the totals accumulated across the whole cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    pub loaded: Vec<PlotInfo>,
    pub removed: Vec<PathBuf>,
    pub processed: usize,
    pub remaining: usize,
    pub duration: Duration,
}

impl RefreshResult {
    pub fn with_remaining(remaining: usize) -> Self {
        Self {
            remaining,
            ..Default::default()
        }
    }
}

/// An observer callback. Invoked on the refresh loop thread; must not block
/// indefinitely, and must never be called while the manager's locks are held.
pub type RefreshCallback = Box<dyn Fn(RefreshEvent, &RefreshResult) + Send + Sync>;
