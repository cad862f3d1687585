// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::{ActionType, StrategyError};

/// Receives progress reports while a strategy runs.
///
/// Tasks nest: every `on_start_task` is followed by an `on_end_task` from the
/// same thread, and tasks started in between belong to the enclosing task.
/// [`Action::ForEachBaseline`](super::Action::ForEachBaseline) starts its
/// tasks on worker threads, so implementations must keep track of nesting
/// per thread.
pub trait ProgressListener: Sync {
    /// Task `task_index` of `task_count` of `action` is starting. `weight` is
    /// the share of the enclosing task that this task represents, relative to
    /// its siblings.
    fn on_start_task(
        &self,
        action: ActionType,
        task_index: usize,
        task_count: usize,
        description: &str,
        weight: f64,
    );

    fn on_end_task(&self, action: ActionType);

    fn on_progress(&self, action: ActionType, progress: usize, max_progress: usize);

    /// An error occurred that didn't stop the strategy.
    fn on_exception(&self, action: ActionType, error: &StrategyError);
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl ProgressListener for NullListener {
    fn on_start_task(&self, _: ActionType, _: usize, _: usize, _: &str, _: f64) {}

    fn on_end_task(&self, _: ActionType) {}

    fn on_progress(&self, _: ActionType, _: usize, _: usize) {}

    fn on_exception(&self, _: ActionType, _: &StrategyError) {}
}
