// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reporting the progress of a strategy with a progress bar.
//!
//! Tasks nest: a baseline is split into polarisations, a polarisation into
//! complex components, and so on. Every thread keeps a stack of the tasks it
//! is inside. Each task owns a share of its parent's share of the whole run,
//! so the overall fraction is the sum of the finished top-level tasks and the
//! progress of the tasks still running.


use std::{
    collections::HashMap,
    sync::Mutex,
    thread::{self, ThreadId},
};

use crossbeam_utils::atomic::AtomicCell;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

use crate::{
    strategy::{ActionType, ProgressListener, StrategyError},
    PROGRESS_BARS,
};

/// The resolution of the progress bar.
const PROGRESS_STEPS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Where the task starts, as a fraction of the whole run.
    start: f64,
    /// The fraction of the whole run this task accounts for.
    share: f64,
    /// How much of `share` is done.
    done: f64,
}

impl Frame {
    fn root() -> Frame {
        Frame {
            start: 0.0,
            share: 1.0,
            done: 0.0,
        }
    }

    fn child(&self, index: usize, count: usize, weight: f64) -> Frame {
        let count = count.max(1) as f64;
        Frame {
            start: self.start + self.share * index as f64 / count,
            share: self.share * weight / count,
            done: 0.0,
        }
    }

    fn end(&self) -> f64 {
        self.start + self.share
    }
}

/// Turns the nested task events of a strategy run into a single fraction.
#[derive(Debug, Default)]
pub(super) struct ProgressTracker {
    stacks: HashMap<ThreadId, Vec<Frame>>,
    /// The share of finished tasks that had no parent.
    completed: f64,
    /// Progress reported outside of any task.
    root_done: f64,
}

impl ProgressTracker {
    pub(super) fn start_task(
        &mut self,
        thread: ThreadId,
        index: usize,
        count: usize,
        weight: f64,
    ) {
        let stack = self.stacks.entry(thread).or_default();
        let parent = stack.last().copied().unwrap_or_else(Frame::root);
        stack.push(parent.child(index, count, weight));
    }

    pub(super) fn end_task(&mut self, thread: ThreadId) {
        let Some(stack) = self.stacks.get_mut(&thread) else {
            return;
        };
        let Some(frame) = stack.pop() else {
            return;
        };
        match stack.last_mut() {
            Some(parent) => parent.done = parent.done.max(frame.end() - parent.start),
            None => {
                self.completed += frame.share;
                self.stacks.remove(&thread);
            }
        }
    }

    pub(super) fn progress(&mut self, thread: ThreadId, progress: usize, max_progress: usize) {
        let fraction = if max_progress == 0 {
            1.0
        } else {
            (progress as f64 / max_progress as f64).clamp(0.0, 1.0)
        };
        match self.stacks.get_mut(&thread).and_then(|s| s.last_mut()) {
            Some(frame) => frame.done = frame.done.max(frame.share * fraction),
            None => self.root_done = self.root_done.max(fraction),
        }
    }

    /// The fraction of the run that is done, in [0, 1].
    pub(super) fn fraction(&self) -> f64 {
        let running: f64 = self
            .stacks
            .values()
            .map(|stack| {
                // Fold the progress of inner tasks into the outermost one.
                stack
                    .iter()
                    .rev()
                    .fold(None, |inner: Option<(f64, f64)>, frame| {
                        let done = match inner {
                            Some((start, done)) => frame.done.max(start - frame.start + done),
                            None => frame.done,
                        };
                        Some((frame.start, done))
                    })
                    .map_or(0.0, |(_, done)| done)
            })
            .sum();
        (self.completed + running).max(self.root_done).clamp(0.0, 1.0)
    }
}

/// A [`ProgressListener`] that draws an `indicatif` progress bar, if
/// [`PROGRESS_BARS`] is set.
pub(super) struct ProgressBarListener {
    bar: ProgressBar,
    tracker: Mutex<ProgressTracker>,
    num_exceptions: AtomicCell<usize>,
}

impl ProgressBarListener {
    pub(super) fn new(message: &'static str) -> ProgressBarListener {
        let draw_target = if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(PROGRESS_STEPS), draw_target)
            .with_style(
                ProgressStyle::default_bar()
                    .template("{msg:24}: [{wide_bar:.blue}] {percent:3}% ({elapsed_precise}<{eta_precise})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            )
            .with_position(0)
            .with_message(message);
        ProgressBarListener {
            bar,
            tracker: Mutex::new(ProgressTracker::default()),
            num_exceptions: AtomicCell::new(0),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ProgressTracker)) {
        let Ok(mut tracker) = self.tracker.lock() else {
            return;
        };
        f(&mut tracker);
        let position = (tracker.fraction() * PROGRESS_STEPS as f64).round() as u64;
        if position > self.bar.position() {
            self.bar.set_position(position);
        }
    }

    /// The number of exceptions reported so far.
    pub(super) fn num_exceptions(&self) -> usize {
        self.num_exceptions.load()
    }

    pub(super) fn finish(&self) {
        self.bar.abandon_with_message("Flagged");
    }
}

impl ProgressListener for ProgressBarListener {
    fn on_start_task(
        &self,
        _action: ActionType,
        task_index: usize,
        task_count: usize,
        description: &str,
        weight: f64,
    ) {
        let thread = thread::current().id();
        self.update(|t| t.start_task(thread, task_index, task_count, weight));
        self.bar.set_message(description.to_string());
    }

    fn on_end_task(&self, _action: ActionType) {
        let thread = thread::current().id();
        self.update(|t| t.end_task(thread));
    }

    fn on_progress(&self, _action: ActionType, progress: usize, max_progress: usize) {
        let thread = thread::current().id();
        self.update(|t| t.progress(thread, progress, max_progress));
    }

    fn on_exception(&self, action: ActionType, error: &StrategyError) {
        self.num_exceptions.fetch_add(1);
        debug!("{action} reported: {error}");
    }
}
