// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The work dispatcher: moves sample points to wherever the escape
//! evaluator runs, launches it, and brings the iteration counts back.
//!
//! Two backends share one interface.  [`GpuDispatcher`] drives a wgpu
//! compute pipeline; [`HostDispatcher`] runs the same arithmetic on
//! host threads and is what the tests and GPU-less machines use.

mod gpu;
mod host;

pub use self::gpu::{dispatch_size, AdapterFilter, GpuDispatcher, ALLOW_SOFTWARE_ENV};
pub use self::host::HostDispatcher;

use crate::error::Result;
use crate::escape::PointState;
use crate::planes::SampleGrid;

/// A place the escape evaluator can run.
pub trait Dispatcher {
    /// Evaluates every point of `grid` to completion in one launch and
    /// returns the row-major iteration counts.
    fn single_shot(&mut self, grid: &SampleGrid, max_iter: u32) -> Result<Vec<u32>>;

    /// Advances `states` through `launch_count(max_iter, max_loop)`
    /// launches of at most `max_loop` iterations each, leaving the
    /// final state of every point in place.
    fn resumable(&mut self, states: &mut [PointState], max_iter: u32, max_loop: u32)
        -> Result<()>;
}

/// Number of bounded launches needed to spend `max_iter` iterations
/// `max_loop` at a time.
pub fn launch_count(max_iter: u32, max_loop: u32) -> u32 {
    let max_loop = u64::from(max_loop.max(1));
    ((u64::from(max_iter) + max_loop - 1) / max_loop) as u32
}
