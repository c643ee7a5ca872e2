// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Host backend.  The point set is cut into one contiguous chunk per
//! worker thread and each worker runs the escape evaluator over its
//! chunk.  Workers never share a point, so no locking is needed.

use crate::error::{RenderError, Result};
use crate::escape::{self, PointState};
use crate::planes::SampleGrid;

use super::{launch_count, Dispatcher};

/// Runs the escape evaluator on host worker threads.
#[derive(Debug)]
pub struct HostDispatcher {
    threads: usize,
}

impl HostDispatcher {
    /// A dispatcher with `threads` workers.  Zero is treated as one.
    pub fn new(threads: usize) -> Self {
        HostDispatcher {
            threads: threads.max(1),
        }
    }

    /// A dispatcher with one worker per logical CPU.
    pub fn with_all_cpus() -> Self {
        HostDispatcher::new(num_cpus::get())
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }

    fn chunk_len(&self, points: usize) -> usize {
        ((points + self.threads - 1) / self.threads).max(1)
    }
}

impl Dispatcher for HostDispatcher {
    fn single_shot(&mut self, grid: &SampleGrid, max_iter: u32) -> Result<Vec<u32>> {
        let mut iters = vec![0 as u32; grid.len()];
        let chunk = self.chunk_len(grid.len());
        crossbeam::scope(|spawner| {
            for (n, region) in iters.chunks_mut(chunk).enumerate() {
                spawner.spawn(move |_| {
                    let base = n * chunk;
                    for (i, count) in region.iter_mut().enumerate() {
                        *count = escape::iterations(grid.point(base + i), max_iter);
                    }
                });
            }
        })
        .map_err(|_| RenderError::HostWorker)?;
        Ok(iters)
    }

    fn resumable(
        &mut self,
        states: &mut [PointState],
        max_iter: u32,
        max_loop: u32,
    ) -> Result<()> {
        let chunk = self.chunk_len(states.len());
        let launches = launch_count(max_iter, max_loop);
        for launch in 0..launches {
            // Each scope joins all of its workers, so launch N has
            // finished everywhere before launch N+1 starts.
            crossbeam::scope(|spawner| {
                for region in states.chunks_mut(chunk) {
                    spawner.spawn(move |_| {
                        for state in region.iter_mut() {
                            escape::advance(state, max_iter, max_loop);
                        }
                    });
                }
            })
            .map_err(|_| RenderError::HostWorker)?;
            trace!("host launch {}/{} done", launch + 1, launches);
        }
        Ok(())
    }
}
