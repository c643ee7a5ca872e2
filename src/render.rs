// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The pipeline: sample the plane, hand the points to a dispatcher,
//! collect the iteration counts.

use std::path::Path;
use std::time::Instant;

use crate::config::{Backend, RenderConfig, Strategy};
use crate::dispatch::{AdapterFilter, Dispatcher, GpuDispatcher, HostDispatcher};
use crate::error::Result;
use crate::kernel::KernelSource;
use crate::planes::PlaneMapper;

/// Row-major iteration counts for every sample point.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationGrid {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// The iteration budget the counts were produced with.
    pub max_iter: u32,
    /// One count per point, top row first.
    pub iters: Vec<u32>,
}

impl IterationGrid {
    /// The count at `column`, `row`.
    pub fn get(&self, column: usize, row: usize) -> u32 {
        self.iters[row * self.width + column]
    }
}

/// Builds the dispatcher `config` asks for.  For the GPU this opens the
/// device and compiles the kernel, read from `kernel` when given.
/// Software adapters are used only when `MANDEL_ALLOW_SOFTWARE_ADAPTER`
/// is set.
pub fn open_dispatcher(
    config: &RenderConfig,
    kernel: Option<&Path>,
) -> Result<Box<dyn Dispatcher>> {
    match config.backend {
        Backend::Gpu => {
            let source = KernelSource::load(kernel, config.strategy)?;
            let dispatcher = GpuDispatcher::new(
                &source,
                config.strategy,
                config.workgroup_size,
                AdapterFilter::from_env(),
            )?;
            Ok(Box::new(dispatcher))
        }
        Backend::Host { threads } => {
            info!("evaluating on {} host thread(s)", threads);
            Ok(Box::new(HostDispatcher::new(threads)))
        }
    }
}

/// Runs one render of `config` on `dispatcher`.
pub fn render(config: &RenderConfig, dispatcher: &mut dyn Dispatcher) -> Result<IterationGrid> {
    config.validate()?;
    let plane = PlaneMapper::from_config(config)?;
    let started = Instant::now();

    let iters = match config.strategy {
        Strategy::SingleShot => {
            let grid = plane.sample_axes();
            dispatcher.single_shot(&grid, config.max_iter)?
        }
        Strategy::Resumable { max_loop } => {
            let mut states = plane.point_states();
            dispatcher.resumable(&mut states, config.max_iter, max_loop)?;
            states.iter().map(|state| state.iters).collect()
        }
    };

    info!(
        "{}x{} points, {} iterations, {} launch(es) in {:.3}s",
        config.width,
        config.height,
        config.max_iter,
        config.launches(),
        started.elapsed().as_secs_f64()
    );

    Ok(IterationGrid {
        width: config.width,
        height: config.height,
        max_iter: config.max_iter,
        iters,
    })
}
