// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The immutable description of a render.  Built once, from defaults
//! or from the command line, then handed to the sampler and the
//! dispatcher.  Nothing about a render lives anywhere else.

use crate::dispatch::launch_count;
use crate::error::{RenderError, Result};

/// Default image width, in samples along the real axis.
pub const XSTEPS: usize = 800;
/// Default image height, in samples along the imaginary axis.
pub const YSTEPS: usize = 600;
/// Default real coordinate of the first column.
pub const XMIN: f32 = -2.5;
/// Default imaginary coordinate of the first row.
pub const YMIN: f32 = -1.5;
/// Default extent of the plane along the real axis.
pub const XRANGE: f32 = 4.0;
/// Default extent of the plane along the imaginary axis.
pub const YRANGE: f32 = 3.0;
/// Default iteration budget per point.
pub const MAXITER: u32 = 256;
/// Default iteration cap per launch for the resumable strategy.
pub const MAXLOOP: u32 = 64;
/// Default work-group size.  Tuned by hand; the best value depends on
/// the device.
pub const WORKGROUP_SIZE: u32 = 64;

/// How the iteration budget is spent on the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Every point runs to completion inside one launch.
    SingleShot,
    /// Points keep their state in a device buffer and advance at most
    /// `max_loop` iterations per launch, so that no launch can run
    /// for unbounded time.
    Resumable {
        /// Iteration cap per launch.
        max_loop: u32,
    },
}

/// Where the escape evaluator runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    /// A wgpu compute pipeline on the first GPU adapter found.
    Gpu,
    /// Host worker threads running the same arithmetic.
    Host {
        /// Number of worker threads.
        threads: usize,
    },
}

/// Everything needed to describe one render.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Number of samples along the real axis.
    pub width: usize,
    /// Number of samples along the imaginary axis.
    pub height: usize,
    /// Real coordinate of the first column.
    pub x_min: f32,
    /// Imaginary coordinate of the first row.
    pub y_min: f32,
    /// Extent along the real axis.
    pub x_range: f32,
    /// Extent along the imaginary axis.
    pub y_range: f32,
    /// Iteration budget per point.
    pub max_iter: u32,
    /// Single launch or bounded resumable launches.
    pub strategy: Strategy,
    /// Invocations per work group on the device.
    pub workgroup_size: u32,
    /// GPU or host evaluation.
    pub backend: Backend,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            width: XSTEPS,
            height: YSTEPS,
            x_min: XMIN,
            y_min: YMIN,
            x_range: XRANGE,
            y_range: YRANGE,
            max_iter: MAXITER,
            strategy: Strategy::Resumable { max_loop: MAXLOOP },
            workgroup_size: WORKGROUP_SIZE,
            backend: Backend::Gpu,
        }
    }
}

impl RenderConfig {
    /// Total number of sample points, which is also the number of work
    /// items in one launch.
    pub fn points(&self) -> usize {
        self.width * self.height
    }

    /// Number of launches the strategy needs to spend `max_iter`.
    pub fn launches(&self) -> u32 {
        match self.strategy {
            Strategy::SingleShot => 1,
            Strategy::Resumable { max_loop } => launch_count(self.max_iter, max_loop),
        }
    }

    /// Rejects configurations that cannot produce an image.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::Config(format!(
                "image size {}x{} has no pixels",
                self.width, self.height
            )));
        }
        if (self.width as u64) * (self.height as u64) > u64::from(u32::max_value()) {
            return Err(RenderError::Config(format!(
                "image size {}x{} exceeds the device index space",
                self.width, self.height
            )));
        }
        if !self.x_min.is_finite() || !self.y_min.is_finite() {
            return Err(RenderError::Config("plane origin must be finite".to_string()));
        }
        if !(self.x_range.is_finite() && self.x_range > 0.0)
            || !(self.y_range.is_finite() && self.y_range > 0.0)
        {
            return Err(RenderError::Config(
                "plane ranges must be finite and positive".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(RenderError::Config("iteration count must be at least 1".to_string()));
        }
        if let Strategy::Resumable { max_loop } = self.strategy {
            if max_loop == 0 {
                return Err(RenderError::Config(
                    "per-launch iteration cap must be at least 1".to_string(),
                ));
            }
        }
        if self.workgroup_size == 0 {
            return Err(RenderError::Config("work-group size must be at least 1".to_string()));
        }
        if let Backend::Host { threads } = self.backend {
            if threads == 0 {
                return Err(RenderError::Config("thread count must be at least 1".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_baked_in_constants() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.points(), 800 * 600);
        assert_eq!(cfg.max_iter, 256);
        assert_eq!(cfg.strategy, Strategy::Resumable { max_loop: 64 });
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn launch_count_rounds_up() {
        let mut cfg = RenderConfig::default();
        cfg.max_iter = 256;
        cfg.strategy = Strategy::Resumable { max_loop: 64 };
        assert_eq!(cfg.launches(), 4);
        cfg.strategy = Strategy::Resumable { max_loop: 100 };
        assert_eq!(cfg.launches(), 3);
        cfg.strategy = Strategy::Resumable { max_loop: 1000 };
        assert_eq!(cfg.launches(), 1);
        cfg.strategy = Strategy::SingleShot;
        assert_eq!(cfg.launches(), 1);
    }

    #[test]
    fn rejects_empty_image() {
        let mut cfg = RenderConfig::default();
        cfg.height = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_degenerate_plane() {
        let mut cfg = RenderConfig::default();
        cfg.x_range = 0.0;
        assert!(cfg.validate().is_err());
        cfg.x_range = std::f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_loop_cap() {
        let mut cfg = RenderConfig::default();
        cfg.strategy = Strategy::Resumable { max_loop: 0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_iterations_and_threads() {
        let mut cfg = RenderConfig::default();
        cfg.max_iter = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RenderConfig::default();
        cfg.backend = Backend::Host { threads: 0 };
        assert!(cfg.validate().is_err());
    }
}
