#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mandelbrot renderer with GPU offload
//!
//! The Mandelbrot set is the set of points `c` on the complex plane
//! for which repeatedly squaring and adding `c` never runs off to
//! infinity.  An escape-time render counts, for every pixel, how many
//! of those iterations the point survives before its magnitude passes
//! 2, and uses the count as the pixel's brightness.  Points that
//! survive the whole budget are taken to be inside the set and drawn
//! black.
//!
//! Every pixel is independent of every other, which makes the render
//! a natural fit for a GPU: the plane is sampled on the host, the
//! samples are uploaded once, a compute kernel iterates all of them
//! in parallel, and the counts are downloaded once.  Because a single
//! long launch can trip a driver watchdog, the resumable strategy
//! keeps each point's iterate in a device buffer and spends the
//! iteration budget over several short launches instead.  On any one
//! backend both strategies produce identical counts.

extern crate bytemuck;
extern crate crossbeam;
extern crate failure;
extern crate image;
#[macro_use]
extern crate itertools;
#[macro_use]
extern crate log;
extern crate num;
extern crate num_cpus;
extern crate pollster;
extern crate wgpu;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod escape;
pub mod kernel;
pub mod planes;
pub mod ppm;
pub mod render;

pub use config::{Backend, RenderConfig, Strategy};
pub use dispatch::{Dispatcher, GpuDispatcher, HostDispatcher};
pub use error::RenderError;
pub use escape::PointState;
pub use planes::{PlaneMapper, SampleGrid};
pub use ppm::ImageFormat;
pub use render::{open_dispatcher, render, IterationGrid};
