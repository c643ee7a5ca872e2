// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Everything that can go wrong between reading the configuration and
//! writing the last pixel.  Nothing here is recoverable: the binary
//! reports the error and exits.

use std::io;

use failure::Fail;

/// Failure of any stage of the render pipeline.
#[derive(Debug, Fail)]
pub enum RenderError {
    /// The render configuration is unusable.
    #[fail(display = "invalid configuration: {}", _0)]
    Config(String),

    /// No GPU-class adapter is available on any backend.
    #[fail(display = "no GPU compute adapter found")]
    NoAdapter,

    /// The adapter refused to hand out a device.
    #[fail(display = "could not open compute device: {}", _0)]
    DeviceRequest(String),

    /// The request exceeds what the device is able to do.
    #[fail(display = "device limit exceeded: {}", _0)]
    Limit(String),

    /// A device buffer could not be allocated.
    #[fail(display = "device allocation failed: {}", _0)]
    Allocation(String),

    /// The kernel source could not be read.
    #[fail(display = "could not read kernel source: {}", _0)]
    KernelSource(#[cause] io::Error),

    /// The kernel failed to compile.  `log` carries the compiler output.
    #[fail(display = "kernel build failed")]
    KernelBuild {
        /// Compiler diagnostics, one message per line.
        log: String,
    },

    /// A device operation reported an error.
    #[fail(display = "device error: {}", _0)]
    Device(String),

    /// Result download from the device failed.
    #[fail(display = "could not map result buffer: {}", _0)]
    Map(String),

    /// A host evaluation thread panicked.
    #[fail(display = "host worker thread panicked")]
    HostWorker,

    /// Writing the image failed.
    #[fail(display = "i/o error: {}", _0)]
    Io(#[cause] io::Error),

    /// The image encoder rejected the pixels.
    #[fail(display = "image encoding failed: {}", _0)]
    Image(String),
}

impl From<io::Error> for RenderError {
    fn from(e: io::Error) -> Self {
        RenderError::Io(e)
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RenderError>;
