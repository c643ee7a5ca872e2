// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Turns iteration counts into an image.  Points that used the whole
//! budget are black; everything else is its count wrapped into a byte,
//! which gives the familiar banding.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use image::pnm::PNMEncoder;
use image::pnm::{PNMSubtype, SampleEncoding};
use image::ColorType;

use crate::error::{RenderError, Result};
use crate::render::IterationGrid;

/// Output file formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    /// Plain-text RGB pixmap, `P3`, one pixel per line.
    Ppm,
    /// Binary graymap, `P5`.
    Pgm,
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "ppm" => Ok(ImageFormat::Ppm),
            "pgm" => Ok(ImageFormat::Pgm),
            _ => Err(format!("unknown image format '{}'", s)),
        }
    }
}

/// Gray level for a point that iterated `count` times out of
/// `max_iter`.
#[inline]
pub fn intensity(count: u32, max_iter: u32) -> u8 {
    if count >= max_iter {
        0
    } else {
        (count % 256) as u8
    }
}

/// Writes `grid` as a plain-text `P3` image: the header, then one
/// `c c c` line per pixel, row by row from the top.
pub fn write_ppm<W: Write>(out: W, grid: &IterationGrid) -> Result<()> {
    let mut out = BufWriter::new(out);
    write!(out, "P3\n{} {}\n255\n", grid.width, grid.height)?;
    for &count in &grid.iters {
        let c = intensity(count, grid.max_iter);
        writeln!(out, "{} {} {}", c, c, c)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `grid` as a binary graymap with the same intensities.
pub fn write_graymap<W: Write>(out: W, grid: &IterationGrid) -> Result<()> {
    let pixels: Vec<u8> = grid
        .iters
        .iter()
        .map(|&count| intensity(count, grid.max_iter))
        .collect();
    let mut encoder =
        PNMEncoder::new(out).with_subtype(PNMSubtype::Graymap(SampleEncoding::Binary));
    encoder
        .encode(
            &pixels[..],
            grid.width as u32,
            grid.height as u32,
            ColorType::Gray(8),
        )
        .map_err(|e| RenderError::Image(e.to_string()))
}

/// Creates (or truncates) `path` and writes `grid` to it in `format`.
pub fn save(path: &Path, grid: &IterationGrid, format: ImageFormat) -> Result<()> {
    let output = File::create(path)?;
    match format {
        ImageFormat::Ppm => write_ppm(output, grid),
        ImageFormat::Pgm => write_graymap(output, grid),
    }
}
