// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the PlaneMapper struct, which describes a relationship
//! between a rectangle on the integral plane with an origin at 0,0,
//! and a rectangle on the complex plane given by a corner and an
//! extent.  The mapper is also the grid sampler: it produces the
//! coordinates the escape evaluator consumes, either as two separable
//! axes or as one state record per point.

use num::Complex;

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::escape::PointState;

/// Describes the width and height of an integral plane that is assumed
/// to start at 0,0.  Both values are counts of samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegralPlane(pub usize, pub usize);

/// Describes the corner of the complex plane that maps to pixel 0,0
/// and the extent of the plane along each axis, treating the real part
/// as the x-component and the imaginary part as the y-component.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ComplexPlane(pub Complex<f32>, pub Complex<f32>);

/// Describes the column, row of a sample in the integral plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub usize, pub usize);

/// The separable coordinate grid: one real coordinate per column and
/// one imaginary coordinate per row.  The point at column `i`, row `j`
/// is `reals[i] + imags[j]·i`.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleGrid {
    /// Real coordinate of each column, `width` entries.
    pub reals: Vec<f32>,
    /// Imaginary coordinate of each row, `height` entries.
    pub imags: Vec<f32>,
}

impl SampleGrid {
    /// Number of columns.
    pub fn width(&self) -> usize {
        self.reals.len()
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.imags.len()
    }

    /// Number of points in the grid.
    pub fn len(&self) -> usize {
        self.reals.len() * self.imags.len()
    }

    /// True if the grid has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The point sampled at linear, row-major offset `offset`.
    pub fn point(&self, offset: usize) -> Complex<f32> {
        let width = self.width();
        Complex::new(self.reals[offset % width], self.imags[offset / width])
    }
}

/// Maps pixels of the integral plane onto the complex plane.
#[derive(Debug)]
pub struct PlaneMapper {
    /// The size of the integral cartesian plane.
    pub integral_plane: IntegralPlane,
    /// The origin and extent of the complex cartesian plane.
    pub complex_plane: ComplexPlane,
    // Distance on the complex plane between two neighbouring samples,
    // along each axis.
    steps: (f32, f32),
}

impl PlaneMapper {
    /// Takes the size of the integral plane, the complex coordinate of
    /// its first pixel, and the extent of the complex plane covered.
    pub fn new(
        width: usize,
        height: usize,
        origin: Complex<f32>,
        range: Complex<f32>,
    ) -> Result<PlaneMapper> {
        if width == 0 || height == 0 {
            return Err(RenderError::Config(
                "The integral plane must contain at least one pixel.".to_string(),
            ));
        }

        if !(range.re > 0.0) || !(range.im > 0.0) {
            return Err(RenderError::Config(
                "The complex plane must have a positive extent along both axes.".to_string(),
            ));
        }

        let steps = (range.re / (width as f32), range.im / (height as f32));

        Ok(PlaneMapper {
            integral_plane: IntegralPlane(width, height),
            complex_plane: ComplexPlane(origin, range),
            steps,
        })
    }

    /// Builds the mapper a render configuration describes.
    pub fn from_config(config: &RenderConfig) -> Result<PlaneMapper> {
        PlaneMapper::new(
            config.width,
            config.height,
            Complex::new(config.x_min, config.y_min),
            Complex::new(config.x_range, config.y_range),
        )
    }

    fn column_to_real(&self, column: usize) -> f32 {
        self.complex_plane.0.re + (column as f32) * self.steps.0
    }

    fn row_to_imag(&self, row: usize) -> f32 {
        self.complex_plane.0.im + (row as f32) * self.steps.1
    }

    /// Given a pixel on the integral cartesian plane, return the point
    /// on the complex plane it samples.
    pub fn pixel_to_point(&self, pixel: &Pixel) -> Complex<f32> {
        Complex::new(self.column_to_real(pixel.0), self.row_to_imag(pixel.1))
    }

    /// The two coordinate axes, for the single-shot evaluator.
    pub fn sample_axes(&self) -> SampleGrid {
        SampleGrid {
            reals: (0..self.integral_plane.0)
                .map(|column| self.column_to_real(column))
                .collect(),
            imags: (0..self.integral_plane.1)
                .map(|row| self.row_to_imag(row))
                .collect(),
        }
    }

    /// One freshly initialised state record per point, in row-major
    /// order, for the resumable evaluator.
    pub fn point_states(&self) -> Vec<PointState> {
        iproduct!(0..self.integral_plane.1, 0..self.integral_plane.0)
            .map(|(row, column)| PointState::new(self.pixel_to_point(&Pixel(column, row))))
            .collect()
    }
}
