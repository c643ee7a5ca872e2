// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape evaluator, host side.  These functions follow the
//! `mandel_iters` kernels step for step in the same `f32` width.  The
//! host and the device are not bit-exact: a shader compiler is free
//! to fuse or reorder the multiply-adds, so a point sitting on the
//! bailout boundary can come out a few iterations apart.  Agreement
//! between strategies is exact on either side.
//!
//! Iteration starts at `z = c`: the first step from zero is free, so
//! a point is counted from the first iterate onward.  The point 2+0i
//! therefore escapes after one iteration and 0+0i never does.

use bytemuck::{Pod, Zeroable};
use num::Complex;

/// Squared bailout radius.  A point whose iterate exceeds it has
/// escaped.
pub const BAILOUT: f32 = 4.0;

/// The resumable per-point record.  The layout mirrors the WGSL
/// `PointState` struct in `mandel_resumable.wgsl` field for field.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PointState {
    /// Real part of the sampled point.
    pub x0: f32,
    /// Imaginary part of the sampled point.
    pub y0: f32,
    /// Real part of the running iterate.
    pub x: f32,
    /// Imaginary part of the running iterate.
    pub y: f32,
    /// Iterations performed so far.
    pub iters: u32,
    /// Non-zero once the iterate has left the bailout radius.
    pub escaped: u32,
}

impl PointState {
    /// A record for `c` that has not iterated yet.
    pub fn new(c: Complex<f32>) -> Self {
        PointState {
            x0: c.re,
            y0: c.im,
            x: c.re,
            y: c.im,
            iters: 0,
            escaped: 0,
        }
    }

    /// The sampled point.
    pub fn point(&self) -> Complex<f32> {
        Complex::new(self.x0, self.y0)
    }

    /// Whether the point has escaped.  Sticky.
    pub fn is_escaped(&self) -> bool {
        self.escaped != 0
    }
}

#[inline]
fn step(z: Complex<f32>, c: Complex<f32>) -> Complex<f32> {
    Complex::new(z.re * z.re - z.im * z.im + c.re, 2.0 * z.re * z.im + c.im)
}

/// Single-shot evaluation: the number of iterations `c` survives
/// before escaping, saturating at `max_iter`.
pub fn iterations(c: Complex<f32>, max_iter: u32) -> u32 {
    let mut z = c;
    let mut i = 0;
    while i < max_iter && z.norm_sqr() <= BAILOUT {
        z = step(z, c);
        i += 1;
    }
    i
}

/// Resumable evaluation: advance `state` by at most `max_loop`
/// iterations without exceeding `max_iter` in total.  An escaped
/// point is left untouched.
pub fn advance(state: &mut PointState, max_iter: u32, max_loop: u32) {
    if state.is_escaped() {
        return;
    }
    let c = state.point();
    let mut z = Complex::new(state.x, state.y);
    if z.norm_sqr() > BAILOUT {
        state.escaped = 1;
        return;
    }
    let mut n = 0;
    while n < max_loop && state.iters < max_iter {
        z = step(z, c);
        state.iters += 1;
        n += 1;
        if z.norm_sqr() > BAILOUT {
            state.escaped = 1;
            break;
        }
    }
    state.x = z.re;
    state.y = z.im;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_never_escapes() {
        assert_eq!(iterations(Complex::new(0.0, 0.0), 256), 256);
        let mut state = PointState::new(Complex::new(0.0, 0.0));
        advance(&mut state, 256, 256);
        assert_eq!(state.iters, 256);
        assert!(!state.is_escaped());
    }

    #[test]
    fn two_escapes_after_one_iteration() {
        assert_eq!(iterations(Complex::new(2.0, 0.0), 10), 1);
        let mut state = PointState::new(Complex::new(2.0, 0.0));
        advance(&mut state, 10, 3);
        assert_eq!(state.iters, 1);
        assert!(state.is_escaped());
        assert_eq!((state.x, state.y), (6.0, 0.0));
    }

    #[test]
    fn points_outside_the_radius_do_not_iterate() {
        assert_eq!(iterations(Complex::new(3.0, 0.0), 10), 0);
        let mut state = PointState::new(Complex::new(3.0, 0.0));
        advance(&mut state, 10, 10);
        assert_eq!(state.iters, 0);
        assert!(state.is_escaped());
    }

    #[test]
    fn escaped_points_are_a_fixed_point() {
        let mut state = PointState::new(Complex::new(0.3, 0.6));
        while !state.is_escaped() && state.iters < 1000 {
            advance(&mut state, 1000, 7);
        }
        assert!(state.is_escaped());
        let settled = state;
        for _ in 0..5 {
            advance(&mut state, 1000, 7);
            assert_eq!(state, settled);
        }
    }

    #[test]
    fn saturated_points_stay_saturated() {
        let mut state = PointState::new(Complex::new(-1.0, 0.0));
        advance(&mut state, 16, 16);
        assert_eq!(state.iters, 16);
        let saturated = state;
        advance(&mut state, 16, 16);
        assert_eq!(state, saturated);
    }

    #[test]
    fn each_launch_is_capped() {
        let mut state = PointState::new(Complex::new(-1.0, 0.0));
        advance(&mut state, 100, 30);
        assert_eq!(state.iters, 30);
        advance(&mut state, 100, 30);
        assert_eq!(state.iters, 60);
        advance(&mut state, 100, 30);
        advance(&mut state, 100, 30);
        assert_eq!(state.iters, 100);
    }

    #[test]
    fn split_launches_agree_with_single_shot() {
        let points = [
            Complex::new(-0.75, 0.1),
            Complex::new(0.25, 0.5),
            Complex::new(-1.25, 0.02),
            Complex::new(0.4, -0.3),
            Complex::new(-2.0, 0.0),
        ];
        for &c in points.iter() {
            let expected = iterations(c, 500);
            for &max_loop in [1, 3, 64, 500].iter() {
                let mut state = PointState::new(c);
                for _ in 0..(500 + max_loop - 1) / max_loop {
                    advance(&mut state, 500, max_loop);
                }
                assert_eq!(state.iters, expected, "c = {}, max_loop = {}", c, max_loop);
            }
        }
    }

    #[test]
    fn record_is_twenty_four_bytes() {
        assert_eq!(std::mem::size_of::<PointState>(), 24);
    }
}
