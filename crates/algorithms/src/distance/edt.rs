//! Exact Euclidean distance transform with anisotropic pixel spacing
//!
//! Separable lower-envelope algorithm (Felzenszwalb & Huttenlocher, 2012):
//! a 1-D squared transform down every column (spacing `dy`) followed by
//! one along every row (spacing `dx`). Each pass works on independent
//! lines, so a pass can be applied to any strip that spans the full
//! extent along its axis. That is what lets the whole-grid path run over
//! scratch storage one strip at a time.

use crate::maybe_rayon::*;
use distmap_core::{Error, PixelSpacing, Result};
use ndarray::{Array2, ArrayView2, ShapeBuilder};

/// Reusable buffers for the 1-D lower envelope of parabolas
#[derive(Debug, Clone)]
pub struct LowerEnvelope {
    /// Sample index of each parabola in the envelope
    sites: Vec<usize>,
    /// Boundaries between consecutive parabolas
    bounds: Vec<f64>,
}

impl LowerEnvelope {
    pub fn new(len: usize) -> Self {
        Self {
            sites: vec![0; len],
            bounds: vec![0.0; len + 1],
        }
    }

    fn ensure(&mut self, len: usize) {
        if self.sites.len() < len {
            self.sites.resize(len, 0);
            self.bounds.resize(len + 1, 0.0);
        }
    }
}

/// Squared 1-D distance transform of `f` with sample spacing `spacing`.
///
/// `f[i]` is the squared distance already known at sample `i` (`0` on a
/// feature, `+inf` when nothing is known). On return
/// `out[i] = min_j (f[j] + ((i - j) * spacing)^2)`. A line without any
/// finite sample yields `+inf` everywhere.
pub fn squared_distance_1d(f: &[f64], spacing: f64, out: &mut [f64], env: &mut LowerEnvelope) {
    let n = f.len();
    debug_assert_eq!(out.len(), n);
    env.ensure(n);

    let pos = |i: usize| i as f64 * spacing;
    let intersect = |p: usize, q: usize| {
        let (xp, xq) = (pos(p), pos(q));
        ((f[q] + xq * xq) - (f[p] + xp * xp)) / (2.0 * (xq - xp))
    };

    let mut k = 0usize;
    let mut any = false;
    for q in 0..n {
        if !f[q].is_finite() {
            continue;
        }
        if !any {
            env.sites[0] = q;
            env.bounds[0] = f64::NEG_INFINITY;
            env.bounds[1] = f64::INFINITY;
            any = true;
            continue;
        }
        let mut s = intersect(env.sites[k], q);
        // bounds[0] is -inf, so k never underflows
        while s <= env.bounds[k] {
            k -= 1;
            s = intersect(env.sites[k], q);
        }
        k += 1;
        env.sites[k] = q;
        env.bounds[k] = s;
        env.bounds[k + 1] = f64::INFINITY;
    }

    if !any {
        out.iter_mut().for_each(|v| *v = f64::INFINITY);
        return;
    }

    k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        let x = pos(q);
        while env.bounds[k + 1] < x {
            k += 1;
        }
        let site = env.sites[k];
        let d = x - pos(site);
        *o = d * d + f[site];
    }
}

/// Column pass: squared vertical distance to the nearest feature (`0`) in
/// each column of `binary`.
///
/// `binary` must span the full grid height for the result to be exact.
pub fn column_pass(binary: ArrayView2<'_, u8>, dy: f64) -> Result<Array2<f64>> {
    let (rows, cols) = binary.dim();

    let data: Vec<f64> = (0..cols)
        .into_par_iter()
        .flat_map(|col| {
            let f: Vec<f64> = binary
                .column(col)
                .iter()
                .map(|&b| if b == 0 { 0.0 } else { f64::INFINITY })
                .collect();
            let mut out = vec![0.0; rows];
            squared_distance_1d(&f, dy, &mut out, &mut LowerEnvelope::new(rows));
            out
        })
        .collect();

    // Column-major: one column after the other
    Array2::from_shape_vec((rows, cols).f(), data).map_err(|e| Error::Other(e.to_string()))
}

/// Row pass: completes the transform of a strip of column-pass output and
/// takes the square root.
///
/// `squared` must span the full grid width for the result to be exact.
pub fn row_pass(squared: ArrayView2<'_, f64>, dx: f64) -> Result<Array2<f64>> {
    let (rows, cols) = squared.dim();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let f = squared.row(row).to_vec();
            let mut out = vec![0.0; cols];
            squared_distance_1d(&f, dx, &mut out, &mut LowerEnvelope::new(cols));
            out.iter_mut().for_each(|v| *v = v.sqrt());
            out
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

/// Euclidean distance from every cell to the nearest `0` cell, in the
/// units of `spacing`. Cells are `+inf` when the grid holds no zero.
pub fn euclidean_distance(binary: ArrayView2<'_, u8>, spacing: PixelSpacing) -> Result<Array2<f64>> {
    spacing.validate()?;
    let squared = column_pass(binary, spacing.dy)?;
    row_pass(squared.view(), spacing.dx)
}
