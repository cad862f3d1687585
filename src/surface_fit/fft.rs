// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-dimensional FFTs and the lock guarding FFT plan construction.

use std::sync::{Arc, Mutex, PoisonError};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// The capability to construct FFT plans. Plan construction isn't allowed to
/// happen concurrently; executing plans is. One lock is made for a whole run
/// and shared by everything that plans FFTs.
#[derive(Debug, Clone, Default)]
pub struct FftPlanLock(Arc<Mutex<()>>);

impl FftPlanLock {
    pub fn new() -> FftPlanLock {
        FftPlanLock::default()
    }

    /// Run `f` while holding the lock. A poisoned lock is still usable; the
    /// lock protects no data.
    pub fn plan<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Forward and inverse plans for a `rows` × `cols` grid.
pub(crate) struct Fft2Plans {
    rows: usize,
    cols: usize,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl Fft2Plans {
    pub(crate) fn new(rows: usize, cols: usize, lock: &FftPlanLock) -> Fft2Plans {
        lock.plan(|| {
            let mut planner = FftPlanner::<f64>::new();
            Fft2Plans {
                rows,
                cols,
                row_forward: planner.plan_fft_forward(cols),
                row_inverse: planner.plan_fft_inverse(cols),
                col_forward: planner.plan_fft_forward(rows),
                col_inverse: planner.plan_fft_inverse(rows),
            }
        })
    }

    /// In-place 2D FFT of a row-major buffer.
    pub(crate) fn forward(&self, buffer: &mut Vec<Complex<f64>>) {
        self.transform(buffer, &self.row_forward, &self.col_forward);
    }

    /// In-place, normalised inverse 2D FFT of a row-major buffer.
    pub(crate) fn inverse(&self, buffer: &mut Vec<Complex<f64>>) {
        self.transform(buffer, &self.row_inverse, &self.col_inverse);
        let norm = 1.0 / (self.rows * self.cols) as f64;
        buffer.iter_mut().for_each(|v| *v *= norm);
    }

    fn transform(
        &self,
        buffer: &mut Vec<Complex<f64>>,
        row_fft: &Arc<dyn Fft<f64>>,
        col_fft: &Arc<dyn Fft<f64>>,
    ) {
        debug_assert_eq!(buffer.len(), self.rows * self.cols);
        // A buffer holding several rows is processed one row at a time.
        row_fft.process(buffer);
        let mut transposed = transpose(buffer, self.rows, self.cols);
        col_fft.process(&mut transposed);
        *buffer = transpose(&transposed, self.cols, self.rows);
    }
}

fn transpose(buffer: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::default(); buffer.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = buffer[r * cols + c];
        }
    }
    out
}
