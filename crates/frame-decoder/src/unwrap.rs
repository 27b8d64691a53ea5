//! Phase Unwrapping

use ndarray::{Array2, Axis};
use std::f64::consts::PI;

/// Remove 2π jumps from a phase series in place.
///
/// A step larger than π in magnitude is taken as a wrap and corrected by the
/// multiple of 2π that brings it into [-π, π].
pub fn unwrap_series(phase: &mut [f64]) {
    let mut correction = 0.0;
    let mut previous = match phase.first() {
        Some(&p) => p,
        None => return,
    };

    for value in phase.iter_mut().skip(1) {
        let raw = *value;
        let step = raw - previous;
        previous = raw;

        if step.abs() >= PI {
            let mut wrapped = (step + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && step > 0.0 {
                wrapped = PI;
            }
            correction += wrapped - step;
        }
        *value = raw + correction;
    }
}

/// Unwrap every channel (row) of a channels × frames phase matrix along time
pub fn unwrap_phase(phase: &mut Array2<f64>) {
    for mut row in phase.axis_iter_mut(Axis(0)) {
        match row.as_slice_mut() {
            Some(slice) => unwrap_series(slice),
            None => {
                let mut owned = row.to_vec();
                unwrap_series(&mut owned);
                row.iter_mut().zip(owned).for_each(|(dst, src)| *dst = src);
            }
        }
    }
}
