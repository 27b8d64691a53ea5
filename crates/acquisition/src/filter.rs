//! Lowpass Filter Design
//!
//! Digital Butterworth coefficients for the aggregator's downsampling filter,
//! designed from the analog prototype with a bilinear transform.

use crate::error::FilterError;
use rustfft::num_complex::Complex;
use serde::Serialize;
use std::f64::consts::PI;

/// Transfer function coefficients, highest power first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

/// Source of lowpass coefficients
pub trait FilterDesign {
    /// `cutoff` is normalized to the Nyquist frequency (0 < cutoff < 1)
    fn lowpass(&self, order: usize, cutoff: f64) -> Result<FilterCoefficients, FilterError>;
}

/// Maximally flat passband design
#[derive(Debug, Clone, Copy, Default)]
pub struct Butterworth;

/// Expand the monic polynomial with the given roots
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![Complex::new(0.0, 0.0); coeffs.len() + 1];
        for (k, &c) in coeffs.iter().enumerate() {
            next[k] += c;
            next[k + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

impl FilterDesign for Butterworth {
    fn lowpass(&self, order: usize, cutoff: f64) -> Result<FilterCoefficients, FilterError> {
        if order == 0 {
            return Err(FilterError::ZeroOrder);
        }
        if !(cutoff > 0.0 && cutoff < 1.0) {
            return Err(FilterError::CutoffOutOfRange(cutoff));
        }

        let n = order as f64;
        // pre-warp for a sample rate of 2 (Nyquist = 1)
        let fs2 = 4.0;
        let warped = fs2 * (PI * cutoff / 2.0).tan();

        let analog: Vec<Complex<f64>> = (0..order)
            .map(|k| {
                let m = -(order as f64) + 1.0 + 2.0 * k as f64;
                -Complex::from_polar(1.0, PI * m / (2.0 * n)) * warped
            })
            .collect();

        let digital: Vec<Complex<f64>> = analog.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
        let denom: Complex<f64> = analog.iter().map(|&p| fs2 - p).product();
        let gain = (Complex::new(warped.powi(order as i32), 0.0) / denom).re;

        let zeros = vec![Complex::new(-1.0, 0.0); order];
        let b = poly(&zeros).iter().map(|c| gain * c.re).collect();
        let a = poly(&digital).iter().map(|c| c.re).collect();

        Ok(FilterCoefficients { b, a })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (x, y) in actual.iter().zip(expected) {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_first_order_half_band() {
        let c = Butterworth.lowpass(1, 0.5).unwrap();
        close(&c.b, &[0.5, 0.5]);
        close(&c.a, &[1.0, 0.0]);
    }

    #[test]
    fn test_second_order_half_band() {
        let c = Butterworth.lowpass(2, 0.5).unwrap();
        close(&c.b, &[0.29289, 0.58579, 0.29289]);
        close(&c.a, &[1.0, 0.0, 0.17157]);
    }

    #[test]
    fn test_fourth_order_narrow() {
        // 63 Hz at a 4 kHz flux ramp
        let c = Butterworth.lowpass(4, 2.0 * 63.0 / 4000.0).unwrap();
        assert_eq!(c.a.len(), 5);
        assert!((c.a[0] - 1.0).abs() < 1e-12);
        close(&c.a[1..], &[-3.74146, 5.25727, -3.28777, 0.77204]);
    }

    #[test]
    fn test_cutoff_at_or_above_nyquist_rejected() {
        assert_eq!(
            Butterworth.lowpass(4, 1.0),
            Err(FilterError::CutoffOutOfRange(1.0))
        );
        assert!(Butterworth.lowpass(4, 1.26).is_err());
        assert!(Butterworth.lowpass(4, 0.0).is_err());
        assert!(Butterworth.lowpass(4, f64::NAN).is_err());
        assert_eq!(Butterworth.lowpass(0, 0.5), Err(FilterError::ZeroOrder));
    }

    proptest! {
        #[test]
        fn prop_unity_dc_gain(order in 1usize..6, cutoff in 0.05f64..0.95) {
            let c = Butterworth.lowpass(order, cutoff).unwrap();
            let dc = c.b.iter().sum::<f64>() / c.a.iter().sum::<f64>();
            prop_assert!((dc - 1.0).abs() < 1e-6);
        }
    }
}
