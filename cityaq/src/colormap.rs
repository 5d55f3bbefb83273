//! Scalar fields to discrete colour buckets, and the legend that explains
//! them.
//!
//! The fitted range is cut at [`LEGEND_BREAKS`] evenly spaced break values.
//! A value takes the colour of the highest break at or below it, so every
//! colour drawn on a map appears in the legend.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of breaks in a legend for a field with a range.
pub const LEGEND_BREAKS: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ColormapError {
    #[error("cannot colour NaN")]
    NaN,
}

/// An opaque RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Bucket colours from low to high, one per break.
const STOPS: [Rgb; LEGEND_BREAKS] = [
    Rgb::new(68, 1, 84),     // Dark purple
    Rgb::new(59, 82, 139),   // Blue
    Rgb::new(33, 145, 140),  // Teal
    Rgb::new(94, 201, 98),   // Green
    Rgb::new(253, 231, 37),  // Yellow
];

/// Bucketed colour scale spanning a field's range.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    min: f64,
    max: f64,
}

/// One legend entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub value: f64,
    pub color: Rgb,
}

impl Colormap {
    /// Fit the breaks to the finite values of `data`. Empty, all-zero and
    /// constant inputs give a degenerate map with a single colour.
    pub fn new(data: &[f64]) -> Self {
        let (min, max) = data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            return Self { min: 0.0, max: 0.0 };
        }
        Self { min, max }
    }

    pub fn is_degenerate(&self) -> bool {
        self.max <= self.min
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Value of break `i`. The last break is exactly the maximum.
    fn break_value(&self, i: usize) -> f64 {
        if i == LEGEND_BREAKS - 1 {
            return self.max;
        }
        let step = (self.max - self.min) / (LEGEND_BREAKS - 1) as f64;
        self.min + step * i as f64
    }

    fn bucket(&self, v: f64) -> usize {
        if self.is_degenerate() {
            return 0;
        }
        (1..LEGEND_BREAKS)
            .take_while(|&i| self.break_value(i) <= v)
            .count()
    }

    /// Colour of the bucket holding `v`. Values outside the fitted range
    /// take the first or last colour.
    pub fn at(&self, v: f64) -> Result<Rgb, ColormapError> {
        if v.is_nan() {
            return Err(ColormapError::NaN);
        }
        Ok(STOPS[self.bucket(v)])
    }

    /// Break values and the colour of the bucket each one starts.
    pub fn legend(&self) -> Vec<LegendEntry> {
        if self.is_degenerate() {
            return vec![LegendEntry {
                value: self.min,
                color: STOPS[0],
            }];
        }
        (0..LEGEND_BREAKS)
            .map(|i| LegendEntry {
                value: self.break_value(i),
                color: STOPS[i],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_and_clamping() {
        let cm = Colormap::new(&[0.0, 5.0, 10.0]);
        assert_eq!(cm.at(0.0).unwrap(), STOPS[0]);
        assert_eq!(cm.at(10.0).unwrap(), STOPS[4]);
        assert_eq!(cm.at(-3.0).unwrap(), STOPS[0]);
        assert_eq!(cm.at(99.0).unwrap(), STOPS[4]);
        assert_eq!(cm.at(5.0).unwrap(), STOPS[2]);
    }

    #[test]
    fn test_values_take_the_bucket_below() {
        let cm = Colormap::new(&[0.0, 8.0]);
        // Breaks at 0, 2, 4, 6, 8.
        assert_eq!(cm.at(1.0).unwrap(), STOPS[0]);
        assert_eq!(cm.at(1.999).unwrap(), STOPS[0]);
        assert_eq!(cm.at(2.0).unwrap(), STOPS[1]);
        assert_eq!(cm.at(7.9).unwrap(), STOPS[3]);
        assert_eq!(cm.at(8.0).unwrap(), STOPS[4]);
    }

    #[test]
    fn test_every_colour_is_in_the_legend() {
        let data = [0.013, 0.2, 0.35, 0.7, 1.1, 2.9, 3.0];
        let cm = Colormap::new(&data);
        let legend: Vec<Rgb> = cm.legend().iter().map(|e| e.color).collect();
        for v in data {
            assert!(legend.contains(&cm.at(v).unwrap()), "{v}");
        }
        // A break value gets the colour listed next to it.
        for entry in cm.legend() {
            assert_eq!(cm.at(entry.value).unwrap(), entry.color);
        }
    }

    #[test]
    fn test_nan_is_an_error() {
        let cm = Colormap::new(&[0.0, 1.0]);
        assert_eq!(cm.at(f64::NAN), Err(ColormapError::NaN));
    }

    #[test]
    fn test_degenerate_inputs() {
        for data in [&[][..], &[0.0, 0.0][..], &[3.0, 3.0, 3.0][..]] {
            let cm = Colormap::new(data);
            assert!(cm.is_degenerate());
            assert_eq!(cm.at(42.0).unwrap(), STOPS[0]);
            assert_eq!(cm.legend().len(), 1);
        }
    }

    #[test]
    fn test_legend() {
        let cm = Colormap::new(&[2.0, 10.0, 6.0]);
        let legend = cm.legend();
        let values: Vec<f64> = legend.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        let colors: Vec<Rgb> = legend.iter().map(|e| e.color).collect();
        assert_eq!(colors, STOPS.to_vec());
    }

    #[test]
    fn test_ignores_non_finite_values() {
        let cm = Colormap::new(&[1.0, f64::INFINITY, 3.0, f64::NAN]);
        assert_eq!(cm.range(), (1.0, 3.0));
    }
}
