//! Geometry and marker rules of a Taylor diagram, independent of any
//! drawing backend.
//!
//! The diagram is a quarter disc. Radius is the standard-deviation ratio of
//! a case to the reference, and the angle, measured clockwise from the
//! vertical axis, is `pi/2 - acos(correlation)`.

use crate::stats::TaylorStats;
use std::f64::consts::FRAC_PI_2;

pub const CORRELATION_TICKS: [f64; 13] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.99, 1.0];
pub const RADIAL_GRID: [f64; 7] = [0.0, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5];
pub const RADIUS_LIMIT: f64 = 1.6;
pub const BIAS_EDGES: [f64; 8] = [-20.0, -10.0, -5.0, -1.0, 1.0, 5.0, 10.0, 20.0];
/// Correlations this far past 1 are rounding error and drawn at 1.
const CORRELATION_SLACK: f64 = 1e-9;

pub const CORRELATION_LABEL: &str = "Correlation";
pub const CORRELATION_LABEL_ANGLE_DEG: f64 = 50.0;
pub const RADIUS_LABEL: &str = "Standardized Deviations";
pub const REFERENCE_LABEL: &str = "REF";
pub const REFERENCE_LABEL_ANGLE_DEG: f64 = 95.0;

/// matplotlib's tab20 qualitative palette.
pub const TAB20: [(u8, u8, u8); 20] = [
    (31, 119, 180),
    (174, 199, 232),
    (255, 127, 14),
    (255, 187, 120),
    (44, 160, 44),
    (152, 223, 138),
    (214, 39, 40),
    (255, 152, 150),
    (148, 103, 189),
    (197, 176, 213),
    (140, 86, 75),
    (196, 156, 148),
    (227, 119, 194),
    (247, 182, 210),
    (127, 127, 127),
    (199, 199, 199),
    (188, 189, 34),
    (219, 219, 141),
    (23, 190, 207),
    (158, 218, 229),
];

pub fn case_color(index: usize) -> (u8, u8, u8) {
    TAB20[index % TAB20.len()]
}

/// Angle of a correlation, measured clockwise from the vertical axis.
pub fn polar_angle(correlation: f64) -> f64 {
    FRAC_PI_2 - correlation.acos()
}

/// Cartesian position of a point at `radius` and clockwise-from-top `theta`.
pub fn polar_to_xy(radius: f64, theta: f64) -> (f64, f64) {
    (radius * theta.sin(), radius * theta.cos())
}

pub fn placement(stats: &TaylorStats) -> (f64, f64) {
    polar_to_xy(stats.ratio, polar_angle(stats.correlation.min(1.0)))
}

/// Index of the bias bin: the number of edges `<=` the value. NaN has no bin.
pub fn bias_bin(bias_percent: f64) -> Option<usize> {
    if bias_percent.is_nan() {
        return None;
    }
    Some(BIAS_EDGES.iter().filter(|&&edge| edge <= bias_percent).count())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerShape {
    DownTriangle,
    Circle,
    UpTriangle,
}

/// Shape and size of the marker for a bias bin.
pub fn marker_style(bin: usize) -> (MarkerShape, u32) {
    const SIZES: [u32; 9] = [24, 16, 8, 4, 4, 4, 8, 16, 24];
    let shape = match bin {
        0..=3 => MarkerShape::DownTriangle,
        4 => MarkerShape::Circle,
        _ => MarkerShape::UpTriangle,
    };
    (shape, SIZES[bin.min(SIZES.len() - 1)])
}

/// One row of the bias legend.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasTier {
    pub label: &'static str,
    pub size: u32,
    /// Drawn as outline only.
    pub hollow: bool,
    /// False for the `< 1%` tier, which is a single circle.
    pub paired: bool,
}

pub fn bias_legend() -> [BiasTier; 5] {
    [
        BiasTier { label: "> 20%", size: 24, hollow: true, paired: true },
        BiasTier { label: "10-20%", size: 16, hollow: false, paired: true },
        BiasTier { label: "5-10%", size: 8, hollow: false, paired: true },
        BiasTier { label: "1-5%", size: 4, hollow: false, paired: true },
        BiasTier { label: "< 1%", size: 4, hollow: false, paired: false },
    ]
}

/// Legend line for the variable with 1-based annotation number `number`.
pub fn variable_legend_line(number: usize, name: &str) -> String {
    format!("{} - {}", number, name.replace('_', ""))
}

/// Statistics of one case across the diagram's variables.
#[derive(Debug, Clone)]
pub struct CaseSeries {
    pub name: String,
    pub color: (u8, u8, u8),
    /// One entry per diagram variable; `None` when the variable was skipped.
    pub stats: Vec<Option<TaylorStats>>,
}

/// Everything drawn on one seasonal diagram.
#[derive(Debug, Clone)]
pub struct Diagram {
    pub title: String,
    pub variables: Vec<String>,
    pub cases: Vec<CaseSeries>,
}

/// A marker ready to draw, in diagram coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub number: usize,
    pub x: f64,
    pub y: f64,
    pub shape: MarkerShape,
    pub size: u32,
    pub color: (u8, u8, u8),
}

/// A point that cannot be placed on the diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPoint {
    pub case: String,
    pub variable: String,
    /// True when the statistics themselves are NaN or infinite.
    pub non_finite: bool,
    pub reason: String,
}

impl Diagram {
    /// Markers for every finite point inside the quarter disc, plus the
    /// points that had to be left out.
    pub fn markers(&self) -> (Vec<Marker>, Vec<SkippedPoint>) {
        let mut markers = Vec::new();
        let mut skipped = Vec::new();

        for case in &self.cases {
            for (i, (variable, stats)) in self.variables.iter().zip(&case.stats).enumerate() {
                let Some(stats) = stats else { continue };
                let skip = |non_finite: bool, reason: String| SkippedPoint {
                    case: case.name.clone(),
                    variable: variable.clone(),
                    non_finite,
                    reason,
                };

                if !stats.is_finite() {
                    let reason = format!(
                        "non-finite statistics (corr={}, ratio={}, bias={})",
                        stats.correlation, stats.ratio, stats.bias_percent
                    );
                    skipped.push(skip(true, reason));
                    continue;
                }
                if stats.correlation < 0.0 || stats.correlation > 1.0 + CORRELATION_SLACK || stats.ratio > RADIUS_LIMIT {
                    let reason = format!(
                        "outside the diagram (corr={:.3}, ratio={:.3})",
                        stats.correlation, stats.ratio
                    );
                    skipped.push(skip(false, reason));
                    continue;
                }

                let (x, y) = placement(stats);
                let Some(bin) = bias_bin(stats.bias_percent) else { continue };
                let (shape, size) = marker_style(bin);
                markers.push(Marker {
                    number: i + 1,
                    x,
                    y,
                    shape,
                    size,
                    color: case.color,
                });
            }
        }

        (markers, skipped)
    }

    pub fn variable_legend(&self) -> Vec<String> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, v)| variable_legend_line(i + 1, v))
            .collect()
    }
}
