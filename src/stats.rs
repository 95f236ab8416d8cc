use crate::error::{Result, TaylorError};
use crate::field::Field;
use ndarray::{ArrayD, Zip};
use serde::Serialize;

/// Pattern statistics of one case field against its reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaylorStats {
    #[serde(rename = "corr")]
    pub correlation: f64,
    /// Standard deviation of the case over that of the reference.
    pub ratio: f64,
    /// Mean bias in percent of the reference mean.
    #[serde(rename = "bias")]
    pub bias_percent: f64,
}

impl TaylorStats {
    pub fn is_finite(&self) -> bool {
        self.correlation.is_finite() && self.ratio.is_finite() && self.bias_percent.is_finite()
    }
}

/// Spatial weighting applied along the `lat` axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// cos(latitude) area weights.
    #[default]
    CosLat,
    Uniform,
}

impl Weighting {
    pub fn latitude_weights(self, lat: &[f64]) -> Vec<f64> {
        match self {
            Weighting::CosLat => lat.iter().map(|l| l.to_radians().cos()).collect(),
            Weighting::Uniform => vec![1.0; lat.len()],
        }
    }
}

/// Correlation, standard-deviation ratio and percent bias of `case` against
/// `reference`, weighted per latitude.
pub fn taylor_stats(case: &Field, reference: &Field, weighting: Weighting) -> Result<TaylorStats> {
    let axis = case.require_axis("lat")?;
    let lat: Vec<f64> = match case.coord("lat") {
        Some(values) => values.to_vec(),
        None if weighting == Weighting::Uniform => vec![0.0; case.shape()[axis]],
        None => {
            return Err(TaylorError::Precondition(format!(
                "field '{}' has no latitude values to weight by",
                case.name()
            )));
        }
    };
    taylor_stats_with_weights(case, reference, &weighting.latitude_weights(&lat))
}

/// Same as [`taylor_stats`] with explicit weights, one per latitude row.
pub fn taylor_stats_with_weights(case: &Field, reference: &Field, lat_weights: &[f64]) -> Result<TaylorStats> {
    if case.shape() != reference.shape() {
        return Err(TaylorError::Precondition(format!(
            "case '{}' has shape {:?} but reference has {:?}",
            case.name(),
            case.shape(),
            reference.shape()
        )));
    }
    let axis = case.require_axis("lat")?;
    reference.require_axis("lat")?;
    if lat_weights.len() != case.shape()[axis] {
        return Err(TaylorError::Precondition(format!(
            "{} latitude weights for {} latitudes",
            lat_weights.len(),
            case.shape()[axis]
        )));
    }

    let weights = ArrayD::from_shape_fn(case.data().raw_dim(), |idx| lat_weights[idx[axis]]);
    let x = case.data();
    let y = reference.data();

    let mean_x = weighted_mean(x, &weights);
    let mean_y = weighted_mean(y, &weights);
    let dev_x = x.mapv(|v| v - mean_x);
    let dev_y = y.mapv(|v| v - mean_y);

    let var_x = weighted_mean(&(&dev_x * &dev_x), &weights);
    let var_y = weighted_mean(&(&dev_y * &dev_y), &weights);
    let cov = weighted_mean(&(&dev_x * &dev_y), &weights);

    Ok(TaylorStats {
        correlation: cov / (var_x * var_y).sqrt(),
        ratio: var_x.sqrt() / var_y.sqrt(),
        bias_percent: 100.0 * (mean_x - mean_y) / mean_y,
    })
}

/// `sum(w * v) / sum(w)` over the cells where `v` is not NaN.
fn weighted_mean(values: &ArrayD<f64>, weights: &ArrayD<f64>) -> f64 {
    let mut sum = 0.0;
    let mut total_weight = 0.0;
    Zip::from(values).and(weights).for_each(|&v, &w| {
        if !v.is_nan() {
            sum += w * v;
            total_weight += w;
        }
    });
    sum / total_weight
}
