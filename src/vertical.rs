//! Hybrid sigma-pressure helpers: level pressures, isobaric extraction and
//! pressure-weighted column averages.

use crate::error::{Result, TaylorError};
use crate::field::Field;
use ndarray::{ArrayD, ArrayView1, Axis, Zip};

/// Reference pressure used when a source carries no `P0`, in Pa.
pub const DEFAULT_P0_PA: f64 = 100_000.0;

/// How values between two model levels are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpMethod {
    /// Linear in pressure.
    #[default]
    Linear,
    /// Linear in the logarithm of pressure.
    Log,
}

/// Multiplier turning hPa into the units of `ps`.
pub fn hpa_factor(ps: &Field) -> f64 {
    match ps.units().map(|u| u.trim().to_ascii_lowercase()) {
        Some(u) if u == "hpa" || u == "mb" || u == "mbar" || u == "millibars" => 1.0,
        _ => 100.0,
    }
}

/// Reference pressure in the units of `ps`: the source's `P0` when it has
/// one, otherwise 1000 hPa.
pub fn reference_pressure(p0: Option<&Field>, ps: &Field) -> f64 {
    p0.and_then(|f| f.data().iter().copied().find(|v| v.is_finite()))
        .unwrap_or(DEFAULT_P0_PA / 100.0 * hpa_factor(ps))
}

fn coefficients(name: &str, coef: &Field, nlev: usize) -> Result<Vec<f64>> {
    let values: Vec<f64> = coef.data().iter().copied().collect();
    if values.len() != nlev {
        return Err(TaylorError::Precondition(format!(
            "hybrid coefficient {} has {} values for {} levels",
            name,
            values.len(),
            nlev
        )));
    }
    Ok(values)
}

/// Pressure `hyam * p0 + hybm * ps` at every cell of `field`, which must have
/// a `lev` axis and otherwise the dimensions of `ps`.
pub fn hybrid_pressure(field: &Field, ps: &Field, hyam: &Field, hybm: &Field, p0: f64) -> Result<Field> {
    let k = field.require_axis("lev")?;
    let nlev = field.shape()[k];
    let a = coefficients("hyam", hyam, nlev)?;
    let b = coefficients("hybm", hybm, nlev)?;

    let column_dims: Vec<&String> = field.dims().iter().filter(|d| *d != "lev").collect();
    let ps_dims: Vec<&String> = ps.dims().iter().collect();
    let mut column_shape = field.shape().to_vec();
    column_shape.remove(k);
    if column_dims != ps_dims || ps.shape() != column_shape.as_slice() {
        return Err(TaylorError::Precondition(format!(
            "surface pressure {:?}{:?} does not match the columns of '{}' {:?}{:?}",
            ps.dims(),
            ps.shape(),
            field.name(),
            field.dims(),
            field.shape()
        )));
    }

    let mut pressure = ArrayD::<f64>::zeros(field.data().raw_dim());
    for (i, mut level) in pressure.axis_iter_mut(Axis(k)).enumerate() {
        let (ai, bi) = (a[i], b[i]);
        level.assign(&ps.data().mapv(|s| ai * p0 + bi * s));
    }

    let pres = Field::new(
        "PMID",
        ps.units().map(str::to_string),
        field.dims().to_vec(),
        field
            .dims()
            .iter()
            .filter_map(|d| field.coord(d).map(|c| (d.clone(), c.to_vec())))
            .collect(),
        pressure,
    )?;
    Ok(pres)
}

/// Interpolate `field` to the isobaric level `level_hpa`. Columns that do not
/// span the level yield NaN; the `lev` dimension is dropped.
pub fn interp_to_pressure(
    field: &Field,
    ps: &Field,
    hyam: &Field,
    hybm: &Field,
    p0: f64,
    level_hpa: f64,
    method: InterpMethod,
) -> Result<Field> {
    let k = field.require_axis("lev")?;
    let target = level_hpa * hpa_factor(ps);
    let pressure = hybrid_pressure(field, ps, hyam, hybm, p0)?;

    let data = Zip::from(field.data().lanes(Axis(k)))
        .and(pressure.data().lanes(Axis(k)))
        .map_collect(|f, p| interp_column(f, p, target, method));

    Ok(field.without_dim("lev", data))
}

fn sorted_column(f: ArrayView1<f64>, p: ArrayView1<f64>) -> Vec<(f64, f64)> {
    let mut column: Vec<(f64, f64)> = p
        .iter()
        .zip(f.iter())
        .filter(|(p, _)| p.is_finite())
        .map(|(&p, &f)| (p, f))
        .collect();
    column.sort_by(|a, b| a.0.total_cmp(&b.0));
    column
}

fn interp_column(f: ArrayView1<f64>, p: ArrayView1<f64>, target: f64, method: InterpMethod) -> f64 {
    let column = sorted_column(f, p);
    let (Some(first), Some(last)) = (column.first(), column.last()) else {
        return f64::NAN;
    };
    if target < first.0 || target > last.0 {
        return f64::NAN;
    }

    for pair in column.windows(2) {
        let (p0, f0) = pair[0];
        let (p1, f1) = pair[1];
        if target == p0 {
            return f0;
        }
        if target <= p1 {
            if target == p1 || p1 == p0 {
                return f1;
            }
            let w = match method {
                InterpMethod::Linear => (target - p0) / (p1 - p0),
                InterpMethod::Log => (target.ln() - p0.ln()) / (p1.ln() - p0.ln()),
            };
            return f0 + w * (f1 - f0);
        }
    }
    // Single-level column equal to the target.
    first.1
}

/// Pressure-weighted vertical average: per column
/// `trapz(f * p, p) / (0.5 * (pmax^2 - pmin^2))`.
pub fn column_average(field: &Field, ps: &Field, hyam: &Field, hybm: &Field, p0: f64) -> Result<Field> {
    let k = field.require_axis("lev")?;
    let pressure = hybrid_pressure(field, ps, hyam, hybm, p0)?;

    let data = Zip::from(field.data().lanes(Axis(k)))
        .and(pressure.data().lanes(Axis(k)))
        .map_collect(|f, p| {
            let column = sorted_column(f, p);
            let (Some(&(pmin, _)), Some(&(pmax, _))) = (column.first(), column.last()) else {
                return f64::NAN;
            };
            let integral: f64 = column
                .windows(2)
                .map(|w| {
                    let (pa, fa) = w[0];
                    let (pb, fb) = w[1];
                    0.5 * (fa * pa + fb * pb) * (pb - pa)
                })
                .sum();
            integral / (0.5 * (pmax * pmax - pmin * pmin))
        });

    Ok(field.without_dim("lev", data))
}
