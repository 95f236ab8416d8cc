use crate::error::{Result, TaylorError};
use crate::season::Season;
use ndarray::{ArrayD, ArrayView1, Axis, IxDyn, Zip};
use std::collections::BTreeMap;

/// A labeled N-d array over named dimensions (a subset of time, lev, lat,
/// lon). Invalid cells are NaN. Every operation returns a new field.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    units: Option<String>,
    dims: Vec<String>,
    coords: BTreeMap<String, Vec<f64>>,
    data: ArrayD<f64>,
}

impl Field {
    pub fn new(
        name: &str,
        units: Option<String>,
        dims: Vec<String>,
        coords: BTreeMap<String, Vec<f64>>,
        data: ArrayD<f64>,
    ) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(TaylorError::Precondition(format!(
                "field '{}' names {} dimensions but has {}",
                name,
                dims.len(),
                data.ndim()
            )));
        }

        for (dim, values) in &coords {
            let Some(axis) = dims.iter().position(|d| d == dim) else {
                return Err(TaylorError::Precondition(format!(
                    "field '{}' has coordinate '{}' for a dimension it does not have",
                    name, dim
                )));
            };
            if values.len() != data.len_of(Axis(axis)) {
                return Err(TaylorError::Precondition(format!(
                    "coordinate '{}' of field '{}' has {} values for an axis of length {}",
                    dim,
                    name,
                    values.len(),
                    data.len_of(Axis(axis))
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            units,
            dims,
            coords,
            data,
        })
    }

    /// Convenience constructor for a field given by its dims and coordinate
    /// vectors, one per dimension, in order.
    pub fn from_parts(name: &str, dims: &[&str], coords: Vec<Vec<f64>>, values: Vec<f64>) -> Result<Self> {
        let shape: Vec<usize> = coords.iter().map(Vec::len).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| TaylorError::Precondition(format!("field '{}': {}", name, e)))?;
        let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
        let coords = dims.iter().cloned().zip(coords).collect();
        Self::new(name, None, dims, coords, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn coord(&self, dim: &str) -> Option<&[f64]> {
        self.coords.get(dim).map(Vec::as_slice)
    }

    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis(dim).is_some()
    }

    /// Axis index of `dim`, failing when the field does not have it.
    pub fn require_axis(&self, dim: &str) -> Result<usize> {
        self.axis(dim).ok_or_else(|| {
            TaylorError::Precondition(format!(
                "field '{}' has no '{}' dimension (dimensions: {})",
                self.name,
                dim,
                self.dims.join(", ")
            ))
        })
    }

    pub fn renamed(&self, name: &str) -> Field {
        Field {
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Same labels, new payload of the same shape.
    fn with_data(&self, data: ArrayD<f64>) -> Field {
        debug_assert_eq!(data.shape(), self.data.shape());
        Field {
            name: self.name.clone(),
            units: self.units.clone(),
            dims: self.dims.clone(),
            coords: self.coords.clone(),
            data,
        }
    }

    /// Labels with `dim` removed, and a payload without that axis.
    pub(crate) fn without_dim(&self, dim: &str, data: ArrayD<f64>) -> Field {
        let dims: Vec<String> = self.dims.iter().filter(|d| *d != dim).cloned().collect();
        let coords = self
            .coords
            .iter()
            .filter(|(k, _)| *k != dim)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Field {
            name: self.name.clone(),
            units: self.units.clone(),
            dims,
            coords,
            data,
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Field {
        self.with_data(self.data.mapv(f))
    }

    /// Element-wise combination of two fields on the same grid.
    pub fn zip_with(&self, other: &Field, f: impl Fn(f64, f64) -> f64) -> Result<Field> {
        if self.dims != other.dims || self.shape() != other.shape() {
            return Err(TaylorError::Precondition(format!(
                "cannot combine '{}' {:?}{:?} with '{}' {:?}{:?}",
                self.name,
                self.dims,
                self.shape(),
                other.name,
                other.dims,
                other.shape()
            )));
        }
        let mut out = self.data.clone();
        Zip::from(&mut out).and(&other.data).for_each(|a, &b| *a = f(*a, b));
        Ok(self.with_data(out))
    }

    /// Set every cell whose mask value fails `keep` to NaN. The mask is
    /// aligned by dimension name; its dimensions must be a subset of this
    /// field's, and length-1 or absent mask axes broadcast.
    pub fn masked_where(&self, mask: &Field, keep: impl Fn(f64) -> bool) -> Result<Field> {
        let mut placement: Vec<(usize, usize)> = Vec::with_capacity(mask.dims.len());
        for (i, dim) in mask.dims.iter().enumerate() {
            let target = self.axis(dim).ok_or_else(|| {
                TaylorError::Precondition(format!(
                    "mask '{}' has dimension '{}' which field '{}' lacks",
                    mask.name, dim, self.name
                ))
            })?;
            placement.push((target, i));
        }
        placement.sort_unstable();

        let order: Vec<usize> = placement.iter().map(|&(_, i)| i).collect();
        let mut aligned = mask.data.view().permuted_axes(order);
        for (pos, dim) in self.dims.iter().enumerate() {
            if !mask.has_dim(dim) {
                aligned = aligned.insert_axis(Axis(pos));
            }
        }

        let broadcast = aligned.broadcast(self.data.raw_dim()).ok_or_else(|| {
            TaylorError::Precondition(format!(
                "mask '{}' with shape {:?} does not fit field '{}' with shape {:?}",
                mask.name,
                mask.shape(),
                self.name,
                self.shape()
            ))
        })?;

        let mut out = self.data.clone();
        Zip::from(&mut out).and(&broadcast).for_each(|v, &m| {
            if !keep(m) {
                *v = f64::NAN;
            }
        });
        Ok(self.with_data(out))
    }

    /// Keep the indices of `dim` whose coordinate lies in `[lo, hi]`.
    pub fn select_range(&self, dim: &str, lo: f64, hi: f64) -> Result<Field> {
        let axis = self.require_axis(dim)?;
        let values = self.coord(dim).ok_or_else(|| {
            TaylorError::Precondition(format!(
                "field '{}' has no coordinate values for '{}'",
                self.name, dim
            ))
        })?;
        let indices: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= lo && **v <= hi)
            .map(|(i, _)| i)
            .collect();
        Ok(self.take(axis, &indices))
    }

    fn take(&self, axis: usize, indices: &[usize]) -> Field {
        let data = self.data.select(Axis(axis), indices);
        let mut coords = self.coords.clone();
        if let Some(values) = coords.get_mut(&self.dims[axis]) {
            *values = indices.iter().map(|&i| values[i]).collect();
        }
        Field {
            name: self.name.clone(),
            units: self.units.clone(),
            dims: self.dims.clone(),
            coords,
            data,
        }
    }

    /// Calendar month of every time step. Without a time coordinate the
    /// steps are taken to be months 1, 2, ...
    pub fn months(&self) -> Result<Vec<u32>> {
        let axis = self.require_axis("time")?;
        Ok(match self.coord("time") {
            Some(values) => values.iter().map(|v| v.round() as u32).collect(),
            None => (1..=self.data.len_of(Axis(axis)) as u32).collect(),
        })
    }

    pub fn select_months(&self, months: &[u32]) -> Result<Field> {
        let axis = self.require_axis("time")?;
        let indices: Vec<usize> = self
            .months()?
            .iter()
            .enumerate()
            .filter(|(_, m)| months.contains(m))
            .map(|(i, _)| i)
            .collect();
        Ok(self.take(axis, &indices))
    }

    /// Mean along `dim`, ignoring NaN cells; the dimension is dropped.
    pub fn mean_over(&self, dim: &str) -> Result<Field> {
        let axis = self.require_axis(dim)?;
        let data = self.data.map_axis(Axis(axis), nanmean);
        Ok(self.without_dim(dim, data))
    }

    /// Temporal mean over the months of `season`.
    pub fn season_mean(&self, season: Season) -> Result<Field> {
        let selected = self.select_months(season.months())?;
        if selected.data.len_of(Axis(selected.require_axis("time")?)) == 0 {
            return Err(TaylorError::Precondition(format!(
                "field '{}' has no time steps in {}",
                self.name, season
            )));
        }
        selected.mean_over("time")
    }

    /// Join fields that share all labels except `dim` along `dim`.
    pub fn concat(fields: &[Field], dim: &str) -> Result<Field> {
        let first = fields
            .first()
            .ok_or_else(|| TaylorError::Precondition("nothing to concatenate".to_string()))?;
        let axis = first.require_axis(dim)?;

        for other in &fields[1..] {
            if other.dims != first.dims {
                return Err(TaylorError::Precondition(format!(
                    "cannot concatenate '{}' with dimensions {:?} and {:?}",
                    first.name, first.dims, other.dims
                )));
            }
        }

        let views: Vec<_> = fields.iter().map(|f| f.data.view()).collect();
        let data = ndarray::concatenate(Axis(axis), &views).map_err(|e| {
            TaylorError::Precondition(format!("cannot concatenate '{}' along {}: {}", first.name, dim, e))
        })?;

        let mut coords = first.coords.clone();
        if fields.iter().all(|f| f.coords.contains_key(dim)) {
            let joined: Vec<f64> = fields.iter().flat_map(|f| f.coords[dim].iter().copied()).collect();
            coords.insert(dim.to_string(), joined);
        } else {
            coords.remove(dim);
        }

        Field::new(&first.name, first.units.clone(), first.dims.clone(), coords, data)
    }
}

pub(crate) fn nanmean(values: ArrayView1<f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in values.iter() {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monthly(values_per_month: impl Fn(usize) -> f64) -> Field {
        let lat = vec![-30.0, -10.0, 10.0, 30.0];
        let lon = vec![0.0, 120.0, 240.0];
        let time: Vec<f64> = (1..=12).map(f64::from).collect();
        let values = (0..12 * 12).map(|i| values_per_month(i / 12)).collect();
        Field::from_parts("PSL", &["time", "lat", "lon"], vec![time, lat, lon], values).unwrap()
    }

    #[test]
    fn test_season_mean_uses_season_months() {
        // value = month number
        let field = monthly(|t| (t + 1) as f64);
        let djf = field.season_mean(Season::Djf).unwrap();
        assert_eq!(djf.dims(), &["lat".to_string(), "lon".to_string()]);
        for v in djf.data().iter() {
            assert!((v - 5.0).abs() < 1e-12); // (12 + 1 + 2) / 3
        }

        let ann = field.season_mean(Season::Ann).unwrap();
        assert!((ann.data()[[0, 0]] - 6.5).abs() < 1e-12);
    }

    #[test]
    fn test_season_mean_skips_nan() {
        let field = monthly(|t| if t == 5 { f64::NAN } else { 3.0 });
        let jja = field.season_mean(Season::Jja).unwrap();
        assert!(jja.data().iter().all(|v| (*v - 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_season_mean_without_time_fails() {
        let field = Field::from_parts("x", &["lat"], vec![vec![0.0]], vec![1.0]).unwrap();
        assert!(matches!(
            field.season_mean(Season::Ann),
            Err(TaylorError::Precondition(_))
        ));
    }

    #[test]
    fn test_select_range_is_inclusive() {
        let field = Field::from_parts(
            "TAUX",
            &["lat", "lon"],
            vec![vec![-10.0, -5.0, 0.0, 5.0, 10.0], vec![0.0]],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        let band = field.select_range("lat", -5.0, 5.0).unwrap();
        assert_eq!(band.shape(), &[3, 1]);
        assert_eq!(band.coord("lat").unwrap(), &[-5.0, 0.0, 5.0]);
        assert_eq!(band.data().iter().copied().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_masked_where_broadcasts_by_name() {
        let field = monthly(|_| 1.0);
        // Mask given as (lon, lat): only the first longitude is land.
        let mask = Field::from_parts(
            "LANDFRAC",
            &["lon", "lat"],
            vec![vec![0.0, 120.0, 240.0], vec![-30.0, -10.0, 10.0, 30.0]],
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5],
        )
        .unwrap();
        let land = field.masked_where(&mask, |f| f >= 0.95).unwrap();
        for t in 0..12 {
            for j in 0..4 {
                assert_eq!(land.data()[[t, j, 0]], 1.0);
                assert!(land.data()[[t, j, 1]].is_nan());
                assert!(land.data()[[t, j, 2]].is_nan());
            }
        }
    }

    #[test]
    fn test_masked_where_rejects_foreign_dims() {
        let field = Field::from_parts("x", &["lat"], vec![vec![0.0, 1.0]], vec![1.0, 2.0]).unwrap();
        let mask = Field::from_parts("m", &["lev"], vec![vec![0.0, 1.0]], vec![1.0, 1.0]).unwrap();
        assert!(field.masked_where(&mask, |m| m > 0.5).is_err());
    }

    #[test]
    fn test_concat_along_time() {
        let a = Field::from_parts("T", &["time", "lat"], vec![vec![1.0], vec![0.0, 1.0]], vec![1.0, 2.0]).unwrap();
        let b = Field::from_parts("T", &["time", "lat"], vec![vec![2.0], vec![0.0, 1.0]], vec![3.0, 4.0]).unwrap();
        let joined = Field::concat(&[a, b], "time").unwrap();
        assert_eq!(joined.shape(), &[2, 2]);
        assert_eq!(joined.months().unwrap(), vec![1, 2]);
        assert_eq!(joined.data()[[1, 0]], 3.0);
    }

    #[test]
    fn test_zip_with_requires_same_grid() {
        let a = Field::from_parts("PRECC", &["lat"], vec![vec![0.0, 1.0]], vec![1.0, 2.0]).unwrap();
        let b = Field::from_parts("PRECL", &["lat"], vec![vec![0.0, 1.0]], vec![0.5, 0.5]).unwrap();
        let sum = a.zip_with(&b, |x, y| x + y).unwrap();
        assert_eq!(sum.data().iter().copied().collect::<Vec<_>>(), vec![1.5, 2.5]);

        let c = Field::from_parts("PRECL", &["lat"], vec![vec![0.0]], vec![0.5]).unwrap();
        assert!(a.zip_with(&c, |x, y| x + y).is_err());
    }
}
