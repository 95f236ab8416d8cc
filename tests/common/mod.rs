//! Synthetic climatology stores for integration tests.
//!
//! Every store is an uncompressed Zarr v2 group with one whole-array chunk
//! per variable. Case fields are a common spatial pattern multiplied by a
//! per-case scale, so a case at scale `s` against a reference at scale 1 has
//! correlation 1, ratio `s` and bias `100 * (s - 1)` percent.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::path::{Path, PathBuf};

pub const LAT: [f64; 6] = [-25.0, -5.0, 0.0, 5.0, 25.0, 45.0];
pub const LON: [f64; 4] = [0.0, 90.0, 180.0, 270.0];
pub const LEV: [f64; 4] = [100.0, 300.0, 500.0, 850.0];
pub const NTIME: usize = 12;

/// Surface variables written by [`write_case`], one store each.
pub const SURFACE_VARIABLES: [&str; 5] = ["PSL", "SWCF", "LWCF", "TREFHT", "TAUX"];
/// Model-level variables written by [`write_case`] with PS and coefficients.
pub const LEVEL_VARIABLES: [&str; 3] = ["U", "RELHUM", "T"];

/// One array to write into a store.
pub struct TestArray {
    pub name: String,
    pub dims: Vec<&'static str>,
    pub values: Vec<f64>,
    pub units: Option<&'static str>,
}

impl TestArray {
    pub fn new(name: &str, dims: &[&'static str], values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.to_vec(),
            values,
            units: None,
        }
    }

    pub fn with_units(mut self, units: &'static str) -> Self {
        self.units = Some(units);
        self
    }
}

/// What to put in the climatology directory of one case.
#[derive(Debug, Clone)]
pub struct CaseLayout {
    pub scale: f64,
    /// Write PRECT; otherwise PRECC and PRECL are written.
    pub prect: bool,
    /// Write a LANDFRAC climatology.
    pub landfrac: bool,
    /// Variables to leave out entirely.
    pub skip: Vec<&'static str>,
}

impl CaseLayout {
    pub fn scaled(scale: f64) -> Self {
        Self {
            scale,
            prect: true,
            landfrac: true,
            skip: Vec::new(),
        }
    }
}

pub fn dim_len(dim: &str) -> usize {
    match dim {
        "time" => NTIME,
        "lev" => LEV.len(),
        "lat" => LAT.len(),
        "lon" => LON.len(),
        other => panic!("unknown test dimension {}", other),
    }
}

fn coord_values(dim: &str) -> Vec<f64> {
    match dim {
        "time" => (1..=NTIME).map(|m| m as f64).collect(),
        "lev" => LEV.to_vec(),
        "lat" => LAT.to_vec(),
        "lon" => LON.to_vec(),
        other => panic!("unknown test dimension {}", other),
    }
}

fn write_array(root: &Path, array: &TestArray, shape: &[usize]) {
    let dir = root.join(&array.name);
    fs::create_dir_all(&dir).unwrap();

    let zarray = serde_json::json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": shape,
        "dtype": "<f8",
        "compressor": null,
        "fill_value": null,
        "order": "C",
        "filters": null,
    });
    fs::write(dir.join(".zarray"), zarray.to_string()).unwrap();

    let mut attrs = serde_json::json!({ "_ARRAY_DIMENSIONS": array.dims });
    if let Some(units) = array.units {
        attrs["units"] = serde_json::json!(units);
    }
    fs::write(dir.join(".zattrs"), attrs.to_string()).unwrap();

    let key = if shape.is_empty() {
        "0".to_string()
    } else {
        vec!["0"; shape.len()].join(".")
    };
    let mut buf = Vec::with_capacity(array.values.len() * 8);
    for v in &array.values {
        buf.write_f64::<LittleEndian>(*v).unwrap();
    }
    fs::write(dir.join(key), buf).unwrap();
}

/// Write a store holding `arrays` plus a coordinate array for every
/// dimension they use.
pub fn write_store(path: &Path, arrays: &[TestArray]) {
    fs::create_dir_all(path).unwrap();
    fs::write(path.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();

    let mut dims: Vec<&'static str> = Vec::new();
    for array in arrays {
        let shape: Vec<usize> = array.dims.iter().map(|d| dim_len(d)).collect();
        assert_eq!(
            shape.iter().product::<usize>(),
            array.values.len(),
            "wrong value count for {}",
            array.name
        );
        write_array(path, array, &shape);
        for &d in &array.dims {
            if !dims.contains(&d) {
                dims.push(d);
            }
        }
    }

    for dim in dims {
        let coord = TestArray::new(dim, &[dim], coord_values(dim));
        write_array(path, &coord, &[dim_len(dim)]);
    }
}

/// Positive, spatially varying pattern shared by every case.
pub fn pattern(t: usize, i: usize, j: usize) -> f64 {
    1.0 + ((i * 7 + j * 3) % 5) as f64 + 0.1 * t as f64
}

/// Land where `(i + j)` is even.
pub fn land_fraction(i: usize, j: usize) -> f64 {
    if (i + j) % 2 == 0 { 1.0 } else { 0.0 }
}

pub fn surface(scale: f64, offset: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(NTIME * LAT.len() * LON.len());
    for t in 0..NTIME {
        for i in 0..LAT.len() {
            for j in 0..LON.len() {
                values.push(scale * (offset + pattern(t, i, j)));
            }
        }
    }
    values
}

pub fn model_levels(scale: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(NTIME * LEV.len() * LAT.len() * LON.len());
    for t in 0..NTIME {
        for k in 0..LEV.len() {
            for i in 0..LAT.len() {
                for j in 0..LON.len() {
                    values.push(scale * pattern(t, i, j) * (1.0 + k as f64));
                }
            }
        }
    }
    values
}

pub fn land_mask_values() -> Vec<f64> {
    let mut values = Vec::with_capacity(LAT.len() * LON.len());
    for i in 0..LAT.len() {
        for j in 0..LON.len() {
            values.push(land_fraction(i, j));
        }
    }
    values
}

fn climo_store(dir: &Path, case: &str, variable: &str) -> PathBuf {
    dir.join(format!("{}_{}_climo.zarr", case, variable))
}

/// Write all climatology stores of one case into `dir`.
pub fn write_case(dir: &Path, case: &str, layout: &CaseLayout) {
    let s = layout.scale;
    let keep = |v: &str| !layout.skip.iter().any(|s| *s == v);
    let surface_dims = ["time", "lat", "lon"];

    for (n, &variable) in SURFACE_VARIABLES.iter().enumerate() {
        if keep(variable) {
            let array = TestArray::new(variable, &surface_dims, surface(s, 10.0 * n as f64));
            write_store(&climo_store(dir, case, variable), &[array]);
        }
    }

    if layout.prect {
        if keep("PRECT") {
            let array = TestArray::new("PRECT", &surface_dims, surface(s * 1e-8, 0.0)).with_units("m/s");
            write_store(&climo_store(dir, case, "PRECT"), &[array]);
        }
    } else {
        // Convective and large-scale parts in a fixed 1:3 split.
        let precc = TestArray::new("PRECC", &surface_dims, surface(0.25e-8 * s, 0.0)).with_units("m/s");
        let precl = TestArray::new("PRECL", &surface_dims, surface(0.75e-8 * s, 0.0)).with_units("m/s");
        write_store(&climo_store(dir, case, "PRECC"), &[precc]);
        write_store(&climo_store(dir, case, "PRECL"), &[precl]);
    }

    if layout.landfrac {
        let array = TestArray::new("LANDFRAC", &["lat", "lon"], land_mask_values());
        write_store(&climo_store(dir, case, "LANDFRAC"), &[array]);
    }

    for variable in LEVEL_VARIABLES {
        if keep(variable) {
            write_store(&climo_store(dir, case, variable), &level_arrays(variable, s));
        }
    }
}

/// A model-level variable with the surface pressure and hybrid coefficients
/// needed to put it on pressure levels (pure pressure levels at `LEV` hPa).
pub fn level_arrays(variable: &str, scale: f64) -> Vec<TestArray> {
    vec![
        TestArray::new(variable, &["time", "lev", "lat", "lon"], model_levels(scale)),
        TestArray::new("PS", &["time", "lat", "lon"], vec![1.0e5; NTIME * LAT.len() * LON.len()])
            .with_units("Pa"),
        TestArray::new("hyam", &["lev"], LEV.iter().map(|l| l / 1000.0).collect()),
        TestArray::new("hybm", &["lev"], vec![0.0; LEV.len()]),
    ]
}

/// A history store holding LANDFRAC with a single time step.
pub fn write_history_landfrac(path: &Path) {
    fs::create_dir_all(path).unwrap();
    fs::write(path.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();
    let array = TestArray::new("LANDFRAC", &["time", "lat", "lon"], land_mask_values());
    write_array(path, &array, &[1, LAT.len(), LON.len()]);
    write_array(path, &TestArray::new("time", &["time"], vec![1.0]), &[1]);
    write_array(path, &TestArray::new("lat", &["lat"], LAT.to_vec()), &[LAT.len()]);
    write_array(path, &TestArray::new("lon", &["lon"], LON.to_vec()), &[LON.len()]);
}

/// Configuration JSON for a baseline comparison.
pub fn config_json(
    cases: &[(&str, &Path, Option<&Path>)],
    baseline: (&str, &Path),
    plot_location: &Path,
    plot_type: &str,
) -> String {
    let cases: Vec<serde_json::Value> = cases
        .iter()
        .map(|(name, climo, hist)| {
            serde_json::json!({
                "name": name,
                "climo_loc": climo,
                "hist_loc": hist,
            })
        })
        .collect();
    serde_json::json!({
        "cases": cases,
        "baseline": { "name": baseline.0, "climo_loc": baseline.1 },
        "plot_location": plot_location,
        "plot_type": plot_type,
    })
    .to_string()
}
