use crate::error::{Result, TaylorError};
use crate::field::Field;
use crate::store::ZarrStore;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// True when a store name matches `{casename}*_{VARIABLE}_*`.
pub fn source_matches(file_name: &str, casename: &str, variable: &str) -> bool {
    file_name
        .strip_prefix(casename)
        .is_some_and(|rest| rest.contains(&format!("_{}_", variable)))
}

/// Climatology stores under `location` holding `variable` for `casename`,
/// sorted by path.
pub fn find_sources(location: &Path, casename: &str, variable: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(location) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TaylorError::io(location, e)),
    };

    let mut sources: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            !name.starts_with('.') && source_matches(&name, casename, variable)
        })
        .map(|entry| entry.path())
        .collect();
    sources.sort();
    Ok(sources)
}

fn require_sources(location: &Path, casename: &str, variable: &str) -> Result<Vec<PathBuf>> {
    let sources = find_sources(location, casename, variable)?;
    if sources.is_empty() {
        return Err(TaylorError::NotFound(format!(
            "no climatology source for {} of case '{}' in '{}'",
            variable,
            casename,
            location.display()
        )));
    }
    Ok(sources)
}

/// Load one variable for a case. Several matching sources are concatenated
/// along time.
pub fn load(casename: &str, location: &Path, variable: &str) -> Result<Field> {
    let sources = require_sources(location, casename, variable)?;
    debug!(case = casename, variable, sources = sources.len(), "loading field");

    let mut fields = Vec::with_capacity(sources.len());
    for path in &sources {
        let store = ZarrStore::new(path)?;
        let metadata = store.load_metadata()?;
        fields.push(store.read_field(&metadata, variable)?);
    }

    if fields.len() == 1 {
        Ok(fields.remove(0))
    } else {
        Field::concat(&fields, "time")
    }
}

/// Load every numeric variable of the sources holding `variable`.
pub fn load_dataset(casename: &str, location: &Path, variable: &str) -> Result<Dataset> {
    let sources = require_sources(location, casename, variable)?;
    debug!(case = casename, variable, sources = sources.len(), "loading dataset");

    let mut per_source: Vec<BTreeMap<String, Field>> = Vec::with_capacity(sources.len());
    for path in &sources {
        let store = ZarrStore::new(path)?;
        let metadata = store.load_metadata()?;
        let mut fields = BTreeMap::new();
        for name in metadata.numeric_variable_names() {
            let field = store.read_field(&metadata, &name)?;
            fields.insert(name, field);
        }
        per_source.push(fields);
    }

    let mut merged = BTreeMap::new();
    let Some(first) = per_source.first() else {
        return Ok(Dataset { sources, fields: merged });
    };
    for (name, field) in first {
        if per_source.len() > 1 && field.has_dim("time") {
            let parts: Vec<Field> = per_source
                .iter()
                .map(|fields| {
                    fields.get(name).cloned().ok_or_else(|| {
                        TaylorError::Precondition(format!(
                            "variable '{}' is missing from some sources of case '{}'",
                            name, casename
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            merged.insert(name.clone(), Field::concat(&parts, "time")?);
        } else {
            merged.insert(name.clone(), field.clone());
        }
    }

    Ok(Dataset { sources, fields: merged })
}

/// All fields of one resolved source, keyed by variable name.
#[derive(Debug, Clone)]
pub struct Dataset {
    sources: Vec<PathBuf>,
    fields: BTreeMap<String, Field>,
}

impl Dataset {
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Result<&Field> {
        self.fields.get(name).ok_or_else(|| {
            TaylorError::NotFound(format!(
                "variable '{}' not present in {}",
                name,
                self.sources
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_matches_pattern() {
        assert!(source_matches("c1_PSL_climo.zarr", "c1", "PSL"));
        assert!(source_matches("c1.cam.h0_PSL_1990-2000_climo.zarr", "c1", "PSL"));
        assert!(!source_matches("c1_PSLX_climo.zarr", "c1", "PSL"));
        assert!(!source_matches("c2_PSL_climo.zarr", "c1", "PSL"));
        assert!(!source_matches("xc1_PSL_climo.zarr", "c1", "PSL"));
        // The variable has to follow the case name.
        assert!(!source_matches("c1_PSL", "c1_PSL", "PSL"));
    }

    #[test]
    fn test_find_sources_sorted() {
        let temp = TempDir::new().unwrap();
        for name in ["c1_T_b.zarr", "c1_T_a.zarr", "c1_PS_a.zarr", "c2_T_a.zarr"] {
            fs::create_dir(temp.path().join(name)).unwrap();
        }
        let found = find_sources(temp.path(), "c1", "T").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["c1_T_a.zarr", "c1_T_b.zarr"]);
    }

    fn write_array(store: &Path, name: &str, dims: &[&str], values: &[f64]) {
        use byteorder::{LittleEndian, WriteBytesExt};

        let dir = store.join(name);
        fs::create_dir_all(&dir).unwrap();
        let shape: Vec<usize> = match dims.len() {
            1 => vec![values.len()],
            _ => vec![values.len() / 2, 2],
        };
        let zarray = serde_json::json!({
            "zarr_format": 2, "shape": shape, "chunks": shape, "dtype": "<f8",
            "compressor": null, "fill_value": null, "order": "C", "filters": null
        });
        fs::write(dir.join(".zarray"), zarray.to_string()).unwrap();
        fs::write(dir.join(".zattrs"), serde_json::json!({ "_ARRAY_DIMENSIONS": dims }).to_string()).unwrap();

        let mut buf = Vec::new();
        for v in values {
            buf.write_f64::<LittleEndian>(*v).unwrap();
        }
        let key = vec!["0"; shape.len()].join(".");
        fs::write(dir.join(key), buf).unwrap();
    }

    fn write_source(path: &Path, months: &[f64], hyam: &[f64]) {
        fs::create_dir_all(path).unwrap();
        fs::write(path.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();
        let t: Vec<f64> = months.iter().flat_map(|m| [*m * 10.0, *m * 10.0 + 1.0]).collect();
        write_array(path, "T", &["time", "lat"], &t);
        write_array(path, "time", &["time"], months);
        write_array(path, "lat", &["lat"], &[-10.0, 10.0]);
        write_array(path, "hyam", &["lev"], hyam);
    }

    #[test]
    fn test_load_dataset_joins_sources_along_time() {
        let temp = TempDir::new().unwrap();
        write_source(&temp.path().join("c1_T_a.zarr"), &[1.0, 2.0], &[0.1, 0.2]);
        write_source(&temp.path().join("c1_T_b.zarr"), &[3.0], &[0.9, 0.9]);

        let ds = load_dataset("c1", temp.path(), "T").unwrap();
        assert_eq!(ds.sources().len(), 2);
        let names: Vec<&str> = ds.names().collect();
        assert_eq!(names, vec!["T", "hyam", "lat", "time"]);
        assert!(ds.contains("hyam"));
        assert!(!ds.contains("P0"));

        let t = ds.get("T").unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.coord("time").unwrap(), &[1.0, 2.0, 3.0][..]);
        assert_eq!(t.data().iter().copied().collect::<Vec<_>>(), vec![10.0, 11.0, 20.0, 21.0, 30.0, 31.0]);

        // Time-invariant variables come from the first source.
        let hyam: Vec<f64> = ds.get("hyam").unwrap().data().iter().copied().collect();
        assert_eq!(hyam, vec![0.1, 0.2]);

        let err = ds.get("P0").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("c1_T_b.zarr"));
    }

    #[test]
    fn test_load_without_sources_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = load("c1", temp.path(), "PSL").unwrap_err();
        assert!(err.is_not_found());

        let missing_dir = temp.path().join("nope");
        assert!(load("c1", &missing_dir, "PSL").unwrap_err().is_not_found());
    }
}
