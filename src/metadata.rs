use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named axis of a Zarr array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: u64,
}

/// Represents an attribute in Zarr metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Array(Vec<AttributeValue>),
    Object(HashMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of a scalar attribute. The strings written by xarray and
    /// zarr for non-finite fill values ("NaN", "Infinity") are accepted too.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::String(s) => match s.as_str() {
                "NaN" | "nan" => Some(f64::NAN),
                "Infinity" | "inf" => Some(f64::INFINITY),
                "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Represents a Zarr variable/array
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub path: String,
    pub dtype: String,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub compressor: Option<String>,
    pub fill_value: Option<AttributeValue>,
    pub order: String,
    pub filters: Vec<String>,
    pub dimension_separator: String,
    pub attributes: HashMap<String, AttributeValue>,
    pub dimensions: Vec<Dimension>,
}

impl Variable {
    pub fn attr_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn units(&self) -> Option<&str> {
        self.attr_string("units")
    }

    pub fn dimension_names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name.clone()).collect()
    }

    /// Values that mark invalid cells: `_FillValue`, `missing_value` and the
    /// array-level fill value. NaN entries are dropped since NaN is already
    /// the in-memory sentinel.
    pub fn missing_values(&self) -> Vec<f64> {
        let mut out: Vec<f64> = Vec::new();

        if let Some(v) = self.attributes.get("_FillValue") {
            push_missing_values_attr(&mut out, v);
        }

        if let Some(v) = self.attributes.get("missing_value") {
            push_missing_values_attr(&mut out, v);
        }

        if let Some(v) = &self.fill_value {
            push_missing_values_attr(&mut out, v);
        }

        out.retain(|v| !v.is_nan());
        out.sort_by(|a, b| a.total_cmp(b));
        out.dedup();
        out
    }

    /// True for dtypes that can be decoded into `f64`.
    pub fn is_numeric(&self) -> bool {
        let kind = self.dtype.trim_start_matches(['<', '>', '|', '=']);
        matches!(kind.chars().next(), Some('f' | 'i' | 'u'))
    }
}

fn push_missing_values_attr(out: &mut Vec<f64>, value: &AttributeValue) {
    match value {
        AttributeValue::Array(values) => {
            for v in values {
                push_missing_values_attr(out, v);
            }
        }
        other => {
            if let Some(v) = other.as_f64() {
                out.push(v);
            }
        }
    }
}

/// Root metadata structure for a climatology store
#[derive(Debug, Default)]
pub struct ZarrMetadata {
    pub zarr_format: u8,
    pub global_attributes: HashMap<String, AttributeValue>,
    pub variables: HashMap<String, Variable>,
}

impl ZarrMetadata {
    pub fn new() -> Self {
        Self {
            zarr_format: 2,
            ..Self::default()
        }
    }

    /// Name every variable axis from `_ARRAY_DIMENSIONS` (or `dim_N` when the
    /// attribute is absent).
    pub fn infer_dimensions(&mut self) {
        for variable in self.variables.values_mut() {
            let dim_names = extract_dimension_names(variable);
            variable.dimensions = variable
                .shape
                .iter()
                .enumerate()
                .map(|(i, &size)| Dimension {
                    name: dim_names
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("dim_{}", i)),
                    size,
                })
                .collect();
        }
    }

    /// Look up a variable by its name within the store.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables
            .get(name)
            .or_else(|| self.variables.values().find(|v| v.name == name))
    }

    /// Sorted names of all arrays that can be read as numbers.
    pub fn numeric_variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .variables
            .values()
            .filter(|v| v.is_numeric())
            .map(|v| v.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Extract dimension names from _ARRAY_DIMENSIONS attribute or generate defaults
pub fn extract_dimension_names(variable: &Variable) -> Vec<String> {
    if let Some(AttributeValue::Array(dims)) = variable.attributes.get("_ARRAY_DIMENSIONS") {
        dims.iter()
            .filter_map(|val| val.as_str().map(str::to_string))
            .collect()
    } else {
        (0..variable.shape.len())
            .map(|i| format!("dim_{}", i))
            .collect()
    }
}

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub dimension_separator: Option<String>,
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: HashMap<String, serde_json::Value>,
}
