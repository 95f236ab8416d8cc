use crate::error::{Result, TaylorError};
use crate::field::Field;
use crate::metadata::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use ndarray::{ArrayD, IxDyn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single climatology source on disk (a Zarr v2 directory store).
pub struct ZarrStore {
    path: PathBuf,
}

impl ZarrStore {
    /// Create a new ZarrStore from a directory path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(TaylorError::NotFound(format!(
                "store path does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(TaylorError::Store(format!(
                "store path is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load metadata from the store, attempting consolidated read first
    pub fn load_metadata(&self) -> Result<ZarrMetadata> {
        match self.load_consolidated_metadata() {
            Ok(metadata) => {
                debug!(store = %self.path.display(), "loaded consolidated metadata");
                Ok(metadata)
            }
            Err(e) => {
                debug!(store = %self.path.display(), "consolidated metadata unavailable ({}), scanning arrays", e);
                self.load_hierarchical_metadata()
            }
        }
    }

    /// Attempt to load consolidated metadata from .zmetadata file
    fn load_consolidated_metadata(&self) -> Result<ZarrMetadata> {
        let zmetadata_path = self.path.join(".zmetadata");
        let data = fs::read(&zmetadata_path).map_err(|e| TaylorError::io(&zmetadata_path, e))?;

        let consolidated: ConsolidatedMetadata = serde_json::from_slice(&data).map_err(|e| {
            TaylorError::Store(format!(
                "invalid consolidated metadata JSON at '{}': {}",
                zmetadata_path.display(),
                e
            ))
        })?;

        let mut metadata = ZarrMetadata::new();
        for (key, value) in &consolidated.metadata {
            if key == ".zattrs" {
                metadata.global_attributes = serde_json::from_value(value.clone()).unwrap_or_default();
            } else if let Some(path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone()).map_err(|e| {
                    TaylorError::Store(format!("failed to parse .zarray for {}: {}", path, e))
                })?;

                let attributes = consolidated
                    .metadata
                    .get(&format!("{}/.zattrs", path))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();

                let variable = variable_from_zarray(path, zarray, attributes);
                metadata.variables.insert(path.to_string(), variable);
            }
        }

        metadata.infer_dimensions();
        Ok(metadata)
    }

    /// Load metadata by scanning the store for .zarray/.zattrs files
    fn load_hierarchical_metadata(&self) -> Result<ZarrMetadata> {
        let mut metadata = ZarrMetadata::new();

        self.scan_directory(&mut metadata, "", &self.path)?;

        if let Ok(attrs_data) = fs::read(self.path.join(".zattrs")) {
            metadata.global_attributes = serde_json::from_slice(&attrs_data).unwrap_or_default();
        }

        if metadata.variables.is_empty() {
            return Err(TaylorError::Store(format!(
                "no Zarr arrays found in '{}'. The directory must contain .zarray or .zmetadata files to be a valid Zarr store.",
                self.path.display()
            )));
        }

        metadata.infer_dimensions();
        Ok(metadata)
    }

    /// Recursively scan directory for array metadata
    fn scan_directory(&self, metadata: &mut ZarrMetadata, current_path: &str, fs_path: &Path) -> Result<()> {
        let entries = fs::read_dir(fs_path).map_err(|e| TaylorError::io(fs_path, e))?;

        let mut has_zarray = false;
        let mut children = Vec::new();

        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            match filename.as_str() {
                ".zarray" => has_zarray = true,
                name if !name.starts_with('.') && entry.path().is_dir() => {
                    children.push(name.to_string());
                }
                _ => {}
            }
        }

        if has_zarray {
            self.load_array_metadata(metadata, current_path)?;
            // Chunk directories of nested-separator arrays are not groups.
            return Ok(());
        }

        for child in children {
            let child_path = if current_path.is_empty() {
                child.clone()
            } else {
                format!("{}/{}", current_path, child)
            };
            self.scan_directory(metadata, &child_path, &fs_path.join(&child))?;
        }

        Ok(())
    }

    /// Load array metadata from .zarray and .zattrs files
    fn load_array_metadata(&self, metadata: &mut ZarrMetadata, path: &str) -> Result<()> {
        let array_dir = self.array_dir(path);
        let zarray_path = array_dir.join(".zarray");

        let array_data = fs::read(&zarray_path).map_err(|e| TaylorError::io(&zarray_path, e))?;
        let zarray: ZArrayMetadata = serde_json::from_slice(&array_data).map_err(|e| {
            TaylorError::Store(format!(
                "invalid .zarray JSON for variable '{}' at '{}': {}",
                path,
                zarray_path.display(),
                e
            ))
        })?;

        // .zattrs is optional
        let attributes = match fs::read(array_dir.join(".zattrs")) {
            Ok(attrs_data) => {
                serde_json::from_slice::<HashMap<String, AttributeValue>>(&attrs_data).unwrap_or_default()
            }
            Err(_) => HashMap::new(),
        };

        let variable = variable_from_zarray(path, zarray, attributes);
        metadata.variables.insert(path.to_string(), variable);
        Ok(())
    }

    fn array_dir(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.path.clone()
        } else {
            self.path.join(path)
        }
    }

    /// Read a whole array as `f64`, trying the zarrs crate first (handles
    /// compressed chunks) and falling back to decoding raw chunk files.
    pub fn read_variable_f64(&self, variable: &Variable) -> Result<Vec<f64>> {
        match self.read_with_zarrs(variable) {
            Ok(data) => Ok(data),
            Err(e) => {
                debug!(variable = %variable.name, "zarrs read failed ({}), decoding raw chunks", e);
                self.read_uncompressed_chunks(variable)
            }
        }
    }

    /// Read a variable into a labeled field. Fill and missing values become
    /// NaN, and coordinate values are attached for every dimension that has a
    /// 1-D array of the same name in the store.
    pub fn read_field(&self, metadata: &ZarrMetadata, name: &str) -> Result<Field> {
        let variable = metadata.variable(name).ok_or_else(|| {
            TaylorError::NotFound(format!(
                "variable '{}' not found in '{}'",
                name,
                self.path.display()
            ))
        })?;

        let mut values = self.read_variable_f64(variable)?;
        let missing = variable.missing_values();
        if !missing.is_empty() {
            for v in values.iter_mut() {
                if missing.contains(v) {
                    *v = f64::NAN;
                }
            }
        }

        let shape: Vec<usize> = variable.shape.iter().map(|&s| s as usize).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            TaylorError::Store(format!("variable '{}' has inconsistent shape: {}", name, e))
        })?;

        let dims = variable.dimension_names();
        let mut coords = BTreeMap::new();
        for dim in &dims {
            if dim == &variable.name {
                continue;
            }
            if let Some(coord_var) = metadata.variable(dim) {
                if coord_var.shape.len() == 1 && coord_var.is_numeric() {
                    coords.insert(dim.clone(), self.read_variable_f64(coord_var)?);
                }
            }
        }
        if dims.len() == 1 && dims[0] == variable.name {
            coords.insert(dims[0].clone(), data.iter().copied().collect());
        }

        Field::new(&variable.name, variable.units().map(str::to_string), dims, coords, data)
    }

    /// Read array data using the zarrs crate with proper compression support
    fn read_with_zarrs(&self, variable: &Variable) -> Result<Vec<f64>> {
        use zarrs::array::Array;
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| TaylorError::Store(format!("failed to create zarrs FilesystemStore: {}", e)))?;

        let array_path = if variable.path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", variable.path)
        };

        let array = Array::open(std::sync::Arc::new(store), &array_path)
            .map_err(|e| TaylorError::Store(format!("failed to open array '{}': {}", array_path, e)))?;

        let array_subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let array_bytes = array
            .retrieve_array_subset(&array_subset)
            .map_err(|e| TaylorError::Store(format!("failed to read array data: {}", e)))?;

        let bytes: &[u8] = match &array_bytes {
            zarrs::array::ArrayBytes::Variable(data, _offsets) => data.as_ref(),
            zarrs::array::ArrayBytes::Fixed(data) => data.as_ref(),
        };

        // zarrs hands back elements in native byte order.
        let native = native_dtype(&variable.dtype);
        decode_values(bytes, &native)
    }

    /// Assemble an uncompressed C-order array from its chunk files. Missing
    /// chunks take the array fill value.
    fn read_uncompressed_chunks(&self, variable: &Variable) -> Result<Vec<f64>> {
        if let Some(compressor) = &variable.compressor {
            return Err(TaylorError::Store(format!(
                "variable '{}' uses compression ('{}'), which could not be handled by the zarrs crate",
                variable.name, compressor
            )));
        }
        if !variable.filters.is_empty() {
            return Err(TaylorError::Store(format!(
                "variable '{}' uses filters ({}), which are only supported through the zarrs crate",
                variable.name,
                variable.filters.join(", ")
            )));
        }
        if variable.order != "C" {
            return Err(TaylorError::Store(format!(
                "variable '{}' has order='{}'; only C-order chunks can be decoded",
                variable.name, variable.order
            )));
        }

        let array_dir = self.array_dir(&variable.path);
        let shape: Vec<usize> = variable.shape.iter().map(|&s| s as usize).collect();
        let total: usize = shape.iter().product();
        let fill = variable
            .fill_value
            .as_ref()
            .and_then(AttributeValue::as_f64)
            .unwrap_or(f64::NAN);
        let mut out = vec![fill; total];

        // A 0-d array is stored as the single chunk "0".
        if shape.is_empty() {
            let chunk_path = array_dir.join("0");
            if chunk_path.exists() {
                let bytes = fs::read(&chunk_path).map_err(|e| TaylorError::io(&chunk_path, e))?;
                let values = decode_values(&bytes, &variable.dtype)?;
                if let Some(v) = values.first() {
                    out[0] = *v;
                }
            }
            return Ok(out);
        }

        let chunk_shape: Vec<usize> = variable.chunks.iter().map(|&c| (c as usize).max(1)).collect();
        if chunk_shape.len() != shape.len() {
            return Err(TaylorError::Store(format!(
                "variable '{}' has {} chunk dimensions for {} array dimensions",
                variable.name,
                chunk_shape.len(),
                shape.len()
            )));
        }

        let grid: Vec<usize> = shape
            .iter()
            .zip(&chunk_shape)
            .map(|(&s, &c)| s.div_ceil(c))
            .collect();
        let array_strides = c_strides(&shape);
        let chunk_strides = c_strides(&chunk_shape);
        let chunk_len: usize = chunk_shape.iter().product();

        for chunk_index in MultiIndex::new(&grid) {
            let key = chunk_index
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(&variable.dimension_separator);
            let chunk_path = array_dir.join(&key);
            if !chunk_path.exists() {
                continue;
            }

            let bytes = fs::read(&chunk_path).map_err(|e| TaylorError::io(&chunk_path, e))?;
            let values = decode_values(&bytes, &variable.dtype)?;
            if values.len() < chunk_len {
                return Err(TaylorError::Store(format!(
                    "chunk '{}' of variable '{}' holds {} values, expected {}",
                    key,
                    variable.name,
                    values.len(),
                    chunk_len
                )));
            }

            for local in MultiIndex::new(&chunk_shape) {
                let mut global_offset = 0;
                let mut inside = true;
                for d in 0..shape.len() {
                    let g = chunk_index[d] * chunk_shape[d] + local[d];
                    if g >= shape[d] {
                        inside = false;
                        break;
                    }
                    global_offset += g * array_strides[d];
                }
                if inside {
                    let local_offset: usize = local.iter().zip(&chunk_strides).map(|(i, s)| i * s).sum();
                    out[global_offset] = values[local_offset];
                }
            }
        }

        Ok(out)
    }
}

fn variable_from_zarray(
    path: &str,
    zarray: ZArrayMetadata,
    attributes: HashMap<String, AttributeValue>,
) -> Variable {
    let variable_name = path.split('/').next_back().unwrap_or(path).to_string();

    let compressor = zarray
        .compressor
        .as_ref()
        .and_then(|c| c.get("id"))
        .and_then(|id| id.as_str())
        .map(|s| s.to_string());

    let filters = zarray
        .filters
        .as_ref()
        .map(|f| {
            f.iter()
                .filter_map(|filter| filter.get("id").and_then(|id| id.as_str().map(|s| s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let fill_value = zarray
        .fill_value
        .as_ref()
        .map(|fv| serde_json::from_value(fv.clone()).unwrap_or(AttributeValue::Null));

    Variable {
        name: variable_name,
        path: path.to_string(),
        dtype: zarray.dtype,
        shape: zarray.shape,
        chunks: zarray.chunks,
        compressor,
        fill_value,
        order: zarray.order,
        filters,
        dimension_separator: zarray.dimension_separator.unwrap_or_else(|| ".".to_string()),
        attributes,
        dimensions: vec![],
    }
}

/// Same dtype with the byte order replaced by the host's.
fn native_dtype(dtype: &str) -> String {
    let kind = dtype.trim_start_matches(['<', '>', '|', '=']);
    if cfg!(target_endian = "big") {
        format!(">{}", kind)
    } else {
        format!("<{}", kind)
    }
}

/// Decode a buffer of packed numeric elements described by a Zarr v2 dtype
/// string (for example `<f8`, `>i4`, `|u1`).
pub fn decode_values(bytes: &[u8], dtype: &str) -> Result<Vec<f64>> {
    if dtype.starts_with('>') {
        decode_with::<BigEndian>(bytes, dtype)
    } else {
        decode_with::<LittleEndian>(bytes, dtype)
    }
}

fn decode_with<B: ByteOrder>(bytes: &[u8], dtype: &str) -> Result<Vec<f64>> {
    let kind = dtype.trim_start_matches(['<', '>', '|', '=']);
    let mut reader = std::io::Cursor::new(bytes);
    let mut data = Vec::new();

    macro_rules! read_all {
        ($read:ident $(::<$order:ty>)?) => {
            while reader.position() < bytes.len() as u64 {
                match reader.$read$(::<$order>)?() {
                    Ok(val) => data.push(val as f64),
                    Err(_) => break,
                }
            }
        };
    }

    match kind {
        "f8" => read_all!(read_f64::<B>),
        "f4" => read_all!(read_f32::<B>),
        "i8" => read_all!(read_i64::<B>),
        "i4" => read_all!(read_i32::<B>),
        "i2" => read_all!(read_i16::<B>),
        "i1" => read_all!(read_i8),
        "u8" => read_all!(read_u64::<B>),
        "u4" => read_all!(read_u32::<B>),
        "u2" => read_all!(read_u16::<B>),
        "u1" => read_all!(read_u8),
        _ => {
            return Err(TaylorError::Store(format!("unsupported dtype for numeric data: {}", dtype)));
        }
    }

    Ok(data)
}

fn c_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    let mut stride = 1usize;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// Row-major iteration over every index of an N-d grid.
struct MultiIndex {
    extents: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl MultiIndex {
    fn new(extents: &[usize]) -> Self {
        let next = if extents.iter().all(|&e| e > 0) {
            Some(vec![0; extents.len()])
        } else {
            None
        };
        Self {
            extents: extents.to_vec(),
            next,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        let mut carried = true;
        for d in (0..following.len()).rev() {
            following[d] += 1;
            if following[d] < self.extents[d] {
                carried = false;
                break;
            }
            following[d] = 0;
        }
        if !carried {
            self.next = Some(following);
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use tempfile::TempDir;

    fn write_array(root: &Path, name: &str, zarray: &str, dims: &[&str], chunks: &[(&str, Vec<f64>)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".zarray"), zarray).unwrap();
        let attrs = serde_json::json!({ "_ARRAY_DIMENSIONS": dims, "units": "Pa" });
        fs::write(dir.join(".zattrs"), attrs.to_string()).unwrap();
        for (key, values) in chunks {
            let mut buf = Vec::new();
            for v in values {
                buf.write_f64::<LittleEndian>(*v).unwrap();
            }
            fs::write(dir.join(key), buf).unwrap();
        }
    }

    #[test]
    fn test_decode_values_endianness() {
        let mut le = Vec::new();
        le.write_i32::<LittleEndian>(-7).unwrap();
        le.write_i32::<LittleEndian>(12).unwrap();
        assert_eq!(decode_values(&le, "<i4").unwrap(), vec![-7.0, 12.0]);

        let mut be = Vec::new();
        be.write_f32::<BigEndian>(1.5).unwrap();
        assert_eq!(decode_values(&be, ">f4").unwrap(), vec![1.5]);

        assert!(decode_values(&le, "|S1").is_err());
    }

    #[test]
    fn test_multi_index_row_major() {
        let all: Vec<Vec<usize>> = MultiIndex::new(&[2, 3]).collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], vec![0, 0]);
        assert_eq!(all[1], vec![0, 1]);
        assert_eq!(all[5], vec![1, 2]);
        assert_eq!(MultiIndex::new(&[0, 3]).count(), 0);
    }

    #[test]
    fn test_read_field_from_partial_chunks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join(".zgroup"), r#"{"zarr_format": 2}"#).unwrap();

        // 3x2 array in 2x2 chunks; the second chunk row only has one valid row.
        let zarray = r#"{
            "zarr_format": 2, "shape": [3, 2], "chunks": [2, 2], "dtype": "<f8",
            "compressor": null, "fill_value": -999.0, "order": "C", "filters": null
        }"#;
        write_array(
            root,
            "PS",
            zarray,
            &["lat", "lon"],
            &[("0.0", vec![1.0, 2.0, 3.0, 4.0]), ("1.0", vec![5.0, -999.0, 0.0, 0.0])],
        );

        let lat_zarray = r#"{
            "zarr_format": 2, "shape": [3], "chunks": [3], "dtype": "<f8",
            "compressor": null, "fill_value": null, "order": "C", "filters": null
        }"#;
        write_array(root, "lat", lat_zarray, &["lat"], &[("0", vec![-10.0, 0.0, 10.0])]);

        let store = ZarrStore::new(root).unwrap();
        let metadata = store.load_metadata().unwrap();
        let field = store.read_field(&metadata, "PS").unwrap();

        assert_eq!(field.dims(), &["lat".to_string(), "lon".to_string()]);
        assert_eq!(field.shape(), &[3, 2]);
        assert_eq!(field.coord("lat").unwrap(), &[-10.0, 0.0, 10.0]);
        assert_eq!(field.units(), Some("Pa"));

        let values: Vec<f64> = field.data().iter().copied().collect();
        assert_eq!(&values[..5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(values[5].is_nan());
    }

    #[test]
    fn test_missing_variable_is_not_found() {
        let temp = TempDir::new().unwrap();
        let zarray = r#"{
            "zarr_format": 2, "shape": [1], "chunks": [1], "dtype": "<f8",
            "compressor": null, "fill_value": null, "order": "C", "filters": null
        }"#;
        write_array(temp.path(), "lat", zarray, &["lat"], &[("0", vec![0.0])]);

        let store = ZarrStore::new(temp.path()).unwrap();
        let metadata = store.load_metadata().unwrap();
        let err = store.read_field(&metadata, "LANDFRAC").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_directory_is_not_a_store() {
        let temp = TempDir::new().unwrap();
        let store = ZarrStore::new(temp.path()).unwrap();
        assert!(store.load_metadata().is_err());
    }
}
