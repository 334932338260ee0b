use std::path::Path;

use candle_core::{Device, Tensor};
use tracing::debug;

use super::edges::AdjacencyDict;
use super::pickle::{self, Object, PickleError, Value};
use crate::error::{PlanetoidError, Result};

/// The six feature/label blocks of a Planetoid dataset, each densified into an
/// `f32` CPU tensor of shape `[rows, cols]`.
#[derive(Debug, Clone)]
pub struct RawBlocks {
    pub x: Tensor,
    pub tx: Tensor,
    pub allx: Tensor,
    pub y: Tensor,
    pub ty: Tensor,
    pub ally: Tensor,
}

impl RawBlocks {
    /// Reads `ind.{prefix}.{x,tx,allx,y,ty,ally}` from `folder`.
    pub fn read<P: AsRef<Path>>(folder: P, prefix: &str) -> Result<Self> {
        let folder = folder.as_ref();
        let read = |item: &str| read_matrix(folder.join(format!("ind.{prefix}.{item}")));
        let blocks = Self {
            x: read("x")?,
            tx: read("tx")?,
            allx: read("allx")?,
            y: read("y")?,
            ty: read("ty")?,
            ally: read("ally")?,
        };
        blocks.validate()?;
        Ok(blocks)
    }

    pub fn num_features(&self) -> Result<usize> {
        Ok(self.allx.dims2()?.1)
    }
    pub fn num_label_columns(&self) -> Result<usize> {
        Ok(self.ally.dims2()?.1)
    }

    pub fn validate(&self) -> Result<()> {
        let mismatch = |what: String, a: usize, b: usize| {
            PlanetoidError::ShapeMismatch(format!("{what}: {a} != {b}"))
        };
        let (allx_rows, num_features) = self.allx.dims2()?;
        let (ally_rows, num_labels) = self.ally.dims2()?;
        for (name, m) in [("x", &self.x), ("tx", &self.tx)] {
            let cols = m.dims2()?.1;
            if cols != num_features {
                return Err(mismatch(
                    format!("feature width of {name} vs allx"),
                    cols,
                    num_features,
                ));
            }
        }
        for (name, m) in [("y", &self.y), ("ty", &self.ty)] {
            let cols = m.dims2()?.1;
            if cols != num_labels {
                return Err(mismatch(
                    format!("label width of {name} vs ally"),
                    cols,
                    num_labels,
                ));
            }
        }
        let (tx_rows, ty_rows) = (self.tx.dims2()?.0, self.ty.dims2()?.0);
        if tx_rows != ty_rows {
            return Err(mismatch("rows of tx vs ty".to_owned(), tx_rows, ty_rows));
        }
        if allx_rows != ally_rows {
            return Err(mismatch("rows of allx vs ally".to_owned(), allx_rows, ally_rows));
        }
        Ok(())
    }
}

pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Tensor> {
    let path = path.as_ref();
    let matrix = matrix_from_value(&pickle::from_path(path)?)?;
    debug!(
        "read {:?}: {:?}",
        path.file_name().unwrap_or_default(),
        matrix.shape()
    );
    Ok(matrix)
}

pub fn read_adjacency<P: AsRef<Path>>(path: P) -> Result<AdjacencyDict> {
    let path = path.as_ref();
    let adjacency = adjacency_from_value(&pickle::from_path(path)?)?;
    debug!(
        "read {:?}: {} adjacency entries",
        path.file_name().unwrap_or_default(),
        adjacency.len()
    );
    Ok(adjacency)
}

/// Densifies a pickled `numpy.ndarray`, `numpy.matrix` or scipy CSR/CSC matrix.
pub fn matrix_from_value(value: &Value) -> Result<Tensor> {
    let obj = as_object(value, "matrix")?;
    let (_, class) = obj.class().ok_or_else(|| unexpected("matrix", value))?;
    match class {
        "ndarray" | "matrix" => {
            let NdArray { shape, data } = NdArray::from_object(obj)?;
            match shape[..] {
                [rows, cols] => {
                    let data = data.into_iter().map(|v| v as f32).collect::<Vec<_>>();
                    Ok(Tensor::from_vec(data, (rows, cols), &Device::Cpu)?)
                }
                _ => Err(PlanetoidError::ShapeMismatch(format!(
                    "expected a 2-d array, got shape {shape:?}"
                ))),
            }
        }
        "csr_matrix" | "csr_array" => sparse_to_dense(obj, false),
        "csc_matrix" | "csc_array" => sparse_to_dense(obj, true),
        _ => Err(unexpected("ndarray or CSR/CSC matrix", value).into()),
    }
}

/// A `dict`/`defaultdict` of node -> neighbor list, in pickle order.
pub fn adjacency_from_value(value: &Value) -> Result<AdjacencyDict> {
    let items = match value {
        Value::Dict(items) => items,
        Value::Object(obj) => &obj.items,
        _ => return Err(unexpected("adjacency dict", value).into()),
    };
    items
        .iter()
        .map(|(key, neighbors)| -> Result<(i64, Vec<i64>)> {
            let key = key
                .as_int()
                .ok_or_else(|| unexpected("integer node id", key))?;
            let neighbors = match neighbors {
                Value::Object(obj) => NdArray::from_object(obj)?
                    .data
                    .into_iter()
                    .map(|v| v as i64)
                    .collect(),
                _ => neighbors
                    .as_sequence()
                    .ok_or_else(|| unexpected("neighbor list", neighbors))?
                    .iter()
                    .map(|v| v.as_int().ok_or_else(|| unexpected("integer node id", v)))
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            Ok((key, neighbors))
        })
        .collect()
}

/// A decoded numpy array in C order.
#[derive(Debug, Clone, PartialEq)]
struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    fn from_object(obj: &Object) -> Result<Self> {
        let state = obj
            .state
            .as_ref()
            .and_then(Value::as_sequence)
            .ok_or_else(|| PickleError::Invalid("ndarray without state".to_owned()))?;
        // (version, shape, dtype, is_fortran, raw) or the older 4-tuple without version
        let state = match state.len() {
            5 => &state[1..],
            4 => state,
            n => {
                return Err(PickleError::Invalid(format!("ndarray state of length {n}")).into())
            }
        };
        let shape = state[0]
            .as_sequence()
            .ok_or_else(|| unexpected("shape tuple", &state[0]))?
            .iter()
            .map(|d| {
                d.as_int()
                    .and_then(|d| usize::try_from(d).ok())
                    .ok_or_else(|| unexpected("dimension", d))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let dtype = DType::from_value(&state[1])?;
        let fortran = state[2]
            .as_int()
            .ok_or_else(|| unexpected("fortran flag", &state[2]))?
            != 0;
        let raw = state[3]
            .as_bytes()
            .ok_or_else(|| unexpected("raw array data", &state[3]))?;

        let len: usize = shape.iter().product();
        if raw.len() != len * dtype.size {
            return Err(PlanetoidError::ShapeMismatch(format!(
                "{} bytes for {len} elements of {}{}",
                raw.len(),
                dtype.kind,
                dtype.size
            )));
        }
        let mut data = raw
            .chunks_exact(dtype.size)
            .map(|chunk| dtype.decode(chunk))
            .collect::<Vec<_>>();
        if fortran {
            if let [rows, cols] = shape[..] {
                data = (0..rows * cols)
                    .map(|k| data[(k % cols) * rows + k / cols])
                    .collect();
            }
        }
        Ok(Self { shape, data })
    }
}

#[derive(Debug, Clone, Copy)]
struct DType {
    kind: char,
    size: usize,
    big_endian: bool,
}

impl DType {
    fn from_value(value: &Value) -> Result<Self> {
        let obj = as_object(value, "numpy.dtype")?;
        let descr = obj
            .args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| unexpected("dtype descriptor", value))?;
        let state_order = obj
            .state
            .as_ref()
            .and_then(Value::as_sequence)
            .and_then(|s| s.get(1))
            .and_then(Value::as_str)
            .and_then(|s| s.chars().next());
        let (order, descr) = match descr.chars().next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (Some(c), &descr[1..]),
            _ => (state_order, descr),
        };
        let mut chars = descr.chars();
        let kind = chars.next().unwrap_or('?');
        let size = chars.as_str().parse::<usize>().unwrap_or(0);
        let supported = matches!(
            (kind, size),
            ('f', 4 | 8) | ('i', 1 | 2 | 4 | 8) | ('u', 1 | 2 | 4 | 8) | ('b', 1)
        );
        if !supported {
            return Err(PickleError::Invalid(format!("unsupported dtype {descr:?}")).into());
        }
        Ok(Self {
            kind,
            size,
            big_endian: order == Some('>'),
        })
    }

    fn decode(&self, chunk: &[u8]) -> f64 {
        let mut b = [0u8; 8];
        b[..self.size].copy_from_slice(chunk);
        if self.big_endian {
            b[..self.size].reverse();
        }
        match (self.kind, self.size) {
            ('f', 4) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            ('f', _) => f64::from_le_bytes(b),
            ('i', 1) => b[0] as i8 as f64,
            ('i', 2) => i16::from_le_bytes([b[0], b[1]]) as f64,
            ('i', 4) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            ('i', _) => i64::from_le_bytes(b) as f64,
            // unsigned and bool: the zero-extended little-endian value
            _ => u64::from_le_bytes(b) as f64,
        }
    }
}

fn sparse_to_dense(obj: &Object, column_major: bool) -> Result<Tensor> {
    let state = obj
        .state
        .as_ref()
        .ok_or_else(|| PickleError::Invalid("sparse matrix without state".to_owned()))?;
    let field = |key: &str| {
        state
            .get(key)
            .ok_or_else(|| PickleError::Invalid(format!("sparse matrix without {key:?}")))
    };
    let shape = state
        .get("_shape")
        .or_else(|| state.get("shape"))
        .and_then(Value::as_sequence)
        .ok_or_else(|| PickleError::Invalid("sparse matrix without shape".to_owned()))?;
    let [rows, cols] = shape else {
        return Err(PlanetoidError::ShapeMismatch(format!(
            "sparse matrix of rank {}",
            shape.len()
        )));
    };
    let dim = |d: &Value| {
        d.as_int()
            .and_then(|d| usize::try_from(d).ok())
            .ok_or_else(|| unexpected("dimension", d))
    };
    let (rows, cols) = (dim(rows)?, dim(cols)?);
    let array = |key: &str| -> Result<Vec<f64>> {
        let value = field(key)?;
        Ok(NdArray::from_object(as_object(value, "ndarray")?)?.data)
    };
    let (data, indices, indptr) = (array("data")?, array("indices")?, array("indptr")?);

    let (outer, inner) = if column_major { (cols, rows) } else { (rows, cols) };
    if indptr.len() != outer + 1 || indices.len() != data.len() {
        return Err(PlanetoidError::ShapeMismatch(format!(
            "sparse matrix {rows}x{cols} with {} pointers, {} indices, {} values",
            indptr.len(),
            indices.len(),
            data.len()
        )));
    }
    let mut dense = vec![0f32; rows * cols];
    for i in 0..outer {
        let (start, end) = (indptr[i] as usize, indptr[i + 1] as usize);
        if start > end || end > data.len() {
            return Err(PickleError::Invalid(format!("bad index pointer at {i}")).into());
        }
        for k in start..end {
            let j = indices[k] as usize;
            if indices[k] < 0.0 || j >= inner {
                return Err(PlanetoidError::IndexOutOfRange {
                    index: indices[k] as i64,
                    len: inner,
                });
            }
            let (r, c) = if column_major { (j, i) } else { (i, j) };
            // duplicates are summed, like scipy's todense
            dense[r * cols + c] += data[k] as f32;
        }
    }
    Ok(Tensor::from_vec(dense, (rows, cols), &Device::Cpu)?)
}

fn as_object<'a>(value: &'a Value, expected: &'static str) -> Result<&'a Object> {
    match value {
        Value::Object(obj) => Ok(obj),
        _ => Err(unexpected(expected, value).into()),
    }
}

fn unexpected(expected: &'static str, found: &Value) -> PickleError {
    PickleError::Unexpected {
        expected,
        found: found.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(module: &str, name: &str) -> Value {
        Value::Global {
            module: module.to_owned(),
            name: name.to_owned(),
        }
    }

    fn object(callable: Value, args: Vec<Value>, state: Value) -> Value {
        Value::Object(Box::new(Object {
            callable,
            args,
            state: Some(state),
            items: Vec::new(),
            elements: Vec::new(),
        }))
    }

    fn ndarray(shape: &[i64], descr: &str, fortran: bool, raw: Vec<u8>) -> Value {
        let dtype = object(
            global("numpy", "dtype"),
            vec![
                Value::String(descr.to_owned()),
                Value::Int(0),
                Value::Int(1),
            ],
            Value::Tuple(vec![Value::Int(3), Value::String("<".to_owned())]),
        );
        object(
            global("numpy.core.multiarray", "_reconstruct"),
            vec![
                global("numpy", "ndarray"),
                Value::Tuple(vec![Value::Int(0)]),
                Value::String("b".to_owned()),
            ],
            Value::Tuple(vec![
                Value::Int(1),
                Value::Tuple(shape.iter().map(|&d| Value::Int(d)).collect()),
                dtype,
                Value::Bool(fortran),
                Value::Bytes(raw),
            ]),
        )
    }

    fn f64_bytes(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn i32_bytes(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn dense_ndarray() {
        let value = ndarray(&[2, 3], "f8", false, f64_bytes(&[1., 2., 3., 4., 5., 6.]));
        let m = matrix_from_value(&value).unwrap();
        assert_eq!(m.dims2().unwrap(), (2, 3));
        assert_eq!(m.to_vec2::<f32>().unwrap()[1], vec![4., 5., 6.]);
    }

    #[test]
    fn fortran_ndarray_is_transposed_to_row_major() {
        let value = ndarray(&[2, 3], "i4", true, i32_bytes(&[1, 4, 2, 5, 3, 6]));
        let m = matrix_from_value(&value).unwrap();
        assert_eq!(
            m.to_vec2::<f32>().unwrap(),
            vec![vec![1., 2., 3.], vec![4., 5., 6.]]
        );
    }

    #[test]
    fn csr_matrix_densifies() {
        // [[0, 1, 0], [2, 0, 3]]
        let state = Value::Dict(vec![
            (
                Value::String("_shape".to_owned()),
                Value::Tuple(vec![Value::Int(2), Value::Int(3)]),
            ),
            (
                Value::String("data".to_owned()),
                ndarray(&[3], "f4", false, {
                    [1f32, 2., 3.].iter().flat_map(|v| v.to_le_bytes()).collect()
                }),
            ),
            (
                Value::String("indices".to_owned()),
                ndarray(&[3], "i4", false, i32_bytes(&[1, 0, 2])),
            ),
            (
                Value::String("indptr".to_owned()),
                ndarray(&[3], "i4", false, i32_bytes(&[0, 1, 3])),
            ),
            (
                Value::String("format".to_owned()),
                Value::String("csr".to_owned()),
            ),
        ]);
        let value = object(
            global("copy_reg", "_reconstructor"),
            vec![
                global("scipy.sparse.csr", "csr_matrix"),
                global("__builtin__", "object"),
                Value::None,
            ],
            state,
        );
        let m = matrix_from_value(&value).unwrap();
        assert_eq!(
            m.to_vec2::<f32>().unwrap(),
            vec![vec![0., 1., 0.], vec![2., 0., 3.]]
        );
    }

    #[test]
    fn adjacency_keeps_pickle_order() {
        let value = Value::Dict(vec![
            (
                Value::Int(2),
                Value::List(vec![Value::Int(0), Value::Int(1)]),
            ),
            (Value::Int(0), Value::List(vec![Value::Int(2)])),
        ]);
        assert_eq!(
            adjacency_from_value(&value).unwrap(),
            vec![(2, vec![0, 1]), (0, vec![2])]
        );
    }

    #[test]
    fn mismatched_label_widths_are_rejected() {
        let zeros = |rows: usize, cols: usize| {
            Tensor::zeros((rows, cols), candle_core::DType::F32, &Device::Cpu).unwrap()
        };
        let blocks = RawBlocks {
            x: zeros(1, 2),
            tx: zeros(1, 2),
            allx: zeros(2, 2),
            y: zeros(1, 3),
            ty: zeros(1, 2),
            ally: zeros(2, 3),
        };
        assert!(matches!(
            blocks.validate(),
            Err(PlanetoidError::ShapeMismatch(_))
        ));
    }
}
