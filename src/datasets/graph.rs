use std::{collections::HashMap, path::Path};

use candle_core::{DType, Device, Tensor};

use super::{edges::EdgeIndex, split::full_train_mask, split::ReconciledNodes};
use crate::error::{PlanetoidError, Result};
use crate::utils::{mask_to_index, mask_to_tensor};

/// A single node-classification graph.
///
/// ```python
/// data = {
///     "x": data.x.numpy(),
///     "y": data.y.numpy(),
///     "edge_index": data.edge_index.numpy(),
///     "train_mask": data.train_mask.numpy(),
///     "val_mask": data.val_mask.numpy(),
///     "test_mask": data.test_mask.numpy(),
/// }
/// ```
/// is the layout written by [`GraphRecord::save`].
#[derive(Debug, Clone)]
pub struct GraphRecord {
    /// `f32`, `[num_nodes, num_features]`
    pub x: Tensor,
    /// `u32`, `[num_nodes]`
    pub y: Tensor,
    /// `u32`, `[2, num_edges]`
    pub edge_index: Tensor,
    /// `u8` masks, `[num_nodes]`
    pub train_mask: Tensor,
    pub val_mask: Tensor,
    pub test_mask: Tensor,
}

impl GraphRecord {
    pub fn assemble(nodes: ReconciledNodes, edges: EdgeIndex, device: &Device) -> Result<Self> {
        let num_edges = edges.len();
        let EdgeIndex { mut row, col } = edges;
        row.extend(col);
        Ok(Self {
            x: nodes.features.to_dtype(DType::F32)?.to_device(device)?,
            y: nodes.labels.to_dtype(DType::U32)?.to_device(device)?,
            edge_index: Tensor::from_vec(row, (2, num_edges), device)?,
            train_mask: mask_to_tensor(&nodes.train_mask, device)?,
            val_mask: mask_to_tensor(&nodes.val_mask, device)?,
            test_mask: mask_to_tensor(&nodes.test_mask, device)?,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.y.dims1().unwrap_or_default()
    }
    pub fn num_features(&self) -> usize {
        self.x.dims2().map_or(0, |(_, d)| d)
    }
    pub fn num_edges(&self) -> usize {
        self.edge_index.dims2().map_or(0, |(_, e)| e)
    }
    pub fn num_classes(&self) -> Result<usize> {
        if self.num_nodes() == 0 {
            return Ok(0);
        }
        Ok(self.y.max(0)?.to_scalar::<u32>()? as usize + 1)
    }

    pub fn train_indices(&self) -> Result<Tensor> {
        mask_to_index(&self.train_mask)
    }
    pub fn val_indices(&self) -> Result<Tensor> {
        mask_to_index(&self.val_mask)
    }
    pub fn test_indices(&self) -> Result<Tensor> {
        mask_to_index(&self.test_mask)
    }

    /// A copy whose train mask is every node outside validation and test.
    /// Tensors are immutable, so `self` and other holders of it are unaffected.
    pub fn with_full_split(&self) -> Result<Self> {
        let as_bools = |mask: &Tensor| -> Result<Vec<bool>> {
            Ok(mask.to_vec1::<u8>()?.into_iter().map(|m| m != 0).collect())
        };
        let train = full_train_mask(&as_bools(&self.val_mask)?, &as_bools(&self.test_mask)?);
        Ok(Self {
            train_mask: mask_to_tensor(&train, self.train_mask.device())?,
            ..self.clone()
        })
    }

    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            x: self.x.to_device(device)?,
            y: self.y.to_device(device)?,
            edge_index: self.edge_index.to_device(device)?,
            train_mask: self.train_mask.to_device(device)?,
            val_mask: self.val_mask.to_device(device)?,
            test_mask: self.test_mask.to_device(device)?,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Tensor::write_npz(
            &[
                ("x", &self.x),
                ("y", &self.y),
                ("edge_index", &self.edge_index),
                ("train_mask", &self.train_mask),
                ("val_mask", &self.val_mask),
                ("test_mask", &self.test_mask),
            ],
            path,
        )?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P, device: &Device) -> Result<Self> {
        let mut hashmap: HashMap<String, Tensor> =
            HashMap::from_iter(Tensor::read_npz(path.as_ref())?);
        let mut take = |name: &'static str, dtype: DType| -> Result<Tensor> {
            let tensor = hashmap
                .remove(name)
                .ok_or(PlanetoidError::MissingArtifactEntry(name))?;
            Ok(tensor.to_dtype(dtype)?.to_device(device)?)
        };
        Ok(Self {
            x: take("x", DType::F32)?,
            y: take("y", DType::U32)?,
            edge_index: take("edge_index", DType::U32)?,
            train_mask: take("train_mask", DType::U8)?,
            val_mask: take("val_mask", DType::U8)?,
            test_mask: take("test_mask", DType::U8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::EdgeIndex;

    fn record() -> GraphRecord {
        let nodes = ReconciledNodes {
            features: Tensor::new(&[[1f32, 0.], [0., 1.], [1., 1.]], &Device::Cpu).unwrap(),
            labels: Tensor::new(&[0u32, 2, 1], &Device::Cpu).unwrap(),
            train_mask: vec![true, false, false],
            val_mask: vec![false, true, false],
            test_mask: vec![false, false, true],
        };
        let edges = EdgeIndex {
            row: vec![1, 2, 0, 1],
            col: vec![0, 1, 1, 2],
        };
        GraphRecord::assemble(nodes, edges, &Device::Cpu).unwrap()
    }

    #[test]
    fn assemble_keeps_everything_in_place() {
        let record = record();
        assert_eq!(record.num_nodes(), 3);
        assert_eq!(record.num_features(), 2);
        assert_eq!(record.num_edges(), 4);
        assert_eq!(record.num_classes().unwrap(), 3);
        assert_eq!(
            record.edge_index.to_vec2::<u32>().unwrap(),
            vec![vec![1, 2, 0, 1], vec![0, 1, 1, 2]]
        );
        assert_eq!(record.train_indices().unwrap().to_vec1::<u32>().unwrap(), vec![0]);
        assert_eq!(record.val_indices().unwrap().to_vec1::<u32>().unwrap(), vec![1]);
        assert_eq!(record.test_indices().unwrap().to_vec1::<u32>().unwrap(), vec![2]);
    }

    #[test]
    fn full_split_copies_instead_of_mutating() {
        let public = record();
        let shared = public.clone();
        let full = public.with_full_split().unwrap();
        assert_eq!(full.train_mask.to_vec1::<u8>().unwrap(), vec![1, 0, 0]);
        assert_eq!(
            full.val_mask.to_vec1::<u8>().unwrap(),
            public.val_mask.to_vec1::<u8>().unwrap()
        );
        assert_eq!(
            shared.train_mask.to_vec1::<u8>().unwrap(),
            public.train_mask.to_vec1::<u8>().unwrap()
        );
    }

    #[test]
    fn npz_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.npz");
        let record = record();
        record.save(&path).unwrap();
        let loaded = GraphRecord::load(&path, &Device::Cpu).unwrap();
        assert_eq!(
            loaded.x.to_vec2::<f32>().unwrap(),
            record.x.to_vec2::<f32>().unwrap()
        );
        assert_eq!(
            loaded.y.to_vec1::<u32>().unwrap(),
            record.y.to_vec1::<u32>().unwrap()
        );
        assert_eq!(
            loaded.edge_index.to_vec2::<u32>().unwrap(),
            record.edge_index.to_vec2::<u32>().unwrap()
        );
        assert_eq!(
            loaded.test_mask.to_vec1::<u8>().unwrap(),
            record.test_mask.to_vec1::<u8>().unwrap()
        );
    }
}
