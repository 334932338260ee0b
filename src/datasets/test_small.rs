use candle_core::{Device, Tensor};

use super::{graph::GraphRecord, traits::Dataset};
use crate::error::{PlanetoidError, Result};
use crate::utils::mask_to_tensor;

/// Nine nodes in three classes, for debugging models end to end.
#[derive(Debug, Clone)]
pub struct TestSmall {
    data: GraphRecord,
}

impl TestSmall {
    pub const NUM_CLASSES: usize = 3;

    pub fn new(device: &Device) -> Result<Self> {
        let x: [[f32; 2]; 9] = [
            [-2., -1.],
            [-2., 1.],
            [-1., 0.],
            [0., 0.],
            [0., 1.],
            [1., 0.],
            [2., 1.],
            [3., 0.],
            [2., -1.],
        ];
        let edge_index: [[u32; 22]; 2] = [
            [0, 0, 1, 1, 2, 2, 2, 3, 3, 3, 4, 5, 5, 5, 5, 6, 6, 7, 7, 7, 8, 8],
            [1, 2, 0, 2, 0, 1, 3, 2, 4, 5, 3, 3, 6, 7, 8, 5, 7, 5, 6, 8, 5, 7],
        ];
        let y: [u32; 9] = [0, 0, 0, 1, 1, 2, 2, 2, 2];
        let mask = |nodes: &[usize]| {
            let mask = (0..9).map(|i| nodes.contains(&i)).collect::<Vec<_>>();
            mask_to_tensor(&mask, device)
        };
        Ok(Self {
            data: GraphRecord {
                x: Tensor::new(&x, device)?,
                y: Tensor::new(&y, device)?,
                edge_index: Tensor::new(&edge_index, device)?,
                train_mask: mask(&[0, 3, 5])?,
                val_mask: mask(&[1, 6])?,
                test_mask: mask(&[2, 4, 7, 8])?,
            },
        })
    }
}

impl Dataset for TestSmall {
    type Item = GraphRecord;
    fn len(&self) -> usize {
        1
    }
    fn get(&self, idx: usize) -> Result<&GraphRecord> {
        if idx != 0 {
            return Err(PlanetoidError::InvalidIndexAccess(idx));
        }
        Ok(&self.data)
    }
}
