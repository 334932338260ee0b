use std::{fmt, str::FromStr};

use candle_core::{DType, Tensor};
use itertools::{Itertools, MinMaxResult};
use tracing::debug;

use super::raw::RawBlocks;
use crate::error::{PlanetoidError, Result};
use crate::utils::index_to_mask;

/// Size of the public validation split.
pub const NUM_VAL: usize = 500;

/// Which nodes train on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Split {
    /// The masks as published: the labeled pool trains.
    #[default]
    Public,
    /// Every node outside the validation and test sets trains.
    Full,
}

impl FromStr for Split {
    type Err = PlanetoidError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Self::Public),
            "full" => Ok(Self::Full),
            _ => Err(PlanetoidError::UnsupportedSplit(s.to_owned())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// `!(val | test)`
pub fn full_train_mask(val_mask: &[bool], test_mask: &[bool]) -> Vec<bool> {
    val_mask
        .iter()
        .zip(test_mask)
        .map(|(&v, &t)| !(v || t))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitConfig {
    /// The test index skips node ids that have no raw test row (CiteSeer).
    pub has_isolated_test_nodes: bool,
    pub num_val: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            has_isolated_test_nodes: false,
            num_val: NUM_VAL,
        }
    }
}

/// Features, labels and masks in final node order.
#[derive(Debug, Clone)]
pub struct ReconciledNodes {
    /// `f32`, `[num_nodes, num_features]`
    pub features: Tensor,
    /// `u32`, `[num_nodes]`
    pub labels: Tensor,
    pub train_mask: Vec<bool>,
    pub val_mask: Vec<bool>,
    pub test_mask: Vec<bool>,
}

impl ReconciledNodes {
    pub fn num_nodes(&self) -> usize {
        self.test_mask.len()
    }
}

/// Puts the raw blocks into node order.
///
/// Node ids are `allx` rows followed by the test block. Raw test row `i` belongs
/// to node `test_index[i]`; with isolated test nodes the test block is widened
/// to span `min..=max` of the test index and the missing nodes get zero
/// features and labels.
pub fn reconcile(
    raw: &RawBlocks,
    test_index: &[i64],
    config: &SplitConfig,
) -> Result<ReconciledNodes> {
    raw.validate()?;
    let device = raw.allx.device();
    let num_allx = raw.allx.dims2()?.0;
    let (num_test_rows, num_features) = raw.tx.dims2()?;
    let num_label_columns = raw.ty.dims2()?.1;
    let test_index_reorder = test_index.iter().copied().sorted().collect_vec();

    let span = if config.has_isolated_test_nodes {
        test_span(test_index, num_allx, num_test_rows)?
    } else {
        None
    };
    let num_nodes = num_allx + span.map_or(num_test_rows, |(_, len)| len);
    let position = |v: i64| {
        usize::try_from(v)
            .ok()
            .filter(|&i| i < num_nodes)
            .ok_or(PlanetoidError::IndexOutOfRange {
                index: v,
                len: num_nodes,
            })
    };
    let test_positions = test_index
        .iter()
        .map(|&v| position(v))
        .collect::<Result<Vec<_>>>()?;
    let reorder_positions = test_index_reorder
        .iter()
        .map(|&v| position(v))
        .collect::<Result<Vec<_>>>()?;

    let (tx, ty) = match span {
        Some((min, len)) => {
            if num_test_rows != test_index.len() {
                return Err(PlanetoidError::ShapeMismatch(format!(
                    "{num_test_rows} test rows for {} test indices",
                    test_index.len()
                )));
            }
            // raw test row i fills the slot of the i-th smallest test id
            let slots = test_index_reorder
                .iter()
                .map(|&t| (t - min) as u32)
                .collect_vec();
            let slots = Tensor::from_vec(slots, num_test_rows, device)?;
            let tx = Tensor::zeros((len, num_features), DType::F32, device)?
                .index_add(&slots, &raw.tx, 0)?;
            let ty = Tensor::zeros((len, num_label_columns), DType::F32, device)?
                .index_add(&slots, &raw.ty, 0)?;
            debug!("padded {num_test_rows} test rows to a span of {len} from node {min}");
            (tx, ty)
        }
        None => (raw.tx.clone(), raw.ty.clone()),
    };

    let features = Tensor::cat(&[&raw.allx, &tx], 0)?;
    let labels = Tensor::cat(&[&raw.ally, &ty], 0)?.argmax(1)?;

    // node test_index[i] takes the row at reorder[i], every other node keeps its own
    let mut permutation = (0..num_nodes as u32).collect_vec();
    for (&t, &r) in test_positions.iter().zip(&reorder_positions) {
        permutation[t] = r as u32;
    }
    let permutation = Tensor::from_vec(permutation, num_nodes, device)?;
    let features = features.index_select(&permutation, 0)?;
    let labels = labels.index_select(&permutation, 0)?;

    let num_train = raw.y.dims2()?.0;
    let train_mask = index_to_mask(0..num_train, num_nodes)?;
    let val_mask = index_to_mask(num_train..num_train + config.num_val, num_nodes)?;
    let test_mask = index_to_mask(test_positions, num_nodes)?;

    Ok(ReconciledNodes {
        features,
        labels,
        train_mask,
        val_mask,
        test_mask,
    })
}

/// `(min, max - min + 1)` of a non-empty test index.
///
/// Ids inside the span without a raw test row are isolated nodes; there may
/// be at most as many of them as there are test rows.
fn test_span(
    test_index: &[i64],
    num_allx: usize,
    num_test_rows: usize,
) -> Result<Option<(i64, usize)>> {
    let (min, max) = match test_index.iter().copied().minmax() {
        MinMaxResult::NoElements => return Ok(None),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let limit = 2 * num_test_rows;
    let len = max
        .checked_sub(min)
        .and_then(|d| d.checked_add(1))
        .and_then(|d| usize::try_from(d).ok())
        .filter(|&len| len <= limit)
        .ok_or(PlanetoidError::IndexOutOfRange {
            index: max,
            len: num_allx + limit,
        })?;
    Ok(Some((min, len)))
}
