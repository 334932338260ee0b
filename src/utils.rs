use candle_core::{Device, Tensor};

use crate::error::{PlanetoidError, Result};

/// Positions of the non-zero entries of a `u8` mask, as a `u32` index tensor.
pub fn mask_to_index(mask: &Tensor) -> Result<Tensor> {
    let index = mask
        .to_vec1::<u8>()?
        .into_iter()
        .enumerate()
        .filter_map(|(idx, m)| (m != 0).then_some(idx as u32))
        .collect::<Vec<_>>();
    let len = index.len();
    Ok(Tensor::from_vec(index, len, mask.device())?)
}

/// A boolean mask of length `size` set at every position of `index`.
pub fn index_to_mask<I: IntoIterator<Item = usize>>(index: I, size: usize) -> Result<Vec<bool>> {
    let mut mask = vec![false; size];
    for i in index {
        *mask.get_mut(i).ok_or(PlanetoidError::IndexOutOfRange {
            index: i as i64,
            len: size,
        })? = true;
    }
    Ok(mask)
}

pub fn mask_to_tensor(mask: &[bool], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_iter(mask.iter().map(|&m| m as u8), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_round_trip() {
        let mask = index_to_mask([4, 1], 6).unwrap();
        assert_eq!(mask, vec![false, true, false, false, true, false]);
        let tensor = mask_to_tensor(&mask, &Device::Cpu).unwrap();
        let index = mask_to_index(&tensor).unwrap();
        assert_eq!(index.to_vec1::<u32>().unwrap(), vec![1, 4]);
    }

    #[test]
    fn index_beyond_size() {
        assert!(matches!(
            index_to_mask([6], 6),
            Err(PlanetoidError::IndexOutOfRange { index: 6, len: 6 })
        ));
    }
}
