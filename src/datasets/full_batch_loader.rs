use super::traits::Dataset;
use crate::error::Result;

/// Yields every graph of a dataset once, as a whole batch.
pub struct FullBatchLoader<'a, T> {
    next: usize,
    dataset: &'a T,
}
impl<'a, T: Dataset + 'a> FullBatchLoader<'a, T> {
    pub fn new(dataset: &'a T) -> Self {
        Self { next: 0, dataset }
    }
}

impl<'a, T: Dataset> Iterator for FullBatchLoader<'a, T> {
    type Item = Result<&'a T::Item>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.dataset.len() {
            None
        } else {
            let batch = self.dataset.get(self.next);
            self.next += 1;
            Some(batch)
        }
    }
}
