use crate::error::Result;

/// An indexable collection of graphs.
pub trait Dataset {
    type Item;
    fn len(&self) -> usize;
    fn get(&self, idx: usize) -> Result<&Self::Item>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
