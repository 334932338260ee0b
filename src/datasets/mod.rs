mod edges;
pub use edges::*;

mod full_batch_loader;
pub use full_batch_loader::*;

mod graph;
pub use graph::*;

mod index_file;
pub use index_file::*;

pub mod pickle;
pub use pickle::PickleError;

mod planetoid;
pub use planetoid::*;

mod raw;
pub use raw::*;

mod split;
pub use split::*;

mod test_small;
pub use test_small::*;

mod traits;
pub use traits::*;

mod utils;
pub use utils::*;
