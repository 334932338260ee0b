pub mod datasets;
pub mod error;
pub mod utils;

pub use error::{PlanetoidError, Result};
