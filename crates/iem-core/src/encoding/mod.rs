//! Forward encoding model
//!
//! - [`fit`]: least-squares channel → measurement weights
//! - [`evaluate`]: pooled variance explained and mean squared error

pub mod evaluate;
pub mod fit;

pub use evaluate::{
    mean_squared_error, variance_explained, variance_explained_per_column, GoodnessOfFit,
};
pub use fit::{EncodingModel, FitConfig};
