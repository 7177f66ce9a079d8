pub use log::{info, warn};

pub type Mat = nalgebra::DMatrix<f32>;

/// Default asinh cofactor for mass cytometry
pub const DEFAULT_COFACTOR: f32 = 5.0;
pub const DEFAULT_SEED: u64 = 42;
