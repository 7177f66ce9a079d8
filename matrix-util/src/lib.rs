pub mod common_io; // reading and writing (gzipped) text files
pub mod dmatrix_io; // named dense matrices to and from tsv/parquet
pub mod dmatrix_util; // distances, sampling and column summaries
pub mod membership; // key -> group lookup tables
pub mod parquet; // parquet backend for named matrices
pub mod traits; // traits implemented for `DMatrix<f32>`
pub mod utils; // grouping helpers
