pub mod aggregate; // frequencies and expression per (meta)cluster
pub mod assignment; // cluster and metacluster ids of every cell
pub mod common;
pub mod dendrogram; // average-linkage hierarchical clustering
pub mod error;
pub mod expression; // cells x channels intensity matrix
pub mod markers; // marker names and subsets
pub mod metacluster; // SOM nodes -> metaclusters
pub mod pipeline; // train, merge, summarize
pub mod som; // self-organizing map

pub use error::{LupinError, Result};
