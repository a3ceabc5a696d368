pub mod bid;
pub mod dp;
pub mod graph;
pub mod policy;
pub mod types;

pub use bid::*;
pub use dp::*;
pub use graph::*;
pub use policy::*;
pub use types::*;
