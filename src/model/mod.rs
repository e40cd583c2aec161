//! Data model shared by the potential pipeline.

pub mod system;

pub use system::{NatomsVec, System};
