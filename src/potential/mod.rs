mod config;
mod error;
mod interaction;
mod kernel;
mod network;
mod srtab;
mod stats;

pub use config::{DescriptorVariant, ModelConfig, SrTabConfig};
pub use error::Error;
pub use interaction::{Interaction, KahanSum, Potential};
pub use kernel::{DescriptorKernel, KernelOutput, RadialKernel};
pub use network::{FilterNet, FittingNet};
pub use srtab::PairTab;
pub use stats::{compute_dstats, DescriptorStats, DSTD_FLOOR};
