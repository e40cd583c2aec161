//! A pure Rust library for neural-network interatomic potentials.
//! It evaluates energy, atomic forces, and the virial tensor from local-
//! environment descriptors pushed through per-type feed-forward networks,
//! with an optional tabulated short-range interaction blended in at close
//! separations.
//!
//! # Features
//!
//! - **Local-environment descriptors** — A smoothed radial descriptor with
//!   analytic coordinate derivatives, plus a trait seam for plugging in
//!   external descriptor kernels (including the full local-frame layout
//!   with angular and radial channels)
//! - **Per-type networks** — Residual fitting networks per atom type, with
//!   embedding filter networks for the radial variant and optional
//!   trainable timestep scalars on the residual links
//! - **Descriptor normalization** — Mean/deviation statistics aggregated
//!   over reference frames, with a floor on small deviations
//! - **Short-range blending** — Cubic-spline pair tables switched in by a
//!   soft-min of the neighbor distances, with consistent forces and virials
//!   across the switching window
//! - **Checkpoint migration** — Version dispatch for upgrading legacy model
//!   checkpoints to the current layout
//!
//! # Quick Start
//!
//! Build a [`ModelConfig`], derive normalization statistics from reference
//! frames, then evaluate a [`Potential`]:
//!
//! ```
//! use nnp_forge::{compute_dstats, ModelConfig, Potential, RadialKernel, System};
//!
//! // One atom type, up to 4 neighbors, 6 Å cutoff smoothed from 5.5 Å.
//! let config = ModelConfig::radial_only(
//!     vec![4],          // neighbors selected per type
//!     6.0,              // cutoff radius
//!     5.5,              // smoothing onset
//!     vec![10, 10],     // embedding widths
//!     vec![32, 32],     // fitting widths
//! )?;
//! let kernel = RadialKernel::from_config(&config)?;
//!
//! // A bent triatomic, non-periodic.
//! let frame = System::new(
//!     vec![
//!         0.00, 0.00, 0.00, //
//!         0.96, 0.00, 0.00, //
//!         -0.24, 0.93, 0.00,
//!     ],
//!     vec![0, 0, 0],
//! );
//!
//! let stats = compute_dstats(&kernel, &config, std::slice::from_ref(&frame))?;
//! let potential = Potential::new(config, kernel, stats, None, None)?;
//! let out = potential.evaluate(&frame, &[])?;
//!
//! assert_eq!(out.atom_energy.len(), 3);
//! assert_eq!(out.force.len(), 9);
//! // Forces on an isolated cluster sum to zero.
//! for k in 0..3 {
//!     let total: f64 = (0..3).map(|a| out.force[a * 3 + k]).sum();
//!     assert!(total.abs() < 1e-9);
//! }
//! # Ok::<(), nnp_forge::Error>(())
//! ```
//!
//! # Module Organization
//!
//! - [`Potential`] — Descriptor, networks, and short-range table assembled
//!   into one evaluator
//! - [`DescriptorKernel`] — Trait seam for descriptor implementations;
//!   [`RadialKernel`] is the built-in one
//! - [`convert`] — Legacy checkpoint migration
//!
//! # Data Types
//!
//! ## Input
//!
//! - [`System`] — Atom coordinates, types, optional cell, and ghost count
//! - [`ModelConfig`] — Descriptor variant, selections, network widths
//! - [`SrTabConfig`] — Soft-min switching parameters
//! - [`PairTab`] — Tabulated short-range pair energies
//!
//! ## Output
//!
//! - [`Interaction`] — Energy, per-atom energies, forces, virials
//! - [`KernelOutput`] — Descriptor values, derivatives, and neighbor
//!   bookkeeping produced by a kernel
//! - [`DescriptorStats`] — Per-type normalization statistics

mod model;
mod potential;

pub mod convert;

pub use model::{NatomsVec, System};
pub use potential::{
    compute_dstats, DescriptorKernel, DescriptorStats, DescriptorVariant, Error, FilterNet,
    FittingNet, Interaction, KahanSum, KernelOutput, ModelConfig, PairTab, Potential,
    RadialKernel, SrTabConfig, DSTD_FLOOR,
};
