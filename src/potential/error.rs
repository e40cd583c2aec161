//! Error types for potential evaluation.
//!
//! This module defines the error type used throughout the potential module.
//! Errors are categorized by source: configuration validation, malformed
//! system input, descriptor kernel failures, and legacy model conversion.

use thiserror::Error;

/// Errors that can occur while building or evaluating a potential.
///
/// This enum covers all failure modes of [`Potential`](super::Potential)
/// construction and evaluation, descriptor statistics estimation, and
/// legacy model version dispatch. All variants are fatal: no operation
/// retries or recovers from a partial result.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse a model configuration TOML document.
    ///
    /// A missing required key (`sel_r`, `rcut`, `n_neuron`, ...) surfaces
    /// here at construction time.
    #[error("failed to parse model configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The model configuration is internally inconsistent.
    #[error("invalid model configuration: {0}")]
    Config(String),

    /// A per-type selection array does not match the number of atom types.
    #[error("configuration key '{key}' has length {got}, expected {expected}")]
    SelectionMismatch {
        /// The offending configuration key.
        key: &'static str,
        /// Expected length (one entry per atom type, unless noted).
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// The input system is malformed.
    ///
    /// Occurs on coordinate/type length mismatches, out-of-range type ids,
    /// or local atoms that are not sorted by type.
    #[error("malformed system input: {0}")]
    System(String),

    /// The descriptor kernel failed.
    ///
    /// Propagates up through the whole forward pass; there is no retry.
    #[error("descriptor kernel failed: {0}")]
    Kernel(String),

    /// The per-frame parameter vector has the wrong length.
    #[error("frame parameter vector has length {got}, expected {expected}")]
    FrameParam {
        /// Configured `numb_fparam`.
        expected: usize,
        /// Supplied length.
        got: usize,
    },

    /// A short-range table could not be constructed.
    #[error("invalid short-range table: {0}")]
    Table(String),

    /// A legacy model conversion was requested for an unknown version.
    #[error("unsupported model version {0}")]
    UnsupportedVersion(String),
}

impl Error {
    /// Creates a [`Config`](Error::Config) error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }

    /// Creates a [`System`](Error::System) error.
    pub fn system(detail: impl Into<String>) -> Self {
        Self::System(detail.into())
    }

    /// Creates a [`Kernel`](Error::Kernel) error.
    pub fn kernel(detail: impl Into<String>) -> Self {
        Self::Kernel(detail.into())
    }

    /// Creates a [`Table`](Error::Table) error.
    pub fn table(detail: impl Into<String>) -> Self {
        Self::Table(detail.into())
    }
}
