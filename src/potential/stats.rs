//! Per-type descriptor normalization statistics.

use super::config::{DescriptorVariant, ModelConfig};
use super::error::Error;
use super::kernel::DescriptorKernel;
use crate::model::System;

/// Floor applied to every standard deviation entry.
pub const DSTD_FLOOR: f64 = 1e-2;

/// Per-type mean and standard deviation of the flattened descriptor.
///
/// Computed once from a labeled dataset and held fixed for the lifetime of
/// the model. Every `dstd` entry satisfies `abs(dstd) >= 1e-2` so the
/// normalization never divides by a vanishing spread.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorStats {
    pub davg: Vec<Vec<f64>>,
    pub dstd: Vec<Vec<f64>>,
}

impl DescriptorStats {
    /// Identity normalization: mean 0, std 1.
    pub fn trivial(ntypes: usize, ndescrpt: usize) -> Self {
        Self {
            davg: vec![vec![0.0; ndescrpt]; ntypes],
            dstd: vec![vec![1.0; ndescrpt]; ntypes],
        }
    }

    pub fn ntypes(&self) -> usize {
        self.davg.len()
    }

    pub fn ndescrpt(&self) -> usize {
        self.davg.first().map_or(0, Vec::len)
    }
}

/// sqrt(sumv2/n - mean^2), with the radicand clamped at zero so a
/// floating-point cancellation near zero variance cannot produce a NaN
/// that would slip past the floor.
fn compute_std(sumv2: f64, sumv: f64, sumn: f64) -> f64 {
    let mean = sumv / sumn;
    (sumv2 / sumn - mean * mean).max(0.0).sqrt()
}

fn floored(v: f64) -> f64 {
    if v.abs() < DSTD_FLOOR { DSTD_FLOOR } else { v }
}

/// Estimates normalization statistics from a batch of systems.
///
/// Each system is run through the kernel with trivial normalization; raw
/// descriptor components are accumulated per atom type across all systems
/// in order (deterministic aggregation). For the full variant the mean and
/// std are per descriptor column; for the radial-only variant a single
/// scalar-channel statistic per type is tiled across all columns.
///
/// A type with zero sampled atoms divides by zero; callers must guarantee
/// every configured type appears in the dataset.
pub fn compute_dstats<K: DescriptorKernel>(
    kernel: &K,
    config: &ModelConfig,
    systems: &[System],
) -> Result<DescriptorStats, Error> {
    let ntypes = config.ntypes();
    let ndescrpt = config.ndescrpt();
    let trivial = DescriptorStats::trivial(ntypes, ndescrpt);

    match config.variant {
        DescriptorVariant::LocalFrame => {
            let mut sumv = vec![vec![0.0; ndescrpt]; ntypes];
            let mut sumv2 = vec![vec![0.0; ndescrpt]; ntypes];
            let mut sumn = vec![0.0f64; ntypes];
            for system in systems {
                let nat = system.natoms_vec(ntypes)?;
                let out = kernel.compute(system, &trivial)?;
                for t in 0..ntypes {
                    for i in nat.type_range(t) {
                        let row = &out.descriptor[i * ndescrpt..(i + 1) * ndescrpt];
                        for (c, &v) in row.iter().enumerate() {
                            sumv[t][c] += v;
                            sumv2[t][c] += v * v;
                        }
                    }
                    sumn[t] += nat.per_type[t] as f64;
                }
            }
            let mut davg = Vec::with_capacity(ntypes);
            let mut dstd = Vec::with_capacity(ntypes);
            for t in 0..ntypes {
                let avg: Vec<f64> = sumv[t].iter().map(|&s| s / sumn[t]).collect();
                let std: Vec<f64> = (0..ndescrpt)
                    .map(|c| floored(compute_std(sumv2[t][c], sumv[t][c], sumn[t])))
                    .collect();
                davg.push(avg);
                dstd.push(std);
            }
            Ok(DescriptorStats { davg, dstd })
        }
        DescriptorVariant::RadialOnly => {
            // One scalar channel: every descriptor component of every atom
            // of the type is a sample.
            let mut sumr = vec![0.0f64; ntypes];
            let mut sumr2 = vec![0.0f64; ntypes];
            let mut sumn = vec![0.0f64; ntypes];
            for system in systems {
                let nat = system.natoms_vec(ntypes)?;
                let out = kernel.compute(system, &trivial)?;
                for t in 0..ntypes {
                    for i in nat.type_range(t) {
                        for c in 0..ndescrpt {
                            let v = out.descriptor[i * ndescrpt + c];
                            sumr[t] += v;
                            sumr2[t] += v * v;
                        }
                    }
                    sumn[t] += (nat.per_type[t] * ndescrpt) as f64;
                }
            }
            let mut davg = Vec::with_capacity(ntypes);
            let mut dstd = Vec::with_capacity(ntypes);
            for t in 0..ntypes {
                let avg_unit = sumr[t] / sumn[t];
                let std_unit = floored(compute_std(sumr2[t], sumr[t], sumn[t]));
                davg.push(vec![avg_unit; ndescrpt]);
                dstd.push(vec![std_unit; ndescrpt]);
            }
            Ok(DescriptorStats { davg, dstd })
        }
    }
}
