//! Descriptor kernel contract and the reference radial kernel.
//!
//! The heavy descriptor construction lives behind [`DescriptorKernel`]: a
//! kernel returns the primal (already normalized) descriptor together with
//! its analytic derivative tensor, so the rest of the pipeline never has to
//! differentiate through it — the derivative is contracted in via the chain
//! rule at the force/virial step.
//!
//! [`RadialKernel`] is a pure-Rust implementation of the radial-only
//! contract, sufficient for statistics estimation and end-to-end tests.
//! The full local-frame kernel is expected to be supplied externally.

use super::config::{DescriptorVariant, ModelConfig};
use super::error::Error;
use super::stats::DescriptorStats;
use crate::model::System;

/// Output of one descriptor kernel invocation, flattened per local atom.
///
/// For a frame with `nloc` local atoms, `nnei` neighbor slots, and
/// `ndescrpt` descriptor components:
///
/// - `descriptor`: `nloc x ndescrpt`, normalized by the supplied statistics.
///   Slots beyond the true neighbor count hold the normalized zero
///   `-davg/dstd`.
/// - `descriptor_deriv`: `nloc x ndescrpt x deriv_width`. The radial-only
///   variant uses width 3 (derivative of the component with respect to the
///   center atom's coordinates; the neighbor derivative is its negation).
///   The local-frame variant uses width 12: derivatives with respect to the
///   center, the two axis atoms, and the slot's neighbor, in that order.
/// - `rij`: `nloc x nnei x 3` pairwise displacements `x_j - x_i`, zero for
///   empty slots.
/// - `nlist`: `nloc x nnei` neighbor atom indices, `-1` for empty slots.
///   Slots are grouped by neighbor type and distance-sorted within a group.
/// - `axis`: `nloc x 2` neighbor-slot indices of the two axis atoms fixing
///   the local frame (`-1` when absent). Empty for the radial-only variant.
#[derive(Debug, Clone)]
pub struct KernelOutput {
    pub descriptor: Vec<f64>,
    pub descriptor_deriv: Vec<f64>,
    pub rij: Vec<f64>,
    pub nlist: Vec<i64>,
    pub axis: Vec<i64>,
}

/// The external descriptor-construction boundary.
///
/// Implementations must be deterministic functions of their inputs. The
/// only shared state a kernel reads is the fixed normalization passed in.
pub trait DescriptorKernel {
    fn variant(&self) -> DescriptorVariant;

    /// Flattened descriptor width per atom.
    fn ndescrpt(&self) -> usize;

    /// Total neighbor slots per atom.
    fn nnei(&self) -> usize;

    /// Scalars per descriptor component in `descriptor_deriv`.
    fn deriv_width(&self) -> usize {
        match self.variant() {
            DescriptorVariant::LocalFrame => 12,
            DescriptorVariant::RadialOnly => 3,
        }
    }

    fn compute(&self, system: &System, stats: &DescriptorStats) -> Result<KernelOutput, Error>;
}

/// Quintic switching polynomial and its derivative.
///
/// Returns `(1, 0)` below `rmin`, `(0, 0)` at or above `rmax`, and a
/// smooth transition in between with vanishing first and second derivatives
/// at both ends.
pub(crate) fn spline5_switch(r: f64, rmin: f64, rmax: f64) -> (f64, f64) {
    if r < rmin {
        (1.0, 0.0)
    } else if r >= rmax {
        (0.0, 0.0)
    } else {
        let span = rmax - rmin;
        let uu = (r - rmin) / span;
        let vv = uu * uu * uu * (-6.0 * uu * uu + 15.0 * uu - 10.0) + 1.0;
        let dd = -30.0 * uu * uu * (uu - 1.0) * (uu - 1.0) / span;
        (vv, dd)
    }
}

/// Reference radial-only descriptor kernel.
///
/// Per neighbor slot the raw descriptor is the smoothed inverse distance
/// `s(r) = sw(r)/r`, where `sw` switches from 1 to 0 between `rcut_smth`
/// and `rcut`. Minimum-image displacements are used when the frame carries
/// a cell; open boundaries otherwise. When more in-cutoff candidates exist
/// than a type has slots, the nearest are kept.
#[derive(Debug, Clone)]
pub struct RadialKernel {
    sel: Vec<usize>,
    rcut: f64,
    rcut_smth: f64,
    slot_offset: Vec<usize>,
}

impl RadialKernel {
    pub fn new(sel: Vec<usize>, rcut: f64, rcut_smth: f64) -> Result<Self, Error> {
        if sel.is_empty() {
            return Err(Error::config("radial kernel needs at least one type"));
        }
        if rcut <= 0.0 || rcut_smth <= 0.0 || rcut_smth > rcut {
            return Err(Error::config(format!(
                "radial kernel cutoffs must satisfy 0 < rcut_smth <= rcut, got ({rcut_smth}, {rcut})"
            )));
        }
        let mut slot_offset = Vec::with_capacity(sel.len());
        let mut acc = 0;
        for &s in &sel {
            slot_offset.push(acc);
            acc += s;
        }
        Ok(Self {
            sel,
            rcut,
            rcut_smth,
            slot_offset,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, Error> {
        if config.variant != DescriptorVariant::RadialOnly {
            return Err(Error::config(
                "RadialKernel implements the radial-only variant",
            ));
        }
        Self::new(config.sel_r.clone(), config.rcut, config.smoothing_cutoff())
    }

    fn displacement(&self, system: &System, i: usize, j: usize) -> [f64; 3] {
        let c = &system.coords;
        let mut d = [
            c[3 * j] - c[3 * i],
            c[3 * j + 1] - c[3 * i + 1],
            c[3 * j + 2] - c[3 * i + 2],
        ];
        if let Some(cell) = &system.cell {
            let inv = mat3_inverse(cell);
            // Fractional coordinates, wrapped to the nearest image.
            let mut frac = [0.0; 3];
            for (k, f) in frac.iter_mut().enumerate() {
                *f = d[0] * inv[0][k] + d[1] * inv[1][k] + d[2] * inv[2][k];
            }
            for f in &mut frac {
                *f -= f.round();
            }
            for (k, dk) in d.iter_mut().enumerate() {
                *dk = frac[0] * cell[0][k] + frac[1] * cell[1][k] + frac[2] * cell[2][k];
            }
        }
        d
    }
}

impl DescriptorKernel for RadialKernel {
    fn variant(&self) -> DescriptorVariant {
        DescriptorVariant::RadialOnly
    }

    fn ndescrpt(&self) -> usize {
        self.sel.iter().sum()
    }

    fn nnei(&self) -> usize {
        self.ndescrpt()
    }

    fn compute(&self, system: &System, stats: &DescriptorStats) -> Result<KernelOutput, Error> {
        let ntypes = self.sel.len();
        let nat = system.natoms_vec(ntypes)?;
        let nnei = self.nnei();
        if stats.ntypes() != ntypes || stats.ndescrpt() != nnei {
            return Err(Error::kernel(format!(
                "normalization shape ({} x {}) does not match kernel ({} x {})",
                stats.ntypes(),
                stats.ndescrpt(),
                ntypes,
                nnei
            )));
        }

        let nloc = nat.nloc;
        let mut descriptor = vec![0.0; nloc * nnei];
        let mut descriptor_deriv = vec![0.0; nloc * nnei * 3];
        let mut rij = vec![0.0; nloc * nnei * 3];
        let mut nlist = vec![-1i64; nloc * nnei];

        let rcut2 = self.rcut * self.rcut;
        for i in 0..nloc {
            let ti = system.atom_types[i];
            // Empty slots carry the normalized zero descriptor.
            for slot in 0..nnei {
                descriptor[i * nnei + slot] = -stats.davg[ti][slot] / stats.dstd[ti][slot];
            }

            let mut buckets: Vec<Vec<(f64, [f64; 3], usize)>> = vec![Vec::new(); ntypes];
            for j in 0..nat.nall {
                if j == i {
                    continue;
                }
                let d = self.displacement(system, i, j);
                let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2];
                if r2 < rcut2 {
                    buckets[system.atom_types[j]].push((r2.sqrt(), d, j));
                }
            }
            for (t, bucket) in buckets.iter_mut().enumerate() {
                bucket.sort_by(|a, b| a.0.total_cmp(&b.0));
                bucket.truncate(self.sel[t]);
                for (k, &(r, d, j)) in bucket.iter().enumerate() {
                    let slot = self.slot_offset[t] + k;
                    let (sw, dsw) = spline5_switch(r, self.rcut_smth, self.rcut);
                    let s = sw / r;
                    let sprime = dsw / r - sw / (r * r);
                    let std = stats.dstd[ti][slot];
                    descriptor[i * nnei + slot] = (s - stats.davg[ti][slot]) / std;
                    for k3 in 0..3 {
                        // d s / d x_i = s'(r) * (-d / r), normalized.
                        descriptor_deriv[(i * nnei + slot) * 3 + k3] =
                            sprime * (-d[k3] / r) / std;
                        rij[(i * nnei + slot) * 3 + k3] = d[k3];
                    }
                    nlist[i * nnei + slot] = j as i64;
                }
            }
        }

        Ok(KernelOutput {
            descriptor,
            descriptor_deriv,
            rij,
            nlist,
            axis: Vec::new(),
        })
    }
}

fn mat3_inverse(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    let inv_det = 1.0 / det;
    let mut inv = [[0.0; 3]; 3];
    for r in 0..3 {
        for c in 0..3 {
            let (r1, r2) = ((r + 1) % 3, (r + 2) % 3);
            let (c1, c2) = ((c + 1) % 3, (c + 2) % 3);
            // Transposed cofactor.
            inv[c][r] = (m[r1][c1] * m[r2][c2] - m[r1][c2] * m[r2][c1]) * inv_det;
        }
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trivial_stats(ntypes: usize, ndescrpt: usize) -> DescriptorStats {
        DescriptorStats::trivial(ntypes, ndescrpt)
    }

    #[test]
    fn switch_endpoints_and_interior() {
        let (v, d) = spline5_switch(0.5, 1.0, 3.0);
        assert_eq!((v, d), (1.0, 0.0));
        let (v, d) = spline5_switch(3.0, 1.0, 3.0);
        assert_eq!((v, d), (0.0, 0.0));
        let (v, _) = spline5_switch(2.0, 1.0, 3.0);
        assert!((v - 0.5).abs() < 1e-12);
        // Numerical derivative agrees in the interior.
        let eps = 1e-6;
        let (vp, _) = spline5_switch(2.2 + eps, 1.0, 3.0);
        let (vm, _) = spline5_switch(2.2 - eps, 1.0, 3.0);
        let (_, d) = spline5_switch(2.2, 1.0, 3.0);
        assert!((d - (vp - vm) / (2.0 * eps)).abs() < 1e-8);
    }

    #[test]
    fn two_atom_descriptor_and_padding() {
        let kernel = RadialKernel::new(vec![2], 6.0, 6.0).unwrap();
        let system = System::new(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0], vec![0, 0]);
        let out = kernel.compute(&system, &trivial_stats(1, 2)).unwrap();
        // One real neighbor per atom, second slot padded.
        assert_eq!(out.nlist, vec![1, -1, 0, -1]);
        assert!((out.descriptor[0] - 0.5).abs() < 1e-12);
        assert_eq!(out.descriptor[1], 0.0);
        // rij points from center to neighbor.
        assert!((out.rij[0] - 2.0).abs() < 1e-12);
        assert!((out.rij[6] + 2.0).abs() < 1e-12);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let kernel = RadialKernel::new(vec![2], 6.0, 4.0).unwrap();
        let stats = trivial_stats(1, 2);
        let base = vec![0.0, 0.0, 0.0, 2.0, 1.0, -0.5];
        let eps = 1e-6;
        let out = kernel.compute(&System::new(base.clone(), vec![0, 0]), &stats).unwrap();
        for k in 0..3 {
            // Move the center atom (atom 0) along axis k.
            let mut cp = base.clone();
            cp[k] += eps;
            let dp = kernel
                .compute(&System::new(cp, vec![0, 0]), &stats)
                .unwrap()
                .descriptor[0];
            let mut cm = base.clone();
            cm[k] -= eps;
            let dm = kernel
                .compute(&System::new(cm, vec![0, 0]), &stats)
                .unwrap()
                .descriptor[0];
            let fd = (dp - dm) / (2.0 * eps);
            assert!(
                (out.descriptor_deriv[k] - fd).abs() < 1e-6,
                "axis {k}: analytic {} vs fd {fd}",
                out.descriptor_deriv[k]
            );
        }
    }

    #[test]
    fn minimum_image_wraps_across_the_cell() {
        let kernel = RadialKernel::new(vec![1], 3.0, 3.0).unwrap();
        let cell = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];
        let system =
            System::new(vec![0.5, 0.0, 0.0, 9.5, 0.0, 0.0], vec![0, 0]).with_cell(cell);
        let out = kernel.compute(&system, &trivial_stats(1, 1)).unwrap();
        assert_eq!(out.nlist[0], 1);
        // Image distance is 1.0, not 9.0.
        assert!((out.rij[0] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_neighbors_kept_on_overflow() {
        let kernel = RadialKernel::new(vec![1], 6.0, 6.0).unwrap();
        let system = System::new(
            vec![0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 1.5, 0.0, 0.0],
            vec![0, 0, 0],
        );
        let out = kernel.compute(&system, &trivial_stats(1, 1)).unwrap();
        // Atom 2 is closer to atom 0 than atom 1 is.
        assert_eq!(out.nlist[0], 2);
    }
}
