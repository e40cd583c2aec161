//! Short-range tabulated correction.
//!
//! A cubic-spline pair table supplies energies at small separations where
//! the network extrapolates poorly. Per atom, a soft-min of its neighbor
//! distances drives a smooth switching weight `lambda`; the blended atomic
//! energy is `lambda * tab + (1 - lambda) * net`. The tabulated force and
//! per-atom virial come back already scaled by `lambda` (the raw tabulated
//! energy is not), and the switching-derivative terms keep the blend
//! analytically consistent.

use super::error::Error;
use super::kernel::{spline5_switch, KernelOutput};

/// Tabulated short-range pair potential, one cubic spline per unordered
/// type pair over a uniform distance grid. Immutable once built.
#[derive(Debug, Clone)]
pub struct PairTab {
    ntypes: usize,
    rmin: f64,
    hh: f64,
    npoints: usize,
    /// `coeffs[pair][bin]` = (a, b, c, d) of `a + b dr + c dr^2 + d dr^3`.
    coeffs: Vec<[f64; 4]>,
}

impl PairTab {
    /// Builds natural cubic splines from `columns[pair_index(i, j)]`, each
    /// holding energies at `rmin + k * hh` for `k` in `0..npoints`.
    pub fn new(
        ntypes: usize,
        rmin: f64,
        hh: f64,
        columns: &[Vec<f64>],
    ) -> Result<Self, Error> {
        let npairs = ntypes * (ntypes + 1) / 2;
        if columns.len() != npairs {
            return Err(Error::table(format!(
                "expected {npairs} energy columns for {ntypes} types, got {}",
                columns.len()
            )));
        }
        if hh <= 0.0 {
            return Err(Error::table("grid spacing must be positive"));
        }
        let npoints = columns.first().map_or(0, Vec::len);
        if npoints < 2 {
            return Err(Error::table("each column needs at least two grid points"));
        }
        if columns.iter().any(|c| c.len() != npoints) {
            return Err(Error::table("energy columns have unequal lengths"));
        }
        let nbins = npoints - 1;
        let mut coeffs = Vec::with_capacity(npairs * nbins);
        for y in columns {
            let m = natural_spline_second_derivs(y, hh);
            for k in 0..nbins {
                let a = y[k];
                let b = (y[k + 1] - y[k]) / hh - hh * (2.0 * m[k] + m[k + 1]) / 6.0;
                let c = m[k] / 2.0;
                let d = (m[k + 1] - m[k]) / (6.0 * hh);
                coeffs.push([a, b, c, d]);
            }
        }
        Ok(Self {
            ntypes,
            rmin,
            hh,
            npoints,
            coeffs,
        })
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    /// Largest tabulated distance; the table is zero at and beyond it.
    pub fn cutoff(&self) -> f64 {
        self.rmin + self.hh * (self.npoints - 1) as f64
    }

    fn pair_index(&self, ti: usize, tj: usize) -> usize {
        let (i, j) = if ti <= tj { (ti, tj) } else { (tj, ti) };
        i * self.ntypes - i * (i + 1) / 2 + j
    }

    /// Tabulated energy and its distance derivative at `r`.
    ///
    /// Distances left of the grid clamp into the first bin; at or beyond
    /// the last grid point both values are zero.
    pub fn eval(&self, ti: usize, tj: usize, r: f64) -> (f64, f64) {
        if r >= self.cutoff() {
            return (0.0, 0.0);
        }
        let nbins = self.npoints - 1;
        let pos = ((r - self.rmin) / self.hh).max(0.0);
        let bin = (pos as usize).min(nbins - 1);
        let dr = r - (self.rmin + bin as f64 * self.hh);
        let [a, b, c, d] = self.coeffs[self.pair_index(ti, tj) * nbins + bin];
        let u = a + dr * (b + dr * (c + dr * d));
        let du = b + dr * (2.0 * c + dr * 3.0 * d);
        (u, du)
    }
}

fn natural_spline_second_derivs(y: &[f64], hh: f64) -> Vec<f64> {
    let n = y.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }
    // Thomas algorithm on the interior points; natural ends (m = 0).
    let mut diag = vec![4.0; n - 2];
    let mut rhs: Vec<f64> = (1..n - 1)
        .map(|k| 6.0 * (y[k + 1] - 2.0 * y[k] + y[k - 1]) / (hh * hh))
        .collect();
    for k in 1..n - 2 {
        let f = 1.0 / diag[k - 1];
        diag[k] -= f;
        rhs[k] -= f * rhs[k - 1];
    }
    for k in (0..n - 2).rev() {
        let upper = if k + 1 < n - 2 { m[k + 2] } else { 0.0 };
        m[k + 1] = (rhs[k] - upper) / diag[k];
    }
    m
}

/// Per-atom switching weight and its derivative with respect to each
/// neighbor's coordinates.
#[derive(Debug, Clone)]
pub(crate) struct SwitchOutput {
    pub lambda: Vec<f64>,
    /// `nloc x nnei x 3`, derivative of the atom's lambda w.r.t. `x_j`.
    pub deriv: Vec<f64>,
}

/// Soft-min switching over an atom's neighbor distances.
///
/// `smin = sum(exp(-r/alpha) r) / sum(exp(-r/alpha))`, pushed through the
/// quintic switch between `rmin` and `rmax`. Atoms without neighbors get
/// `lambda = 0` (pure network output).
pub(crate) fn soft_min_switch(
    out: &KernelOutput,
    nloc: usize,
    nnei: usize,
    alpha: f64,
    rmin: f64,
    rmax: f64,
) -> SwitchOutput {
    let mut lambda = vec![0.0; nloc];
    let mut deriv = vec![0.0; nloc * nnei * 3];
    for i in 0..nloc {
        let mut s0 = 0.0;
        let mut s1 = 0.0;
        for slot in 0..nnei {
            if out.nlist[i * nnei + slot] < 0 {
                continue;
            }
            let r = slot_distance(out, i, nnei, slot);
            let e = (-r / alpha).exp();
            s0 += e;
            s1 += e * r;
        }
        if s0 == 0.0 {
            continue;
        }
        let smin = s1 / s0;
        let (vv, dd) = spline5_switch(smin, rmin, rmax);
        lambda[i] = vv;
        if dd == 0.0 {
            continue;
        }
        for slot in 0..nnei {
            if out.nlist[i * nnei + slot] < 0 {
                continue;
            }
            let r = slot_distance(out, i, nnei, slot);
            let e = (-r / alpha).exp();
            let dsmin = (e / s0) * (1.0 + (smin - r) / alpha);
            for k in 0..3 {
                let rhat = out.rij[(i * nnei + slot) * 3 + k] / r;
                deriv[(i * nnei + slot) * 3 + k] = dd * dsmin * rhat;
            }
        }
    }
    SwitchOutput { lambda, deriv }
}

fn slot_distance(out: &KernelOutput, i: usize, nnei: usize, slot: usize) -> f64 {
    let base = (i * nnei + slot) * 3;
    let (x, y, z) = (out.rij[base], out.rij[base + 1], out.rij[base + 2]);
    (x * x + y * y + z * z).sqrt()
}

#[derive(Debug, Clone)]
pub(crate) struct TabOutput {
    /// Raw tabulated atomic energies (not scaled by lambda).
    pub atom_energy: Vec<f64>,
    /// Lambda-scaled pair forces, `nall x 3`.
    pub force: Vec<f64>,
    /// Lambda-scaled per-atom virials, `nall x 9`.
    pub atom_virial: Vec<f64>,
}

/// Tabulated pair interaction over the neighbor list.
///
/// Half of each pair energy is assigned to the center atom. Forces and
/// virials carry the center atom's switching weight, matching the blend's
/// `lambda * tab` term with `lambda` held constant.
pub(crate) fn tab_inter(
    tab: &PairTab,
    atom_types: &[usize],
    out: &KernelOutput,
    lambda: &[f64],
    nloc: usize,
    nnei: usize,
    nall: usize,
) -> TabOutput {
    let mut atom_energy = vec![0.0; nloc];
    let mut force = vec![0.0; nall * 3];
    let mut atom_virial = vec![0.0; nall * 9];
    for i in 0..nloc {
        let ti = atom_types[i];
        for slot in 0..nnei {
            let j = out.nlist[i * nnei + slot];
            if j < 0 {
                continue;
            }
            let j = j as usize;
            let r = slot_distance(out, i, nnei, slot);
            let (u, du) = tab.eval(ti, atom_types[j], r);
            atom_energy[i] += 0.5 * u;
            let pref = -0.5 * lambda[i] * du / r;
            for d0 in 0..3 {
                let rd0 = out.rij[(i * nnei + slot) * 3 + d0];
                let f = pref * rd0;
                force[j * 3 + d0] += f;
                force[i * 3 + d0] -= f;
                for d1 in 0..3 {
                    let rd1 = out.rij[(i * nnei + slot) * 3 + d1];
                    atom_virial[j * 9 + d0 * 3 + d1] -= rd0 * pref * rd1;
                }
            }
        }
    }
    TabOutput {
        atom_energy,
        force,
        atom_virial,
    }
}

/// Force term from the geometry dependence of the switching weight:
/// the blend contributes `energy_diff[i] * d lambda_i / d x`.
pub(crate) fn soft_min_force(
    energy_diff: &[f64],
    sw: &SwitchOutput,
    nlist: &[i64],
    nloc: usize,
    nnei: usize,
    nall: usize,
) -> Vec<f64> {
    let mut force = vec![0.0; nall * 3];
    for i in 0..nloc {
        for slot in 0..nnei {
            let j = nlist[i * nnei + slot];
            if j < 0 {
                continue;
            }
            let j = j as usize;
            for k in 0..3 {
                let f = energy_diff[i] * sw.deriv[(i * nnei + slot) * 3 + k];
                force[j * 3 + k] -= f;
                force[i * 3 + k] += f;
            }
        }
    }
    force
}

/// Virial counterpart of [`soft_min_force`], plus its per-atom split.
pub(crate) fn soft_min_virial(
    energy_diff: &[f64],
    sw: &SwitchOutput,
    rij: &[f64],
    nlist: &[i64],
    nloc: usize,
    nnei: usize,
    nall: usize,
) -> ([f64; 9], Vec<f64>) {
    let mut virial = [0.0; 9];
    let mut atom_virial = vec![0.0; nall * 9];
    for i in 0..nloc {
        for slot in 0..nnei {
            let j = nlist[i * nnei + slot];
            if j < 0 {
                continue;
            }
            let j = j as usize;
            for d0 in 0..3 {
                for d1 in 0..3 {
                    let tmp = rij[(i * nnei + slot) * 3 + d0]
                        * energy_diff[i]
                        * sw.deriv[(i * nnei + slot) * 3 + d1];
                    virial[d0 * 3 + d1] += tmp;
                    atom_virial[j * 9 + d0 * 3 + d1] += tmp;
                }
            }
        }
    }
    (virial, atom_virial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_reproduces_linear_data() {
        // Natural cubic splines are exact on linear data.
        let y: Vec<f64> = (0..6).map(|k| 3.0 - 0.5 * k as f64).collect();
        let tab = PairTab::new(1, 0.5, 0.2, &[y]).unwrap();
        let (u, du) = tab.eval(0, 0, 0.73);
        assert!((u - (3.0 - 0.5 * (0.73 - 0.5) / 0.2)).abs() < 1e-10);
        assert!((du + 2.5).abs() < 1e-10);
    }

    #[test]
    fn table_vanishes_beyond_grid() {
        let tab = PairTab::new(1, 0.2, 0.1, &[vec![5.0, 3.0, 1.0]]).unwrap();
        assert_eq!(tab.eval(0, 0, tab.cutoff()), (0.0, 0.0));
        assert_eq!(tab.eval(0, 0, 10.0), (0.0, 0.0));
    }

    #[test]
    fn pair_index_is_symmetric() {
        let cols = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]];
        let tab = PairTab::new(2, 0.1, 0.5, &cols).unwrap();
        assert_eq!(tab.eval(0, 1, 0.3), tab.eval(1, 0, 0.3));
    }

    #[test]
    fn column_count_checked() {
        assert!(matches!(
            PairTab::new(2, 0.1, 0.5, &[vec![0.0, 1.0]]),
            Err(Error::Table(_))
        ));
    }

    fn pair_output(r: f64) -> KernelOutput {
        KernelOutput {
            descriptor: vec![0.0; 2],
            descriptor_deriv: vec![0.0; 6],
            rij: vec![r, 0.0, 0.0, -r, 0.0, 0.0],
            nlist: vec![1, 0],
            axis: Vec::new(),
        }
    }

    #[test]
    fn switch_saturates_at_window_edges() {
        let below = soft_min_switch(&pair_output(0.8), 2, 1, 0.1, 1.0, 2.0);
        assert_eq!(below.lambda, vec![1.0, 1.0]);
        assert!(below.deriv.iter().all(|&d| d == 0.0));

        let above = soft_min_switch(&pair_output(2.5), 2, 1, 0.1, 1.0, 2.0);
        assert_eq!(above.lambda, vec![0.0, 0.0]);
        assert!(above.deriv.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn single_neighbor_soft_min_is_the_distance() {
        // With one neighbor smin == r, so lambda is the plain switch value.
        let sw = soft_min_switch(&pair_output(1.5), 2, 1, 0.25, 1.0, 2.0);
        let (vv, _) = spline5_switch(1.5, 1.0, 2.0);
        assert!((sw.lambda[0] - vv).abs() < 1e-12);
    }

    #[test]
    fn soft_min_force_obeys_newton() {
        let out = pair_output(1.5);
        let sw = soft_min_switch(&out, 2, 1, 0.25, 1.0, 2.0);
        let force = soft_min_force(&[0.7, 0.7], &sw, &out.nlist, 2, 1, 2);
        for k in 0..3 {
            assert!((force[k] + force[3 + k]).abs() < 1e-12);
        }
    }

    #[test]
    fn tab_inter_pair_energy_split_and_newton() {
        // Linear table U(r) = 4 - r on [0.5, 3.0].
        let y: Vec<f64> = (0..26).map(|k| 4.0 - (0.5 + 0.1 * k as f64)).collect();
        let tab = PairTab::new(1, 0.5, 0.1, &[y]).unwrap();
        let out = pair_output(1.5);
        let res = tab_inter(&tab, &[0, 0], &out, &[1.0, 1.0], 2, 1, 2);
        assert!((res.atom_energy[0] - 0.5 * 2.5).abs() < 1e-9);
        assert!((res.atom_energy[1] - 0.5 * 2.5).abs() < 1e-9);
        for k in 0..3 {
            assert!((res.force[k] + res.force[3 + k]).abs() < 1e-12);
        }
        // dU/dr = -1: the neighbor is pushed outward along +x.
        assert!(res.force[3] > 0.0);
    }
}
