//! Interaction builder: descriptor -> networks -> energy, force, virial.
//!
//! The kernel supplies the descriptor and its analytic derivative tensor;
//! reverse-mode differentiation runs only through the networks, and the
//! two gradients meet in a chain-rule contraction over neighbor slots
//! (and axis assignments for the local-frame variant).

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::config::{DescriptorVariant, ModelConfig};
use super::error::Error;
use super::kernel::{DescriptorKernel, KernelOutput};
use super::network::{FilterNet, FittingNet};
use super::srtab::{self, PairTab};
use super::stats::DescriptorStats;
use crate::model::System;

/// Result of one forward/backward evaluation of a frame.
#[derive(Debug, Clone)]
pub struct Interaction {
    /// Total energy, the compensated sum of `atom_energy`.
    pub energy: f64,
    /// Per-atom energies (blended when a short-range table is active).
    pub atom_energy: Vec<f64>,
    /// Forces, `nall x 3`.
    pub force: Vec<f64>,
    /// Virial tensor, row-major 3x3.
    pub virial: [f64; 9],
    /// Per-atom virial decomposition, `nall x 9`.
    pub atom_virial: Vec<f64>,
}

/// A ready-to-evaluate potential: kernel, normalization, per-type networks,
/// and the optional short-range table. All state is fixed at construction;
/// evaluation never mutates.
pub struct Potential<K: DescriptorKernel> {
    config: ModelConfig,
    kernel: K,
    stats: DescriptorStats,
    fitting: Vec<FittingNet>,
    filter: Vec<FilterNet>,
    srtab: Option<PairTab>,
}

impl<K: DescriptorKernel> Potential<K> {
    /// Builds the per-type networks from the configured seed.
    ///
    /// `bias_atom_e` initializes each type's output bias (one entry per
    /// type); `srtab` must be present exactly when the configuration
    /// carries short-range switching parameters.
    pub fn new(
        config: ModelConfig,
        kernel: K,
        stats: DescriptorStats,
        bias_atom_e: Option<&[f64]>,
        srtab: Option<PairTab>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let ntypes = config.ntypes();
        if kernel.variant() != config.variant {
            return Err(Error::config(
                "descriptor kernel variant does not match the configuration",
            ));
        }
        if kernel.ndescrpt() != config.ndescrpt() || kernel.nnei() != config.nnei() {
            return Err(Error::config(format!(
                "kernel shape ({}, {}) does not match configuration ({}, {})",
                kernel.ndescrpt(),
                kernel.nnei(),
                config.ndescrpt(),
                config.nnei()
            )));
        }
        if stats.ntypes() != ntypes || stats.ndescrpt() != config.ndescrpt() {
            return Err(Error::config(format!(
                "normalization shape ({} x {}) does not match configuration ({} x {})",
                stats.ntypes(),
                stats.ndescrpt(),
                ntypes,
                config.ndescrpt()
            )));
        }
        if let Some(bias) = bias_atom_e {
            if bias.len() != ntypes {
                return Err(Error::SelectionMismatch {
                    key: "bias_atom_e",
                    expected: ntypes,
                    got: bias.len(),
                });
            }
        }
        match (&config.srtab, &srtab) {
            (Some(_), Some(tab)) if tab.ntypes() != ntypes => {
                return Err(Error::config(format!(
                    "short-range table covers {} types, configuration has {ntypes}",
                    tab.ntypes()
                )));
            }
            (Some(_), None) => {
                return Err(Error::config(
                    "configuration requests a short-range table but none was supplied",
                ));
            }
            (None, Some(_)) => {
                return Err(Error::config(
                    "a short-range table was supplied without switching parameters",
                ));
            }
            _ => {}
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut filter = Vec::new();
        let fit_in = match config.variant {
            DescriptorVariant::RadialOnly => {
                for _ in 0..ntypes {
                    filter.push(FilterNet::new(
                        &config.sel_r,
                        &config.filter_neuron,
                        config.filter_resnet_dt,
                        &mut rng,
                    ));
                }
                filter[0].out_width() + config.numb_fparam
            }
            DescriptorVariant::LocalFrame => config.ndescrpt() + config.numb_fparam,
        };
        let fitting = (0..ntypes)
            .map(|t| {
                FittingNet::new(
                    fit_in,
                    &config.n_neuron,
                    config.fitting_resnet_dt,
                    bias_atom_e.map_or(0.0, |b| b[t]),
                    &mut rng,
                )
            })
            .collect();

        Ok(Self {
            config,
            kernel,
            stats,
            fitting,
            filter,
            srtab,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn stats(&self) -> &DescriptorStats {
        &self.stats
    }

    /// Evaluates energy, force, and virial for one frame.
    pub fn evaluate(&self, system: &System, fparam: &[f64]) -> Result<Interaction, Error> {
        let config = &self.config;
        if fparam.len() != config.numb_fparam {
            return Err(Error::FrameParam {
                expected: config.numb_fparam,
                got: fparam.len(),
            });
        }
        let nat = system.natoms_vec(config.ntypes())?;
        let out = self.kernel.compute(system, &self.stats)?;
        let nd = config.ndescrpt();
        let nnei = config.nnei();
        let (nloc, nall) = (nat.nloc, nat.nall);
        check_kernel_shapes(&out, nloc, nd, nnei, self.kernel.deriv_width(), config.variant)?;

        // Per-type network routing: contiguous type slices, outputs kept in
        // original atom order.
        let mut net_energy = vec![0.0; nloc];
        let mut net_deriv = vec![0.0; nloc * nd];
        let mut grad_scale = vec![1.0; nloc];

        let mut blended = Vec::new();
        let mut sr = None;
        if let (Some(tab), Some(sw_cfg)) = (&self.srtab, &config.srtab) {
            // Forward pass first: the switch scaling needs the raw energies.
            self.forward_atoms(&out, &nat, fparam, nd, &mut net_energy, None)?;
            let sw = srtab::soft_min_switch(
                &out,
                nloc,
                nnei,
                sw_cfg.smin_alpha,
                sw_cfg.sw_rmin,
                sw_cfg.sw_rmax,
            );
            let tab_out = srtab::tab_inter(
                tab,
                &system.atom_types,
                &out,
                &sw.lambda,
                nloc,
                nnei,
                nall,
            );
            let energy_diff: Vec<f64> = (0..nloc)
                .map(|i| tab_out.atom_energy[i] - net_energy[i])
                .collect();
            blended = (0..nloc)
                .map(|i| {
                    sw.lambda[i] * tab_out.atom_energy[i] + (1.0 - sw.lambda[i]) * net_energy[i]
                })
                .collect();
            for i in 0..nloc {
                grad_scale[i] = 1.0 - sw.lambda[i];
            }
            sr = Some((sw, tab_out, energy_diff));
        }

        // Backward pass: gradient of the (blend-scaled) atomic energy with
        // respect to the descriptor.
        self.forward_atoms(
            &out,
            &nat,
            fparam,
            nd,
            &mut net_energy,
            Some((&grad_scale, &mut net_deriv)),
        )?;

        let (mut force, mut virial, mut atom_virial) = match config.variant {
            DescriptorVariant::RadialOnly => prod_radial(&net_deriv, &out, nloc, nall, nd),
            DescriptorVariant::LocalFrame => prod_local_frame(
                &net_deriv,
                &out,
                nloc,
                nall,
                nd,
                nnei,
                config.nnei_a(),
            ),
        };

        let atom_energy = if let Some((sw, tab_out, energy_diff)) = sr {
            let sw_force = srtab::soft_min_force(&energy_diff, &sw, &out.nlist, nloc, nnei, nall);
            let (sw_virial, sw_atom_virial) =
                srtab::soft_min_virial(&energy_diff, &sw, &out.rij, &out.nlist, nloc, nnei, nall);
            for k in 0..nall * 3 {
                force[k] += sw_force[k] + tab_out.force[k];
            }
            for k in 0..9 {
                virial[k] += sw_virial[k];
            }
            for a in 0..nall {
                for k in 0..9 {
                    atom_virial[a * 9 + k] +=
                        sw_atom_virial[a * 9 + k] + tab_out.atom_virial[a * 9 + k];
                    virial[k] += tab_out.atom_virial[a * 9 + k];
                }
            }
            blended
        } else {
            net_energy
        };

        let mut total = KahanSum::default();
        for &e in &atom_energy {
            total.add(e);
        }

        Ok(Interaction {
            energy: total.value(),
            atom_energy,
            force,
            virial,
            atom_virial,
        })
    }

    /// Evaluates a batch of frames in order.
    pub fn evaluate_batch(
        &self,
        systems: &[System],
        fparam: &[f64],
    ) -> Result<Vec<Interaction>, Error> {
        systems.iter().map(|s| self.evaluate(s, fparam)).collect()
    }

    /// Runs the per-atom networks. With a gradient request, also runs the
    /// backward sweep, scaling each atom's seed gradient by `grad_scale`.
    fn forward_atoms(
        &self,
        out: &KernelOutput,
        nat: &crate::model::NatomsVec,
        fparam: &[f64],
        nd: usize,
        energies: &mut [f64],
        mut grad: Option<(&[f64], &mut Vec<f64>)>,
    ) -> Result<(), Error> {
        for t in 0..self.config.ntypes() {
            for i in nat.type_range(t) {
                let row = &out.descriptor[i * nd..(i + 1) * nd];
                match self.config.variant {
                    DescriptorVariant::RadialOnly => {
                        let (embed, fcache) = self.filter[t].forward(row);
                        let mut input = embed;
                        input.extend_from_slice(fparam);
                        let (e, cache) = self.fitting[t].forward(&input);
                        energies[i] = e;
                        if let Some((scale, net_deriv)) = grad.as_mut() {
                            let dinput = self.fitting[t].backward(&cache, scale[i]);
                            let demb = &dinput[..self.filter[t].out_width()];
                            let ddesc = self.filter[t].backward(&fcache, demb);
                            net_deriv[i * nd..(i + 1) * nd].copy_from_slice(&ddesc);
                        }
                    }
                    DescriptorVariant::LocalFrame => {
                        let mut input = row.to_vec();
                        input.extend_from_slice(fparam);
                        let (e, cache) = self.fitting[t].forward(&input);
                        energies[i] = e;
                        if let Some((scale, net_deriv)) = grad.as_mut() {
                            let dinput = self.fitting[t].backward(&cache, scale[i]);
                            net_deriv[i * nd..(i + 1) * nd].copy_from_slice(&dinput[..nd]);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_kernel_shapes(
    out: &KernelOutput,
    nloc: usize,
    nd: usize,
    nnei: usize,
    deriv_width: usize,
    variant: DescriptorVariant,
) -> Result<(), Error> {
    let expect = [
        (out.descriptor.len(), nloc * nd, "descriptor"),
        (out.descriptor_deriv.len(), nloc * nd * deriv_width, "descriptor_deriv"),
        (out.rij.len(), nloc * nnei * 3, "rij"),
        (out.nlist.len(), nloc * nnei, "nlist"),
    ];
    for (got, want, name) in expect {
        if got != want {
            return Err(Error::kernel(format!(
                "{name} has length {got}, expected {want}"
            )));
        }
    }
    if variant == DescriptorVariant::LocalFrame && out.axis.len() != nloc * 2 {
        return Err(Error::kernel(format!(
            "axis has length {}, expected {}",
            out.axis.len(),
            nloc * 2
        )));
    }
    Ok(())
}

/// Radial-only force/virial contraction.
///
/// The derivative tensor holds d(descriptor)/d(center coords); the
/// neighbor derivative is its negation, which fixes the sign bookkeeping
/// below (Newton's third law per slot).
fn prod_radial(
    net_deriv: &[f64],
    out: &KernelOutput,
    nloc: usize,
    nall: usize,
    nd: usize,
) -> (Vec<f64>, [f64; 9], Vec<f64>) {
    let mut force = vec![0.0; nall * 3];
    let mut virial = [0.0; 9];
    let mut atom_virial = vec![0.0; nall * 9];
    for i in 0..nloc {
        for slot in 0..nd {
            let pref = net_deriv[i * nd + slot];
            let base = (i * nd + slot) * 3;
            for k in 0..3 {
                force[i * 3 + k] -= pref * out.descriptor_deriv[base + k];
            }
            let j = out.nlist[i * nd + slot];
            if j < 0 {
                continue;
            }
            let j = j as usize;
            for d0 in 0..3 {
                force[j * 3 + d0] += pref * out.descriptor_deriv[base + d0];
                for d1 in 0..3 {
                    let tmp =
                        out.rij[base + d0] * pref * out.descriptor_deriv[base + d1];
                    virial[d0 * 3 + d1] -= tmp;
                    atom_virial[j * 9 + d0 * 3 + d1] -= tmp;
                }
            }
        }
    }
    (force, virial, atom_virial)
}

/// Local-frame force/virial contraction.
///
/// Each descriptor component carries derivatives with respect to four
/// atoms: the center, the two axis atoms, and the slot's neighbor. The
/// axis entries of `KernelOutput::axis` are neighbor-slot indices, so both
/// the partner atom and its displacement are recovered per slot.
fn prod_local_frame(
    net_deriv: &[f64],
    out: &KernelOutput,
    nloc: usize,
    nall: usize,
    nd: usize,
    nnei: usize,
    nnei_a: usize,
) -> (Vec<f64>, [f64; 9], Vec<f64>) {
    let mut force = vec![0.0; nall * 3];
    let mut virial = [0.0; 9];
    let mut atom_virial = vec![0.0; nall * 9];
    for i in 0..nloc {
        let axis_slots = [out.axis[i * 2], out.axis[i * 2 + 1]];
        for comp in 0..nd {
            let pref = net_deriv[i * nd + comp];
            let base = (i * nd + comp) * 12;
            // Component -> neighbor slot: angular slots carry 4 components.
            let slot = if comp < 4 * nnei_a {
                comp / 4
            } else {
                nnei_a + (comp - 4 * nnei_a)
            };
            for k in 0..3 {
                force[i * 3 + k] -= pref * out.descriptor_deriv[base + k];
            }
            let mut partners = [(axis_slots[0], 3), (axis_slots[1], 6), (slot as i64, 9)];
            if out.nlist[i * nnei + slot] < 0 {
                partners[2].0 = -1;
            }
            for &(pslot, off) in &partners {
                if pslot < 0 {
                    continue;
                }
                let pslot = pslot as usize;
                let j = out.nlist[i * nnei + pslot];
                if j < 0 {
                    continue;
                }
                let j = j as usize;
                for d0 in 0..3 {
                    force[j * 3 + d0] -= pref * out.descriptor_deriv[base + off + d0];
                    for d1 in 0..3 {
                        let tmp = out.rij[(i * nnei + pslot) * 3 + d0]
                            * pref
                            * out.descriptor_deriv[base + off + d1];
                        virial[d0 * 3 + d1] += tmp;
                        atom_virial[j * 9 + d0 * 3 + d1] += tmp;
                    }
                }
            }
        }
    }
    (force, virial, atom_virial)
}

/// Compensated (Kahan) accumulator for the total-energy reduction.
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    comp: f64,
}

impl KahanSum {
    pub fn add(&mut self, v: f64) {
        let y = v - self.comp;
        let t = self.sum + y;
        self.comp = (t - self.sum) - y;
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum
    }
}
