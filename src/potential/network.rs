//! Per-type fitting and filter networks.
//!
//! Weights are drawn once from a seeded RNG and fixed afterwards; only
//! input gradients are ever needed (training is out of scope), so the
//! backward passes are hand-derived reverse-mode sweeps over a small
//! per-evaluation cache of activated layer outputs.

use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// How a layer's output connects to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// `out = tanh(x W + b)`
    Plain,
    /// Same width: `out = x + c * tanh(x W + b)` with `c` the learned
    /// timestep (or 1).
    Residual,
    /// Doubled width: `out = [x, x] + c * tanh(x W + b)`.
    Double,
}

/// One fully-connected layer. Row-major weights: `w[i * nout + o]`.
#[derive(Debug, Clone)]
struct Dense {
    nin: usize,
    nout: usize,
    w: Vec<f64>,
    b: Vec<f64>,
    idt: Option<Vec<f64>>,
}

impl Dense {
    fn new(nin: usize, nout: usize, bavg: f64, timestep: bool, rng: &mut StdRng) -> Self {
        let sigma = 1.0 / ((nin + nout) as f64).sqrt();
        let wdist = Normal::new(0.0, sigma).expect("finite weight stddev");
        let bdist = Normal::new(bavg, 1.0).expect("finite bias stddev");
        let w = (0..nin * nout).map(|_| wdist.sample(rng)).collect();
        let b = (0..nout).map(|_| bdist.sample(rng)).collect();
        let idt = if timestep {
            let tdist = Normal::new(1.0, 0.001).expect("finite timestep stddev");
            Some((0..nout).map(|_| tdist.sample(rng)).collect())
        } else {
            None
        };
        Self { nin, nout, w, b, idt }
    }

    fn affine(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.nin);
        let mut out = self.b.clone();
        for (i, &xi) in x.iter().enumerate() {
            let row = &self.w[i * self.nout..(i + 1) * self.nout];
            for (o, &wio) in row.iter().enumerate() {
                out[o] += xi * wio;
            }
        }
        out
    }

    /// Input gradient of the affine map: `dx = W dpre`.
    fn back_input(&self, dpre: &[f64]) -> Vec<f64> {
        debug_assert_eq!(dpre.len(), self.nout);
        let mut dx = vec![0.0; self.nin];
        for (i, dxi) in dx.iter_mut().enumerate() {
            let row = &self.w[i * self.nout..(i + 1) * self.nout];
            *dxi = row.iter().zip(dpre).map(|(&w, &g)| w * g).sum();
        }
        dx
    }
}

fn apply_layer(layer: &Dense, link: Link, h: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut y = layer.affine(h);
    for v in &mut y {
        *v = v.tanh();
    }
    let scale = |o: usize, v: f64| match &layer.idt {
        Some(idt) => idt[o] * v,
        None => v,
    };
    let out = match link {
        Link::Plain => y.clone(),
        Link::Residual => y
            .iter()
            .enumerate()
            .map(|(o, &v)| h[o] + scale(o, v))
            .collect(),
        Link::Double => y
            .iter()
            .enumerate()
            .map(|(o, &v)| h[o % layer.nin] + scale(o, v))
            .collect(),
    };
    (out, y)
}

/// Backward through one layer: consumes the output gradient `g` and the
/// cached activation `y`, returns the input gradient.
fn back_layer(layer: &Dense, link: Link, y: &[f64], g: &[f64]) -> Vec<f64> {
    let mut dpre = vec![0.0; layer.nout];
    for o in 0..layer.nout {
        let c = layer.idt.as_ref().map_or(1.0, |idt| idt[o]);
        let dy = match link {
            Link::Plain => g[o],
            Link::Residual | Link::Double => g[o] * c,
        };
        dpre[o] = dy * (1.0 - y[o] * y[o]);
    }
    let mut dx = layer.back_input(&dpre);
    match link {
        Link::Plain => {}
        Link::Residual => {
            for (i, dxi) in dx.iter_mut().enumerate() {
                *dxi += g[i];
            }
        }
        Link::Double => {
            for (i, dxi) in dx.iter_mut().enumerate() {
                *dxi += g[i] + g[i + layer.nin];
            }
        }
    }
    dx
}

/// Per-type fitting network: hidden tanh stack ending in a single linear
/// output whose bias is initialized to the type's energy offset.
#[derive(Debug, Clone)]
pub struct FittingNet {
    hidden: Vec<Dense>,
    links: Vec<Link>,
    out: Dense,
}

/// Activations cached by [`FittingNet::forward`] for one atom.
pub struct FitCache {
    ys: Vec<Vec<f64>>,
}

impl FittingNet {
    /// `n_in` includes any frame parameters appended to the descriptor.
    pub fn new(
        n_in: usize,
        widths: &[usize],
        resnet_dt: bool,
        bias_energy: f64,
        rng: &mut StdRng,
    ) -> Self {
        let mut hidden = Vec::with_capacity(widths.len());
        let mut links = Vec::with_capacity(widths.len());
        let mut prev = n_in;
        for (i, &width) in widths.iter().enumerate() {
            let link = if i > 0 && width == prev {
                Link::Residual
            } else {
                Link::Plain
            };
            let timestep = resnet_dt && link == Link::Residual;
            hidden.push(Dense::new(prev, width, 0.0, timestep, rng));
            links.push(link);
            prev = width;
        }
        let out = Dense::new(prev, 1, bias_energy, false, rng);
        Self { hidden, links, out }
    }

    pub fn forward(&self, x: &[f64]) -> (f64, FitCache) {
        let mut h = x.to_vec();
        let mut ys = Vec::with_capacity(self.hidden.len());
        for (layer, &link) in self.hidden.iter().zip(&self.links) {
            let (next, y) = apply_layer(layer, link, &h);
            ys.push(y);
            h = next;
        }
        let e = self.out.affine(&h)[0];
        (e, FitCache { ys })
    }

    /// Gradient of `de * energy` with respect to the input vector.
    pub fn backward(&self, cache: &FitCache, de: f64) -> Vec<f64> {
        let mut g = self.out.back_input(&[de]);
        for ((layer, &link), y) in self.hidden.iter().zip(&self.links).zip(&cache.ys).rev() {
            g = back_layer(layer, link, y, &g);
        }
        g
    }
}

/// Per-center-type filter network for the radial-only descriptor.
///
/// One chain of layers per neighbor type maps each neighbor's scalar
/// descriptor to an embedding; embeddings are averaged over the full
/// neighbor axis (padded slots included) and rescaled by 1/5.
#[derive(Debug, Clone)]
pub struct FilterNet {
    chains: Vec<FilterChain>,
    sel: Vec<usize>,
    nnei: usize,
    width: usize,
}

#[derive(Debug, Clone)]
struct FilterChain {
    layers: Vec<Dense>,
    links: Vec<Link>,
}

/// Activations cached by [`FilterNet::forward`] for one atom.
pub struct FilterCache {
    slots: Vec<Vec<Vec<f64>>>,
}

const FILTER_RESCALE: f64 = 1.0 / 5.0;

impl FilterNet {
    pub fn new(sel: &[usize], widths: &[usize], resnet_dt: bool, rng: &mut StdRng) -> Self {
        let mut chains = Vec::with_capacity(sel.len());
        for _ in sel {
            let mut layers = Vec::with_capacity(widths.len());
            let mut links = Vec::with_capacity(widths.len());
            let mut prev = 1usize;
            for &width in widths {
                let link = if width == prev {
                    Link::Residual
                } else if width == 2 * prev {
                    Link::Double
                } else {
                    Link::Plain
                };
                let timestep = resnet_dt && link != Link::Plain;
                layers.push(Dense::new(prev, width, 0.0, timestep, rng));
                links.push(link);
                prev = width;
            }
            chains.push(FilterChain { layers, links });
        }
        Self {
            chains,
            sel: sel.to_vec(),
            nnei: sel.iter().sum(),
            width: *widths.last().expect("filter_neuron validated nonempty"),
        }
    }

    /// Embedding width fed to the fitting network.
    pub fn out_width(&self) -> usize {
        self.width
    }

    /// `descriptor` holds one scalar per neighbor slot (`nnei` entries).
    pub fn forward(&self, descriptor: &[f64]) -> (Vec<f64>, FilterCache) {
        debug_assert_eq!(descriptor.len(), self.nnei);
        let mut sum = vec![0.0; self.width];
        let mut slots = Vec::with_capacity(self.nnei);
        let mut slot = 0;
        for (chain, &count) in self.chains.iter().zip(&self.sel) {
            for _ in 0..count {
                let mut h = vec![descriptor[slot]];
                let mut ys = Vec::with_capacity(chain.layers.len());
                for (layer, &link) in chain.layers.iter().zip(&chain.links) {
                    let (next, y) = apply_layer(layer, link, &h);
                    ys.push(y);
                    h = next;
                }
                for (s, &v) in sum.iter_mut().zip(&h) {
                    *s += v;
                }
                slots.push(ys);
                slot += 1;
            }
        }
        let norm = FILTER_RESCALE / self.nnei as f64;
        for s in &mut sum {
            *s *= norm;
        }
        (sum, FilterCache { slots })
    }

    /// Pulls the embedding gradient back to per-slot descriptor gradients.
    pub fn backward(&self, cache: &FilterCache, dout: &[f64]) -> Vec<f64> {
        debug_assert_eq!(dout.len(), self.width);
        let norm = FILTER_RESCALE / self.nnei as f64;
        let seed: Vec<f64> = dout.iter().map(|&g| g * norm).collect();
        let mut ddesc = vec![0.0; self.nnei];
        let mut slot = 0;
        for (chain, &count) in self.chains.iter().zip(&self.sel) {
            for _ in 0..count {
                let mut g = seed.clone();
                for ((layer, &link), y) in chain
                    .layers
                    .iter()
                    .zip(&chain.links)
                    .zip(&cache.slots[slot])
                    .rev()
                {
                    g = back_layer(layer, link, y, &g);
                }
                ddesc[slot] = g[0];
                slot += 1;
            }
        }
        ddesc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn seeded_construction_is_deterministic() {
        let a = FittingNet::new(4, &[8, 8], true, -1.5, &mut rng(7));
        let b = FittingNet::new(4, &[8, 8], true, -1.5, &mut rng(7));
        let x = [0.3, -0.1, 0.7, 0.05];
        assert_eq!(a.forward(&x).0, b.forward(&x).0);
    }

    #[test]
    fn fitting_backward_matches_finite_difference() {
        let net = FittingNet::new(5, &[10, 10, 6], true, 0.2, &mut rng(11));
        let x = [0.4, -0.8, 0.1, 0.9, -0.3];
        let (_, cache) = net.forward(&x);
        let grad = net.backward(&cache, 1.0);
        let eps = 1e-6;
        for i in 0..x.len() {
            let mut xp = x;
            xp[i] += eps;
            let mut xm = x;
            xm[i] -= eps;
            let fd = (net.forward(&xp).0 - net.forward(&xm).0) / (2.0 * eps);
            assert!(
                (grad[i] - fd).abs() < 1e-7,
                "component {i}: analytic {} vs fd {fd}",
                grad[i]
            );
        }
    }

    #[test]
    fn fitting_backward_scales_linearly() {
        let net = FittingNet::new(3, &[6], false, 0.0, &mut rng(3));
        let x = [0.2, 0.5, -0.4];
        let (_, cache) = net.forward(&x);
        let g1 = net.backward(&cache, 1.0);
        let g2 = net.backward(&cache, -2.5);
        for (a, b) in g1.iter().zip(&g2) {
            assert!((b - a * -2.5).abs() < 1e-12);
        }
    }

    #[test]
    fn filter_backward_matches_finite_difference() {
        // Widths 1 -> 2 (double) -> 4 (double) -> 4 (residual).
        let net = FilterNet::new(&[2, 1], &[2, 4, 4], true, &mut rng(23));
        let desc = [0.7, -0.2, 0.35];
        let (out, cache) = net.forward(&desc);
        assert_eq!(out.len(), 4);
        // Scalar objective: sum of embedding components.
        let dout = vec![1.0; 4];
        let grad = net.backward(&cache, &dout);
        let eps = 1e-6;
        for i in 0..desc.len() {
            let mut dp = desc;
            dp[i] += eps;
            let mut dm = desc;
            dm[i] -= eps;
            let op: f64 = net.forward(&dp).0.iter().sum();
            let om: f64 = net.forward(&dm).0.iter().sum();
            let fd = (op - om) / (2.0 * eps);
            assert!(
                (grad[i] - fd).abs() < 1e-7,
                "slot {i}: analytic {} vs fd {fd}",
                grad[i]
            );
        }
    }

    #[test]
    fn filter_mean_includes_padded_slots() {
        let net = FilterNet::new(&[3], &[2], false, &mut rng(5));
        // A padded slot (descriptor 0) still contributes tanh(b) terms.
        let (out_padded, _) = net.forward(&[0.5, 0.0, 0.0]);
        let (out_one, _) = net.forward(&[0.5, 0.5, 0.5]);
        assert_ne!(out_padded, out_one);
    }

    #[test]
    fn final_bias_shifts_energy() {
        let a = FittingNet::new(2, &[4], false, 0.0, &mut rng(1));
        let b = FittingNet::new(2, &[4], false, 10.0, &mut rng(1));
        let x = [0.1, 0.2];
        let d = b.forward(&x).0 - a.forward(&x).0;
        // Same seed, same draws; only the output bias mean differs.
        assert!((d - 10.0).abs() < 1e-9);
    }
}
