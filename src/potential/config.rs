use super::error::Error;
use serde::Deserialize;

/// Which descriptor the model is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorVariant {
    /// Full angular/radial descriptor with a local reference frame fixed
    /// by two axis atoms per center.
    LocalFrame,
    /// Radial-only descriptor ("SeR"): one smoothed inverse distance per
    /// neighbor slot, fed through a per-type filter network.
    RadialOnly,
}

/// Model configuration. Immutable after construction.
///
/// Required keys depend on the variant; [`validate`](ModelConfig::validate)
/// raises a fatal error on any inconsistency. The legacy key spellings
/// `fitting_neuron` (for `n_neuron`) and `resnet_dt` (for
/// `fitting_resnet_dt`) are accepted when deserializing.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub variant: DescriptorVariant,
    /// Angular neighbor slots per type. Ignored by the radial-only variant.
    #[serde(default)]
    pub sel_a: Vec<usize>,
    /// Radial neighbor slots per type. Its length fixes the number of types.
    pub sel_r: Vec<usize>,
    /// Neighbor cutoff radius.
    #[serde(alias = "rcut_r")]
    pub rcut: f64,
    /// Where the radial descriptor starts switching off. Defaults to `rcut`.
    #[serde(default)]
    pub rcut_smth: Option<f64>,
    /// Axis-atom assignment rule, six integers per type (local-frame only).
    #[serde(default)]
    pub axis_rule: Vec<i32>,
    /// Hidden-layer widths of the fitting network.
    #[serde(alias = "fitting_neuron")]
    pub n_neuron: Vec<usize>,
    /// Residual timestep scaling in the fitting network.
    #[serde(default = "default_resnet_dt", alias = "resnet_dt")]
    pub fitting_resnet_dt: bool,
    /// Layer widths of the per-neighbor filter network (radial-only).
    #[serde(default)]
    pub filter_neuron: Vec<usize>,
    /// Residual timestep scaling in the filter network.
    #[serde(default)]
    pub filter_resnet_dt: bool,
    /// Number of extra scalar frame parameters appended to the fitting input.
    #[serde(default)]
    pub numb_fparam: usize,
    /// Optional type names, one per type.
    #[serde(default)]
    pub type_map: Vec<String>,
    /// Accepted for compatibility with older configurations; unused here.
    #[serde(default = "default_coord_norm")]
    pub coord_norm: bool,
    /// Seed for the network weight initialization.
    #[serde(default)]
    pub seed: u64,
    /// Short-range tabulated correction, absent by default.
    #[serde(default)]
    pub srtab: Option<SrTabConfig>,
}

/// Switching parameters for the optional short-range correction.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SrTabConfig {
    /// Soft-min sharpness; smaller values weigh the closest pair harder.
    pub smin_alpha: f64,
    /// Below this soft-min distance the tabulated potential takes over fully.
    pub sw_rmin: f64,
    /// Above this soft-min distance the network output is used unchanged.
    pub sw_rmax: f64,
}

fn default_resnet_dt() -> bool {
    true
}

fn default_coord_norm() -> bool {
    true
}

impl ModelConfig {
    /// Configuration for the full local-frame descriptor.
    pub fn local_frame(
        sel_a: Vec<usize>,
        sel_r: Vec<usize>,
        rcut: f64,
        axis_rule: Vec<i32>,
        n_neuron: Vec<usize>,
    ) -> Result<Self, Error> {
        let config = Self {
            variant: DescriptorVariant::LocalFrame,
            sel_a,
            sel_r,
            rcut,
            rcut_smth: None,
            axis_rule,
            n_neuron,
            fitting_resnet_dt: true,
            filter_neuron: Vec::new(),
            filter_resnet_dt: false,
            numb_fparam: 0,
            type_map: Vec::new(),
            coord_norm: true,
            seed: 0,
            srtab: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for the radial-only descriptor.
    pub fn radial_only(
        sel_r: Vec<usize>,
        rcut: f64,
        rcut_smth: f64,
        filter_neuron: Vec<usize>,
        n_neuron: Vec<usize>,
    ) -> Result<Self, Error> {
        let config = Self {
            variant: DescriptorVariant::RadialOnly,
            sel_a: Vec::new(),
            sel_r,
            rcut,
            rcut_smth: Some(rcut_smth),
            axis_rule: Vec::new(),
            n_neuron,
            fitting_resnet_dt: true,
            filter_neuron,
            filter_resnet_dt: false,
            numb_fparam: 0,
            type_map: Vec::new(),
            coord_norm: true,
            seed: 0,
            srtab: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration from a TOML document.
    pub fn from_toml(doc: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(doc)?;
        config.validate()?;
        Ok(config)
    }

    pub fn ntypes(&self) -> usize {
        self.sel_r.len()
    }

    pub fn nnei_a(&self) -> usize {
        match self.variant {
            DescriptorVariant::LocalFrame => self.sel_a.iter().sum(),
            DescriptorVariant::RadialOnly => 0,
        }
    }

    pub fn nnei_r(&self) -> usize {
        self.sel_r.iter().sum()
    }

    pub fn nnei(&self) -> usize {
        self.nnei_a() + self.nnei_r()
    }

    /// Flattened descriptor width per atom.
    pub fn ndescrpt(&self) -> usize {
        match self.variant {
            DescriptorVariant::LocalFrame => 4 * self.nnei_a() + self.nnei_r(),
            DescriptorVariant::RadialOnly => self.nnei_r(),
        }
    }

    /// Effective smoothing cutoff (defaults to `rcut`).
    pub fn smoothing_cutoff(&self) -> f64 {
        self.rcut_smth.unwrap_or(self.rcut)
    }

    /// Checks the configuration, raising the first fatal inconsistency.
    pub fn validate(&self) -> Result<(), Error> {
        let ntypes = self.ntypes();
        if ntypes == 0 {
            return Err(Error::config("sel_r must list at least one atom type"));
        }
        if self.rcut <= 0.0 {
            return Err(Error::config(format!(
                "cutoff radius must be positive, got {}",
                self.rcut
            )));
        }
        let rcut_smth = self.smoothing_cutoff();
        if rcut_smth <= 0.0 || rcut_smth > self.rcut {
            return Err(Error::config(format!(
                "rcut_smth must lie in (0, rcut], got {rcut_smth}"
            )));
        }
        if self.n_neuron.is_empty() {
            return Err(Error::config("n_neuron must list at least one layer"));
        }
        match self.variant {
            DescriptorVariant::LocalFrame => {
                if self.sel_a.len() != ntypes {
                    return Err(Error::SelectionMismatch {
                        key: "sel_a",
                        expected: ntypes,
                        got: self.sel_a.len(),
                    });
                }
                if self.axis_rule.len() != 6 * ntypes {
                    return Err(Error::SelectionMismatch {
                        key: "axis_rule",
                        expected: 6 * ntypes,
                        got: self.axis_rule.len(),
                    });
                }
            }
            DescriptorVariant::RadialOnly => {
                if self.filter_neuron.is_empty() {
                    return Err(Error::config(
                        "filter_neuron must list at least one layer for the radial-only variant",
                    ));
                }
            }
        }
        if !self.type_map.is_empty() && self.type_map.len() != ntypes {
            return Err(Error::SelectionMismatch {
                key: "type_map",
                expected: ntypes,
                got: self.type_map.len(),
            });
        }
        if let Some(srtab) = &self.srtab {
            if srtab.smin_alpha <= 0.0 {
                return Err(Error::config("smin_alpha must be positive"));
            }
            if srtab.sw_rmin >= srtab.sw_rmax {
                return Err(Error::config(format!(
                    "sw_rmin ({}) must be below sw_rmax ({})",
                    srtab.sw_rmin, srtab.sw_rmax
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_identities_local_frame() {
        let config = ModelConfig::local_frame(
            vec![16, 8],
            vec![4, 2],
            6.0,
            vec![0; 12],
            vec![240, 120, 60],
        )
        .unwrap();
        assert_eq!(config.ntypes(), 2);
        assert_eq!(config.nnei_a(), 24);
        assert_eq!(config.nnei_r(), 6);
        assert_eq!(config.nnei(), 30);
        assert_eq!(config.ndescrpt(), 4 * 24 + 6);
    }

    #[test]
    fn shape_identities_radial_only() {
        let config =
            ModelConfig::radial_only(vec![10, 20], 6.0, 5.5, vec![5, 10], vec![60, 60]).unwrap();
        assert_eq!(config.nnei_a(), 0);
        assert_eq!(config.nnei(), 30);
        assert_eq!(config.ndescrpt(), 30);
    }

    #[test]
    fn missing_required_key_is_fatal() {
        // No sel_r.
        let doc = r#"
            variant = "radial_only"
            rcut = 6.0
            n_neuron = [20]
            filter_neuron = [10]
        "#;
        match ModelConfig::from_toml(doc) {
            Err(Error::ConfigParse(_)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn legacy_key_aliases() {
        let doc = r#"
            variant = "radial_only"
            sel_r = [4]
            rcut = 6.0
            rcut_smth = 5.0
            fitting_neuron = [20, 20]
            resnet_dt = false
            filter_neuron = [8]
        "#;
        let config = ModelConfig::from_toml(doc).unwrap();
        assert_eq!(config.n_neuron, vec![20, 20]);
        assert!(!config.fitting_resnet_dt);
    }

    #[test]
    fn sel_length_mismatch_is_fatal() {
        let err = ModelConfig::local_frame(vec![8], vec![2, 2], 6.0, vec![0; 12], vec![20])
            .unwrap_err();
        match err {
            Error::SelectionMismatch { key: "sel_a", expected: 2, got: 1 } => {}
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn srtab_window_must_be_ordered() {
        let mut config =
            ModelConfig::radial_only(vec![2], 6.0, 5.0, vec![8], vec![20]).unwrap();
        config.srtab = Some(SrTabConfig {
            smin_alpha: 0.1,
            sw_rmin: 2.0,
            sw_rmax: 1.0,
        });
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
