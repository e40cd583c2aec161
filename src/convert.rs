//! Legacy checkpoint conversion dispatch.
//!
//! Old model checkpoints come in several on-disk generations; each needs a
//! different upgrade path to the current layout. The format-specific work
//! lives behind [`ModelConverter`], so the dispatch stays independent of
//! how any one generation is actually rewritten.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::potential::Error;

/// Checkpoint generations with a supported upgrade path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyVersion {
    V0_12,
    V1_0,
    V1_1,
    V1_2,
    V1_3,
    V2_0,
}

impl FromStr for LegacyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0.12" => Ok(Self::V0_12),
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            "1.2" => Ok(Self::V1_2),
            "1.3" => Ok(Self::V1_3),
            "2.0" => Ok(Self::V2_0),
            other => Err(Error::UnsupportedVersion(other.to_string())),
        }
    }
}

impl fmt::Display for LegacyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V0_12 => "0.12",
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
            Self::V2_0 => "2.0",
        };
        f.write_str(s)
    }
}

/// Generation-specific upgrade steps. Each method rewrites `input` into the
/// current checkpoint layout at `output`.
pub trait ModelConverter {
    fn convert_012_to_21(&self, input: &Path, output: &Path) -> Result<(), Error>;
    fn convert_10_to_21(&self, input: &Path, output: &Path) -> Result<(), Error>;
    fn convert_12_to_21(&self, input: &Path, output: &Path) -> Result<(), Error>;
    fn convert_13_to_21(&self, input: &Path, output: &Path) -> Result<(), Error>;
    fn convert_20_to_21(&self, input: &Path, output: &Path) -> Result<(), Error>;
}

/// Routes a checkpoint through the upgrade step for its generation.
///
/// The 1.1 and 1.2 layouts are identical on disk and share one converter.
pub fn convert<C: ModelConverter>(
    from: LegacyVersion,
    input: &Path,
    output: &Path,
    converter: &C,
) -> Result<(), Error> {
    match from {
        LegacyVersion::V0_12 => converter.convert_012_to_21(input, output),
        LegacyVersion::V1_0 => converter.convert_10_to_21(input, output),
        LegacyVersion::V1_1 | LegacyVersion::V1_2 => converter.convert_12_to_21(input, output),
        LegacyVersion::V1_3 => converter.convert_13_to_21(input, output),
        LegacyVersion::V2_0 => converter.convert_20_to_21(input, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
    }

    impl Recorder {
        fn record(&self, name: &'static str) -> Result<(), Error> {
            self.calls.borrow_mut().push(name);
            Ok(())
        }
    }

    impl ModelConverter for Recorder {
        fn convert_012_to_21(&self, _: &Path, _: &Path) -> Result<(), Error> {
            self.record("012")
        }
        fn convert_10_to_21(&self, _: &Path, _: &Path) -> Result<(), Error> {
            self.record("10")
        }
        fn convert_12_to_21(&self, _: &Path, _: &Path) -> Result<(), Error> {
            self.record("12")
        }
        fn convert_13_to_21(&self, _: &Path, _: &Path) -> Result<(), Error> {
            self.record("13")
        }
        fn convert_20_to_21(&self, _: &Path, _: &Path) -> Result<(), Error> {
            self.record("20")
        }
    }

    #[test]
    fn each_version_routes_to_its_converter() {
        let rec = Recorder::default();
        let p = Path::new("in");
        let q = Path::new("out");
        for v in ["0.12", "1.0", "1.1", "1.2", "1.3", "2.0"] {
            convert(v.parse().unwrap(), p, q, &rec).unwrap();
        }
        assert_eq!(
            *rec.calls.borrow(),
            vec!["012", "10", "12", "12", "13", "20"]
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = "0.9".parse::<LegacyVersion>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(s) if s == "0.9"));
    }

    #[test]
    fn display_round_trips() {
        for v in ["0.12", "1.0", "1.1", "1.2", "1.3", "2.0"] {
            let parsed: LegacyVersion = v.parse().unwrap();
            assert_eq!(parsed.to_string(), v);
        }
    }
}
