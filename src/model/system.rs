use crate::potential::Error;
use std::ops::Range;

/// One frame of a molecular system.
///
/// Coordinates are flattened `[x0, y0, z0, x1, ...]`. The first
/// `nall - nghost` atoms are local and must be sorted by type id; ghost
/// atoms (periodic images supplied by an external neighbor builder) follow
/// and may appear in any order.
#[derive(Debug, Clone, Default)]
pub struct System {
    pub coords: Vec<f64>,
    pub atom_types: Vec<usize>,
    pub cell: Option<[[f64; 3]; 3]>,
    pub nghost: usize,
}

impl System {
    pub fn new(coords: Vec<f64>, atom_types: Vec<usize>) -> Self {
        Self {
            coords,
            atom_types,
            cell: None,
            nghost: 0,
        }
    }

    pub fn with_cell(mut self, cell: [[f64; 3]; 3]) -> Self {
        self.cell = Some(cell);
        self
    }

    #[inline]
    pub fn nall(&self) -> usize {
        self.atom_types.len()
    }

    #[inline]
    pub fn nloc(&self) -> usize {
        self.nall() - self.nghost
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.cell.is_some()
    }

    /// Builds the atom-count vector for `ntypes` types, validating shapes.
    ///
    /// Fails if the coordinate length does not match the atom count, a type
    /// id is out of range, or the local atoms are not sorted by type.
    pub fn natoms_vec(&self, ntypes: usize) -> Result<NatomsVec, Error> {
        let nall = self.nall();
        if self.nghost > nall {
            return Err(Error::system(format!(
                "nghost ({}) exceeds atom count ({nall})",
                self.nghost
            )));
        }
        let nloc = self.nloc();
        if self.coords.len() != 3 * nall {
            return Err(Error::system(format!(
                "coordinate length {} does not match 3 x {nall} atoms",
                self.coords.len()
            )));
        }
        let mut per_type = vec![0usize; ntypes];
        let mut prev = 0usize;
        for (i, &t) in self.atom_types.iter().enumerate() {
            if t >= ntypes {
                return Err(Error::system(format!(
                    "atom {i} has type {t}, but only {ntypes} types are configured"
                )));
            }
            if i < nloc {
                if t < prev {
                    return Err(Error::system(format!(
                        "local atoms must be sorted by type (atom {i} has type {t} after {prev})"
                    )));
                }
                prev = t;
                per_type[t] += 1;
            }
        }
        Ok(NatomsVec {
            nloc,
            nall,
            per_type,
        })
    }
}

/// Atom counts of a frame: locals, locals plus ghosts, and per-type counts.
///
/// Local atoms are partitioned into contiguous per-type slices in type-id
/// order; [`type_range`](NatomsVec::type_range) recovers each slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatomsVec {
    pub nloc: usize,
    pub nall: usize,
    pub per_type: Vec<usize>,
}

impl NatomsVec {
    /// Index range of the local atoms of type `t`.
    pub fn type_range(&self, t: usize) -> Range<usize> {
        let start: usize = self.per_type[..t].iter().sum();
        start..start + self.per_type[t]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natoms_vec_counts_and_ranges() {
        let system = System::new(vec![0.0; 12], vec![0, 0, 1, 1]);
        let nat = system.natoms_vec(2).unwrap();
        assert_eq!(nat.nloc, 4);
        assert_eq!(nat.nall, 4);
        assert_eq!(nat.per_type, vec![2, 2]);
        assert_eq!(nat.type_range(0), 0..2);
        assert_eq!(nat.type_range(1), 2..4);
    }

    #[test]
    fn unsorted_local_types_rejected() {
        let system = System::new(vec![0.0; 9], vec![1, 0, 1]);
        assert!(system.natoms_vec(2).is_err());
    }

    #[test]
    fn ghosts_need_not_be_sorted() {
        let mut system = System::new(vec![0.0; 12], vec![0, 1, 1, 0]);
        system.nghost = 1;
        let nat = system.natoms_vec(2).unwrap();
        assert_eq!(nat.nloc, 3);
        assert_eq!(nat.per_type, vec![1, 2]);
    }

    #[test]
    fn coordinate_length_checked() {
        let system = System::new(vec![0.0; 5], vec![0, 0]);
        assert!(system.natoms_vec(1).is_err());
    }
}
