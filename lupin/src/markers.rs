//! Marker names and marker subsets
//!
//! Cytometry files name each column twice: a channel identifier
//! (`Nd142Di`, `FL1-A`) and an optional marker description (`CD19`).
//! Clustering works on the subset of columns whose marker names match
//! a list of patterns, e.g., the surface markers.

use crate::error::{LupinError, Result};
use fnv::FnvHashMap as HashMap;
use std::collections::BTreeSet;

/// Name patterns that pick out the usual surface markers
pub const DEFAULT_SURFACE_PATTERNS: [&str; 5] = ["CD", "Ig", "HLA", "CCR", "CXC"];

const PLACEHOLDERS: [&str; 7] = ["", "na", "nan", "none", "null", "-", "_"];

/// Is this description missing or a placeholder?
fn is_placeholder(desc: &str) -> bool {
    let desc = desc.trim();
    PLACEHOLDERS.iter().any(|p| desc.eq_ignore_ascii_case(p))
}

/// Trim and join internal whitespace with `_`
fn tidy(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Human-readable, unique marker names.
///
/// * `channels` - channel identifiers, one per column
/// * `descriptions` - marker descriptions; a missing or placeholder
///   description falls back to the channel identifier
///
/// Repeated names get `_2`, `_3`, ... suffixes in column order.
pub fn clean_marker_names(
    channels: &[Box<str>],
    descriptions: &[Option<Box<str>>],
) -> Vec<Box<str>> {
    let raw: Vec<String> = channels
        .iter()
        .enumerate()
        .map(|(j, ch)| match descriptions.get(j) {
            Some(Some(desc)) if !is_placeholder(desc) => tidy(desc),
            _ => tidy(ch),
        })
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::default();
    let mut taken: BTreeSet<String> = raw.iter().cloned().collect();

    raw.into_iter()
        .map(|name| {
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                return name.into_boxed_str();
            }
            let mut k = *count;
            let mut candidate = format!("{}_{}", name, k);
            while taken.contains(&candidate) {
                k += 1;
                candidate = format!("{}_{}", name, k);
            }
            taken.insert(candidate.clone());
            candidate.into_boxed_str()
        })
        .collect()
}

/// Column indices chosen for clustering, sorted and unique, with
/// their names
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSubset {
    pub indices: Vec<usize>,
    pub names: Vec<Box<str>>,
}

impl MarkerSubset {
    /// Take the given columns. Indices are sorted and de-duplicated;
    /// every index must be a valid column of `marker_names`.
    pub fn from_indices(marker_names: &[Box<str>], indices: &[usize]) -> Result<Self> {
        let indices: Vec<usize> = indices
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if let Some(&bad) = indices.iter().find(|&&j| j >= marker_names.len()) {
            return Err(LupinError::InvalidSubset {
                index: bad,
                ncols: marker_names.len(),
            });
        }

        let names = indices.iter().map(|&j| marker_names[j].clone()).collect();
        Ok(Self { indices, names })
    }

    /// Every column
    pub fn all(marker_names: &[Box<str>]) -> Self {
        Self {
            indices: (0..marker_names.len()).collect(),
            names: marker_names.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Check the subset against a matrix with `ncols` columns
    pub fn check_bounds(&self, ncols: usize) -> Result<()> {
        match self.indices.iter().find(|&&j| j >= ncols) {
            Some(&bad) => Err(LupinError::InvalidSubset { index: bad, ncols }),
            None => Ok(()),
        }
    }
}

/// Columns whose names contain any of the patterns (case-sensitive
/// substring match). The result does not depend on the order of the
/// patterns.
pub fn select_markers<S: AsRef<str>>(marker_names: &[Box<str>], patterns: &[S]) -> MarkerSubset {
    let indices: Vec<usize> = marker_names
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            patterns
                .iter()
                .any(|p| !p.as_ref().is_empty() && name.contains(p.as_ref()))
        })
        .map(|(j, _)| j)
        .collect();

    let names = indices.iter().map(|&j| marker_names[j].clone()).collect();
    MarkerSubset { indices, names }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(xs: &[&str]) -> Vec<Box<str>> {
        xs.iter().map(|&x| x.into()).collect()
    }

    #[test]
    fn test_placeholder_falls_back_to_channel() {
        let channels = boxed(&["Time", "Nd142Di", "Nd144Di", "Sm147Di"]);
        let desc = vec![None, Some("CD19".into()), Some(" NA ".into()), Some("HLA DR".into())];

        let names = clean_marker_names(&channels, &desc);
        assert_eq!(names, boxed(&["Time", "CD19", "Nd144Di", "HLA_DR"]));
    }

    #[test]
    fn test_duplicate_names_become_unique() {
        let channels = boxed(&["a", "b", "c", "d"]);
        let desc = vec![
            Some("CD4".into()),
            Some("CD4".into()),
            Some("CD4_2".into()),
            Some("CD4".into()),
        ];
        let names = clean_marker_names(&channels, &desc);
        assert_eq!(names, boxed(&["CD4", "CD4_3", "CD4_2", "CD4_4"]));
    }

    #[test]
    fn test_select_union_ignores_pattern_order() {
        let names = boxed(&["Time", "CD3", "IgD", "HLA_DR", "pSTAT5", "CCR7", "CXCR5", "CD45RA"]);

        let a = select_markers(&names, &DEFAULT_SURFACE_PATTERNS);
        let b = select_markers(&names, &["CXC", "CCR", "HLA", "Ig", "CD", "CD"]);

        assert_eq!(a, b);
        assert_eq!(a.indices, vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(a.names[0].as_ref(), "CD3");
    }

    #[test]
    fn test_from_indices_out_of_range() {
        let names = boxed(&["a", "b", "c", "d", "e"]);
        let err = MarkerSubset::from_indices(&names, &[0, 999]).unwrap_err();
        assert_eq!(err, LupinError::InvalidSubset { index: 999, ncols: 5 });

        let ok = MarkerSubset::from_indices(&names, &[3, 1, 3]).unwrap();
        assert_eq!(ok.indices, vec![1, 3]);
    }
}
