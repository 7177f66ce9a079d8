//! Membership mapping utilities: look up a group (or label) for each key.
//!
//! Supports reading two-column files (TSV/CSV) and matching with prefix
//! support, e.g., channel `Nd142Di` against a table keyed by `Nd142`.

use crate::common_io::{detect_delimiter, read_lines_of_words_delim, ReadLinesOut};
use fnv::FnvHashMap as HashMap;
use log::info;

/// A membership mapping from keys to groups/labels.
#[derive(Clone)]
pub struct Membership {
    map: HashMap<Box<str>, Box<str>>,
    /// Keys in file order, for prefix matching
    keys: Vec<Box<str>>,
    allow_prefix: bool,
}

/// Statistics about membership matching
#[derive(Debug, Default, Clone)]
pub struct MatchStats {
    pub exact: usize,
    pub prefix: usize,
    pub unmatched: usize,
}

impl MatchStats {
    pub fn total_matched(&self) -> usize {
        self.exact + self.prefix
    }
}

impl Membership {
    /// Create membership from key-value pairs; a later pair overrides
    /// an earlier pair with the same key
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Box<str>, Box<str>)>,
        allow_prefix: bool,
    ) -> Self {
        let mut map = HashMap::default();
        let mut keys = Vec::new();

        for (key, value) in pairs {
            if map.insert(key.clone(), value).is_none() {
                keys.push(key);
            }
        }

        Self {
            map,
            keys,
            allow_prefix,
        }
    }

    /// Load membership from file (TSV, CSV, or gzipped variants)
    ///
    /// # Arguments
    /// * `file_path` - Path to membership file
    /// * `key_col` - Column index for keys (0-based)
    /// * `value_col` - Column index for values (0-based)
    /// * `allow_prefix` - Enable prefix matching
    pub fn from_file(
        file_path: &str,
        key_col: usize,
        value_col: usize,
        allow_prefix: bool,
    ) -> anyhow::Result<Self> {
        let delim = detect_delimiter(file_path);

        let ReadLinesOut { lines, header: _ } = read_lines_of_words_delim(file_path, delim, -1)?;

        if lines.is_empty() {
            anyhow::bail!("Membership file is empty: {}", file_path);
        }

        let max_col = key_col.max(value_col);
        let mut pairs = Vec::with_capacity(lines.len());

        for line in lines {
            if line.len() <= max_col {
                log::warn!(
                    "{}: skipping line with {} column(s), need {}",
                    file_path,
                    line.len(),
                    max_col + 1
                );
                continue;
            }
            let key: Box<str> = line[key_col].trim().into();
            let value: Box<str> = line[value_col].trim().into();
            pairs.push((key, value));
        }

        let ret = Self::from_pairs(pairs, allow_prefix);
        info!("Loaded {} entries from {}", ret.len(), file_path);
        Ok(ret)
    }

    /// Look up a key: exact match first, then (if enabled) the first
    /// stored key that is a prefix of the query or vice versa
    pub fn get(&self, key: &str) -> Option<&Box<str>> {
        self.get_with_kind(key).map(|(v, _)| v)
    }

    fn get_with_kind(&self, key: &str) -> Option<(&Box<str>, bool)> {
        if let Some(v) = self.map.get(key) {
            return Some((v, true));
        }
        if !self.allow_prefix || key.is_empty() {
            return None;
        }
        self.keys
            .iter()
            .find(|k| !k.is_empty() && (key.starts_with(k.as_ref()) || k.starts_with(key)))
            .and_then(|k| self.map.get(k))
            .map(|v| (v, false))
    }

    /// Match a list of queries; unmatched queries get `None`
    pub fn match_keys(&self, queries: &[Box<str>]) -> (Vec<Option<Box<str>>>, MatchStats) {
        let mut stats = MatchStats::default();
        let matched = queries
            .iter()
            .map(|q| match self.get_with_kind(q) {
                Some((v, true)) => {
                    stats.exact += 1;
                    Some(v.clone())
                }
                Some((v, false)) => {
                    stats.prefix += 1;
                    Some(v.clone())
                }
                None => {
                    stats.unmatched += 1;
                    None
                }
            })
            .collect();
        (matched, stats)
    }

    /// Number of entries in the membership
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if membership is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Nd142\tCD19").unwrap();
        writeln!(file, "Nd144Di\tCD4").unwrap();
        writeln!(file, "Sm147Di\tNA").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_exact_match() {
        let file = create_test_file();
        let membership = Membership::from_file(file.path().to_str().unwrap(), 0, 1, false).unwrap();

        assert_eq!(membership.get("Nd144Di").map(|s| s.as_ref()), Some("CD4"));
        assert_eq!(membership.get("Nd142Di"), None);
        assert_eq!(membership.len(), 3);
    }

    #[test]
    fn test_prefix_match() {
        let file = create_test_file();
        let membership = Membership::from_file(file.path().to_str().unwrap(), 0, 1, true).unwrap();

        assert_eq!(membership.get("Nd142Di").map(|s| s.as_ref()), Some("CD19"));
        assert_eq!(membership.get("Nd144").map(|s| s.as_ref()), Some("CD4"));
    }

    #[test]
    fn test_match_keys() {
        let membership = Membership::from_pairs(
            vec![("Nd142".into(), "CD19".into()), ("Nd144Di".into(), "CD4".into())],
            true,
        );

        let queries: Vec<Box<str>> = vec!["Nd144Di".into(), "Nd142Di".into(), "Time".into()];
        let (matched, stats) = membership.match_keys(&queries);

        assert_eq!(stats.exact, 1);
        assert_eq!(stats.prefix, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.total_matched(), 2);
        assert_eq!(matched[2], None);
    }
}
