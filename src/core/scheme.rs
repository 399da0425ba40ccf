//! Classification schemes
//!
//! A scheme collapses raw land-cover codes into a small set of semantic
//! classes and carries the display metadata (names and palette) for them.
//! It is validated once on construction and read-only afterwards.

use crate::types::{ClassIndex, LandCoverError, LcResult, RawCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Marker stored in the lookup table for codes the scheme does not list
const NOT_LISTED: ClassIndex = ClassIndex::MAX;

/// What `lookup` does with a raw code that is not part of the scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmappedPolicy {
    /// Fail with `UnmappedCode`
    #[default]
    Reject,
    /// Map every unknown code to this class index
    MapToSentinelClass(ClassIndex),
    /// Use the raw code itself as the class index
    Passthrough,
}

/// Serialized form of a scheme: four parallel fields plus the policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeSpec {
    pub codes: Vec<RawCode>,
    pub new_classes: Vec<ClassIndex>,
    pub palette: Vec<String>,
    pub names: BTreeMap<ClassIndex, String>,
    #[serde(default)]
    pub unmapped_policy: UnmappedPolicy,
}

/// Validated mapping from raw codes to semantic classes
#[derive(Debug, Clone)]
pub struct ClassificationScheme {
    codes: Vec<RawCode>,
    class_of: BTreeMap<RawCode, ClassIndex>,
    names: BTreeMap<ClassIndex, String>,
    palette: Vec<String>,
    policy: UnmappedPolicy,
    /// Dense table indexed by raw code
    table: Vec<ClassIndex>,
}

impl ClassificationScheme {
    /// Build and validate a scheme.
    ///
    /// Fails with `Config` on the first duplicate code, code without a
    /// mapping, mapping for an unlisted code, or class index lacking a name
    /// or palette entry.
    pub fn new(
        codes: Vec<RawCode>,
        class_of: &HashMap<RawCode, ClassIndex>,
        names: BTreeMap<ClassIndex, String>,
        palette: Vec<String>,
        policy: UnmappedPolicy,
    ) -> LcResult<Self> {
        let mut seen = BTreeSet::new();
        for &code in &codes {
            if !seen.insert(code) {
                return Err(LandCoverError::Config(format!("Duplicate raw code {}", code)));
            }
        }

        let mut mapping = BTreeMap::new();
        for &code in &codes {
            let class = *class_of.get(&code).ok_or_else(|| {
                LandCoverError::Config(format!("Raw code {} has no class mapping", code))
            })?;
            if class == NOT_LISTED {
                return Err(LandCoverError::Config(format!(
                    "Class index {} for code {} is reserved",
                    class, code
                )));
            }
            mapping.insert(code, class);
        }

        let mut extra: Vec<RawCode> = class_of.keys().filter(|c| !seen.contains(c)).copied().collect();
        extra.sort_unstable();
        if let Some(code) = extra.first() {
            return Err(LandCoverError::Config(format!(
                "Class mapping given for code {} which is not listed in codes",
                code
            )));
        }

        let mut referenced: BTreeSet<ClassIndex> = mapping.values().copied().collect();
        if let UnmappedPolicy::MapToSentinelClass(sentinel) = policy {
            if sentinel == NOT_LISTED {
                return Err(LandCoverError::Config(format!(
                    "Sentinel class index {} is reserved",
                    sentinel
                )));
            }
            referenced.insert(sentinel);
        }

        for &class in &referenced {
            if !names.contains_key(&class) {
                return Err(LandCoverError::Config(format!("Class index {} has no name", class)));
            }
            if palette.get(class as usize).map_or(true, |color| color.trim().is_empty()) {
                return Err(LandCoverError::Config(format!(
                    "Class index {} has no palette entry",
                    class
                )));
            }
        }

        let table_len = codes.iter().max().map_or(0, |&max| max as usize + 1);
        let mut table = vec![NOT_LISTED; table_len];
        for (&code, &class) in &mapping {
            table[code as usize] = class;
        }

        log::debug!(
            "Built classification scheme: {} codes -> {} classes, policy {:?}",
            codes.len(),
            referenced.len(),
            policy
        );

        Ok(Self {
            codes,
            class_of: mapping,
            names,
            palette,
            policy,
            table,
        })
    }

    /// Build from the parallel-array form, failing fast on length mismatch
    pub fn from_spec(spec: SchemeSpec) -> LcResult<Self> {
        if spec.codes.len() != spec.new_classes.len() {
            return Err(LandCoverError::Config(format!(
                "codes has {} entries but new_classes has {}",
                spec.codes.len(),
                spec.new_classes.len()
            )));
        }

        // Duplicates must survive into `new` so they are reported, not merged
        let mut seen = BTreeSet::new();
        if let Some(&dup) = spec.codes.iter().find(|&&code| !seen.insert(code)) {
            return Err(LandCoverError::Config(format!("Duplicate raw code {}", dup)));
        }

        let class_of: HashMap<RawCode, ClassIndex> = spec
            .codes
            .iter()
            .copied()
            .zip(spec.new_classes.iter().copied())
            .collect();

        Self::new(spec.codes, &class_of, spec.names, spec.palette, spec.unmapped_policy)
    }

    pub fn from_json_str(json: &str) -> LcResult<Self> {
        let spec: SchemeSpec = serde_json::from_str(json)?;
        Self::from_spec(spec)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LcResult<Self> {
        log::info!("Loading classification scheme from: {}", path.as_ref().display());
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Scheme where every listed class index maps to itself
    pub fn identity(classes: &[ClassIndex], policy: UnmappedPolicy) -> LcResult<Self> {
        let class_of: HashMap<RawCode, ClassIndex> = classes.iter().map(|&c| (c, c)).collect();
        let names = classes.iter().map(|&c| (c, format!("Classe {}", c))).collect();
        let palette_len = classes.iter().max().map_or(0, |&max| max as usize + 1);
        let palette = vec!["#808080".to_string(); palette_len];
        Self::new(classes.to_vec(), &class_of, names, palette, policy)
    }

    /// Class index for a raw code, following the unmapped-code policy
    pub fn lookup(&self, code: RawCode) -> LcResult<ClassIndex> {
        self.resolve(code).ok_or(LandCoverError::UnmappedCode { code })
    }

    /// Infallible form of `lookup`: `None` only under `Reject` for unlisted codes
    pub(crate) fn resolve(&self, code: RawCode) -> Option<ClassIndex> {
        match self.table.get(code as usize) {
            Some(&class) if class != NOT_LISTED => Some(class),
            _ => match self.policy {
                UnmappedPolicy::Reject => None,
                UnmappedPolicy::MapToSentinelClass(sentinel) => Some(sentinel),
                UnmappedPolicy::Passthrough => Some(code),
            },
        }
    }

    pub fn contains_code(&self, code: RawCode) -> bool {
        matches!(self.table.get(code as usize), Some(&class) if class != NOT_LISTED)
    }

    pub fn codes(&self) -> &[RawCode] {
        &self.codes
    }

    pub fn class_of(&self, code: RawCode) -> Option<ClassIndex> {
        self.class_of.get(&code).copied()
    }

    /// Sorted class indices the scheme can produce (including the sentinel class)
    pub fn class_indices(&self) -> Vec<ClassIndex> {
        let mut classes: BTreeSet<ClassIndex> = self.class_of.values().copied().collect();
        if let UnmappedPolicy::MapToSentinelClass(sentinel) = self.policy {
            classes.insert(sentinel);
        }
        classes.into_iter().collect()
    }

    pub fn name(&self, class: ClassIndex) -> Option<&str> {
        self.names.get(&class).map(String::as_str)
    }

    /// Display name, falling back to `Classe <n>` for classes without one
    pub fn display_name(&self, class: ClassIndex) -> String {
        self.name(class)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Classe {}", class))
    }

    pub fn color(&self, class: ClassIndex) -> Option<&str> {
        self.palette.get(class as usize).map(String::as_str)
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    pub fn policy(&self) -> UnmappedPolicy {
        self.policy
    }

    pub fn to_spec(&self) -> SchemeSpec {
        SchemeSpec {
            codes: self.codes.clone(),
            new_classes: self.codes.iter().map(|c| self.class_of[c]).collect(),
            palette: self.palette.clone(),
            names: self.names.clone(),
            unmapped_policy: self.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_class_spec() -> SchemeSpec {
        SchemeSpec {
            codes: vec![1, 3, 15],
            new_classes: vec![1, 1, 2],
            palette: vec!["#ffffff".into(), "#1f8d49".into(), "#edde8e".into()],
            names: [(1, "Floresta".to_string()), (2, "Agropecuária".to_string())]
                .into_iter()
                .collect(),
            unmapped_policy: UnmappedPolicy::Reject,
        }
    }

    #[test]
    fn test_lookup_listed_codes() {
        let scheme = ClassificationScheme::from_spec(two_class_spec()).unwrap();
        assert_eq!(scheme.lookup(1).unwrap(), 1);
        assert_eq!(scheme.lookup(3).unwrap(), 1);
        assert_eq!(scheme.lookup(15).unwrap(), 2);
        assert_eq!(scheme.class_indices(), vec![1, 2]);
    }

    #[test]
    fn test_unmapped_policies() {
        let reject = ClassificationScheme::from_spec(two_class_spec()).unwrap();
        assert!(matches!(reject.lookup(2), Err(LandCoverError::UnmappedCode { code: 2 })));
        assert!(matches!(reject.lookup(900), Err(LandCoverError::UnmappedCode { code: 900 })));

        let mut spec = two_class_spec();
        spec.unmapped_policy = UnmappedPolicy::Passthrough;
        let passthrough = ClassificationScheme::from_spec(spec).unwrap();
        assert_eq!(passthrough.lookup(2).unwrap(), 2);
        assert_eq!(passthrough.lookup(900).unwrap(), 900);

        let mut spec = two_class_spec();
        spec.names.insert(0, "Não Observado".into());
        spec.unmapped_policy = UnmappedPolicy::MapToSentinelClass(0);
        let sentinel = ClassificationScheme::from_spec(spec).unwrap();
        assert_eq!(sentinel.lookup(27).unwrap(), 0);
        assert_eq!(sentinel.lookup(3).unwrap(), 1);
        assert_eq!(sentinel.class_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn test_length_mismatch() {
        let mut spec = two_class_spec();
        spec.new_classes.pop();
        assert!(matches!(ClassificationScheme::from_spec(spec), Err(LandCoverError::Config(_))));
    }

    #[test]
    fn test_duplicate_code() {
        let mut spec = two_class_spec();
        spec.codes = vec![1, 3, 3];
        let err = ClassificationScheme::from_spec(spec).unwrap_err();
        assert!(err.to_string().contains("Duplicate raw code 3"));
    }

    #[test]
    fn test_missing_name_and_palette() {
        let mut spec = two_class_spec();
        spec.names.remove(&2);
        let err = ClassificationScheme::from_spec(spec).unwrap_err();
        assert!(err.to_string().contains("Class index 2 has no name"));

        let mut spec = two_class_spec();
        spec.palette.truncate(2);
        let err = ClassificationScheme::from_spec(spec).unwrap_err();
        assert!(err.to_string().contains("Class index 2 has no palette entry"));
    }

    #[test]
    fn test_sentinel_needs_metadata() {
        let mut spec = two_class_spec();
        spec.unmapped_policy = UnmappedPolicy::MapToSentinelClass(7);
        assert!(ClassificationScheme::from_spec(spec).is_err());
    }

    #[test]
    fn test_json_round_trip_of_policy() {
        let json = r##"{
            "codes": [0, 26],
            "new_classes": [0, 5],
            "palette": ["#ffffff", "#000000", "#000000", "#000000", "#000000", "#2532e4"],
            "names": {"0": "Não Observado", "5": "Corpo D'água"},
            "unmapped_policy": {"MapToSentinelClass": 0}
        }"##;
        let scheme = ClassificationScheme::from_json_str(json).unwrap();
        assert_eq!(scheme.policy(), UnmappedPolicy::MapToSentinelClass(0));
        assert_eq!(scheme.lookup(26).unwrap(), 5);
        assert_eq!(scheme.name(5), Some("Corpo D'água"));
        assert_eq!(scheme.to_spec().new_classes, vec![0, 5]);
    }

    #[test]
    fn test_policy_defaults_to_reject() {
        assert_eq!(UnmappedPolicy::default(), UnmappedPolicy::Reject);

        let json = r##"{
            "codes": [26],
            "new_classes": [5],
            "palette": ["#ffffff", "#000000", "#000000", "#000000", "#000000", "#2532e4"],
            "names": {"5": "Corpo D'água"}
        }"##;
        let scheme = ClassificationScheme::from_json_str(json).unwrap();
        assert_eq!(scheme.policy(), UnmappedPolicy::Reject);
        assert!(scheme.lookup(33).is_err());
    }
}
