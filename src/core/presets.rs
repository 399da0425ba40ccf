//! Built-in MapBiomas Collection 9 schemes

use crate::core::scheme::{ClassificationScheme, UnmappedPolicy};
use crate::types::{ClassIndex, LcResult, RawCode};
use std::collections::{BTreeMap, HashMap};

const FOREST: &[RawCode] = &[1, 3, 4, 5, 6, 49];
const NON_FOREST_NATURAL: &[RawCode] = &[10, 11, 12, 32, 29, 50];
const FARMING: &[RawCode] = &[14, 15, 18, 19, 39, 20, 40, 62, 41, 36, 46, 47, 35, 48, 9, 21];
const NON_VEGETATED: &[RawCode] = &[22, 23, 24, 30, 25];
const WATER: &[RawCode] = &[26, 33, 31];
const NOT_OBSERVED: &[RawCode] = &[27];

fn grouped(groups: &[(ClassIndex, &[RawCode])]) -> (Vec<RawCode>, HashMap<RawCode, ClassIndex>) {
    let mut codes = Vec::new();
    let mut class_of = HashMap::new();
    for &(class, members) in groups {
        for &code in members {
            codes.push(code);
            class_of.insert(code, class);
        }
    }
    (codes, class_of)
}

fn names(entries: &[(ClassIndex, &str)]) -> BTreeMap<ClassIndex, String> {
    entries.iter().map(|&(class, name)| (class, name.to_string())).collect()
}

/// Six-class MapBiomas Collection 9 grouping (classes 1..=6)
pub fn mapbiomas_collection9(policy: UnmappedPolicy) -> LcResult<ClassificationScheme> {
    let (codes, class_of) = grouped(&[
        (1, FOREST),
        (2, NON_FOREST_NATURAL),
        (3, FARMING),
        (4, NON_VEGETATED),
        (5, WATER),
        (6, NOT_OBSERVED),
    ]);

    let names = names(&[
        (1, "Formação Florestal"),
        (2, "Formação Natural não Florestal"),
        (3, "Agropecuária"),
        (4, "Área não Vegetada"),
        (5, "Corpo D'água"),
        (6, "Não Observado"),
    ]);

    // index 0 is never produced by this grouping
    let palette = ["#FFFFFF", "#006400", "#B8AF4F", "#FFD966", "#E974ED", "#0000FF", "#FFFFFF"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    ClassificationScheme::new(codes, &class_of, names, palette, policy)
}

/// Collection 9 grouping that also keeps raw code 0 as class 0 (no data)
pub fn mapbiomas_collection9_with_nodata(policy: UnmappedPolicy) -> LcResult<ClassificationScheme> {
    let (codes, class_of) = grouped(&[
        (0, &[0]),
        (1, FOREST),
        (2, NON_FOREST_NATURAL),
        (3, FARMING),
        (4, NON_VEGETATED),
        (5, WATER),
        (6, NOT_OBSERVED),
    ]);

    let names = names(&[
        (0, "Não Observado"),
        (1, "Floresta"),
        (2, "Vegetação Herbácea"),
        (3, "Agropecuária"),
        (4, "Área não Vegetada"),
        (5, "Corpo D'água"),
        (6, "Não Observado"),
    ]);

    let palette = ["#ffffff", "#1f8d49", "#d6bc74", "#ffefc3", "#d4271e", "#2532e4", "#ffffff"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    ClassificationScheme::new(codes, &class_of, names, palette, policy)
}
