//! Crop identity canonicalisation and cross-dataset matching.
//!
//! Selection keys arrive as `"kale-red_russian"`, trend records carry
//! `{cropName: "Kale", variety: "Red Russian"}` and top-performer rows use
//! `crop` instead of `cropName`. Every comparison goes through [`normalize`]
//! so all three spellings meet on the same canonical tuple. Matching is exact
//! equality of those tuples and never substring or fuzzy.

use crate::error::ReportError;
use std::fmt;
use std::str::FromStr;

/// Variety used when a record or key leaves the variety blank.
pub const GENERAL_VARIETY: &str = "general";

/// Canonicalise a crop name, variety or type: lower-case, with every
/// underscore and whitespace character removed.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| *c != '_' && !c.is_whitespace())
        .collect()
}

/// Canonicalise a variety; blank or missing varieties become [`GENERAL_VARIETY`].
pub fn normalize_variety(variety: Option<&str>) -> String {
    match variety.map(normalize) {
        Some(v) if !v.is_empty() => v,
        _ => GENERAL_VARIETY.to_string(),
    }
}

/// A canonical `(cropName, variety[, cropType])` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey {
    pub crop: String,
    pub variety: String,
    pub crop_type: Option<String>,
}

impl CanonicalKey {
    pub fn new(crop: &str, variety: Option<&str>, crop_type: Option<&str>) -> Self {
        Self {
            crop: normalize(crop),
            variety: normalize_variety(variety),
            crop_type: crop_type.map(normalize).filter(|t| !t.is_empty()),
        }
    }
}

/// Structural equality of two canonical keys.
///
/// Crop type only participates when both sides carry one; a selection key
/// without a type still matches a record that has one.
pub fn matches(a: &CanonicalKey, b: &CanonicalKey) -> bool {
    if a.crop != b.crop || a.variety != b.variety {
        return false;
    }
    match (&a.crop_type, &b.crop_type) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Anything that carries a crop identity and can be matched against a
/// selection.
pub trait CropIdentity {
    fn canonical_key(&self) -> CanonicalKey;
}

/// Return the first record whose identity matches `key`.
pub fn find_match<'a, T: CropIdentity>(key: &CanonicalKey, records: &'a [T]) -> Option<&'a T> {
    records.iter().find(|r| matches(key, &r.canonical_key()))
}

/// A crop the user selected for the report, parsed from `"{crop}-{variety}"`.
///
/// Only the first hyphen separates crop from variety, so varieties such as
/// `"f1-hybrid"` survive intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropSelectionKey {
    pub crop_name: String,
    pub variety: String,
    pub crop_type: Option<String>,
}

impl CropSelectionKey {
    /// Human-readable label, e.g. `Kale (Red Russian)`.
    pub fn display_label(&self) -> String {
        let crop = title_case(&self.crop_name);
        if normalize_variety(Some(&self.variety)) == GENERAL_VARIETY {
            crop
        } else {
            format!("{} ({})", crop, title_case(&self.variety))
        }
    }
}

impl CropIdentity for CropSelectionKey {
    fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(&self.crop_name, Some(&self.variety), self.crop_type.as_deref())
    }
}

impl FromStr for CropSelectionKey {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (crop, variety) = match trimmed.split_once('-') {
            Some((c, v)) => (c, v),
            None => (trimmed, ""),
        };
        if normalize(crop).is_empty() {
            return Err(ReportError::InvalidSelectionKey { key: s.to_string() });
        }
        Ok(Self {
            crop_name: crop.to_string(),
            variety: variety.to_string(),
            crop_type: None,
        })
    }
}

impl fmt::Display for CropSelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.crop_name, self.variety)
    }
}

/// `"red_russian"` → `"Red Russian"`.
pub fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Record {
        crop_name: &'static str,
        variety: Option<&'static str>,
    }

    impl CropIdentity for Record {
        fn canonical_key(&self) -> CanonicalKey {
            CanonicalKey::new(self.crop_name, self.variety, None)
        }
    }

    #[test]
    fn normalize_spellings_agree() {
        assert_eq!(normalize("Red_Russian"), "redrussian");
        assert_eq!(normalize("red russian"), "redrussian");
        assert_eq!(normalize(" RED\t_russian "), "redrussian");
    }

    #[test]
    fn blank_variety_is_general() {
        assert_eq!(normalize_variety(None), "general");
        assert_eq!(normalize_variety(Some("")), "general");
        assert_eq!(normalize_variety(Some(" _ ")), "general");
        assert_eq!(normalize_variety(Some("Curly")), "curly");
    }

    #[test]
    fn selection_key_splits_on_first_hyphen() {
        let key: CropSelectionKey = "tomato-f1-hybrid".parse().unwrap();
        assert_eq!(key.crop_name, "tomato");
        assert_eq!(key.variety, "f1-hybrid");
    }

    #[test]
    fn selection_key_without_variety() {
        let key: CropSelectionKey = "basil".parse().unwrap();
        assert_eq!(key.variety, "");
        assert_eq!(key.canonical_key().variety, "general");
    }

    #[test]
    fn empty_selection_key_is_rejected() {
        assert!("".parse::<CropSelectionKey>().is_err());
        assert!("-curly".parse::<CropSelectionKey>().is_err());
    }

    #[test]
    fn selection_matches_record_across_formats() {
        let key: CropSelectionKey = "kale-red_russian".parse().unwrap();
        let records = [
            Record { crop_name: "Kale", variety: Some("Curly") },
            Record { crop_name: "Kale", variety: Some("Red Russian") },
        ];
        let hit = find_match(&key.canonical_key(), &records).expect("match");
        assert_eq!(hit.variety, Some("Red Russian"));

        let curly: CropSelectionKey = "kale-lacinato".parse().unwrap();
        assert!(find_match(&curly.canonical_key(), &records).is_none());
    }

    #[test]
    fn matching_is_not_substring() {
        let a = CanonicalKey::new("Kale", Some("Red"), None);
        let b = CanonicalKey::new("Kale", Some("Red Russian"), None);
        assert!(!matches(&a, &b));
    }

    #[test]
    fn crop_type_only_compared_when_both_present() {
        let untyped = CanonicalKey::new("Kale", Some("Curly"), None);
        let leafy = CanonicalKey::new("Kale", Some("Curly"), Some("Leafy Greens"));
        let herb = CanonicalKey::new("Kale", Some("Curly"), Some("Herbs"));
        assert!(matches(&untyped, &leafy));
        assert!(matches(&leafy, &CanonicalKey::new("kale", Some("curly"), Some("leafy_greens"))));
        assert!(!matches(&leafy, &herb));
    }

    #[test]
    fn display_label_title_cases() {
        let key: CropSelectionKey = "kale-red_russian".parse().unwrap();
        assert_eq!(key.display_label(), "Kale (Red Russian)");
        let plain: CropSelectionKey = "basil".parse().unwrap();
        assert_eq!(plain.display_label(), "Basil");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
