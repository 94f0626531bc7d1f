use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").unwrap());
static STRENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|mcg|g|ml|iu)\b|\b\d+(?:\.\d+)?\s*%").unwrap()
});
static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:here\s+(?:are|is)[^:]*|(?:the\s+)?(?:prescribed\s+)?(?:medicines?|medications?|drugs?|names?|rx))\s*:").unwrap()
});
static DOSAGE_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:tabs?|tablets?|caps?|capsules?|syrup|syp|inj|injection)\b\.?").unwrap()
});

/// A medicine name as read from a prescription or typed by the user
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct Medicine {
    pub name: String,
    /// Name without strength or dosage form, when that differs from `name`
    pub normalized: Option<String>,
}

impl Medicine {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let normalized = normalize(&name).filter(|n| *n != name);
        Self { name, normalized }
    }

    /// Term used when searching pharmacies
    pub fn search_term(&self) -> &str {
        self.normalized.as_deref().unwrap_or(&self.name)
    }
}

fn normalize(name: &str) -> Option<String> {
    let stripped = STRENGTH.replace_all(name, " ");
    let stripped = DOSAGE_FORM.replace_all(&stripped, " ");
    let collapsed = collapse_whitespace(&stripped);
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == ',' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered, de-duplicated medicines parsed out of untrusted free text.
///
/// The text comes either from the vision model or straight from the user, so
/// nothing about its shape is assumed: separators may be commas, semicolons or
/// line breaks, entries may carry list markers or quotes, and the whole thing
/// may be empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MedicineNameSet {
    medicines: Vec<Medicine>,
}

impl MedicineNameSet {
    pub fn parse(text: &str) -> Self {
        let mut seen = HashSet::new();
        let medicines = text
            .split([',', ';', '\n', '\r'])
            .filter_map(clean_fragment)
            .filter(|name| seen.insert(name.to_lowercase()))
            .map(Medicine::new)
            .collect();

        Self { medicines }
    }

    pub fn len(&self) -> usize {
        self.medicines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medicines.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Medicine> {
        self.medicines.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.medicines.iter().map(|m| m.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a MedicineNameSet {
    type Item = &'a Medicine;
    type IntoIter = std::slice::Iter<'a, Medicine>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn clean_fragment(fragment: &str) -> Option<String> {
    // "Medicines: Aspirin" -> "Aspirin"
    let fragment = PREAMBLE.replace(fragment, "");
    // "Dolo 650: 1-0-1" -> "Dolo 650"
    let fragment = match fragment.split_once(':') {
        Some((name, _note)) if !name.trim().is_empty() => name,
        Some((_, rest)) => rest,
        None => fragment.as_ref(),
    }
    .trim();
    let fragment = LIST_MARKER.replace(fragment, "");
    let fragment = fragment
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '_') || c.is_whitespace())
        .trim_end_matches('.');
    let fragment = collapse_whitespace(fragment);

    if fragment.is_empty() {
        None
    } else {
        Some(fragment)
    }
}
