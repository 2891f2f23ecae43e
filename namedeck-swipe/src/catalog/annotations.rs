//! Sparse annotation side-map
//!
//! Enrichment layers attach categories, styles, list memberships and a short meaning
//! to entries after the dataset was built. Annotations are append-only and kept apart
//! from the immutable entries; readers merge them on the way out.

use namedeck_common::CatalogEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Light annotation fields for one entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning_short: Option<String>,
}

fn union_into(target: &mut Vec<String>, extra: &[String]) -> bool {
    let mut changed = false;
    for value in extra {
        let value = value.trim();
        if !value.is_empty() && !target.iter().any(|v| v == value) {
            target.push(value.to_string());
            changed = true;
        }
    }
    changed
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.styles.is_empty()
            && self.lists.is_empty()
            && self.meaning_short.is_none()
    }

    /// Union list fields; the short meaning is only taken if none is set yet
    ///
    /// Returns whether anything changed.
    pub fn merge(&mut self, other: &Annotation) -> bool {
        let mut changed = union_into(&mut self.categories, &other.categories);
        changed |= union_into(&mut self.styles, &other.styles);
        changed |= union_into(&mut self.lists, &other.lists);

        if self.meaning_short.is_none() {
            if let Some(meaning) = other.meaning_short.as_deref().map(str::trim) {
                if !meaning.is_empty() {
                    self.meaning_short = Some(meaning.to_string());
                    changed = true;
                }
            }
        }

        changed
    }

    /// Entry with these annotations merged into its light fields
    ///
    /// Identity fields are never touched; a short meaning already on the entry wins.
    pub fn apply_to(&self, entry: &CatalogEntry) -> CatalogEntry {
        let mut merged = entry.clone();
        union_into(&mut merged.categories, &self.categories);
        union_into(&mut merged.styles, &self.styles);
        union_into(&mut merged.lists, &self.lists);
        if merged.meaning_short.is_none() {
            merged.meaning_short = self.meaning_short.clone();
        }
        merged
    }
}

#[derive(Debug, Default)]
pub struct AnnotationMap {
    inner: HashMap<u32, Annotation>,
}

impl AnnotationMap {
    pub fn merge(&mut self, id: u32, annotation: &Annotation) -> bool {
        self.inner.entry(id).or_default().merge(annotation)
    }

    pub fn get(&self, id: u32) -> Option<&Annotation> {
        self.inner.get(&id).filter(|a| !a.is_empty())
    }

    pub fn len(&self) -> usize {
        self.inner.values().filter(|a| !a.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_unions_lists_and_sets_meaning_once() {
        let mut annotation = Annotation {
            categories: vec!["nature".into()],
            ..Default::default()
        };

        let changed = annotation.merge(&Annotation {
            categories: vec!["nature".into(), "classic".into()],
            meaning_short: Some("river".into()),
            ..Default::default()
        });
        assert!(changed);
        assert_eq!(annotation.categories, vec!["nature", "classic"]);

        annotation.merge(&Annotation {
            meaning_short: Some("mountain".into()),
            ..Default::default()
        });
        assert_eq!(annotation.meaning_short.as_deref(), Some("river"));

        assert!(!annotation.merge(&Annotation::default()));
    }

    #[test]
    fn test_apply_keeps_identity_fields() {
        let entry: CatalogEntry =
            serde_json::from_str(r#"{"id":5,"n":"Willow","g":"F","styles":["boho"]}"#).unwrap();
        let annotation = Annotation {
            styles: vec!["boho".into(), "nature".into()],
            meaning_short: Some("willow tree".into()),
            ..Default::default()
        };

        let merged = annotation.apply_to(&entry);

        assert_eq!(merged.id, 5);
        assert_eq!(merged.name, "Willow");
        assert_eq!(merged.styles, vec!["boho", "nature"]);
        assert_eq!(merged.meaning_short.as_deref(), Some("willow tree"));
    }

    #[test]
    fn test_map_ignores_empty_annotations() {
        let mut map = AnnotationMap::default();
        map.merge(3, &Annotation::default());

        assert!(map.get(3).is_none());
        assert!(map.is_empty());

        map.merge(3, &Annotation {
            lists: vec!["top-100".into()],
            ..Default::default()
        });
        assert_eq!(map.len(), 1);
    }
}
