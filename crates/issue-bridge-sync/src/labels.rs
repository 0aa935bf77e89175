use std::collections::{BTreeMap, HashSet};

use issue_bridge_discord::AppliedTag;

/// Static rules turning forum tags into issue labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPolicy {
    pub default_labels: Vec<String>,
    pub tag_label_map: BTreeMap<String, Vec<String>>,
    pub fallback_label_prefix: String,
}

impl LabelPolicy {
    /// Default labels first, then per-tag labels in tag order; the first
    /// occurrence of a label wins.
    ///
    /// A tag with no mapping contributes one fallback label: the prefix
    /// followed by the sanitized tag display name. A tag mapped to an empty
    /// list is treated as unmapped and gets the fallback label too.
    pub fn build_labels(&self, tags: &[AppliedTag]) -> Vec<String> {
        let mut labels = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |label: String| {
            let label = label.trim().to_string();
            if !label.is_empty() && seen.insert(label.clone()) {
                labels.push(label);
            }
        };
        for label in &self.default_labels {
            push(label.clone());
        }
        for tag in tags {
            match self.tag_label_map.get(&tag.id) {
                Some(mapped) if !mapped.is_empty() => {
                    for label in mapped {
                        push(label.clone());
                    }
                }
                _ => push(format!(
                    "{}{}",
                    self.fallback_label_prefix,
                    sanitize_label(&tag.name)
                )),
            }
        }
        labels
    }
}

/// Lower-cases and hyphenates a tag name; empty names become `untitled`.
pub fn sanitize_label(name: &str) -> String {
    let normalized = name.trim().to_lowercase().replace(' ', "-");
    if normalized.is_empty() {
        "untitled".to_string()
    } else {
        normalized
    }
}
