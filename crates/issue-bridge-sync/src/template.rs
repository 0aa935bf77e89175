use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template placeholder '{{{{{0}}}}}' has no value")]
    MissingKey(String),
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"))
}

/// Replaces every `{{name}}` placeholder in one left-to-right pass.
///
/// Substituted values are never rescanned, so a value containing `{{...}}`
/// is emitted verbatim.
pub fn render_template(
    template: &str,
    context: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = 0;
    for captures in placeholder_pattern().captures_iter(template) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = context
            .get(key.as_str())
            .ok_or_else(|| TemplateError::MissingKey(key.as_str().to_string()))?;
        rendered.push_str(&template[cursor..whole.start()]);
        rendered.push_str(value);
        cursor = whole.end();
    }
    rendered.push_str(&template[cursor..]);
    Ok(rendered)
}
