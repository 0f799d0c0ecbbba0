//! Placeholder substitution in both directions
//!
//! Forward: `{{id}}` → absolute path, used on the caller's template.
//! Reverse: absolute path → `{{id}}`, used on everything sent back.

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use tracing::{debug, error, trace};

use crate::error::{GatewayError, Result};
use crate::registry::ReferenceRegistry;
use crate::tokenizer::tokenize;

/// `{{id}}` where the id is any run of non-brace characters (newlines included)
pub(crate) static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("static placeholder pattern"));

/// Delimiters for the per-token slot markers used by `resolve_argv`
const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

static SLOT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("static slot pattern"));

/// Returned instead of output that could not be scrubbed
const WITHHELD_OUTPUT: &str = "[output withheld: it could not be sanitized]";

/// Ids named by placeholders in `text`, in order of appearance
pub fn extract_ids(text: &str) -> Vec<String> {
    PLACEHOLDER_PATTERN
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitutes placeholders against one registry
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderSubstitutor<'a> {
    registry: &'a ReferenceRegistry,
}

impl<'a> PlaceholderSubstitutor<'a> {
    pub fn new(registry: &'a ReferenceRegistry) -> Self {
        Self { registry }
    }

    /// Replace every placeholder with its absolute path.
    ///
    /// All ids are resolved before anything is replaced, so an unknown id
    /// yields `UnknownReference` for the first such id and no partial command.
    /// Replacement is a single pass: text inside a resolved path is never
    /// substituted again.
    pub fn resolve_all(&self, template: &str) -> Result<String> {
        let resolved = self.resolve_ids(template)?;
        let command = PLACEHOLDER_PATTERN.replace_all(template, |caps: &Captures| {
            // every id was resolved above
            resolved
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(command.into_owned())
    }

    /// Tokenize `template` and resolve placeholders inside each argument.
    ///
    /// Placeholders are swapped for slot markers before tokenizing, so a path
    /// containing quotes, backslashes or whitespace always lands in the argv
    /// byte for byte and never changes how the template splits.
    pub fn resolve_argv(&self, template: &str) -> Result<Vec<String>> {
        if template.contains(SLOT_OPEN) || template.contains(SLOT_CLOSE) {
            return Err(GatewayError::InvalidArgument(
                "Command contains reserved characters".to_string(),
            ));
        }

        let resolved = self.resolve_ids(template)?;
        let mut slots: Vec<&str> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();
        let masked = PLACEHOLDER_PATTERN.replace_all(template, |caps: &Captures| {
            let id = caps.get(1).map_or("", |m| m.as_str());
            let path = resolved.get(id).map_or("", String::as_str);
            let slot = *slot_of.entry(path).or_insert_with(|| {
                slots.push(path);
                slots.len() - 1
            });
            format!("{SLOT_OPEN}{slot}{SLOT_CLOSE}")
        });

        let argv = tokenize(&masked)
            .into_iter()
            .map(|token| {
                SLOT_PATTERN
                    .replace_all(&token, |caps: &Captures| {
                        caps[1]
                            .parse::<usize>()
                            .ok()
                            .and_then(|slot| slots.get(slot))
                            .map_or_else(|| caps[0].to_string(), |path| path.to_string())
                    })
                    .into_owned()
            })
            .collect();
        Ok(argv)
    }

    /// Resolve every distinct id in `template`; the first unknown id aborts
    fn resolve_ids(&self, template: &str) -> Result<HashMap<String, String>> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        for id in extract_ids(template) {
            if resolved.contains_key(&id) {
                continue;
            }
            let path = self.registry.resolve(&id).inspect_err(|_| {
                debug!("No reference found for id {:?}", id);
            })?;
            resolved.insert(id, path.to_string_lossy().into_owned());
        }
        debug!("Resolved {} distinct references", resolved.len());
        Ok(resolved)
    }

    /// Replace every registered absolute path in `text` with its placeholder.
    ///
    /// One pass over `text` with a single alternation, longest path first, so
    /// a path that prefixes another never splits it and an inserted
    /// placeholder is never scanned again.
    pub fn sanitize(&self, text: &str) -> String {
        let mut entries: Vec<(String, String)> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|reference| {
                (
                    reference.path().to_string_lossy().into_owned(),
                    reference.placeholder(),
                )
            })
            .filter(|(path, _)| !path.is_empty())
            .collect();
        if entries.is_empty() {
            return text.to_string();
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let alternation = entries
            .iter()
            .map(|(path, _)| regex::escape(path))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = match RegexBuilder::new(&alternation)
            .size_limit(64 * (1 << 20))
            .build()
        {
            Ok(pattern) => pattern,
            Err(e) => {
                error!("Failed to build sanitization pattern: {}", e);
                return WITHHELD_OUTPUT.to_string();
            }
        };

        let placeholders: HashMap<&str, &str> = entries
            .iter()
            .map(|(path, placeholder)| (path.as_str(), placeholder.as_str()))
            .collect();
        pattern
            .replace_all(text, |caps: &Captures| {
                trace!("Sanitizing a registered path");
                placeholders
                    .get(&caps[0])
                    .map_or_else(|| caps[0].to_string(), |placeholder| placeholder.to_string())
            })
            .into_owned()
    }

    /// Sanitize an error's caller-facing text
    pub fn sanitize_error(&self, error: &GatewayError) -> String {
        error.log_if_security_critical();
        self.sanitize(&error.caller_message())
    }
}
