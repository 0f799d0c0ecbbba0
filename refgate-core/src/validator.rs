//! Command template validation
//!
//! Every real file must enter a command through a `{{id}}` placeholder. This
//! module runs before substitution and rejects any template that still looks
//! like it carries a raw path or file name. Once substitution has run, the
//! caller's literal text is gone and can no longer be told apart from the
//! resolved paths.
//!
//! The filename check is a heuristic. It rejects some legitimate dotted tokens
//! (`2.5M`) and only exempts plain decimals (`10.5`, `00:00:10.500`). Callers
//! rely on the exact rejection messages, so the heuristic is kept as is.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::Rejection;
use crate::substitution::PLACEHOLDER_PATTERN;

/// Stand-in for each `{{...}}` span while the template is inspected
const PLACEHOLDER_MARKER: &str = "REF";

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\w+(?:\.\w+)*\.[A-Za-z0-9]{2,4}\b").expect("static filename pattern")
});

static DECIMAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+$").expect("static decimal pattern"));

/// Check a template while its placeholders are still present
pub fn validate(template: &str) -> Result<(), Rejection> {
    let masked = mask_placeholders(template);

    if masked.contains("..") {
        debug!("Template rejected: path traversal");
        return Err(Rejection::PathTraversal);
    }

    if let Some(separator) = masked.chars().find(|c| matches!(c, '/' | '\\')) {
        debug!("Template rejected: path separator {:?}", separator);
        return Err(Rejection::PathSeparator(separator));
    }

    for candidate in FILENAME_PATTERN.find_iter(&masked) {
        let token = candidate.as_str();
        if DECIMAL_PATTERN.is_match(token) {
            continue;
        }
        debug!("Template rejected: filename-like token {:?}", token);
        return Err(Rejection::DirectFilename(token.to_string()));
    }

    Ok(())
}

/// Replace every `{{...}}` span with a neutral marker
fn mask_placeholders(template: &str) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, PLACEHOLDER_MARKER)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_path_separator() {
        let err = validate("-i foo/bar.mp4").unwrap_err();
        assert_eq!(err.reason(), "direct path separator");
        assert_eq!(err, Rejection::PathSeparator('/'));

        let err = validate(r"-i C:\clips").unwrap_err();
        assert_eq!(err, Rejection::PathSeparator('\\'));
    }

    #[test]
    fn test_rejects_traversal_before_separator() {
        let err = validate("-o ../../etc/passwd").unwrap_err();
        assert_eq!(err.reason(), "path traversal attempt");
    }

    #[test]
    fn test_rejects_bare_filename() {
        let err = validate("-o clip.mp4").unwrap_err();
        assert_eq!(err, Rejection::DirectFilename("clip.mp4".to_string()));
        assert_eq!(err.reason(), "potential direct filename");
    }

    #[test]
    fn test_accepts_decimals_and_placeholders() {
        assert!(validate("-ss 10.5 -i {{a}} {{b}}").is_ok());
        assert!(validate("-ss 00:00:10.500 -t 2.0 -i {{a}} -c:v copy {{b}}").is_ok());
        assert!(validate("ffmpeg -i {{src}} -vf scale=1280:720 {{out}}").is_ok());
    }

    #[test]
    fn test_placeholder_content_is_masked() {
        // ids may contain dots, slashes or whitespace; only the literal text counts
        assert!(validate("-i {{clip.mp4}} {{a/b}} {{x y\n}}").is_ok());
    }

    #[test]
    fn test_filename_adjacent_to_placeholder() {
        assert!(matches!(
            validate("-i {{a}}.mp4"),
            Err(Rejection::DirectFilename(_))
        ));
    }

    #[test]
    fn test_heuristic_edges_preserved() {
        // one-character extension slips through
        assert!(validate("-tag v2.1").is_ok());
        // unit suffixes look like extensions
        assert_eq!(
            validate("-b:v 2.5M").unwrap_err(),
            Rejection::DirectFilename("2.5M".to_string())
        );
    }

    #[test]
    fn test_traversal_inside_placeholder_is_ignored() {
        assert!(validate("-i {{..}}").is_ok());
        assert!(validate("-i {{a}} ..").is_err());
    }
}
