//! Content negotiation — the outgoing `Accept` value and validation of the
//! response's declared `Content-Type` against it.
//!
//! Matching is exact on the normalized type, parameters included: an accept
//! of `text/html` does not admit `text/html; charset=utf-8`. The only
//! exception is the `*/*` wildcard, which admits any non-empty type.

use crate::types::FragmentError;

/// Accept value used when none is configured.
pub const DEFAULT_ACCEPT: &str = "text/html";

/// The match-anything media range.
pub const WILDCARD: &str = "*/*";

/// The header value to send for a configured accept string.
pub fn accept_header(accept: &str) -> String {
    let trimmed = accept.trim();
    if trimmed.is_empty() {
        DEFAULT_ACCEPT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether any entry of the accept list is the `*/*` wildcard.
pub fn is_wildcard(accept: &str) -> bool {
    accept_entries(accept).any(|entry| entry == WILDCARD)
}

/// Normalize a media type for comparison.
///
/// Lowercases the type, subtype and parameter names, and drops insignificant
/// whitespace around `/`, `;` and `=`. Parameter values keep their case.
pub fn normalize(media_type: &str) -> String {
    let mut parts = media_type.split(';');
    let essence = parts
        .next()
        .unwrap_or_default()
        .split('/')
        .map(|p| p.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("/");

    let mut out = essence;
    for param in parts {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        out.push(';');
        match param.split_once('=') {
            Some((name, value)) => {
                out.push_str(&name.trim().to_ascii_lowercase());
                out.push('=');
                out.push_str(value.trim());
            }
            None => out.push_str(&param.to_ascii_lowercase()),
        }
    }
    out
}

/// Check a declared content type against the configured accept value.
///
/// A missing or blank content type always fails, even for `*/*`.
pub fn validate(accept: &str, content_type: Option<&str>) -> Result<(), FragmentError> {
    let expected = accept_header(accept);
    let mismatch = || FragmentError::TypeMismatch {
        expected: expected.clone(),
        actual: content_type.map(str::to_string),
    };

    let declared = match content_type.map(str::trim) {
        Some(ct) if !ct.is_empty() => normalize(ct),
        _ => return Err(mismatch()),
    };

    if is_wildcard(&expected) {
        return Ok(());
    }

    if accept_entries(&expected).any(|entry| entry == declared) {
        Ok(())
    } else {
        Err(mismatch())
    }
}

fn accept_entries(accept: &str) -> impl Iterator<Item = String> + '_ {
    accept
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_header_defaults_to_html() {
        assert_eq!(accept_header(""), "text/html");
        assert_eq!(accept_header("   "), "text/html");
        assert_eq!(accept_header("text/fragment+html"), "text/fragment+html");
    }

    #[test]
    fn test_exact_match() {
        assert!(validate("text/html", Some("text/html")).is_ok());
        assert!(validate("", Some("text/html")).is_ok());
        assert!(validate("text/fragment+html", Some("text/fragment+html")).is_ok());
    }

    #[test]
    fn test_parameters_participate_in_match() {
        let err = validate("text/html", Some("text/html; charset=utf-8")).unwrap_err();
        assert_eq!(
            err,
            FragmentError::TypeMismatch {
                expected: "text/html".into(),
                actual: Some("text/html; charset=utf-8".into()),
            }
        );
        assert!(validate("text/html; charset=utf-8", Some("text/html;charset=utf-8")).is_ok());
    }

    #[test]
    fn test_not_a_prefix_match() {
        assert!(validate("text/html", Some("text/htmlx")).is_err());
        assert!(validate("text/fragment+html", Some("text/html")).is_err());
    }

    #[test]
    fn test_case_normalization() {
        assert!(validate("text/html", Some("TEXT/HTML")).is_ok());
        assert!(validate("Text/Html", Some("text/html")).is_ok());
    }

    #[test]
    fn test_wildcard_accepts_any_non_empty_type() {
        assert!(validate("*/*", Some("text/javascript")).is_ok());
        assert!(validate("text/html, */*", Some("application/json")).is_ok());
        assert!(validate("*/*", Some("")).is_err());
        assert!(validate("*/*", None).is_err());
    }

    #[test]
    fn test_missing_content_type_fails() {
        let err = validate("text/html", None).unwrap_err();
        assert!(err.to_string().contains("expected text/html"));
    }

    #[test]
    fn test_accept_list_matches_any_entry() {
        assert!(validate("text/fragment+html, text/html", Some("text/html")).is_ok());
        assert!(validate("text/fragment+html, text/html", Some("text/plain")).is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(" Text/HTML ;  Charset = UTF-8 "),
            "text/html;charset=UTF-8"
        );
        assert_eq!(normalize("*/*"), "*/*");
    }
}
