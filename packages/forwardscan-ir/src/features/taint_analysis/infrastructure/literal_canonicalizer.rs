//! Guard literal canonicalization
//!
//! A prefix literal is canonicalized by percent-decoding until stable and then
//! resolving `.`/`..` segments. A literal that changes is non-canonical: it can
//! never match a fully decoded value. Deny-list keys are also case-folded so
//! `/WEB-INF` and `/web-inf` denote the same forbidden prefix.

use percent_encoding::percent_decode_str;

/// Nested encodings deeper than this are left partially decoded
const MAX_DECODE_PASSES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalLiteral {
    pub value: String,
    /// Canonicalization changed the literal
    pub changed: bool,
}

pub fn canonicalize(literal: &str) -> CanonicalLiteral {
    let decoded = decode_fully(literal);
    let value = remove_dot_segments(&decoded);
    CanonicalLiteral {
        changed: value != literal,
        value,
    }
}

/// Key and canonical flag for `startsWith(literal)` allow checks
pub fn allow_prefix_key(literal: &str) -> (String, bool) {
    let c = canonicalize(literal);
    (c.value, !c.changed)
}

/// Key and canonical flag for `!startsWith(literal)` deny checks
pub fn deny_prefix_key(literal: &str) -> (String, bool) {
    let c = canonicalize(literal);
    (c.value.to_lowercase(), !c.changed)
}

/// Percent-decode until no further change
pub fn decode_fully(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let next = percent_decode_str(&current).decode_utf8_lossy().into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// `.`/`..` segment resolution on a `/`-separated path
pub fn remove_dot_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);

    let mut out: Vec<&str> = Vec::new();
    let mut trailing_slash = false;
    for (i, seg) in segments.iter().enumerate() {
        match *seg {
            "." => trailing_slash = i == last,
            ".." => {
                out.pop();
                trailing_slash = i == last;
            }
            "" if i == 0 && absolute => {}
            s => {
                out.push(s);
                trailing_slash = false;
            }
        }
    }

    let mut result = String::with_capacity(path.len());
    if absolute {
        result.push('/');
    }
    result.push_str(&out.join("/"));
    if trailing_slash && !out.is_empty() {
        result.push('/');
    }
    result
}
