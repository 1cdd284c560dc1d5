//! Plain-text estimation for rich-text bodies
//!
//! Bodies are opaque HTML produced by the editor widget. The engine only
//! needs a rough plain-text view for the character count; presence is
//! decided on the raw body (see [`is_present`]).

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| {
    // Block-level closers and <br> become whitespace so words don't merge
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6])\b[^>]*>|<[^>]*>").expect("static regex")
});

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(nbsp|amp|lt|gt|quot|#39|apos);").expect("static regex"));

/// Strip markup and decode the common entities
#[must_use]
pub fn plain_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, |caps: &regex::Captures<'_>| {
        if caps.get(1).is_some() {
            " "
        } else {
            ""
        }
    });
    ENTITY
        .replace_all(&stripped, |caps: &regex::Captures<'_>| match &caps[1] {
            "nbsp" => " ",
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        })
        .into_owned()
}

/// Character count of the trimmed plain text
#[must_use]
pub fn plain_text_len(html: &str) -> usize {
    plain_text(html).trim().chars().count()
}

/// True when the raw body is non-empty after trimming
///
/// Markup counts: an image-only body is present.
#[inline]
#[must_use]
pub fn is_present(body: &str) -> bool {
    !body.trim().is_empty()
}
