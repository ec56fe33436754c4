//! C3: pure chapter-directory-name sanitizer.
//!
//! `sanitize` is a total function: every input maps to *some* output, and
//! inputs that don't match either rewrite shape map to themselves. Both
//! rewrite shapes strip digits only from the leading scanlation-group token,
//! which is what makes the function idempotent (see the test at the bottom):
//! once the token is digit-free, neither shape's eligibility condition can
//! fire a second, different rewrite.

use std::sync::OnceLock;

use regex::Regex;

/// Tokens that must never be treated as a scanlation-group prefix, even if
/// they otherwise look eligible (structural keywords, leading articles).
const BLACKLIST: &[&str] = &[
    "the", "a", "an", "ch", "ep", "vol", "volume", "chapter", "episode", "issue", "special",
    "extra", "side", "season",
];

/// Known group names with no digits in them. Digit-free tokens already
/// rewrite to themselves (nothing to strip), so whitelisting only documents
/// that these names are recognized groups; it never changes output.
const WHITELIST: &[&str] = &["asura", "void", "null", "genesis", "trinity"];

const CHAPTER_KEYWORDS: &[&str] = &[
    "ch.", "chapter", "ep.", "episode", "issue", "special", "extra", "side", "season", "volume",
    "vol.",
];

fn boundary_chapter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(ch\.|chapter|ep\.|episode|issue|special|extra|side|season|vol\.|volume)\b").unwrap()
    })
}

fn embedded_chapter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(ch\.|chapter|ep\.|episode|issue|special|extra|side|season|vol\.|volume)").unwrap()
    })
}

fn prefix_space_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*[0-9][A-Za-z0-9]*)\s+(.+)$").unwrap())
}

fn is_blacklisted(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    BLACKLIST.iter().any(|b| *b == lower)
}

fn is_whitelisted(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    WHITELIST.iter().any(|w| *w == lower)
}

/// "Looks like a group prefix": contains at least one ASCII letter and at
/// least one ASCII digit.
fn looks_like_group_prefix(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_alphabetic()) && token.chars().any(|c| c.is_ascii_digit())
}

fn eligible_prefix(token: &str) -> bool {
    !token.is_empty()
        && !is_blacklisted(token)
        && (is_whitelisted(token) || looks_like_group_prefix(token))
}

fn strip_digits(token: &str) -> String {
    token.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// True iff `CHAPTER_KEYWORDS` matches at the start of `s`, or anywhere
/// embedded within it, both case-insensitively. Used by the underscore form.
fn is_chapter_like(s: &str) -> bool {
    boundary_chapter_regex().is_match(s) || embedded_chapter_regex().is_match(s)
}

/// True iff `s` begins with a chapter keyword. Used by the prefix-space
/// form, which requires the keyword at the very start of `REST`.
fn starts_with_chapter_keyword(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    CHAPTER_KEYWORDS.iter().any(|kw| lower.starts_with(kw))
}

fn try_underscore_form(name: &str) -> Option<String> {
    let underscore_idx = name.find('_')?;
    let (prefix, after) = name.split_at(underscore_idx);
    let rest = &after[1..];

    let token_end = prefix
        .find(|c: char| c.is_whitespace())
        .unwrap_or(prefix.len());
    let prefix_token = &prefix[..token_end];
    let prefix_tail = &prefix[token_end..];

    if !eligible_prefix(prefix_token) {
        return None;
    }
    if !is_chapter_like(rest) {
        return None;
    }
    let stripped = strip_digits(prefix_token);
    if stripped.is_empty() {
        return None;
    }
    Some(format!("{stripped}{prefix_tail}_{rest}"))
}

fn try_prefix_space_form(name: &str) -> Option<String> {
    let caps = prefix_space_regex().captures(name)?;
    let token = caps.get(1).unwrap().as_str();
    let rest = caps.get(2).unwrap().as_str();

    if !starts_with_chapter_keyword(rest) {
        return None;
    }
    if !eligible_prefix(token) {
        return None;
    }
    let stripped = strip_digits(token);
    Some(format!("{stripped} {rest}"))
}

/// Maps a chapter directory basename to its sanitized form, or returns the
/// input unchanged when neither rewrite shape applies.
pub fn sanitize(name: &str) -> String {
    if let Some(out) = try_underscore_form(name) {
        return out;
    }
    if let Some(out) = try_prefix_space_form(name) {
        return out;
    }
    name.to_string()
}
