//! C8: maps any title to a canonical title and its equivalent-title set.
//! Read-only from the core's perspective; the underlying document is loaded
//! by an external collaborator (the daemon's `config` module).

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

const LEADING_ARTICLES: &[&str] = &["a", "an", "the"];

fn ascii_fold(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect()
}

fn punctuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]").unwrap())
}

/// Strips a trailing scene-tag suffix such as `(Official)` or `[Group]` when
/// present at the very end of the title, case-insensitively.
fn strip_scene_tag_suffix(s: &str) -> String {
    let trimmed = s.trim_end();
    if let Some(stripped) = trimmed.strip_suffix(')') {
        if let Some(idx) = stripped.rfind('(') {
            return stripped[..idx].trim_end().to_string();
        }
    }
    if let Some(stripped) = trimmed.strip_suffix(']') {
        if let Some(idx) = stripped.rfind('[') {
            return stripped[..idx].trim_end().to_string();
        }
    }
    trimmed.to_string()
}

fn strip_trailing_s(word: &str) -> &str {
    if word.len() > 1 && word.ends_with('s') {
        &word[..word.len() - 1]
    } else {
        word
    }
}

/// Normalized-title key: ASCII fold, lowercase, scene-tag-suffix strip,
/// punctuation-to-space, leading-article strip, per-word trailing-`s` strip,
/// concatenation.
pub fn normalized_title_key(title: &str) -> String {
    let folded = ascii_fold(title).to_lowercase();
    let tag_stripped = strip_scene_tag_suffix(&folded);
    let spaced = punctuation_regex().replace_all(&tag_stripped, " ").into_owned();
    let mut words: Vec<&str> = spaced.split_whitespace().collect();
    if let Some(first) = words.first() {
        if LEADING_ARTICLES.contains(first) && words.len() > 1 {
            words.remove(0);
        }
    }
    words.iter().map(|w| strip_trailing_s(w)).collect()
}

#[derive(Debug, Clone)]
pub struct EquivalenceGroup {
    pub canonical_title: String,
    /// Display-order member set, including the canonical title itself.
    pub members: Vec<String>,
}

/// In-memory equivalence catalog built from configured groups.
#[derive(Debug, Clone, Default)]
pub struct EquivalenceCatalog {
    by_key: HashMap<String, usize>,
    groups: Vec<EquivalenceGroup>,
}

impl EquivalenceCatalog {
    pub fn from_groups(groups: Vec<EquivalenceGroup>) -> Self {
        let mut by_key = HashMap::new();
        for (idx, group) in groups.iter().enumerate() {
            let canonical_key = normalized_title_key(&group.canonical_title);
            by_key.entry(canonical_key).or_insert(idx);
            for member in &group.members {
                let key = normalized_title_key(member);
                by_key.entry(key).or_insert(idx);
            }
        }
        Self { by_key, groups }
    }

    pub fn try_resolve_canonical_title(&self, input: &str) -> Option<String> {
        let key = normalized_title_key(input);
        let idx = *self.by_key.get(&key)?;
        Some(self.groups[idx].canonical_title.clone())
    }

    pub fn try_get_equivalent_titles(&self, input: &str) -> Option<Vec<String>> {
        let key = normalized_title_key(input);
        let idx = *self.by_key.get(&key)?;
        Some(self.groups[idx].members.clone())
    }

    pub fn resolve_canonical_or_input(&self, input: &str) -> String {
        self.try_resolve_canonical_title(input)
            .unwrap_or_else(|| input.to_string())
    }
}
