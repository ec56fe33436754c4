//! C9: maps a source name to its configured priority rank. Ordinal name
//! comparison; read-only from the core's perspective.

use std::collections::HashMap;

pub const DEFAULT_PRIORITY: i64 = i64::MAX;

#[derive(Debug, Clone, Default)]
pub struct PriorityService {
    ranks: HashMap<String, i64>,
}

impl PriorityService {
    /// `ordered_source_names` is the configured priority list, highest
    /// priority first; rank is its 0-based index.
    pub fn from_ordered_names(ordered_source_names: &[String]) -> Self {
        let ranks = ordered_source_names
            .iter()
            .enumerate()
            .map(|(rank, name)| (name.clone(), rank as i64))
            .collect();
        Self { ranks }
    }

    pub fn get_priority_or_default(&self, source_name: &str, default: i64) -> i64 {
        self.ranks.get(source_name).copied().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_source_returns_its_rank() {
        let p = PriorityService::from_ordered_names(&[
            "SourceA".to_string(),
            "SourceB".to_string(),
        ]);
        assert_eq!(p.get_priority_or_default("SourceB", DEFAULT_PRIORITY), 1);
    }

    #[test]
    fn unconfigured_source_returns_default() {
        let p = PriorityService::from_ordered_names(&["SourceA".to_string()]);
        assert_eq!(
            p.get_priority_or_default("SourceZ", DEFAULT_PRIORITY),
            DEFAULT_PRIORITY
        );
    }
}
