//! Builds C8's [`EquivalenceCatalog`] from the `manga_equivalents` document.

use sourcemerge_core::equivalence::{EquivalenceCatalog, EquivalenceGroup};

use crate::config::Settings;

pub fn build_catalog(settings: &Settings) -> EquivalenceCatalog {
    let groups = settings
        .manga_equivalents
        .groups
        .iter()
        .map(|entry| {
            let mut members = vec![entry.canonical.clone()];
            members.extend(entry.aliases.iter().cloned());
            EquivalenceGroup {
                canonical_title: entry.canonical.clone(),
                members,
            }
        })
        .collect();
    EquivalenceCatalog::from_groups(groups)
}
