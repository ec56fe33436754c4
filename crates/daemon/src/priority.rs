//! Builds C9's [`PriorityService`] from the `source_priority` document.

use sourcemerge_core::priority::PriorityService;

use crate::config::Settings;

pub fn build_priority_service(settings: &Settings) -> PriorityService {
    PriorityService::from_ordered_names(&settings.source_priority.ordered_source_names)
}
