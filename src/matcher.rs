//! Resolves an inbound event to the configured projects it should deploy.

use crate::config::{Config, ProjectSpec};
use crate::event::InboundEvent;

/// Returns every project matching the event's repository and branch, in
/// configuration order.
///
/// Repository identifiers are compared with exact, case-sensitive equality;
/// no normalization or suffix matching. A project without a branch filter
/// matches every branch of its repository. An event with an empty
/// repository name or branch matches nothing. Zero matches is a normal
/// outcome.
pub fn matching_projects<'a>(config: &'a Config, event: &InboundEvent) -> Vec<&'a ProjectSpec> {
    let branch = event.branch();
    if event.repository.is_empty() || branch.is_empty() {
        return Vec::new();
    }

    config
        .projects
        .iter()
        .filter(|project| {
            project.repo == event.repository
                && project.branch_filter().is_none_or(|filter| filter == branch)
        })
        .collect()
}
