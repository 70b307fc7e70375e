//! # trigmap-triggers
//!
//! Trigger-side engines over the `trigmap-store` gateway:
//! - [`dependency`]: validated dependency-graph mutations with propagation
//!   to inherited triggers
//! - [`skip_dependent`]: the upstream-problem post-filter
//! - [`query`]: the trigger query engine (`get_triggers`, `count_triggers`)
//! - [`expand`]: macro expansion of trigger names, comments and expressions

pub mod dependency;
pub mod expand;
pub mod query;
pub mod skip_dependent;

pub use dependency::{
    DependencyChange, DependencyRequest, DependencyStore, add_dependencies, delete_dependencies,
    retarget_dependency, sync_template_dependencies,
};
pub use expand::{HostMacro, TriggerExpander, UserMacros, function_refs, host_macro_re};
pub use query::{
    SortField, SortOrder, TriggerFilter, TriggerQuery, TriggerSearch, TriggerSet, TriggerView,
    count_triggers, get_triggers,
};
pub use skip_dependent::filter_by_skip_dependent;
