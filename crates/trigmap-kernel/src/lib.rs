//! # trigmap-kernel
//!
//! Shared vocabulary for the trigger dependency engine and the map state
//! aggregator:
//! - store records (`Trigger`, `Host`, `Item`, `Sysmap`, ...) as explicit
//!   structs with closed enums instead of loosely-typed rows
//! - the caller identity (`Principal`) and access levels
//! - `FrontendConfig` and the per-request `RenderContext`
//! - the error taxonomy (`ApiError`, `DependencyError`, `ConfigError`)
//!
//! The kernel does no I/O beyond reading a config file; data access lives in
//! `trigmap-store`.

pub mod config;
pub mod error;
pub mod host;
pub mod principal;
pub mod sysmap;
pub mod trigger;

pub use config::{
    DEFAULT_BLINK_PERIOD_SECS, DEFAULT_CONFIG_FILE, DEFAULT_OK_PERIOD_SECS, DEFAULT_SEARCH_LIMIT,
    FrontendConfig, Palette, RenderContext, UNRESOLVED_MACRO_STRING,
};
pub use error::{ApiError, ConfigError, DependencyError};
pub use host::{
    GroupId, HistoryPoint, Host, HostGroup, HostId, HostInterface, HostStatus, InterfaceId,
    InterfaceType, Item, ItemId, ItemStatus, Maintenance, MaintenanceId, UserMacro,
};
pub use principal::{Access, GroupRight, Permission, Principal, User, UserId, UserType};
pub use sysmap::{
    AreaType, DrawType, ElementSubtype, ElementType, IconMap, IconMapId, IconMapping, Image,
    ImageId, LabelLocation, LabelType, LinkId, LinkTrigger, MapLabels, SelementId, Selement,
    SelementTarget, ShowUnack, Sysmap, SysmapId, SysmapLink, TypeLabel,
};
pub use trigger::{
    DependencyEdge, Event, EventId, FunctionId, Severity, Trigger, TriggerFlags, TriggerFunction,
    TriggerId, TriggerState, TriggerStatus, TriggerValue,
};
