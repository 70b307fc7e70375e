//! # trigmap-maps
//!
//! Network map state aggregation over the `trigmap-store` gateway:
//! - [`area`]: host-group area expansion, grid layout, connector anchors
//! - [`collect`]: submap traversal and per-element reference buckets
//! - [`filter`]: application filters on host triggers
//! - [`aggregate`]: per-element problem/maintenance/disabled counters
//! - [`status`]: icon choice, status lines and highlights
//! - [`icon_map`]: inventory-driven icon selection
//! - [`label`]: label text with host, item-function and count macros
//! - [`link`]: link styles driven by link triggers
//! - [`state`]: the `map_state` pipeline tying the above together
//!
//! The pipeline is pure over a store snapshot and a [`RenderContext`]; it
//! never writes back to the store.
//!
//! [`RenderContext`]: trigmap_kernel::RenderContext

pub mod aggregate;
pub mod area;
pub mod collect;
pub mod error;
pub mod filter;
pub mod icon_map;
pub mod label;
pub mod link;
pub mod state;
pub mod status;

pub use aggregate::{ElementCounts, FoldSettings};
pub use area::{
    Area, DefaultIconMetrics, ExpandedMap, IconMetrics, ImageMetrics, area_link_anchor,
    expand_areas, layout_areas,
};
pub use collect::{ElementTargets, MapReferences, collect_references};
pub use error::MapError;
pub use filter::{ApplicationFilters, HostTrigger};
pub use icon_map::icon_by_mapping;
pub use label::{LabelLine, LabelResolver};
pub use link::{LinkState, link_state};
pub use state::{ElementState, MapState, MapStateOptions, map_state};
pub use status::{ElementIcons, ElementStatus, Highlight, IconType, StatusInfo, StatusLine};

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use trigmap_kernel::{
        AreaType, DrawType, ElementSubtype, GroupId, Host, HostId, HostStatus, LabelLocation,
        LinkId, SelementId, Selement, SelementTarget, Severity, Sysmap, SysmapId, SysmapLink,
        Trigger, TriggerFlags, TriggerId, TriggerValue,
    };

    pub fn selement(selementid: SelementId, element: SelementTarget) -> Selement {
        Selement {
            selementid,
            element,
            elementsubtype: ElementSubtype::HostGroup,
            areatype: AreaType::Fit,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            iconid_off: Some(1),
            iconid_on: None,
            iconid_maintenance: None,
            iconid_disabled: None,
            label: String::new(),
            label_location: LabelLocation::Default,
            application: String::new(),
            use_iconmap: false,
        }
    }

    pub fn map(sysmapid: SysmapId, selements: Vec<Selement>) -> Sysmap {
        Sysmap {
            sysmapid,
            name: format!("Map {sysmapid}"),
            width: 800,
            height: 600,
            labels: Default::default(),
            label_location: LabelLocation::Bottom,
            highlight: false,
            expandproblem: false,
            show_unack: Default::default(),
            severity_min: Default::default(),
            iconmapid: None,
            selements,
            links: Vec::new(),
        }
    }

    pub fn link(linkid: LinkId, a: SelementId, b: SelementId) -> SysmapLink {
        SysmapLink {
            linkid,
            selementid1: a,
            selementid2: b,
            drawtype: DrawType::Line,
            color: "000000".to_string(),
            label: String::new(),
            linktriggers: Vec::new(),
        }
    }

    pub fn host(hostid: HostId, name: &str, groups: &[GroupId]) -> Host {
        Host {
            hostid,
            host: name.to_string(),
            name: String::new(),
            description: String::new(),
            status: HostStatus::Monitored,
            maintenance_status: false,
            maintenanceid: None,
            groups: groups.to_vec(),
            templates: Vec::new(),
            interfaces: Vec::new(),
            inventory: BTreeMap::new(),
        }
    }

    pub fn trigger(triggerid: TriggerId, priority: Severity, value: TriggerValue) -> Trigger {
        Trigger {
            triggerid,
            description: format!("Trigger {triggerid}"),
            expression: String::new(),
            comments: String::new(),
            status: Default::default(),
            value,
            state: Default::default(),
            priority,
            lastchange: 0,
            templateid: None,
            flags: TriggerFlags::Normal,
            functions: Vec::new(),
            discovery_ruleid: None,
        }
    }
}
