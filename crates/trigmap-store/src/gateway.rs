//! The boundary the core consumes: read access to the monitoring store,
//! dependency-edge writes, and host-level permission checks.
//!
//! Every fetch is keyed by ID sets so callers can batch one round-trip per
//! record kind. `None` in a filter field means "no restriction".

use crate::error::StoreError;
use std::collections::{BTreeMap, BTreeSet};
use trigmap_kernel::{
    Access, DependencyEdge, Event, GroupId, HistoryPoint, Host, HostGroup, HostId, IconMap,
    IconMapId, Image, ImageId, Item, ItemId, Maintenance, MaintenanceId, Principal, Sysmap,
    SysmapId, Trigger, TriggerId, UserMacro,
};

/// Which side of the dependency table a lookup is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Edges whose `triggerid_down` is in the set (what these depend on).
    Up,
    /// Edges whose `triggerid_up` is in the set (what depends on these).
    Down,
}

#[derive(Debug, Clone, Default)]
pub struct TriggerFetch {
    pub triggerids: Option<BTreeSet<TriggerId>>,
    /// Triggers with at least one function on an item of these hosts.
    pub hostids: Option<BTreeSet<HostId>>,
    pub itemids: Option<BTreeSet<ItemId>>,
    /// Triggers inherited from (`templateid` in) these parent triggers.
    pub parent_triggerids: Option<BTreeSet<TriggerId>>,
}

impl TriggerFetch {
    pub fn by_ids(triggerids: impl IntoIterator<Item = TriggerId>) -> Self {
        Self {
            triggerids: Some(triggerids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn by_hosts(hostids: impl IntoIterator<Item = HostId>) -> Self {
        Self {
            hostids: Some(hostids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn children_of(parent_triggerids: impl IntoIterator<Item = TriggerId>) -> Self {
        Self {
            parent_triggerids: Some(parent_triggerids.into_iter().collect()),
            ..Self::default()
        }
    }
}

/// Host (and template) lookup.
#[derive(Debug, Clone, Default)]
pub struct HostFetch {
    pub hostids: Option<BTreeSet<HostId>>,
    pub groupids: Option<BTreeSet<GroupId>>,
    /// Hosts linked to any of these templates.
    pub templateids: Option<BTreeSet<HostId>>,
}

impl HostFetch {
    pub fn by_ids(hostids: impl IntoIterator<Item = HostId>) -> Self {
        Self {
            hostids: Some(hostids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn by_groups(groupids: impl IntoIterator<Item = GroupId>) -> Self {
        Self {
            groupids: Some(groupids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn linked_to(templateids: impl IntoIterator<Item = HostId>) -> Self {
        Self {
            templateids: Some(templateids.into_iter().collect()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemFetch {
    pub itemids: Option<BTreeSet<ItemId>>,
    pub hostids: Option<BTreeSet<HostId>>,
}

impl ItemFetch {
    pub fn by_ids(itemids: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            itemids: Some(itemids.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn by_hosts(hostids: impl IntoIterator<Item = HostId>) -> Self {
        Self {
            hostids: Some(hostids.into_iter().collect()),
            ..Self::default()
        }
    }
}

/// Read side of the monitoring store. Results are keyed/ordered by ID.
pub trait DataAccess {
    fn fetch_triggers(&self, filter: &TriggerFetch) -> Result<Vec<Trigger>, StoreError>;

    fn fetch_hosts(&self, filter: &HostFetch) -> Result<Vec<Host>, StoreError>;

    /// `None` fetches every group.
    fn fetch_host_groups(
        &self,
        groupids: Option<&BTreeSet<GroupId>>,
    ) -> Result<Vec<HostGroup>, StoreError>;

    fn fetch_items(&self, filter: &ItemFetch) -> Result<Vec<Item>, StoreError>;

    fn fetch_maps(&self, sysmapids: &BTreeSet<SysmapId>) -> Result<Vec<Sysmap>, StoreError>;

    /// Macros defined on the given hosts/templates plus every global macro.
    fn fetch_user_macros(&self, hostids: &BTreeSet<HostId>) -> Result<Vec<UserMacro>, StoreError>;

    fn fetch_dependency_edges(
        &self,
        triggerids: &BTreeSet<TriggerId>,
        direction: EdgeDirection,
    ) -> Result<Vec<DependencyEdge>, StoreError>;

    /// Most recent event per trigger (by clock, then ns, then eventid).
    fn fetch_last_events(
        &self,
        triggerids: &BTreeSet<TriggerId>,
    ) -> Result<BTreeMap<TriggerId, Event>, StoreError>;

    /// Triggers whose most recent PROBLEM event is unacknowledged.
    fn fetch_unacknowledged_trigger_ids(
        &self,
        triggerids: &BTreeSet<TriggerId>,
    ) -> Result<BTreeSet<TriggerId>, StoreError>;

    fn fetch_events(&self, triggerids: &BTreeSet<TriggerId>) -> Result<Vec<Event>, StoreError>;

    fn fetch_maintenances(
        &self,
        maintenanceids: &BTreeSet<MaintenanceId>,
    ) -> Result<Vec<Maintenance>, StoreError>;

    fn fetch_icon_map(&self, iconmapid: IconMapId) -> Result<Option<IconMap>, StoreError>;

    fn fetch_images(&self, imageids: &BTreeSet<ImageId>) -> Result<Vec<Image>, StoreError>;

    /// History values of one item with `clock >= since`, oldest first.
    fn fetch_item_history(&self, itemid: ItemId, since: i64)
    -> Result<Vec<HistoryPoint>, StoreError>;
}

/// Write side used by dependency mutations.
pub trait DependencyWriter {
    fn insert_dependency_edges(&mut self, edges: &[DependencyEdge]) -> Result<(), StoreError>;

    /// Remove every edge whose `triggerid_down` is in the set.
    fn delete_dependency_edges(
        &mut self,
        triggerids_down: &BTreeSet<TriggerId>,
    ) -> Result<usize, StoreError>;

    /// Delete the down-edges of `triggerids_down`, then insert `edges`.
    /// Either both writes land or neither does.
    fn replace_dependency_edges(
        &mut self,
        triggerids_down: &BTreeSet<TriggerId>,
        edges: &[DependencyEdge],
    ) -> Result<usize, StoreError>;
}

/// Host-level permission checks. Objects owned by hosts (triggers, items)
/// are permitted when every owning host is.
pub trait PermissionOracle {
    fn permitted_hosts(
        &self,
        principal: &Principal,
        access: Access,
        hostids: &BTreeSet<HostId>,
    ) -> Result<BTreeSet<HostId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_only_restrict_their_field() {
        let fetch = TriggerFetch::by_hosts([3, 1, 3]);
        assert_eq!(fetch.hostids, Some(BTreeSet::from([1, 3])));
        assert!(fetch.triggerids.is_none());
        assert!(fetch.parent_triggerids.is_none());

        let hosts = HostFetch::linked_to([10]);
        assert!(hosts.hostids.is_none());
        assert_eq!(hosts.templateids, Some(BTreeSet::from([10])));
    }
}
