//! Canonical in-memory monitoring store.
//!
//! This is the reference implementation of the gateway traits:
//! - load/store JSONL snapshots
//! - answer `DataAccess` fetches deterministically (ID order)
//! - apply dependency-edge writes, optionally inside an all-or-nothing
//!   transaction
//! - evaluate host-group rights for `PermissionOracle`

use crate::error::StoreError;
use crate::gateway::{
    DataAccess, DependencyWriter, EdgeDirection, HostFetch, ItemFetch, PermissionOracle,
    TriggerFetch,
};
use crate::jsonl::{StoreRecord, read_records_from_path, write_records_to_path};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use trigmap_kernel::{
    Access, DependencyEdge, Event, EventId, GroupId, HistoryPoint, Host, HostGroup, HostId,
    IconMap, IconMapId, Image, ImageId, Item, ItemId, Maintenance, MaintenanceId, Permission,
    Principal, Sysmap, SysmapId, Trigger, TriggerId, User, UserId, UserMacro,
};

pub const STORE_SNAPSHOT_REF_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    hosts: BTreeMap<HostId, Host>,
    groups: BTreeMap<GroupId, HostGroup>,
    items: BTreeMap<ItemId, Item>,
    triggers: BTreeMap<TriggerId, Trigger>,
    edges: BTreeSet<DependencyEdge>,
    events: BTreeMap<EventId, Event>,
    maintenances: BTreeMap<MaintenanceId, Maintenance>,
    maps: BTreeMap<SysmapId, Sysmap>,
    icon_maps: BTreeMap<IconMapId, IconMap>,
    images: BTreeMap<ImageId, Image>,
    macros: Vec<UserMacro>,
    history: Vec<HistoryPoint>,
    users: BTreeMap<UserId, User>,
}

impl MemoryStore {
    /// Build a store from snapshot records. Duplicate IDs resolve with
    /// last-write-wins, matching append/overlay snapshot workflows.
    pub fn from_records(records: Vec<StoreRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            store.insert_record(record);
        }
        store
    }

    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::from_records(read_records_from_path(path)?))
    }

    pub fn save_jsonl(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        write_records_to_path(path, &self.records())?;
        Ok(())
    }

    pub fn insert_record(&mut self, record: StoreRecord) {
        match record {
            StoreRecord::Host(host) => {
                self.hosts.insert(host.hostid, host);
            }
            StoreRecord::HostGroup(group) => {
                self.groups.insert(group.groupid, group);
            }
            StoreRecord::Item(item) => {
                self.items.insert(item.itemid, item);
            }
            StoreRecord::Trigger(trigger) => {
                self.triggers.insert(trigger.triggerid, trigger);
            }
            StoreRecord::Dependency(edge) => {
                self.edges.insert(edge);
            }
            StoreRecord::Event(event) => {
                self.events.insert(event.eventid, event);
            }
            StoreRecord::Maintenance(maintenance) => {
                self.maintenances
                    .insert(maintenance.maintenanceid, maintenance);
            }
            StoreRecord::Map(map) => {
                self.maps.insert(map.sysmapid, map);
            }
            StoreRecord::IconMap(icon_map) => {
                self.icon_maps.insert(icon_map.iconmapid, icon_map);
            }
            StoreRecord::Image(image) => {
                self.images.insert(image.imageid, image);
            }
            StoreRecord::UserMacro(user_macro) => {
                self.macros
                    .retain(|m| !(m.hostid == user_macro.hostid && m.name == user_macro.name));
                self.macros.push(user_macro);
            }
            StoreRecord::History(point) => self.history.push(point),
            StoreRecord::User(user) => {
                self.users.insert(user.userid, user);
            }
        }
    }

    /// Every record in deterministic (kind, id) order.
    pub fn records(&self) -> Vec<StoreRecord> {
        let mut records = Vec::new();
        records.extend(self.groups.values().cloned().map(StoreRecord::HostGroup));
        records.extend(self.hosts.values().cloned().map(StoreRecord::Host));
        records.extend(self.items.values().cloned().map(StoreRecord::Item));
        records.extend(self.triggers.values().cloned().map(StoreRecord::Trigger));
        records.extend(self.edges.iter().copied().map(StoreRecord::Dependency));
        records.extend(self.events.values().cloned().map(StoreRecord::Event));
        records.extend(
            self.maintenances
                .values()
                .cloned()
                .map(StoreRecord::Maintenance),
        );
        records.extend(self.images.values().cloned().map(StoreRecord::Image));
        records.extend(self.icon_maps.values().cloned().map(StoreRecord::IconMap));
        records.extend(self.maps.values().cloned().map(StoreRecord::Map));
        records.extend(self.macros.iter().cloned().map(StoreRecord::UserMacro));
        records.extend(self.history.iter().cloned().map(StoreRecord::History));
        records.extend(self.users.values().cloned().map(StoreRecord::User));
        records
    }

    pub fn trigger(&self, triggerid: TriggerId) -> Option<&Trigger> {
        self.triggers.get(&triggerid)
    }

    pub fn trigger_mut(&mut self, triggerid: TriggerId) -> Option<&mut Trigger> {
        self.triggers.get_mut(&triggerid)
    }

    pub fn host(&self, hostid: HostId) -> Option<&Host> {
        self.hosts.get(&hostid)
    }

    pub fn host_mut(&mut self, hostid: HostId) -> Option<&mut Host> {
        self.hosts.get_mut(&hostid)
    }

    pub fn item_mut(&mut self, itemid: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&itemid)
    }

    pub fn map(&self, sysmapid: SysmapId) -> Option<&Sysmap> {
        self.maps.get(&sysmapid)
    }

    pub fn user(&self, userid: UserId) -> Option<&User> {
        self.users.get(&userid)
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }

    pub fn dependency_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    pub fn has_dependency(&self, triggerid_down: TriggerId, triggerid_up: TriggerId) -> bool {
        self.edges
            .contains(&DependencyEdge::new(triggerid_down, triggerid_up))
    }

    /// Run `mutation` against a staged copy; commit only on `Ok`.
    pub fn transaction<T, E, F>(&mut self, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut MemoryStore) -> Result<T, E>,
    {
        let mut staged = self.clone();
        let value = mutation(&mut staged)?;
        *self = staged;
        Ok(value)
    }

    fn host_permitted(user: &User, host: &Host, required: Permission) -> bool {
        if host.groups.is_empty() {
            return true;
        }
        let rights: Vec<Permission> = host
            .groups
            .iter()
            .filter_map(|groupid| user.right_on(*groupid))
            .collect();
        match (rights.iter().min(), rights.iter().max()) {
            (Some(min), Some(max)) => *min != Permission::Deny && *max >= required,
            _ => false,
        }
    }
}

/// Content reference of a store snapshot: `sha256:<hex>` over the canonical
/// JSONL lines. Equal stores yield equal refs.
pub fn store_snapshot_ref(store: &MemoryStore) -> Result<String, StoreError> {
    let mut hasher = Sha256::new();
    for record in store.records() {
        let line = serde_json::to_string(&record)
            .map_err(|e| crate::jsonl::JsonlError::Serialize(e.to_string()))?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{STORE_SNAPSHOT_REF_PREFIX}{:x}", hasher.finalize()))
}

fn keep<T: Ord>(filter: &Option<BTreeSet<T>>, value: &T) -> bool {
    filter.as_ref().is_none_or(|set| set.contains(value))
}

impl DataAccess for MemoryStore {
    fn fetch_triggers(&self, filter: &TriggerFetch) -> Result<Vec<Trigger>, StoreError> {
        let host_items: Option<BTreeSet<ItemId>> = filter.hostids.as_ref().map(|hostids| {
            self.items
                .values()
                .filter(|item| hostids.contains(&item.hostid))
                .map(|item| item.itemid)
                .collect()
        });

        Ok(self
            .triggers
            .values()
            .filter(|t| keep(&filter.triggerids, &t.triggerid))
            .filter(|t| {
                filter
                    .parent_triggerids
                    .as_ref()
                    .is_none_or(|parents| t.templateid.is_some_and(|id| parents.contains(&id)))
            })
            .filter(|t| {
                host_items
                    .as_ref()
                    .is_none_or(|items| t.functions.iter().any(|f| items.contains(&f.itemid)))
            })
            .filter(|t| {
                filter
                    .itemids
                    .as_ref()
                    .is_none_or(|items| t.functions.iter().any(|f| items.contains(&f.itemid)))
            })
            .cloned()
            .collect())
    }

    fn fetch_hosts(&self, filter: &HostFetch) -> Result<Vec<Host>, StoreError> {
        Ok(self
            .hosts
            .values()
            .filter(|h| keep(&filter.hostids, &h.hostid))
            .filter(|h| {
                filter
                    .groupids
                    .as_ref()
                    .is_none_or(|groups| h.groups.iter().any(|g| groups.contains(g)))
            })
            .filter(|h| {
                filter
                    .templateids
                    .as_ref()
                    .is_none_or(|templates| h.templates.iter().any(|t| templates.contains(t)))
            })
            .cloned()
            .collect())
    }

    fn fetch_host_groups(
        &self,
        groupids: Option<&BTreeSet<GroupId>>,
    ) -> Result<Vec<HostGroup>, StoreError> {
        Ok(self
            .groups
            .values()
            .filter(|g| groupids.is_none_or(|ids| ids.contains(&g.groupid)))
            .cloned()
            .collect())
    }

    fn fetch_items(&self, filter: &ItemFetch) -> Result<Vec<Item>, StoreError> {
        Ok(self
            .items
            .values()
            .filter(|i| keep(&filter.itemids, &i.itemid))
            .filter(|i| keep(&filter.hostids, &i.hostid))
            .cloned()
            .collect())
    }

    fn fetch_maps(&self, sysmapids: &BTreeSet<SysmapId>) -> Result<Vec<Sysmap>, StoreError> {
        Ok(sysmapids
            .iter()
            .filter_map(|id| self.maps.get(id))
            .cloned()
            .collect())
    }

    fn fetch_user_macros(&self, hostids: &BTreeSet<HostId>) -> Result<Vec<UserMacro>, StoreError> {
        Ok(self
            .macros
            .iter()
            .filter(|m| m.hostid.is_none_or(|id| hostids.contains(&id)))
            .cloned()
            .collect())
    }

    fn fetch_dependency_edges(
        &self,
        triggerids: &BTreeSet<TriggerId>,
        direction: EdgeDirection,
    ) -> Result<Vec<DependencyEdge>, StoreError> {
        Ok(self
            .edges
            .iter()
            .filter(|edge| match direction {
                EdgeDirection::Up => triggerids.contains(&edge.triggerid_down),
                EdgeDirection::Down => triggerids.contains(&edge.triggerid_up),
            })
            .copied()
            .collect())
    }

    fn fetch_last_events(
        &self,
        triggerids: &BTreeSet<TriggerId>,
    ) -> Result<BTreeMap<TriggerId, Event>, StoreError> {
        let mut last: BTreeMap<TriggerId, &Event> = BTreeMap::new();
        for event in self.events.values() {
            if !triggerids.contains(&event.objectid) {
                continue;
            }
            let newer = last.get(&event.objectid).is_none_or(|current| {
                (event.clock, event.ns, event.eventid) > (current.clock, current.ns, current.eventid)
            });
            if newer {
                last.insert(event.objectid, event);
            }
        }
        Ok(last
            .into_iter()
            .map(|(id, event)| (id, event.clone()))
            .collect())
    }

    fn fetch_unacknowledged_trigger_ids(
        &self,
        triggerids: &BTreeSet<TriggerId>,
    ) -> Result<BTreeSet<TriggerId>, StoreError> {
        let mut last_problem: BTreeMap<TriggerId, &Event> = BTreeMap::new();
        for event in self.events.values() {
            if !event.is_problem() || !triggerids.contains(&event.objectid) {
                continue;
            }
            let newer = last_problem
                .get(&event.objectid)
                .is_none_or(|current| event.eventid > current.eventid);
            if newer {
                last_problem.insert(event.objectid, event);
            }
        }
        Ok(last_problem
            .into_iter()
            .filter(|(_, event)| !event.acknowledged)
            .map(|(id, _)| id)
            .collect())
    }

    fn fetch_events(&self, triggerids: &BTreeSet<TriggerId>) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .values()
            .filter(|event| triggerids.contains(&event.objectid))
            .cloned()
            .collect())
    }

    fn fetch_maintenances(
        &self,
        maintenanceids: &BTreeSet<MaintenanceId>,
    ) -> Result<Vec<Maintenance>, StoreError> {
        Ok(maintenanceids
            .iter()
            .filter_map(|id| self.maintenances.get(id))
            .cloned()
            .collect())
    }

    fn fetch_icon_map(&self, iconmapid: IconMapId) -> Result<Option<IconMap>, StoreError> {
        Ok(self.icon_maps.get(&iconmapid).cloned())
    }

    fn fetch_images(&self, imageids: &BTreeSet<ImageId>) -> Result<Vec<Image>, StoreError> {
        Ok(imageids
            .iter()
            .filter_map(|id| self.images.get(id))
            .cloned()
            .collect())
    }

    fn fetch_item_history(
        &self,
        itemid: ItemId,
        since: i64,
    ) -> Result<Vec<HistoryPoint>, StoreError> {
        let mut points: Vec<HistoryPoint> = self
            .history
            .iter()
            .filter(|p| p.itemid == itemid && p.clock >= since)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.clock);
        Ok(points)
    }
}

impl DependencyWriter for MemoryStore {
    /// Inserts the whole batch or nothing.
    fn insert_dependency_edges(&mut self, edges: &[DependencyEdge]) -> Result<(), StoreError> {
        let mut batch = BTreeSet::new();
        for edge in edges {
            for id in [edge.triggerid_down, edge.triggerid_up] {
                if !self.triggers.contains_key(&id) {
                    return Err(StoreError::NotFound {
                        kind: "trigger",
                        id,
                    });
                }
            }
            if self.edges.contains(edge) || !batch.insert(*edge) {
                return Err(StoreError::DependencyAlreadyExists {
                    down: edge.triggerid_down,
                    up: edge.triggerid_up,
                });
            }
        }
        self.edges.extend(batch);
        Ok(())
    }

    fn delete_dependency_edges(
        &mut self,
        triggerids_down: &BTreeSet<TriggerId>,
    ) -> Result<usize, StoreError> {
        let before = self.edges.len();
        self.edges
            .retain(|edge| !triggerids_down.contains(&edge.triggerid_down));
        Ok(before - self.edges.len())
    }

    fn replace_dependency_edges(
        &mut self,
        triggerids_down: &BTreeSet<TriggerId>,
        edges: &[DependencyEdge],
    ) -> Result<usize, StoreError> {
        self.transaction(|staged| {
            let deleted = staged.delete_dependency_edges(triggerids_down)?;
            staged.insert_dependency_edges(edges)?;
            Ok(deleted)
        })
    }
}

impl PermissionOracle for MemoryStore {
    fn permitted_hosts(
        &self,
        principal: &Principal,
        access: Access,
        hostids: &BTreeSet<HostId>,
    ) -> Result<BTreeSet<HostId>, StoreError> {
        if principal.is_super_admin() {
            return Ok(hostids.clone());
        }
        let Some(user) = self.users.get(&principal.userid) else {
            return Ok(BTreeSet::new());
        };
        let required = access.required();
        Ok(hostids
            .iter()
            .filter_map(|id| self.hosts.get(id))
            .filter(|host| Self::host_permitted(user, host, required))
            .map(|host| host.hostid)
            .collect())
    }
}
