//! Trigger → item → host joins for an already-fetched trigger set.
//!
//! Triggers carry no host reference of their own; ownership is derived from
//! the items their functions read. Every consumer of "which hosts does this
//! trigger live on" goes through [`TriggerRelations`].

use crate::error::StoreError;
use crate::gateway::{DataAccess, HostFetch, ItemFetch, PermissionOracle};
use std::collections::{BTreeMap, BTreeSet};
use trigmap_kernel::{
    Access, Host, HostId, HostStatus, Item, ItemId, Principal, Trigger, TriggerId,
};

#[derive(Debug, Clone, Default)]
pub struct TriggerRelations {
    items: BTreeMap<ItemId, Item>,
    hosts: BTreeMap<HostId, Host>,
    trigger_hosts: BTreeMap<TriggerId, BTreeSet<HostId>>,
}

impl TriggerRelations {
    /// Fetch the items and hosts behind `triggers` in two round-trips.
    pub fn load<'a, D>(
        data: &D,
        triggers: impl IntoIterator<Item = &'a Trigger>,
    ) -> Result<Self, StoreError>
    where
        D: DataAccess + ?Sized,
    {
        let triggers: Vec<&Trigger> = triggers.into_iter().collect();
        let itemids: BTreeSet<ItemId> = triggers.iter().flat_map(|t| t.item_ids()).collect();
        if itemids.is_empty() {
            return Ok(Self {
                trigger_hosts: triggers
                    .iter()
                    .map(|t| (t.triggerid, BTreeSet::new()))
                    .collect(),
                ..Self::default()
            });
        }

        let items: BTreeMap<ItemId, Item> = data
            .fetch_items(&ItemFetch::by_ids(itemids))?
            .into_iter()
            .map(|item| (item.itemid, item))
            .collect();
        let hostids: BTreeSet<HostId> = items.values().map(|item| item.hostid).collect();
        let hosts: BTreeMap<HostId, Host> = data
            .fetch_hosts(&HostFetch::by_ids(hostids))?
            .into_iter()
            .map(|host| (host.hostid, host))
            .collect();

        let trigger_hosts = triggers
            .iter()
            .map(|trigger| {
                let owners = trigger
                    .functions
                    .iter()
                    .filter_map(|f| items.get(&f.itemid))
                    .map(|item| item.hostid)
                    .collect();
                (trigger.triggerid, owners)
            })
            .collect();

        Ok(Self {
            items,
            hosts,
            trigger_hosts,
        })
    }

    pub fn item(&self, itemid: ItemId) -> Option<&Item> {
        self.items.get(&itemid)
    }

    pub fn host(&self, hostid: HostId) -> Option<&Host> {
        self.hosts.get(&hostid)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host_ids_of(&self, triggerid: TriggerId) -> impl Iterator<Item = HostId> + '_ {
        self.trigger_hosts
            .get(&triggerid)
            .into_iter()
            .flat_map(|ids| ids.iter().copied())
    }

    pub fn hosts_of(&self, triggerid: TriggerId) -> impl Iterator<Item = &Host> + '_ {
        self.host_ids_of(triggerid)
            .filter_map(move |hostid| self.hosts.get(&hostid))
    }

    pub fn items_of<'a>(&'a self, trigger: &'a Trigger) -> impl Iterator<Item = &'a Item> + 'a {
        trigger
            .functions
            .iter()
            .filter_map(move |f| self.items.get(&f.itemid))
    }

    /// Owning hosts that are templates.
    pub fn templates_of(&self, triggerid: TriggerId) -> BTreeSet<HostId> {
        self.hosts_of(triggerid)
            .filter(|host| host.is_template())
            .map(|host| host.hostid)
            .collect()
    }

    /// Enabled, every item active, every host monitored.
    pub fn is_monitored(&self, trigger: &Trigger) -> bool {
        trigger.is_enabled()
            && self.items_of(trigger).all(Item::is_active)
            && self.hosts_of(trigger.triggerid).all(Host::is_monitored)
    }

    /// Enabled and every host monitored (items may be disabled).
    pub fn is_active(&self, trigger: &Trigger) -> bool {
        trigger.is_enabled() && self.hosts_of(trigger.triggerid).all(Host::is_monitored)
    }

    /// Disabled directly, through a disabled item, or through an unmonitored
    /// host. Template ownership does not count as disabled.
    pub fn is_disabled(&self, trigger: &Trigger) -> bool {
        !trigger.is_enabled()
            || self.items_of(trigger).any(|item| !item.is_active())
            || self
                .hosts_of(trigger.triggerid)
                .any(|host| host.status == HostStatus::NotMonitored)
    }
}

/// Triggers from `triggerids` the principal may access: every owning host
/// must be permitted. Super admins see everything.
pub fn permitted_trigger_ids<P>(
    oracle: &P,
    relations: &TriggerRelations,
    principal: &Principal,
    access: Access,
    triggerids: impl IntoIterator<Item = TriggerId>,
) -> Result<BTreeSet<TriggerId>, StoreError>
where
    P: PermissionOracle + ?Sized,
{
    let triggerids: BTreeSet<TriggerId> = triggerids.into_iter().collect();
    if principal.is_super_admin() {
        return Ok(triggerids);
    }

    let hostids: BTreeSet<HostId> = triggerids
        .iter()
        .flat_map(|id| relations.host_ids_of(*id))
        .collect();
    let permitted = oracle.permitted_hosts(principal, access, &hostids)?;

    Ok(triggerids
        .into_iter()
        .filter(|id| {
            let mut owners = relations.host_ids_of(*id).peekable();
            owners.peek().is_some() && owners.all(|h| permitted.contains(&h))
        })
        .collect())
}
