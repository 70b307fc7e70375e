//! Application filters: host, host-group and submap elements may restrict
//! the host triggers they count to triggers reading items of named
//! applications.

use std::collections::{BTreeMap, BTreeSet};
use trigmap_kernel::{ElementType, GroupId, HostId, SelementId, Selement, SelementTarget, Sysmap, TriggerId};

/// Application names each host is filtered by, per element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilters {
    by_element: BTreeMap<SelementId, BTreeMap<HostId, Vec<String>>>,
}

/// A trigger found through host membership, with what filtering needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTrigger {
    pub hosts: BTreeSet<HostId>,
    pub applications: BTreeSet<String>,
}

impl ApplicationFilters {
    /// Collect filters for every element.
    ///
    /// Host and host-group elements filter their own hosts. Submap elements
    /// inherit the filters of host and host-group elements inside every
    /// reachable submap; a host-group element without a filter there clears
    /// whatever was collected for its hosts.
    pub fn collect(
        selements: &[Selement],
        element_hosts: &BTreeMap<SelementId, BTreeSet<HostId>>,
        submaps: &BTreeMap<SelementId, Vec<Sysmap>>,
        group_hosts: &BTreeMap<GroupId, BTreeSet<HostId>>,
    ) -> Self {
        let mut filters = Self::default();

        for selement in selements {
            let selementid = selement.selementid;
            match selement.element_type() {
                ElementType::Host | ElementType::HostGroup => {
                    if selement.application.is_empty() {
                        continue;
                    }
                    for hostid in element_hosts.get(&selementid).into_iter().flatten() {
                        filters.push(selementid, *hostid, &selement.application);
                    }
                }
                ElementType::Map => {
                    for submap in submaps.get(&selementid).into_iter().flatten() {
                        filters.inherit(selementid, submap, group_hosts);
                    }
                }
                ElementType::Trigger | ElementType::Image => {}
            }
        }
        filters
    }

    fn inherit(
        &mut self,
        selementid: SelementId,
        submap: &Sysmap,
        group_hosts: &BTreeMap<GroupId, BTreeSet<HostId>>,
    ) {
        let members = |groupid: GroupId| group_hosts.get(&groupid).into_iter().flatten().copied();

        for inner in &submap.selements {
            if let SelementTarget::Host(hostid) = inner.element
                && !inner.application.is_empty()
            {
                self.push(selementid, hostid, &inner.application);
            }
        }
        for inner in &submap.selements {
            if let SelementTarget::HostGroup(groupid) = inner.element
                && !inner.application.is_empty()
            {
                for hostid in members(groupid) {
                    self.push(selementid, hostid, &inner.application);
                }
            }
        }
        for inner in &submap.selements {
            if let SelementTarget::HostGroup(groupid) = inner.element
                && inner.application.is_empty()
                && let Some(hosts) = self.by_element.get_mut(&selementid)
            {
                for hostid in members(groupid) {
                    hosts.remove(&hostid);
                }
            }
        }
    }

    fn push(&mut self, selementid: SelementId, hostid: HostId, application: &str) {
        self.by_element
            .entry(selementid)
            .or_default()
            .entry(hostid)
            .or_default()
            .push(application.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.by_element.values().all(BTreeMap::is_empty)
    }

    pub fn for_host(&self, selementid: SelementId, hostid: HostId) -> Option<&[String]> {
        self.by_element
            .get(&selementid)
            .and_then(|hosts| hosts.get(&hostid))
            .map(Vec::as_slice)
    }

    /// Drop host triggers that match none of the element's filters for
    /// their host. Triggers placed on a submap itself are never filtered
    /// out of that submap's element.
    pub fn apply(
        &self,
        selements: &[Selement],
        element_hosts: &BTreeMap<SelementId, BTreeSet<HostId>>,
        element_triggers: &mut BTreeMap<SelementId, BTreeSet<TriggerId>>,
        host_triggers: &BTreeMap<TriggerId, HostTrigger>,
        submap_triggers: &BTreeMap<TriggerId, BTreeSet<SelementId>>,
    ) {
        let filterable = selements.iter().filter(|s| {
            matches!(
                s.element_type(),
                ElementType::Host | ElementType::HostGroup | ElementType::Map
            )
        });

        for selement in filterable {
            let selementid = selement.selementid;
            let Some(triggers) = element_triggers.get_mut(&selementid) else {
                continue;
            };
            for hostid in element_hosts.get(&selementid).into_iter().flatten() {
                let Some(applications) = self.for_host(selementid, *hostid) else {
                    continue;
                };
                for (triggerid, trigger) in host_triggers {
                    if !trigger.hosts.contains(hostid) {
                        continue;
                    }
                    if submap_triggers
                        .get(triggerid)
                        .is_some_and(|owners| owners.contains(&selementid))
                    {
                        continue;
                    }
                    if !applications
                        .iter()
                        .any(|name| trigger.applications.contains(name))
                    {
                        triggers.remove(triggerid);
                    }
                }
            }
        }
    }
}
