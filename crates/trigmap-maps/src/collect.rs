//! Reference collection: which hosts, host groups and triggers every
//! top-level element of a map stands for, following nested submaps.

use crate::error::MapError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use trigmap_kernel::{
    GroupId, HostId, SelementId, Selement, SelementTarget, Sysmap, SysmapId, TriggerId,
};
use trigmap_store::DataAccess;

/// Inverted indexes from referenced object to the top-level elements it
/// contributes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapReferences {
    /// Host elements of this map and of every reachable submap.
    pub hosts: BTreeMap<HostId, BTreeSet<SelementId>>,
    pub groups: BTreeMap<GroupId, BTreeSet<SelementId>>,
    /// Trigger elements placed directly on this map.
    pub triggers: BTreeMap<TriggerId, BTreeSet<SelementId>>,
    /// Trigger elements found inside submaps.
    pub submap_triggers: BTreeMap<TriggerId, BTreeSet<SelementId>>,
    /// Every map reachable from a submap element, in discovery order.
    pub submaps: BTreeMap<SelementId, Vec<Sysmap>>,
}

impl MapReferences {
    /// Hosts, groups and triggers an element stands for, transitively.
    pub fn element_targets(&self, selement: &Selement) -> ElementTargets {
        let mut targets = ElementTargets::default();
        match selement.element {
            SelementTarget::Host(hostid) => {
                targets.hosts.insert(hostid);
            }
            SelementTarget::HostGroup(groupid) => {
                targets.groups.insert(groupid);
            }
            SelementTarget::Trigger(triggerid) => {
                targets.triggers.insert(triggerid);
            }
            SelementTarget::Map(_) => {
                for submap in self.submaps.get(&selement.selementid).into_iter().flatten() {
                    for inner in &submap.selements {
                        match inner.element {
                            SelementTarget::Host(hostid) => {
                                targets.hosts.insert(hostid);
                            }
                            SelementTarget::HostGroup(groupid) => {
                                targets.groups.insert(groupid);
                            }
                            SelementTarget::Trigger(triggerid) => {
                                targets.triggers.insert(triggerid);
                            }
                            SelementTarget::Map(_) | SelementTarget::Image => {}
                        }
                    }
                }
            }
            SelementTarget::Image => {}
        }
        targets
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementTargets {
    pub hosts: BTreeSet<HostId>,
    pub groups: BTreeSet<GroupId>,
    pub triggers: BTreeSet<TriggerId>,
}

impl ElementTargets {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.groups.is_empty() && self.triggers.is_empty()
    }
}

/// Bucket every object referenced by `selements` (elements of map `root`)
/// by the top-level element it belongs to.
///
/// Submaps are followed depth-first. A submap reached twice through
/// different paths is counted once; a submap that leads back onto the
/// current path fails with [`MapError::SubmapCycle`]. Dangling submap
/// references are skipped.
pub fn collect_references<D>(
    data: &D,
    root: SysmapId,
    selements: &[Selement],
) -> Result<MapReferences, MapError>
where
    D: DataAccess + ?Sized,
{
    let mut refs = MapReferences::default();
    let mut walker = SubmapWalker {
        data,
        cache: BTreeMap::new(),
    };

    for selement in selements {
        let selementid = selement.selementid;
        match selement.element {
            SelementTarget::Host(hostid) => {
                refs.hosts.entry(hostid).or_default().insert(selementid);
            }
            SelementTarget::HostGroup(groupid) => {
                refs.groups.entry(groupid).or_default().insert(selementid);
            }
            SelementTarget::Trigger(triggerid) => {
                refs.triggers.entry(triggerid).or_default().insert(selementid);
            }
            SelementTarget::Map(sysmapid) => {
                let mut reached = Vec::new();
                walker.walk(sysmapid, &mut vec![root], &mut BTreeSet::new(), &mut reached)?;
                for submap in &reached {
                    for inner in &submap.selements {
                        match inner.element {
                            SelementTarget::Host(hostid) => {
                                refs.hosts.entry(hostid).or_default().insert(selementid);
                            }
                            SelementTarget::HostGroup(groupid) => {
                                refs.groups.entry(groupid).or_default().insert(selementid);
                            }
                            SelementTarget::Trigger(triggerid) => {
                                refs.submap_triggers
                                    .entry(triggerid)
                                    .or_default()
                                    .insert(selementid);
                            }
                            SelementTarget::Map(_) | SelementTarget::Image => {}
                        }
                    }
                }
                refs.submaps.insert(selementid, reached);
            }
            SelementTarget::Image => {}
        }
    }

    Ok(refs)
}

struct SubmapWalker<'a, D: ?Sized> {
    data: &'a D,
    cache: BTreeMap<SysmapId, Option<Sysmap>>,
}

impl<D> SubmapWalker<'_, D>
where
    D: DataAccess + ?Sized,
{
    fn load(&mut self, sysmapid: SysmapId) -> Result<Option<Sysmap>, MapError> {
        if let Some(cached) = self.cache.get(&sysmapid) {
            return Ok(cached.clone());
        }
        let map = self
            .data
            .fetch_maps(&BTreeSet::from([sysmapid]))?
            .into_iter()
            .next();
        self.cache.insert(sysmapid, map.clone());
        Ok(map)
    }

    fn walk(
        &mut self,
        sysmapid: SysmapId,
        path: &mut Vec<SysmapId>,
        seen: &mut BTreeSet<SysmapId>,
        reached: &mut Vec<Sysmap>,
    ) -> Result<(), MapError> {
        if path.contains(&sysmapid) {
            warn!(sysmapid, path = ?path, "submap cycle detected");
            return Err(MapError::SubmapCycle { sysmapid });
        }
        if !seen.insert(sysmapid) {
            return Ok(());
        }
        let Some(map) = self.load(sysmapid)? else {
            warn!(sysmapid, "skipping dangling submap reference");
            return Ok(());
        };

        let children: Vec<SysmapId> = map
            .selements
            .iter()
            .filter_map(|s| match s.element {
                SelementTarget::Map(child) => Some(child),
                _ => None,
            })
            .collect();
        reached.push(map);

        path.push(sysmapid);
        for child in children {
            self.walk(child, path, seen, reached)?;
        }
        path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{map, selement};
    use trigmap_store::{MemoryStore, StoreRecord};

    fn store(maps: Vec<Sysmap>) -> MemoryStore {
        MemoryStore::from_records(maps.into_iter().map(StoreRecord::Map).collect())
    }

    #[test]
    fn nested_submaps_bucket_under_the_top_level_element() {
        let store = store(vec![
            map(
                2,
                vec![
                    selement(1, SelementTarget::Host(10)),
                    selement(2, SelementTarget::Map(3)),
                ],
            ),
            map(
                3,
                vec![
                    selement(1, SelementTarget::HostGroup(5)),
                    selement(2, SelementTarget::Trigger(40)),
                ],
            ),
        ]);
        let top = vec![
            selement(1, SelementTarget::Map(2)),
            selement(2, SelementTarget::Trigger(41)),
            selement(3, SelementTarget::Host(10)),
        ];

        let refs = collect_references(&store, 1, &top).expect("collection should succeed");
        assert_eq!(refs.hosts[&10], BTreeSet::from([1, 3]));
        assert_eq!(refs.groups[&5], BTreeSet::from([1]));
        assert_eq!(refs.submap_triggers[&40], BTreeSet::from([1]));
        assert_eq!(refs.triggers[&41], BTreeSet::from([2]));
        let reached: Vec<SysmapId> = refs.submaps[&1].iter().map(|m| m.sysmapid).collect();
        assert_eq!(reached, vec![2, 3]);

        let targets = refs.element_targets(&top[0]);
        assert_eq!(targets.hosts, BTreeSet::from([10]));
        assert_eq!(targets.groups, BTreeSet::from([5]));
        assert_eq!(targets.triggers, BTreeSet::from([40]));
    }

    #[test]
    fn diamond_submaps_are_visited_once() {
        let store = store(vec![
            map(
                2,
                vec![
                    selement(1, SelementTarget::Map(3)),
                    selement(2, SelementTarget::Map(4)),
                ],
            ),
            map(3, vec![selement(1, SelementTarget::Map(5))]),
            map(4, vec![selement(1, SelementTarget::Map(5))]),
            map(5, vec![selement(1, SelementTarget::Host(10))]),
        ]);
        let refs = collect_references(&store, 1, &[selement(1, SelementTarget::Map(2))])
            .expect("diamond is not a cycle");
        let reached: Vec<SysmapId> = refs.submaps[&1].iter().map(|m| m.sysmapid).collect();
        assert_eq!(reached, vec![2, 3, 5, 4]);
    }

    #[test]
    fn map_containing_itself_is_rejected() {
        let store = store(vec![
            map(2, vec![selement(1, SelementTarget::Map(3))]),
            map(3, vec![selement(1, SelementTarget::Map(2))]),
        ]);
        let err = collect_references(&store, 1, &[selement(1, SelementTarget::Map(2))])
            .expect_err("2 -> 3 -> 2 must be rejected");
        assert!(matches!(err, MapError::SubmapCycle { sysmapid: 2 }));

        let err = collect_references(&store, 1, &[selement(1, SelementTarget::Map(1))])
            .expect_err("a map must not contain itself");
        assert!(matches!(err, MapError::SubmapCycle { sysmapid: 1 }));
    }

    #[test]
    fn dangling_submap_is_skipped() {
        let refs = collect_references(&store(Vec::new()), 1, &[selement(1, SelementTarget::Map(9))])
            .expect("missing submap should be skipped");
        assert!(refs.submaps[&1].is_empty());
        assert!(refs.element_targets(&selement(1, SelementTarget::Map(9))).is_empty());
    }
}
