//! Trigger dependency graph mutations.
//!
//! Every mutation is planned first against a read-only view of the store
//! (persisted edges, minus edges scheduled for deletion, plus edges already
//! planned in this request) and written only once the whole plan, including
//! propagation to inherited triggers, has validated. A rejected request
//! leaves the store untouched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use trigmap_kernel::{
    Access, ApiError, DependencyEdge, DependencyError, HostId, Principal, Trigger, TriggerId,
};
use trigmap_store::{
    DataAccess, DependencyWriter, EdgeDirection, HostFetch, PermissionOracle, StoreError,
    TriggerFetch, TriggerRelations, permitted_trigger_ids,
};

/// Everything a dependency mutation needs from the store.
pub trait DependencyStore: DataAccess + DependencyWriter + PermissionOracle {}

impl<T> DependencyStore for T where T: DataAccess + DependencyWriter + PermissionOracle + ?Sized {}

/// "`triggerid` depends on `depends_on_triggerid`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRequest {
    pub triggerid: TriggerId,
    pub depends_on_triggerid: TriggerId,
}

impl DependencyRequest {
    pub fn new(triggerid: TriggerId, depends_on_triggerid: TriggerId) -> Self {
        Self {
            triggerid,
            depends_on_triggerid,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyChange {
    /// Triggers named by the request, first-seen order.
    pub triggerids: Vec<TriggerId>,
    /// Inserted edges, including those propagated to inherited triggers.
    pub inserted: Vec<DependencyEdge>,
    pub deleted: usize,
}

/// Validate and insert `requests`, then propagate each edge to every
/// trigger inherited from its down trigger (retargeted to the child's host),
/// recursing through all inheritance levels.
pub fn add_dependencies<S>(
    store: &mut S,
    principal: &Principal,
    requests: &[DependencyRequest],
) -> Result<DependencyChange, ApiError>
where
    S: DependencyStore + ?Sized,
{
    if requests.is_empty() {
        return Err(ApiError::empty_input());
    }

    let mut plan = DependencyPlan::new(&*store, principal);
    plan.add(requests)
        .inspect_err(|error| debug!(%error, "dependency request rejected"))?;
    let (removed, inserted) = plan.finish();

    store.replace_dependency_edges(&removed, &inserted)?;
    info!(
        requested = requests.len(),
        inserted = inserted.len(),
        "trigger dependencies added"
    );

    Ok(DependencyChange {
        triggerids: first_seen(requests.iter().map(|r| r.triggerid)),
        inserted,
        deleted: 0,
    })
}

/// Remove all dependencies of `triggerids` and, recursively, of every
/// trigger inherited from them.
pub fn delete_dependencies<S>(
    store: &mut S,
    principal: &Principal,
    triggerids: &[TriggerId],
) -> Result<DependencyChange, ApiError>
where
    S: DependencyStore + ?Sized,
{
    if triggerids.is_empty() {
        return Err(ApiError::empty_input());
    }

    let mut plan = DependencyPlan::new(&*store, principal);
    plan.delete(&triggerids.iter().copied().collect())
        .inspect_err(|error| debug!(%error, "dependency deletion rejected"))?;
    let (removed, inserted) = plan.finish();

    let deleted = store.replace_dependency_edges(&removed, &inserted)?;
    info!(
        triggers = removed.len(),
        deleted, "trigger dependencies deleted"
    );

    Ok(DependencyChange {
        triggerids: first_seen(triggerids.iter().copied()),
        inserted,
        deleted,
    })
}

/// Re-derive the dependencies of triggers inherited from `templateids`
/// (optionally only on `hostids`) from their template triggers.
///
/// Internal operation: runs without permission checks.
pub fn sync_template_dependencies<S>(
    store: &mut S,
    templateids: &BTreeSet<HostId>,
    hostids: Option<&BTreeSet<HostId>>,
) -> Result<DependencyChange, ApiError>
where
    S: DependencyStore + ?Sized,
{
    let parents = store.fetch_triggers(&TriggerFetch::by_hosts(templateids.iter().copied()))?;
    if parents.is_empty() {
        return Ok(DependencyChange::default());
    }
    let parent_ids: BTreeSet<TriggerId> = parents.iter().map(|t| t.triggerid).collect();

    let mut parent_deps: BTreeMap<TriggerId, Vec<TriggerId>> = BTreeMap::new();
    for edge in store.fetch_dependency_edges(&parent_ids, EdgeDirection::Up)? {
        parent_deps
            .entry(edge.triggerid_down)
            .or_default()
            .push(edge.triggerid_up);
    }

    let children = store.fetch_triggers(&TriggerFetch {
        parent_triggerids: Some(parent_ids),
        hostids: hostids.cloned(),
        ..TriggerFetch::default()
    })?;
    if children.is_empty() {
        return Ok(DependencyChange::default());
    }
    let relations = TriggerRelations::load(&*store, &children)?;

    let mut requests = Vec::new();
    for child in &children {
        let Some(deps) = child.templateid.and_then(|id| parent_deps.get(&id)) else {
            continue;
        };
        let Some(hostid) = relations.host_ids_of(child.triggerid).next() else {
            continue;
        };
        for dep in deps {
            let target = retarget_dependency(&*store, *dep, hostid)?;
            requests.push(DependencyRequest::new(child.triggerid, target));
        }
    }

    let principal = Principal::super_admin();
    let child_ids: BTreeSet<TriggerId> = children.iter().map(|t| t.triggerid).collect();
    let mut plan = DependencyPlan::new(&*store, &principal);
    plan.delete(&child_ids)?;
    if !requests.is_empty() {
        plan.add(&requests)?;
    }
    let (removed, inserted) = plan.finish();

    let deleted = store.replace_dependency_edges(&removed, &inserted)?;
    info!(
        templates = templateids.len(),
        children = child_ids.len(),
        deleted,
        inserted = inserted.len(),
        "template dependencies synchronised"
    );

    Ok(DependencyChange {
        triggerids: child_ids.into_iter().collect(),
        inserted,
        deleted,
    })
}

/// The trigger on `hostid` inherited from `triggerid`, or `triggerid`
/// itself when the host has no such trigger.
pub fn retarget_dependency<D>(
    data: &D,
    triggerid: TriggerId,
    hostid: HostId,
) -> Result<TriggerId, StoreError>
where
    D: DataAccess + ?Sized,
{
    let inherited = data.fetch_triggers(&TriggerFetch {
        hostids: Some(BTreeSet::from([hostid])),
        parent_triggerids: Some(BTreeSet::from([triggerid])),
        ..TriggerFetch::default()
    })?;
    Ok(inherited.first().map_or(triggerid, |t| t.triggerid))
}

fn first_seen(ids: impl Iterator<Item = TriggerId>) -> Vec<TriggerId> {
    let mut seen = BTreeSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

struct DependencyPlan<'a, S: ?Sized> {
    store: &'a S,
    principal: Principal,
    removed: BTreeSet<TriggerId>,
    planned: BTreeSet<DependencyEdge>,
    order: Vec<DependencyEdge>,
}

impl<'a, S> DependencyPlan<'a, S>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    fn new(store: &'a S, principal: &Principal) -> Self {
        Self {
            store,
            principal: *principal,
            removed: BTreeSet::new(),
            planned: BTreeSet::new(),
            order: Vec::new(),
        }
    }

    fn finish(self) -> (BTreeSet<TriggerId>, Vec<DependencyEdge>) {
        (self.removed, self.order)
    }

    /// Up-edges of `ids` as the store will look after this plan.
    fn up_edges(&self, ids: &BTreeSet<TriggerId>) -> Result<Vec<DependencyEdge>, StoreError> {
        let mut edges: Vec<DependencyEdge> = self
            .store
            .fetch_dependency_edges(ids, EdgeDirection::Up)?
            .into_iter()
            .filter(|edge| !self.removed.contains(&edge.triggerid_down))
            .collect();
        edges.extend(
            self.planned
                .iter()
                .filter(|edge| ids.contains(&edge.triggerid_down))
                .copied(),
        );
        Ok(edges)
    }

    fn add(&mut self, requests: &[DependencyRequest]) -> Result<(), ApiError> {
        self.validate_add(requests)?;
        for request in requests {
            let edge = DependencyEdge::new(request.triggerid, request.depends_on_triggerid);
            self.planned.insert(edge);
            self.order.push(edge);
            self.propagate(request)?;
        }
        Ok(())
    }

    fn propagate(&mut self, request: &DependencyRequest) -> Result<(), ApiError> {
        let children = self
            .store
            .fetch_triggers(&TriggerFetch::children_of([request.triggerid]))?;
        if children.is_empty() {
            return Ok(());
        }
        let relations = TriggerRelations::load(self.store, &children)?;
        for child in &children {
            let hostids: Vec<HostId> = relations.host_ids_of(child.triggerid).collect();
            for hostid in hostids {
                let target = retarget_dependency(self.store, request.depends_on_triggerid, hostid)?;
                debug!(
                    parent = request.triggerid,
                    child = child.triggerid,
                    hostid,
                    target,
                    "propagating dependency to inherited trigger"
                );
                self.add(&[DependencyRequest::new(child.triggerid, target)])?;
            }
        }
        Ok(())
    }

    /// Remove the down-edges of `triggerids` and of every trigger inherited
    /// from them. Only the requested triggers are checked; inherited copies
    /// follow their template trigger.
    fn delete(&mut self, triggerids: &BTreeSet<TriggerId>) -> Result<(), ApiError> {
        let triggers = self.load_editable(triggerids)?;
        if let Some(discovered) = triggers.iter().find(|t| t.is_discovered()) {
            return Err(DependencyError::DiscoveredTrigger {
                description: discovered.description.clone(),
            }
            .into());
        }
        self.cascade_delete(triggerids.clone())
    }

    fn cascade_delete(&mut self, mut triggerids: BTreeSet<TriggerId>) -> Result<(), ApiError> {
        while !triggerids.is_empty() {
            self.removed.extend(triggerids.iter().copied());
            triggerids = self
                .store
                .fetch_triggers(&TriggerFetch::children_of(triggerids.iter().copied()))?
                .into_iter()
                .map(|t| t.triggerid)
                .filter(|id| !self.removed.contains(id))
                .collect();
        }
        Ok(())
    }

    /// Fetch `triggerids`, failing unless every one exists and is writable.
    fn load_editable(&self, triggerids: &BTreeSet<TriggerId>) -> Result<Vec<Trigger>, ApiError> {
        self.load_permitted(triggerids, Access::Write)
            .map(|(triggers, _)| triggers)
    }

    fn load_permitted(
        &self,
        triggerids: &BTreeSet<TriggerId>,
        access: Access,
    ) -> Result<(Vec<Trigger>, TriggerRelations), ApiError> {
        let triggers = self
            .store
            .fetch_triggers(&TriggerFetch::by_ids(triggerids.iter().copied()))?;
        let relations = TriggerRelations::load(self.store, &triggers)?;
        let permitted = permitted_trigger_ids(
            self.store,
            &relations,
            &self.principal,
            access,
            triggers.iter().map(|t| t.triggerid),
        )?;
        if triggers.len() != triggerids.len() || permitted.len() != triggerids.len() {
            return Err(ApiError::NoPermission);
        }
        Ok((triggers, relations))
    }

    fn validate_add(&self, requests: &[DependencyRequest]) -> Result<(), ApiError> {
        let down_ids: BTreeSet<TriggerId> = requests.iter().map(|r| r.triggerid).collect();
        let (triggers, relations) = self.load_permitted(&down_ids, Access::Write)?;
        if let Some(discovered) = triggers.iter().find(|t| t.is_discovered()) {
            return Err(DependencyError::DiscoveredTrigger {
                description: discovered.description.clone(),
            }
            .into());
        }

        let up_ids: BTreeSet<TriggerId> =
            requests.iter().map(|r| r.depends_on_triggerid).collect();
        let (targets, target_relations) = self.load_permitted(&up_ids, Access::Read)?;

        let mut batch: BTreeMap<TriggerId, Vec<TriggerId>> = BTreeMap::new();
        for request in requests {
            batch
                .entry(request.triggerid)
                .or_default()
                .push(request.depends_on_triggerid);
        }

        for (triggerid, deps) in &batch {
            self.check_dependencies(*triggerid, deps, &batch, &relations, &target_relations)?;
        }
        check_dependency_parents(&batch, &targets)?;
        self.check_dependency_duplicates(&batch, &triggers)?;
        Ok(())
    }

    fn check_dependencies(
        &self,
        triggerid: TriggerId,
        deps: &[TriggerId],
        batch: &BTreeMap<TriggerId, Vec<TriggerId>>,
        relations: &TriggerRelations,
        target_relations: &TriggerRelations,
    ) -> Result<(), ApiError> {
        let trigger_templates = relations.templates_of(triggerid);
        let dep_templates: BTreeSet<HostId> = deps
            .iter()
            .flat_map(|id| target_relations.templates_of(*id))
            .collect();

        if trigger_templates.is_empty() && !dep_templates.is_empty() {
            return Err(DependencyError::HostToTemplate.into());
        }
        if deps.contains(&triggerid) {
            return Err(DependencyError::SelfDependency.into());
        }
        self.check_circular(triggerid, batch)?;
        self.check_template_linkage(&trigger_templates, &dep_templates)
    }

    /// Walk upstream from `triggerid` over persisted, planned and batch
    /// edges; reaching `triggerid` again closes a cycle.
    fn check_circular(
        &self,
        triggerid: TriggerId,
        batch: &BTreeMap<TriggerId, Vec<TriggerId>>,
    ) -> Result<(), ApiError> {
        let mut frontier = BTreeSet::from([triggerid]);
        let mut visited = BTreeSet::new();
        while !frontier.is_empty() {
            let mut ups: Vec<TriggerId> = self
                .up_edges(&frontier)?
                .into_iter()
                .map(|edge| edge.triggerid_up)
                .collect();
            for id in &frontier {
                if let Some(pending) = batch.get(id) {
                    ups.extend(pending.iter().copied());
                }
            }

            let mut next = BTreeSet::new();
            for up in ups {
                if up == triggerid {
                    return Err(DependencyError::Circular.into());
                }
                if visited.insert(up) {
                    next.insert(up);
                }
            }
            frontier = next;
        }
        Ok(())
    }

    /// A host linked to one of the trigger's templates must be linked to
    /// every template the dependency targets live on. Only checked when some
    /// dependency template is not one of the trigger's own templates.
    fn check_template_linkage(
        &self,
        trigger_templates: &BTreeSet<HostId>,
        dep_templates: &BTreeSet<HostId>,
    ) -> Result<(), ApiError> {
        if trigger_templates.is_empty()
            || dep_templates.is_empty()
            || dep_templates.is_subset(trigger_templates)
        {
            return Ok(());
        }

        let affected: BTreeSet<HostId> = trigger_templates.union(dep_templates).copied().collect();
        let linked_hosts = self
            .store
            .fetch_hosts(&HostFetch::linked_to(affected.iter().copied()))?;
        for host in &linked_hosts {
            let linked: BTreeSet<HostId> = host
                .templates
                .iter()
                .copied()
                .filter(|id| affected.contains(id))
                .collect();
            let inherits_trigger = trigger_templates.iter().any(|id| linked.contains(id));
            if inherits_trigger && dep_templates.iter().any(|id| !linked.contains(id)) {
                return Err(DependencyError::TemplatesNotLinked {
                    host: host.host.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_dependency_duplicates(
        &self,
        batch: &BTreeMap<TriggerId, Vec<TriggerId>>,
        triggers: &[Trigger],
    ) -> Result<(), ApiError> {
        let existing: BTreeSet<DependencyEdge> = self
            .up_edges(&batch.keys().copied().collect())?
            .into_iter()
            .collect();

        for (triggerid, deps) in batch {
            let mut seen = BTreeSet::new();
            for dep in deps {
                let duplicate = !seen.insert(*dep)
                    || existing.contains(&DependencyEdge::new(*triggerid, *dep));
                if duplicate {
                    let description = triggers
                        .iter()
                        .find(|t| t.triggerid == *triggerid)
                        .map(|t| t.description.clone())
                        .unwrap_or_default();
                    return Err(DependencyError::Duplicate { description }.into());
                }
            }
        }
        Ok(())
    }
}

/// No trigger may depend on a trigger inherited from it.
fn check_dependency_parents(
    batch: &BTreeMap<TriggerId, Vec<TriggerId>>,
    targets: &[Trigger],
) -> Result<(), ApiError> {
    for (triggerid, deps) in batch {
        let inherited_from_self = targets
            .iter()
            .filter(|target| deps.contains(&target.triggerid))
            .any(|target| target.templateid == Some(*triggerid));
        if inherited_from_self {
            return Err(DependencyError::InheritedFrom.into());
        }
    }
    Ok(())
}
