//! The map state pipeline: expand areas, collect what every element stands
//! for, fetch it in bulk, fold, resolve icons and labels, style links.

use crate::aggregate::{ElementCounts, FoldSettings};
use crate::area::{Area, ImageMetrics, expand_areas, layout_areas};
use crate::collect::collect_references;
use crate::error::MapError;
use crate::filter::{ApplicationFilters, HostTrigger};
use crate::icon_map::icon_by_mapping;
use crate::label::{LabelBody, LabelLine, LabelResolver, compose_label};
use crate::link::{LinkState, link_state};
use crate::status::{ElementStatus, Highlight};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use trigmap_kernel::{
    ApiError, ElementType, GroupId, Host, HostId, ImageId, LabelLocation, LabelType, Principal,
    RenderContext, SelementId, Selement, SelementTarget, Severity, ShowUnack, SysmapId,
    SysmapLink, Trigger, TriggerId,
};
use trigmap_store::{DataAccess, HostFetch, PermissionOracle, TriggerFetch};
use trigmap_triggers::{TriggerQuery, TriggerView, get_triggers};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStateOptions {
    /// Overrides the map's own minimum severity.
    pub severity_min: Option<Severity>,
}

/// Everything a renderer needs for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    pub selementid: SelementId,
    pub element_type: ElementType,
    #[serde(flatten)]
    pub counts: ElementCounts,
    #[serde(flatten)]
    pub status: ElementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<LabelLine>,
    pub label_location: LabelLocation,
    pub highlight: Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    pub sysmapid: SysmapId,
    pub name: String,
    /// Elements after area expansion and layout.
    pub selements: Vec<Selement>,
    pub links: Vec<LinkState>,
    pub areas: Vec<Area>,
    pub elements: BTreeMap<SelementId, ElementState>,
}

/// Compute the state of map `sysmapid` at `ctx.now`.
///
/// Reads run with trusted access. A map that does not exist is reported as
/// [`ApiError::NoPermission`].
pub fn map_state<S>(
    store: &S,
    ctx: &RenderContext,
    sysmapid: SysmapId,
    options: &MapStateOptions,
) -> Result<MapState, MapError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let map = store
        .fetch_maps(&BTreeSet::from([sysmapid]))?
        .into_iter()
        .next()
        .ok_or(ApiError::NoPermission)?;

    let mut expanded = expand_areas(store, &map)?;
    let refs = collect_references(store, map.sysmapid, &expanded.selements)?;

    let members = fetch_members(store, &refs.hosts, &refs.groups)?;
    let Members {
        hosts,
        element_hosts,
        host_owners,
        group_hosts,
    } = members;

    let mut fetched = fetch_element_triggers(
        store,
        ctx,
        &refs.triggers,
        &refs.submap_triggers,
        &hosts,
        &host_owners,
    )?;
    let filters = ApplicationFilters::collect(
        &expanded.selements,
        &element_hosts,
        &refs.submaps,
        &group_hosts,
    );
    if !filters.is_empty() {
        filters.apply(
            &expanded.selements,
            &element_hosts,
            &mut fetched.element_triggers,
            &fetched.host_triggers,
            &refs.submap_triggers,
        );
    }

    let maintenanceids: BTreeSet<_> = hosts
        .values()
        .filter(|host| host.maintenance_status)
        .filter_map(|host| host.maintenanceid)
        .collect();
    let maintenances = if maintenanceids.is_empty() {
        BTreeMap::new()
    } else {
        store
            .fetch_maintenances(&maintenanceids)?
            .into_iter()
            .map(|m| (m.maintenanceid, m))
            .collect()
    };

    let severity_min = options.severity_min.unwrap_or(map.severity_min);
    let settings = FoldSettings::new(ctx, severity_min, map.expandproblem, &maintenances);
    let show_unack = if ctx.config.event_ack_enable {
        map.show_unack
    } else {
        ShowUnack::All
    };
    let icon_map = match map.iconmapid {
        Some(iconmapid) => store.fetch_icon_map(iconmapid)?,
        None => None,
    };
    let no_inventory = BTreeMap::new();

    let mut resolved: BTreeMap<SelementId, (ElementCounts, ElementStatus)> = BTreeMap::new();
    for selement in &expanded.selements {
        let selementid = selement.selementid;
        let element_hosts = element_hosts
            .get(&selementid)
            .into_iter()
            .flatten()
            .filter_map(|hostid| hosts.get(hostid));
        let element_triggers = fetched
            .element_triggers
            .get(&selementid)
            .into_iter()
            .flatten()
            .filter_map(|triggerid| fetched.views.get(triggerid));
        let counts =
            ElementCounts::fold(selement.element_type(), element_hosts, element_triggers, &settings);
        let mut status = ElementStatus::resolve(selement, &counts, show_unack, ctx.palette());

        if let Some(icon_map) = &icon_map
            && selement.use_iconmap
            && let SelementTarget::Host(hostid) = selement.element
        {
            let inventory = hosts.get(&hostid).map_or(&no_inventory, |h| &h.inventory);
            status.iconid = Some(icon_by_mapping(icon_map, inventory));
        }
        resolved.insert(selementid, (counts, status));
    }

    let iconids: BTreeSet<ImageId> = resolved.values().filter_map(|(_, s)| s.iconid).collect();
    let metrics = if iconids.is_empty() {
        ImageMetrics::default()
    } else {
        ImageMetrics::from_images(store.fetch_images(&iconids)?)
    };
    layout_areas(
        &mut expanded,
        &map,
        |selementid| resolved.get(&selementid).and_then(|(_, s)| s.iconid),
        &metrics,
    );

    let names = ElementNames::fetch(store, &expanded.selements, &hosts, &fetched.views)?;
    let resolver = LabelResolver::new(store, ctx);

    let mut elements = BTreeMap::new();
    for selement in &expanded.selements {
        let selementid = selement.selementid;
        let Some((counts, status)) = resolved.remove(&selementid) else {
            continue;
        };
        let element_type = selement.element_type();
        let (label_type, template) = map.labels.for_element(element_type);
        let name = (label_type == LabelType::Name)
            .then(|| names.of(selement))
            .flatten();

        let label = if selement.is_area() || label_type == LabelType::Nothing {
            Vec::new()
        } else {
            let text = if map.labels.advanced && label_type == LabelType::Custom {
                template
            } else {
                selement.label.as_str()
            };
            let targets = refs.element_targets(selement);
            let ip = host_ip(selement, &hosts);
            let resolved_text;
            let body = match label_type {
                LabelType::Ip if element_type == ElementType::Host => LabelBody::Ip(ip),
                LabelType::Status => LabelBody::Status,
                LabelType::Name => LabelBody::Name(name.as_deref().unwrap_or_default()),
                _ => {
                    resolved_text = resolver.element_label(selement, text, &targets)?;
                    LabelBody::Text(&resolved_text)
                }
            };
            compose_label(body, &status.info, ctx.palette())
        };

        elements.insert(
            selementid,
            ElementState {
                selementid,
                element_type,
                highlight: Highlight::of(map.highlight, element_type, status.icon_type),
                counts,
                status,
                name,
                label,
                label_location: map.label_location_of(selement),
            },
        );
    }

    let links = link_states(store, &resolver, ctx, &expanded.links)?;
    debug!(
        sysmapid,
        elements = elements.len(),
        links = links.len(),
        areas = expanded.areas.len(),
        "map state computed"
    );

    Ok(MapState {
        sysmapid: map.sysmapid,
        name: map.name.clone(),
        selements: expanded.selements,
        links,
        areas: expanded.areas,
        elements,
    })
}

struct Members {
    hosts: BTreeMap<HostId, Host>,
    element_hosts: BTreeMap<SelementId, BTreeSet<HostId>>,
    /// Elements each host contributes to, directly or through a group.
    host_owners: BTreeMap<HostId, BTreeSet<SelementId>>,
    group_hosts: BTreeMap<GroupId, BTreeSet<HostId>>,
}

fn fetch_members<S>(
    store: &S,
    host_refs: &BTreeMap<HostId, BTreeSet<SelementId>>,
    group_refs: &BTreeMap<GroupId, BTreeSet<SelementId>>,
) -> Result<Members, MapError>
where
    S: DataAccess + ?Sized,
{
    let mut members = Members {
        hosts: BTreeMap::new(),
        element_hosts: BTreeMap::new(),
        host_owners: BTreeMap::new(),
        group_hosts: BTreeMap::new(),
    };

    if !host_refs.is_empty() {
        for host in store.fetch_hosts(&HostFetch::by_ids(host_refs.keys().copied()))? {
            let Some(owners) = host_refs.get(&host.hostid) else {
                continue;
            };
            for selementid in owners {
                members
                    .element_hosts
                    .entry(*selementid)
                    .or_default()
                    .insert(host.hostid);
            }
            members
                .host_owners
                .entry(host.hostid)
                .or_default()
                .extend(owners.iter().copied());
            members.hosts.insert(host.hostid, host);
        }
    }

    if !group_refs.is_empty() {
        for host in store.fetch_hosts(&HostFetch::by_groups(group_refs.keys().copied()))? {
            for groupid in &host.groups {
                let Some(owners) = group_refs.get(groupid) else {
                    continue;
                };
                members
                    .group_hosts
                    .entry(*groupid)
                    .or_default()
                    .insert(host.hostid);
                for selementid in owners {
                    members
                        .element_hosts
                        .entry(*selementid)
                        .or_default()
                        .insert(host.hostid);
                    members
                        .host_owners
                        .entry(host.hostid)
                        .or_default()
                        .insert(*selementid);
                }
            }
            members.hosts.entry(host.hostid).or_insert(host);
        }
    }

    Ok(members)
}

#[derive(Default)]
struct ElementTriggers {
    views: BTreeMap<TriggerId, TriggerView>,
    element_triggers: BTreeMap<SelementId, BTreeSet<TriggerId>>,
    /// Triggers found through host membership, the only ones application
    /// filters apply to.
    host_triggers: BTreeMap<TriggerId, HostTrigger>,
}

impl ElementTriggers {
    fn assign(&mut self, views: Vec<TriggerView>, owners: &BTreeMap<TriggerId, BTreeSet<SelementId>>) {
        for view in views {
            let triggerid = view.trigger.triggerid;
            for selementid in owners.get(&triggerid).into_iter().flatten() {
                self.element_triggers
                    .entry(*selementid)
                    .or_default()
                    .insert(triggerid);
            }
            self.views.insert(triggerid, view);
        }
    }
}

/// Three trigger queries: triggers placed on the map, triggers placed on
/// submaps, and problem triggers of monitored member hosts. The latter two
/// skip triggers whose upstream dependency is already in problem.
fn fetch_element_triggers<S>(
    store: &S,
    ctx: &RenderContext,
    direct: &BTreeMap<TriggerId, BTreeSet<SelementId>>,
    submap: &BTreeMap<TriggerId, BTreeSet<SelementId>>,
    hosts: &BTreeMap<HostId, Host>,
    host_owners: &BTreeMap<HostId, BTreeSet<SelementId>>,
) -> Result<ElementTriggers, MapError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let principal = Principal::super_admin();
    let base = TriggerQuery {
        nopermissions: true,
        select_last_event: true,
        expand_description: true,
        ..TriggerQuery::default()
    };
    let mut fetched = ElementTriggers::default();

    if !direct.is_empty() {
        let query = TriggerQuery {
            triggerids: Some(direct.keys().copied().collect()),
            ..base.clone()
        };
        let set = get_triggers(store, &principal, ctx, &query)?;
        fetched.assign(set.triggers, direct);
    }

    if !submap.is_empty() {
        let query = TriggerQuery {
            triggerids: Some(submap.keys().copied().collect()),
            skip_dependent: true,
            only_true: true,
            ..base.clone()
        };
        let set = get_triggers(store, &principal, ctx, &query)?;
        fetched.assign(set.triggers, submap);
    }

    let monitored: Vec<HostId> = hosts
        .values()
        .filter(|host| host.is_monitored())
        .map(|host| host.hostid)
        .collect();
    if !monitored.is_empty() {
        let query = TriggerQuery {
            hostids: Some(monitored),
            monitored: true,
            skip_dependent: true,
            only_true: true,
            select_hosts: true,
            select_items: true,
            ..base
        };
        let set = get_triggers(store, &principal, ctx, &query)?;
        for view in set.triggers {
            let triggerid = view.trigger.triggerid;
            let trigger_hosts: BTreeSet<HostId> =
                view.hosts.iter().flatten().map(|h| h.hostid).collect();
            for hostid in &trigger_hosts {
                for selementid in host_owners.get(hostid).into_iter().flatten() {
                    fetched
                        .element_triggers
                        .entry(*selementid)
                        .or_default()
                        .insert(triggerid);
                }
            }
            let applications = view
                .items
                .iter()
                .flatten()
                .flat_map(|item| item.applications.iter().cloned())
                .collect();
            fetched.host_triggers.insert(
                triggerid,
                HostTrigger {
                    hosts: trigger_hosts,
                    applications,
                },
            );
            fetched.views.insert(triggerid, view);
        }
    }

    Ok(fetched)
}

/// Display names shown by "name" labels.
struct ElementNames {
    maps: BTreeMap<SysmapId, String>,
    groups: BTreeMap<GroupId, String>,
    hosts: BTreeMap<HostId, String>,
    triggers: BTreeMap<TriggerId, String>,
}

impl ElementNames {
    fn fetch<S>(
        store: &S,
        selements: &[Selement],
        hosts: &BTreeMap<HostId, Host>,
        views: &BTreeMap<TriggerId, TriggerView>,
    ) -> Result<Self, MapError>
    where
        S: DataAccess + ?Sized,
    {
        let mut mapids = BTreeSet::new();
        let mut groupids = BTreeSet::new();
        for selement in selements {
            match selement.element {
                SelementTarget::Map(sysmapid) => {
                    mapids.insert(sysmapid);
                }
                SelementTarget::HostGroup(groupid) => {
                    groupids.insert(groupid);
                }
                _ => {}
            }
        }

        let maps = if mapids.is_empty() {
            BTreeMap::new()
        } else {
            store
                .fetch_maps(&mapids)?
                .into_iter()
                .map(|m| (m.sysmapid, m.name))
                .collect()
        };
        let groups = if groupids.is_empty() {
            BTreeMap::new()
        } else {
            store
                .fetch_host_groups(Some(&groupids))?
                .into_iter()
                .map(|g| (g.groupid, g.name))
                .collect()
        };

        Ok(Self {
            maps,
            groups,
            hosts: hosts
                .values()
                .map(|h| (h.hostid, h.display_name().to_string()))
                .collect(),
            triggers: views
                .iter()
                .map(|(id, view)| (*id, view.trigger.description.clone()))
                .collect(),
        })
    }

    fn of(&self, selement: &Selement) -> Option<String> {
        match selement.element {
            SelementTarget::Map(sysmapid) => self.maps.get(&sysmapid).cloned(),
            SelementTarget::HostGroup(groupid) => self.groups.get(&groupid).cloned(),
            SelementTarget::Host(hostid) => self.hosts.get(&hostid).cloned(),
            SelementTarget::Trigger(triggerid) => self.triggers.get(&triggerid).cloned(),
            SelementTarget::Image => None,
        }
    }
}

/// IP of a host element's main interface, or of its first interface.
fn host_ip<'h>(selement: &Selement, hosts: &'h BTreeMap<HostId, Host>) -> &'h str {
    let SelementTarget::Host(hostid) = selement.element else {
        return "";
    };
    hosts
        .get(&hostid)
        .and_then(|host| host.main_interface().or_else(|| host.interfaces.first()))
        .map_or("", |interface| interface.ip.as_str())
}

fn link_states<S>(
    store: &S,
    resolver: &LabelResolver<'_, S>,
    ctx: &RenderContext,
    links: &[SysmapLink],
) -> Result<Vec<LinkState>, MapError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let triggerids: BTreeSet<TriggerId> = links
        .iter()
        .flat_map(|link| link.linktriggers.iter().map(|lt| lt.triggerid))
        .filter(|id| *id != 0)
        .collect();
    let triggers: BTreeMap<TriggerId, Trigger> = if triggerids.is_empty() {
        BTreeMap::new()
    } else {
        store
            .fetch_triggers(&TriggerFetch::by_ids(triggerids))?
            .into_iter()
            .map(|t| (t.triggerid, t))
            .collect()
    };

    let black = &ctx.palette().black;
    let mut states = Vec::with_capacity(links.len());
    for link in links {
        let mut state = link_state(link, &triggers);
        if !link.label.is_empty() {
            let text = resolver.resolve_functional(&link.label, None)?;
            state.label = text
                .split('\n')
                .map(|line| line.replace('\r', ""))
                .filter(|line| !line.is_empty())
                .map(|msg| LabelLine {
                    msg,
                    color: black.clone(),
                })
                .collect();
        }
        states.push(state);
    }
    Ok(states)
}
