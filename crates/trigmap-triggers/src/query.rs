//! Filtered, sorted and decorated trigger views.
//!
//! A query runs in four passes:
//! 1. candidate selection: one store fetch narrowed by ID sets, then
//!    per-row predicates (status, text, severity, permissions, events)
//! 2. post-filters that need the dependency graph or event history
//!    (`skip_dependent`, `with_last_event_unacknowledged`)
//! 3. sort, then limit
//! 4. decoration with related records and macro expansion

use crate::expand::{TriggerExpander, UserMacros};
use crate::skip_dependent::filter_by_skip_dependent;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use trigmap_kernel::{
    Access, ApiError, Event, GroupId, Host, HostGroup, HostId, Item, ItemId, Principal,
    RenderContext, Severity, Trigger, TriggerFlags, TriggerId, TriggerState, TriggerStatus,
    TriggerValue,
};
use trigmap_store::{
    DataAccess, EdgeDirection, HostFetch, ItemFetch, PermissionOracle, TriggerFetch,
    TriggerRelations, permitted_trigger_ids,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerQuery {
    pub triggerids: Option<Vec<TriggerId>>,
    pub hostids: Option<Vec<HostId>>,
    /// Merged into `hostids`.
    pub templateids: Option<Vec<HostId>>,
    pub groupids: Option<Vec<GroupId>>,
    pub itemids: Option<Vec<ItemId>>,
    /// Function names (`last`, `nodata`, ...) used in the expression.
    pub functions: Option<Vec<String>>,
    pub inherited: Option<bool>,
    pub templated: Option<bool>,
    pub monitored: bool,
    pub active: bool,
    pub maintenance: Option<bool>,
    pub last_change_since: Option<i64>,
    pub last_change_till: Option<i64>,
    pub with_unacknowledged_events: bool,
    pub with_acknowledged_events: bool,
    pub with_last_event_unacknowledged: bool,
    pub skip_dependent: bool,
    pub filter: TriggerFilter,
    pub search: Option<TriggerSearch>,
    /// Host group name.
    pub group: Option<String>,
    /// Host technical name.
    pub host: Option<String>,
    pub only_true: bool,
    pub min_severity: Option<Severity>,
    /// Trusted internal callers only.
    pub nopermissions: bool,
    pub editable: bool,
    pub select_groups: bool,
    pub select_hosts: bool,
    pub select_items: bool,
    pub select_functions: bool,
    pub select_dependencies: bool,
    pub select_discovery_rule: bool,
    pub select_last_event: bool,
    pub expand_description: bool,
    pub expand_comment: bool,
    pub expand_expression: bool,
    pub sortfield: Vec<SortField>,
    pub sortorder: SortOrder,
    pub limit: Option<usize>,
}

/// Exact-match filters; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerFilter {
    pub description: Option<Vec<String>>,
    pub status: Option<Vec<TriggerStatus>>,
    pub value: Option<Vec<TriggerValue>>,
    pub priority: Option<Vec<Severity>>,
    pub state: Option<Vec<TriggerState>>,
    pub templateid: Option<Vec<TriggerId>>,
    /// Technical name of an owning host.
    pub host: Option<Vec<String>>,
    pub hostid: Option<Vec<HostId>>,
    /// Unset means normal and discovered triggers (never prototypes).
    pub flags: Option<Vec<TriggerFlags>>,
}

/// Case-insensitive substring search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerSearch {
    pub description: Option<String>,
    pub comments: Option<String>,
    pub expression: Option<String>,
    pub start_search: bool,
    pub exclude_search: bool,
    /// OR the populated fields instead of AND.
    pub search_by_any: bool,
    /// Treat `*` as "any sequence".
    pub search_wildcards_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Triggerid,
    Description,
    Status,
    Priority,
    Lastchange,
    Hostname,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triggerid" => Ok(SortField::Triggerid),
            "description" => Ok(SortField::Description),
            "status" => Ok(SortField::Status),
            "priority" => Ok(SortField::Priority),
            "lastchange" => Ok(SortField::Lastchange),
            "hostname" => Ok(SortField::Hostname),
            other => Err(format!(
                "unknown sort field `{other}` (expected triggerid, description, status, priority, lastchange or hostname)"
            )),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortField::Triggerid => "triggerid",
            SortField::Description => "description",
            SortField::Status => "status",
            SortField::Priority => "priority",
            SortField::Lastchange => "lastchange",
            SortField::Hostname => "hostname",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One trigger of a result set with the related records the query asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerView {
    #[serde(flatten)]
    pub trigger: Trigger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<HostGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<Host>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Item>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Trigger>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_rule: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<Event>,
}

impl TriggerView {
    /// A view with no related records selected.
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            groups: None,
            hosts: None,
            items: None,
            dependencies: None,
            discovery_rule: None,
            last_event: None,
        }
    }
}

/// Ordered, deduplicated query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSet {
    pub triggers: Vec<TriggerView>,
}

impl TriggerSet {
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn ids(&self) -> Vec<TriggerId> {
        self.triggers.iter().map(|v| v.trigger.triggerid).collect()
    }

    pub fn get(&self, triggerid: TriggerId) -> Option<&TriggerView> {
        self.triggers
            .iter()
            .find(|v| v.trigger.triggerid == triggerid)
    }
}

pub fn get_triggers<S>(
    store: &S,
    principal: &Principal,
    ctx: &RenderContext,
    query: &TriggerQuery,
) -> Result<TriggerSet, ApiError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let Selection {
        mut triggers,
        relations,
    } = select(store, principal, ctx, query)?;

    sort_triggers(&mut triggers, &relations, &query.sortfield, query.sortorder);
    if let Some(limit) = query.limit {
        triggers.truncate(limit);
    }

    let set = decorate(store, principal, ctx, query, triggers, &relations)?;
    debug!(returned = set.len(), "trigger query answered");
    Ok(set)
}

/// Number of triggers `query` matches, ignoring `limit`.
pub fn count_triggers<S>(
    store: &S,
    principal: &Principal,
    ctx: &RenderContext,
    query: &TriggerQuery,
) -> Result<usize, ApiError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    Ok(select(store, principal, ctx, query)?.triggers.len())
}

struct Selection {
    triggers: Vec<Trigger>,
    relations: TriggerRelations,
}

fn select<S>(
    store: &S,
    principal: &Principal,
    ctx: &RenderContext,
    query: &TriggerQuery,
) -> Result<Selection, ApiError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let empty = || Selection {
        triggers: Vec::new(),
        relations: TriggerRelations::default(),
    };

    let host_scope = resolve_host_scope(store, query)?;
    if host_scope.as_ref().is_some_and(BTreeSet::is_empty) {
        return Ok(empty());
    }

    let fetch = TriggerFetch {
        triggerids: query.triggerids.as_ref().map(|ids| ids.iter().copied().collect()),
        hostids: host_scope,
        itemids: query.itemids.as_ref().map(|ids| ids.iter().copied().collect()),
        parent_triggerids: None,
    };
    let fetched = store.fetch_triggers(&fetch)?;
    let relations = TriggerRelations::load(store, &fetched)?;

    let permitted = if query.nopermissions {
        fetched.iter().map(|t| t.triggerid).collect()
    } else {
        let access = if query.editable {
            Access::Write
        } else {
            Access::Read
        };
        permitted_trigger_ids(
            store,
            &relations,
            principal,
            access,
            fetched.iter().map(|t| t.triggerid),
        )?
    };

    let search = query.search.as_ref().map(CompiledSearch::new).transpose()?;
    let row = RowFilter {
        query,
        relations: &relations,
        search: search.as_ref(),
        now: ctx.now,
        ok_period: ctx.config.ok_period_secs,
    };
    let mut triggers: Vec<Trigger> = fetched
        .into_iter()
        .filter(|t| permitted.contains(&t.triggerid))
        .filter(|t| row.matches(t))
        .collect();

    if query.with_unacknowledged_events || query.with_acknowledged_events {
        let ids: BTreeSet<TriggerId> = triggers.iter().map(|t| t.triggerid).collect();
        let unacknowledged: BTreeSet<TriggerId> = store
            .fetch_events(&ids)?
            .into_iter()
            .filter(|event| event.is_problem() && !event.acknowledged)
            .map(|event| event.objectid)
            .collect();
        if query.with_unacknowledged_events {
            triggers.retain(|t| unacknowledged.contains(&t.triggerid));
        }
        if query.with_acknowledged_events {
            triggers.retain(|t| !unacknowledged.contains(&t.triggerid));
        }
    }

    if query.skip_dependent {
        triggers = filter_by_skip_dependent(store, triggers)?;
    }
    if query.with_last_event_unacknowledged {
        let ids: BTreeSet<TriggerId> = triggers.iter().map(|t| t.triggerid).collect();
        let unacknowledged = store.fetch_unacknowledged_trigger_ids(&ids)?;
        triggers.retain(|t| unacknowledged.contains(&t.triggerid));
    }

    Ok(Selection {
        triggers,
        relations,
    })
}

/// Intersection of every host-narrowing option; `None` when no option
/// narrows by host.
fn resolve_host_scope<S>(
    store: &S,
    query: &TriggerQuery,
) -> Result<Option<BTreeSet<HostId>>, ApiError>
where
    S: DataAccess + ?Sized,
{
    let mut scope: Option<BTreeSet<HostId>> = None;
    let mut narrow = |ids: BTreeSet<HostId>| {
        scope = Some(match scope.take() {
            Some(current) => current.intersection(&ids).copied().collect(),
            None => ids,
        });
    };

    if query.hostids.is_some() || query.templateids.is_some() {
        narrow(
            query
                .hostids
                .iter()
                .chain(query.templateids.iter())
                .flatten()
                .copied()
                .collect(),
        );
    }

    let mut groupids: Option<BTreeSet<GroupId>> =
        query.groupids.as_ref().map(|ids| ids.iter().copied().collect());
    if let Some(name) = &query.group {
        let named: BTreeSet<GroupId> = store
            .fetch_host_groups(None)?
            .into_iter()
            .filter(|group| &group.name == name)
            .map(|group| group.groupid)
            .collect();
        groupids = Some(match groupids {
            Some(ids) => ids.intersection(&named).copied().collect(),
            None => named,
        });
    }
    if let Some(groupids) = groupids {
        let members = if groupids.is_empty() {
            BTreeSet::new()
        } else {
            store
                .fetch_hosts(&HostFetch::by_groups(groupids))?
                .into_iter()
                .map(|host| host.hostid)
                .collect()
        };
        narrow(members);
    }

    if let Some(name) = &query.host {
        narrow(
            store
                .fetch_hosts(&HostFetch::default())?
                .into_iter()
                .filter(|host| &host.host == name)
                .map(|host| host.hostid)
                .collect(),
        );
    }

    Ok(scope)
}

struct RowFilter<'a> {
    query: &'a TriggerQuery,
    relations: &'a TriggerRelations,
    search: Option<&'a CompiledSearch>,
    now: i64,
    ok_period: i64,
}

impl RowFilter<'_> {
    fn matches(&self, trigger: &Trigger) -> bool {
        let query = self.query;
        let relations = self.relations;

        if let Some(names) = &query.functions
            && !trigger.functions.iter().any(|f| names.contains(&f.function))
        {
            return false;
        }
        if let Some(inherited) = query.inherited
            && trigger.templateid.is_some() != inherited
        {
            return false;
        }
        if let Some(templated) = query.templated
            && relations.templates_of(trigger.triggerid).is_empty() == templated
        {
            return false;
        }
        if query.monitored && !relations.is_monitored(trigger) {
            return false;
        }
        if query.active && !relations.is_active(trigger) {
            return false;
        }
        if let Some(in_maintenance) = query.maintenance {
            let any_in_maintenance = relations
                .hosts_of(trigger.triggerid)
                .any(|host| host.maintenance_status);
            if !trigger.is_enabled() || any_in_maintenance != in_maintenance {
                return false;
            }
        }
        if query
            .last_change_since
            .is_some_and(|since| trigger.lastchange <= since)
        {
            return false;
        }
        if query
            .last_change_till
            .is_some_and(|till| trigger.lastchange >= till)
        {
            return false;
        }
        if query.only_true {
            let recently_ok = trigger.value == TriggerValue::Ok
                && trigger.lastchange > self.now - self.ok_period;
            if !trigger.is_problem() && !recently_ok {
                return false;
            }
        }
        if query
            .min_severity
            .is_some_and(|min| trigger.priority < min)
        {
            return false;
        }
        if !self.matches_filter(trigger) {
            return false;
        }
        self.search.is_none_or(|search| search.matches(trigger))
    }

    fn matches_filter(&self, trigger: &Trigger) -> bool {
        let filter = &self.query.filter;
        let flags_ok = match &filter.flags {
            Some(flags) => flags.contains(&trigger.flags),
            None => trigger.flags != TriggerFlags::Prototype,
        };
        let templateid_ok = filter
            .templateid
            .as_ref()
            .is_none_or(|ids| trigger.templateid.is_some_and(|id| ids.contains(&id)));
        let host_ok = filter.host.as_ref().is_none_or(|names| {
            self.relations
                .hosts_of(trigger.triggerid)
                .any(|host| names.contains(&host.host))
        });
        let hostid_ok = filter.hostid.as_ref().is_none_or(|ids| {
            self.relations
                .host_ids_of(trigger.triggerid)
                .any(|hostid| ids.contains(&hostid))
        });

        flags_ok
            && templateid_ok
            && host_ok
            && hostid_ok
            && allowed(&filter.description, &trigger.description)
            && allowed(&filter.status, &trigger.status)
            && allowed(&filter.value, &trigger.value)
            && allowed(&filter.priority, &trigger.priority)
            && allowed(&filter.state, &trigger.state)
    }
}

fn allowed<T: PartialEq>(values: &Option<Vec<T>>, value: &T) -> bool {
    values.as_ref().is_none_or(|values| values.contains(value))
}

#[derive(Debug, Clone, Copy)]
enum SearchField {
    Description,
    Comments,
    Expression,
}

struct CompiledSearch {
    patterns: Vec<(SearchField, Regex)>,
    exclude: bool,
    by_any: bool,
}

impl CompiledSearch {
    fn new(search: &TriggerSearch) -> Result<Self, ApiError> {
        let fields = [
            (SearchField::Description, &search.description),
            (SearchField::Comments, &search.comments),
            (SearchField::Expression, &search.expression),
        ];
        let mut patterns = Vec::new();
        for (field, needle) in fields {
            let Some(needle) = needle.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            let body = if search.search_wildcards_enabled {
                needle
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*")
            } else {
                regex::escape(needle)
            };
            let anchored = if search.start_search {
                format!("^{body}")
            } else {
                body
            };
            let regex = RegexBuilder::new(&anchored)
                .case_insensitive(true)
                .build()
                .map_err(|e| ApiError::Parameters(format!("invalid search pattern: {e}")))?;
            patterns.push((field, regex));
        }
        Ok(Self {
            patterns,
            exclude: search.exclude_search,
            by_any: search.search_by_any,
        })
    }

    fn matches(&self, trigger: &Trigger) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let hit = |(field, regex): &(SearchField, Regex)| {
            let haystack = match field {
                SearchField::Description => &trigger.description,
                SearchField::Comments => &trigger.comments,
                SearchField::Expression => &trigger.expression,
            };
            regex.is_match(haystack) != self.exclude
        };
        if self.by_any {
            self.patterns.iter().any(hit)
        } else {
            self.patterns.iter().all(hit)
        }
    }
}

fn sort_triggers(
    triggers: &mut [Trigger],
    relations: &TriggerRelations,
    fields: &[SortField],
    order: SortOrder,
) {
    let hostname = |trigger: &Trigger| -> String {
        relations
            .hosts_of(trigger.triggerid)
            .next()
            .map(|host| host.display_name().to_string())
            .unwrap_or_default()
    };
    triggers.sort_by(|a, b| {
        let mut ordering = Ordering::Equal;
        for field in fields {
            ordering = match field {
                SortField::Triggerid => a.triggerid.cmp(&b.triggerid),
                SortField::Description => a.description.cmp(&b.description),
                SortField::Status => status_rank(a.status).cmp(&status_rank(b.status)),
                SortField::Priority => a.priority.cmp(&b.priority),
                SortField::Lastchange => a.lastchange.cmp(&b.lastchange),
                SortField::Hostname => hostname(a).cmp(&hostname(b)),
            };
            if ordering != Ordering::Equal {
                break;
            }
        }
        if order == SortOrder::Desc {
            ordering = ordering.reverse();
        }
        ordering.then(a.triggerid.cmp(&b.triggerid))
    });
}

fn status_rank(status: TriggerStatus) -> u8 {
    match status {
        TriggerStatus::Enabled => 0,
        TriggerStatus::Disabled => 1,
    }
}

fn decorate<S>(
    store: &S,
    principal: &Principal,
    ctx: &RenderContext,
    query: &TriggerQuery,
    triggers: Vec<Trigger>,
    relations: &TriggerRelations,
) -> Result<TriggerSet, ApiError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    if triggers.is_empty() {
        return Ok(TriggerSet::default());
    }
    let ids: BTreeSet<TriggerId> = triggers.iter().map(|t| t.triggerid).collect();

    let groups: BTreeMap<GroupId, HostGroup> = if query.select_groups {
        let groupids: BTreeSet<GroupId> = relations
            .hosts()
            .flat_map(|host| host.groups.iter().copied())
            .collect();
        store
            .fetch_host_groups(Some(&groupids))?
            .into_iter()
            .map(|group| (group.groupid, group))
            .collect()
    } else {
        BTreeMap::new()
    };

    let dependencies = if query.select_dependencies {
        load_dependencies(store, principal, query, &ids)?
    } else {
        BTreeMap::new()
    };

    let discovery_rules: BTreeMap<ItemId, Item> = if query.select_discovery_rule {
        let ruleids: BTreeSet<ItemId> =
            triggers.iter().filter_map(|t| t.discovery_ruleid).collect();
        store
            .fetch_items(&ItemFetch::by_ids(ruleids))?
            .into_iter()
            .map(|item| (item.itemid, item))
            .collect()
    } else {
        BTreeMap::new()
    };

    let mut last_events = if query.select_last_event {
        store.fetch_last_events(&ids)?
    } else {
        BTreeMap::new()
    };

    let expanding = query.expand_description || query.expand_comment || query.expand_expression;
    let macros = if expanding {
        UserMacros::load(store, relations.hosts())?
    } else {
        UserMacros::default()
    };
    let expander = TriggerExpander::new(relations, &macros, ctx.unresolved_marker());

    let views = triggers
        .into_iter()
        .map(|mut trigger| {
            let triggerid = trigger.triggerid;
            let mut view_hosts: Vec<Host> = relations.hosts_of(triggerid).cloned().collect();
            view_hosts.sort_by_key(|host| host.hostid);

            let view_groups = query.select_groups.then(|| {
                let groupids: BTreeSet<GroupId> = view_hosts
                    .iter()
                    .flat_map(|host| host.groups.iter().copied())
                    .collect();
                groupids
                    .iter()
                    .filter_map(|id| groups.get(id).cloned())
                    .collect()
            });
            let view_items = query.select_items.then(|| {
                let mut items: Vec<Item> = relations.items_of(&trigger).cloned().collect();
                items.sort_by_key(|item| item.itemid);
                items.dedup_by_key(|item| item.itemid);
                items
            });

            if query.expand_description {
                trigger.description = expander.expand_description(&trigger);
            }
            if query.expand_comment {
                trigger.comments = expander.expand_comments(&trigger);
            }
            if query.expand_expression {
                trigger.expression = expander.expand_expression(&trigger);
            }

            let discovery_rule = trigger
                .discovery_ruleid
                .and_then(|id| discovery_rules.get(&id).cloned());
            if !query.select_functions {
                trigger.functions.clear();
            }

            TriggerView {
                groups: view_groups,
                hosts: query.select_hosts.then_some(view_hosts),
                items: view_items,
                dependencies: query
                    .select_dependencies
                    .then(|| dependencies.get(&triggerid).cloned().unwrap_or_default()),
                discovery_rule: discovery_rule.filter(|_| query.select_discovery_rule),
                last_event: last_events.remove(&triggerid),
                ..TriggerView::new(trigger)
            }
        })
        .collect();

    Ok(TriggerSet { triggers: views })
}

/// Upstream triggers of `ids` the principal may read, keyed by down trigger.
fn load_dependencies<S>(
    store: &S,
    principal: &Principal,
    query: &TriggerQuery,
    ids: &BTreeSet<TriggerId>,
) -> Result<BTreeMap<TriggerId, Vec<Trigger>>, ApiError>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    let edges = store.fetch_dependency_edges(ids, EdgeDirection::Up)?;
    let up_ids: BTreeSet<TriggerId> = edges.iter().map(|e| e.triggerid_up).collect();
    if up_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let ups = store.fetch_triggers(&TriggerFetch::by_ids(up_ids))?;
    let readable = if query.nopermissions {
        ups.iter().map(|t| t.triggerid).collect()
    } else {
        let relations = TriggerRelations::load(store, &ups)?;
        permitted_trigger_ids(
            store,
            &relations,
            principal,
            Access::Read,
            ups.iter().map(|t| t.triggerid),
        )?
    };
    let ups: BTreeMap<TriggerId, Trigger> = ups
        .into_iter()
        .filter(|t| readable.contains(&t.triggerid))
        .map(|t| (t.triggerid, t))
        .collect();

    let mut by_down: BTreeMap<TriggerId, Vec<Trigger>> = BTreeMap::new();
    for edge in edges {
        if let Some(up) = ups.get(&edge.triggerid_up) {
            by_down.entry(edge.triggerid_down).or_default().push(up.clone());
        }
    }
    Ok(by_down)
}
