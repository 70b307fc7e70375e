//! Element and link label text.
//!
//! Labels support three macro families:
//! - host macros (`{HOST.NAME}`, `{HOST.CONN2}`, ...) on host and trigger
//!   elements, indexed by the trigger's function order
//! - functional item macros `{host:key.last|min|max|avg(period)}`, where the
//!   host may be a `{HOST.HOST[n]}`/`{HOSTNAME[n]}` placeholder
//! - trigger and event counters (`{TRIGGERS.UNACK}`, ...) over everything
//!   the element stands for
//!
//! A functional macro whose item does not exist resolves to the unresolved
//! marker; it never fails the render.

use crate::collect::ElementTargets;
use crate::error::MapError;
use crate::status::StatusInfo;
use regex::{Captures, Regex};
use serde::Serialize;
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use trigmap_kernel::{
    ElementType, Host, HostId, Item, Palette, Principal, RenderContext, Selement, SelementTarget,
    TriggerId, TriggerValue,
};
use trigmap_store::{DataAccess, HostFetch, ItemFetch, PermissionOracle, TriggerFetch};
use trigmap_triggers::{TriggerFilter, TriggerQuery, function_refs, get_triggers};

/// One drawn label line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelLine {
    pub msg: String,
    pub color: String,
}

/// Hosts an element's macros may refer to, keyed by macro index (`""` for
/// unindexed macros, `"1"`..`"9"` for positional ones).
pub type IndexedHosts = BTreeMap<String, Host>;

const HOST_MACRO_MARKERS: [&str; 7] = [
    "HOST.NAME",
    "HOSTNAME",
    "HOST.HOST",
    "HOST.DNS",
    "HOST.IP",
    "IPADDRESS",
    "HOST.CONN",
];

fn functional_macro_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\{([0-9a-zA-Z_. \-]+|\{HOSTNAME[0-9]?\}|\{HOST\.HOST[0-9]?\}):(.+?)\.(last|max|min|avg)\(([0-9]+[smhdw]?)?\)\}",
        )
        .expect("functional macro regex must compile")
    })
}

fn host_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\{(?:HOSTNAME|HOST\.HOST)([0-9]?)\}$")
            .expect("host placeholder regex must compile")
    })
}

/// Seconds in a `5m`-style period; a bare number is seconds.
pub fn period_secs(period: &str) -> Option<i64> {
    let (digits, unit) = match period.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&period[..i], Some(c)),
        _ => (period, None),
    };
    let value: i64 = digits.parse().ok()?;
    let scale = match unit {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 3_600,
        Some('d') => 86_400,
        Some('w') => 604_800,
        Some(_) => return None,
    };
    value.checked_mul(scale)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.4}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Counter {
    Triggers {
        problems_only: bool,
        ack: bool,
    },
    Events {
        trigger_value: Option<TriggerValue>,
        event_value: Option<TriggerValue>,
        ack: bool,
    },
}

const COUNTERS: [(&str, Counter); 10] = [
    (
        "{TRIGGERS.UNACK}",
        Counter::Triggers {
            problems_only: false,
            ack: false,
        },
    ),
    (
        "{TRIGGERS.PROBLEM.UNACK}",
        Counter::Triggers {
            problems_only: true,
            ack: false,
        },
    ),
    (
        "{TRIGGER.EVENTS.UNACK}",
        Counter::Events {
            trigger_value: None,
            event_value: None,
            ack: false,
        },
    ),
    (
        "{TRIGGER.EVENTS.PROBLEM.UNACK}",
        Counter::Events {
            trigger_value: None,
            event_value: Some(TriggerValue::Problem),
            ack: false,
        },
    ),
    (
        "{TRIGGER.PROBLEM.EVENTS.PROBLEM.UNACK}",
        Counter::Events {
            trigger_value: Some(TriggerValue::Problem),
            event_value: Some(TriggerValue::Problem),
            ack: false,
        },
    ),
    (
        "{TRIGGERS.ACK}",
        Counter::Triggers {
            problems_only: false,
            ack: true,
        },
    ),
    (
        "{TRIGGERS.PROBLEM.ACK}",
        Counter::Triggers {
            problems_only: true,
            ack: true,
        },
    ),
    (
        "{TRIGGER.EVENTS.ACK}",
        Counter::Events {
            trigger_value: None,
            event_value: None,
            ack: true,
        },
    ),
    (
        "{TRIGGER.EVENTS.PROBLEM.ACK}",
        Counter::Events {
            trigger_value: None,
            event_value: Some(TriggerValue::Problem),
            ack: true,
        },
    ),
    (
        "{TRIGGER.PROBLEM.EVENTS.PROBLEM.ACK}",
        Counter::Events {
            trigger_value: Some(TriggerValue::Problem),
            event_value: Some(TriggerValue::Problem),
            ack: true,
        },
    ),
];

/// Resolves label macros against the store at the context's clock.
pub struct LabelResolver<'a, S: ?Sized> {
    store: &'a S,
    ctx: &'a RenderContext,
    hosts_by_name: OnceCell<BTreeMap<String, HostId>>,
}

impl<'a, S> LabelResolver<'a, S>
where
    S: DataAccess + PermissionOracle + ?Sized,
{
    pub fn new(store: &'a S, ctx: &'a RenderContext) -> Self {
        Self {
            store,
            ctx,
            hosts_by_name: OnceCell::new(),
        }
    }

    /// Fully resolved label text of one element.
    pub fn element_label(
        &self,
        selement: &Selement,
        label: &str,
        targets: &ElementTargets,
    ) -> Result<String, MapError> {
        let element_type = selement.element_type();
        let wants_hosts = matches!(element_type, ElementType::Host | ElementType::Trigger)
            && HOST_MACRO_MARKERS.iter().any(|marker| label.contains(marker));

        let mut text = if wants_hosts {
            let hosts = self.indexed_hosts(selement)?;
            let text = self.resolve_functional(label, Some(&hosts))?;
            replace_host_macros(&text, &hosts)
        } else {
            self.resolve_functional(label, None)?
        };

        if element_type != ElementType::Image {
            for (name, counter) in COUNTERS {
                if text.contains(name) {
                    let count = self.count(counter, targets)?;
                    text = text.replace(name, &count.to_string());
                }
            }
        }
        Ok(text)
    }

    /// Hosts `{HOST.*}` macros of a host or trigger element refer to.
    pub fn indexed_hosts(&self, selement: &Selement) -> Result<IndexedHosts, MapError> {
        let mut indexed = IndexedHosts::new();
        match selement.element {
            SelementTarget::Host(hostid) => {
                if let Some(host) = self
                    .store
                    .fetch_hosts(&HostFetch::by_ids([hostid]))?
                    .into_iter()
                    .next()
                {
                    indexed.insert(String::new(), host);
                }
            }
            SelementTarget::Trigger(triggerid) => {
                let Some(trigger) = self
                    .store
                    .fetch_triggers(&TriggerFetch::by_ids([triggerid]))?
                    .into_iter()
                    .next()
                else {
                    return Ok(indexed);
                };
                let items: BTreeMap<_, Item> = self
                    .store
                    .fetch_items(&ItemFetch::by_ids(trigger.item_ids()))?
                    .into_iter()
                    .map(|item| (item.itemid, item))
                    .collect();
                let hosts: BTreeMap<HostId, Host> = self
                    .store
                    .fetch_hosts(&HostFetch::by_ids(items.values().map(|i| i.hostid)))?
                    .into_iter()
                    .map(|host| (host.hostid, host))
                    .collect();

                let positional = function_refs(&trigger.expression).into_iter().take(9);
                for (position, functionid) in positional.enumerate() {
                    let host = trigger
                        .function(functionid)
                        .and_then(|f| items.get(&f.itemid))
                        .and_then(|item| hosts.get(&item.hostid));
                    if let Some(host) = host {
                        indexed.insert((position + 1).to_string(), host.clone());
                    }
                }
                if let Some(first) = indexed.get("1").cloned() {
                    indexed.insert(String::new(), first);
                }
            }
            SelementTarget::HostGroup(_) | SelementTarget::Map(_) | SelementTarget::Image => {}
        }
        Ok(indexed)
    }

    /// Replace `{host:key.func(period)}` macros. With `hosts` given, the host
    /// part may be a `{HOST.HOST[n]}` placeholder.
    pub fn resolve_functional(
        &self,
        label: &str,
        hosts: Option<&IndexedHosts>,
    ) -> Result<String, MapError> {
        let mut failure = None;
        let resolved = functional_macro_re().replace_all(label, |caps: &Captures| {
            if failure.is_some() {
                return caps[0].to_string();
            }
            match self.functional_value(caps, hosts) {
                Ok(Some(value)) => value,
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    failure = Some(e);
                    caps[0].to_string()
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(resolved.into_owned()),
        }
    }

    /// `None` leaves the macro as written.
    fn functional_value(
        &self,
        caps: &Captures,
        hosts: Option<&IndexedHosts>,
    ) -> Result<Option<String>, MapError> {
        let host_part = &caps[1];
        let host = match host_placeholder_re().captures(host_part) {
            Some(placeholder) => {
                let Some(host) = hosts.and_then(|h| h.get(&placeholder[1])) else {
                    return Ok(None);
                };
                host.host.clone()
            }
            None => host_part.to_string(),
        };
        let key = &caps[2];
        let function = &caps[3];
        let marker = self.ctx.unresolved_marker().to_string();

        let Some(item) = self.find_item(&host, key)? else {
            return Ok(Some(marker));
        };

        if function == "last" {
            let value = match (item.lastclock, item.lastvalue) {
                (Some(_), Some(value)) => value,
                _ => marker,
            };
            return Ok(Some(value));
        }

        let Some(period) = caps.get(4).and_then(|p| period_secs(p.as_str())) else {
            return Ok(Some(marker));
        };
        let values: Vec<f64> = self
            .store
            .fetch_item_history(item.itemid, self.ctx.now - period)?
            .into_iter()
            .map(|point| point.value)
            .collect();
        if values.is_empty() {
            return Ok(Some(marker));
        }
        let value = match function {
            "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
            "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            _ => values.iter().sum::<f64>() / values.len() as f64,
        };
        Ok(Some(format_number(value)))
    }

    fn find_item(&self, host: &str, key: &str) -> Result<Option<Item>, MapError> {
        let hosts_by_name = match self.hosts_by_name.get() {
            Some(index) => index,
            None => {
                let index = self
                    .store
                    .fetch_hosts(&HostFetch::default())?
                    .into_iter()
                    .map(|h| (h.host, h.hostid))
                    .collect();
                self.hosts_by_name.get_or_init(|| index)
            }
        };
        let Some(hostid) = hosts_by_name.get(host) else {
            return Ok(None);
        };
        Ok(self
            .store
            .fetch_items(&ItemFetch::by_hosts([*hostid]))?
            .into_iter()
            .find(|item| item.key == key))
    }

    fn count(&self, counter: Counter, targets: &ElementTargets) -> Result<usize, MapError> {
        if targets.is_empty() {
            return Ok(0);
        }
        let ids = |set: &BTreeSet<u64>| (!set.is_empty()).then(|| set.iter().copied().collect());
        let mut query = TriggerQuery {
            hostids: ids(&targets.hosts),
            groupids: ids(&targets.groups),
            triggerids: ids(&targets.triggers),
            monitored: true,
            nopermissions: true,
            ..TriggerQuery::default()
        };

        match counter {
            Counter::Triggers { problems_only, ack } => {
                if ack {
                    query.with_acknowledged_events = true;
                } else {
                    query.with_unacknowledged_events = true;
                }
                if problems_only {
                    query.filter = problem_filter();
                }
                let set = get_triggers(self.store, &Principal::super_admin(), self.ctx, &query)?;
                Ok(set.len().min(self.ctx.config.search_limit + 1))
            }
            Counter::Events {
                trigger_value,
                event_value,
                ack,
            } => {
                if trigger_value == Some(TriggerValue::Problem) {
                    query.filter = problem_filter();
                }
                let set = get_triggers(self.store, &Principal::super_admin(), self.ctx, &query)?;
                let triggerids: BTreeSet<TriggerId> = set.ids().into_iter().collect();
                if triggerids.is_empty() {
                    return Ok(0);
                }
                Ok(self
                    .store
                    .fetch_events(&triggerids)?
                    .iter()
                    .filter(|event| event_value.is_none_or(|value| event.value == value))
                    .filter(|event| event.acknowledged == ack)
                    .count())
            }
        }
    }
}

fn problem_filter() -> TriggerFilter {
    TriggerFilter {
        value: Some(vec![TriggerValue::Problem]),
        ..TriggerFilter::default()
    }
}

/// Replace `{HOST.NAME}`, `{HOST.IP2}`, ... for every indexed host. Macros
/// without a matching host stay as written.
pub fn replace_host_macros(text: &str, hosts: &IndexedHosts) -> String {
    let mut text = text.to_string();
    for (index, host) in hosts {
        let interface = host.main_interface();
        let ip = interface.map(|i| i.ip.as_str()).unwrap_or_default();
        let dns = interface.map(|i| i.dns.as_str()).unwrap_or_default();
        let conn = interface.map(|i| i.connection()).unwrap_or_default();
        let name = host.display_name();
        for (macro_name, value) in [
            ("HOST.NAME", name),
            ("HOSTNAME", name),
            ("HOST.HOST", host.host.as_str()),
            ("HOST.DNS", dns),
            ("HOST.IP", ip),
            ("IPADDRESS", ip),
            ("HOST.CONN", conn),
        ] {
            text = text.replace(&format!("{{{macro_name}{index}}}"), value);
        }
    }
    text
}

/// What a label shows besides the status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelBody<'t> {
    /// Macro-resolved label text, one line per `\n`.
    Text(&'t str),
    Name(&'t str),
    Ip(&'t str),
    /// Status lines only.
    Status,
}

/// Compose the drawn lines: body first, then status lines in drawing
/// order. Empty lines are dropped.
pub fn compose_label(body: LabelBody<'_>, status: &StatusInfo, palette: &Palette) -> Vec<LabelLine> {
    let plain = |msg: &str| LabelLine {
        msg: msg.replace('\r', ""),
        color: palette.black.clone(),
    };
    let mut lines: Vec<LabelLine> = match body {
        LabelBody::Text(text) => text.split('\n').map(plain).collect(),
        LabelBody::Name(name) | LabelBody::Ip(name) => vec![plain(name)],
        LabelBody::Status => Vec::new(),
    };
    lines.extend(status.label_lines().map(|line| LabelLine {
        msg: line.msg.clone(),
        color: line.color.clone(),
    }));
    lines.retain(|line| !line.msg.is_empty());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusLine;
    use crate::testing::{host, selement, trigger};
    use trigmap_kernel::{
        Event, FrontendConfig, HistoryPoint, HostInterface, InterfaceType, Severity,
        TriggerFunction,
    };
    use trigmap_store::{MemoryStore, StoreRecord};

    const NOW: i64 = 1_700_000_000;

    fn item(itemid: u64, hostid: HostId, key: &str, last: Option<&str>) -> StoreRecord {
        StoreRecord::Item(Item {
            itemid,
            hostid,
            name: key.to_string(),
            key: key.to_string(),
            status: Default::default(),
            lastvalue: last.map(str::to_string),
            lastclock: last.map(|_| NOW - 30),
            applications: Vec::new(),
        })
    }

    fn history(itemid: u64, age: i64, value: f64) -> StoreRecord {
        StoreRecord::History(HistoryPoint {
            itemid,
            clock: NOW - age,
            value,
        })
    }

    fn event(eventid: u64, objectid: TriggerId, value: TriggerValue, acknowledged: bool) -> StoreRecord {
        StoreRecord::Event(Event {
            eventid,
            objectid,
            clock: NOW - 100 + eventid as i64,
            ns: 0,
            value,
            acknowledged,
        })
    }

    fn web01() -> Host {
        let mut web01 = host(10, "web01", &[1]);
        web01.name = "Web server 01".to_string();
        web01.interfaces = vec![HostInterface {
            interfaceid: 1,
            kind: InterfaceType::Agent,
            main: true,
            useip: true,
            ip: "10.0.0.1".to_string(),
            dns: "web01.example.com".to_string(),
            port: "10050".to_string(),
        }];
        web01
    }

    fn store() -> MemoryStore {
        let mut cpu = trigger(100, Severity::High, TriggerValue::Problem);
        cpu.expression = "{7}>5 and {8}<1".to_string();
        cpu.functions = vec![
            TriggerFunction {
                functionid: 7,
                itemid: 1,
                function: "last".to_string(),
                parameter: "0".to_string(),
            },
            TriggerFunction {
                functionid: 8,
                itemid: 3,
                function: "last".to_string(),
                parameter: "0".to_string(),
            },
        ];
        MemoryStore::from_records(vec![
            StoreRecord::Host(web01()),
            StoreRecord::Host(host(20, "db01", &[1])),
            item(1, 10, "system.cpu.load[all,avg1]", Some("0.42")),
            item(2, 10, "vfs.fs.size[/,free]", None),
            item(3, 20, "mysql.ping", Some("1")),
            history(2, 600, 10.0),
            history(2, 300, 20.0),
            history(2, 7200, 99.0),
            StoreRecord::Trigger(cpu),
            event(1, 100, TriggerValue::Problem, false),
            event(2, 100, TriggerValue::Ok, false),
            event(3, 100, TriggerValue::Problem, true),
        ])
    }

    fn ctx() -> RenderContext {
        RenderContext::new(FrontendConfig::default(), NOW)
    }

    #[test]
    fn periods_accept_time_suffixes() {
        assert_eq!(period_secs("300"), Some(300));
        assert_eq!(period_secs("5m"), Some(300));
        assert_eq!(period_secs("2h"), Some(7_200));
        assert_eq!(period_secs("1w"), Some(604_800));
        assert_eq!(period_secs("m"), None);
        assert_eq!(period_secs("5x"), None);
    }

    #[test]
    fn unknown_host_item_renders_marker() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);
        let text = resolver
            .resolve_functional("load: {nonexistentHost:key.last(0)}", None)
            .expect("missing items must not fail the label");
        assert_eq!(text, "load: *UNKNOWN*");
    }

    #[test]
    fn functional_macros_read_last_value_and_history() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);

        let text = resolver
            .resolve_functional("{web01:system.cpu.load[all,avg1].last(0)}", None)
            .expect("label should resolve");
        assert_eq!(text, "0.42");

        // Item 2 has history but has never reported a last value.
        let text = resolver
            .resolve_functional(
                "{web01:vfs.fs.size[/,free].last(0)} {web01:vfs.fs.size[/,free].avg(1h)} {web01:vfs.fs.size[/,free].max(5m)}",
                None,
            )
            .expect("label should resolve");
        assert_eq!(text, "*UNKNOWN* 15 20");

        let text = resolver
            .resolve_functional("{web01:vfs.fs.size[/,free].min(60)}", None)
            .expect("label should resolve");
        assert_eq!(text, "*UNKNOWN*");
    }

    #[test]
    fn placeholders_need_a_host_list() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);
        let label = "{{HOST.HOST}:system.cpu.load[all,avg1].last(0)}";

        let untouched = resolver
            .resolve_functional(label, None)
            .expect("label should resolve");
        assert_eq!(untouched, label);

        let host = selement(1, SelementTarget::Host(10));
        let hosts = resolver.indexed_hosts(&host).expect("hosts should load");
        let resolved = resolver
            .resolve_functional(label, Some(&hosts))
            .expect("label should resolve");
        assert_eq!(resolved, "0.42");
    }

    #[test]
    fn host_element_label_resolves_host_macros() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);
        let host = selement(1, SelementTarget::Host(10));
        let targets = ElementTargets {
            hosts: BTreeSet::from([10]),
            ..ElementTargets::default()
        };

        let text = resolver
            .element_label(
                &host,
                "{HOST.NAME} ({HOST.HOST})\n{HOST.CONN} {HOST.DNS2}",
                &targets,
            )
            .expect("label should resolve");
        assert_eq!(text, "Web server 01 (web01)\n10.0.0.1 {HOST.DNS2}");
    }

    #[test]
    fn trigger_element_indexes_hosts_by_function_order() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);
        let element = selement(1, SelementTarget::Trigger(100));
        let targets = ElementTargets {
            triggers: BTreeSet::from([100]),
            ..ElementTargets::default()
        };

        let text = resolver
            .element_label(&element, "{HOST.HOST1}/{HOST.HOST2} {HOSTNAME}", &targets)
            .expect("label should resolve");
        assert_eq!(text, "web01/db01 Web server 01");
    }

    #[test]
    fn counters_cover_triggers_and_events() {
        let store = store();
        let ctx = ctx();
        let resolver = LabelResolver::new(&store, &ctx);
        let element = selement(1, SelementTarget::Host(10));
        let targets = ElementTargets {
            hosts: BTreeSet::from([10]),
            ..ElementTargets::default()
        };

        let text = resolver
            .element_label(
                &element,
                "{TRIGGERS.UNACK} {TRIGGERS.ACK} {TRIGGER.EVENTS.UNACK} {TRIGGER.EVENTS.PROBLEM.UNACK} {TRIGGER.PROBLEM.EVENTS.PROBLEM.ACK}",
                &targets,
            )
            .expect("label should resolve");
        assert_eq!(text, "1 0 2 1 1");

        let empty = resolver
            .element_label(
                &selement(2, SelementTarget::Map(9)),
                "{TRIGGERS.UNACK}",
                &ElementTargets::default(),
            )
            .expect("label should resolve");
        assert_eq!(empty, "0");
    }

    #[test]
    fn composed_label_puts_status_after_body_and_skips_empty_lines() {
        let palette = Palette::default();
        let status = StatusInfo {
            problem: Some(StatusLine {
                msg: "2 Problems".to_string(),
                color: "FF0000".to_string(),
            }),
            ok: Some(StatusLine {
                msg: String::new(),
                color: "009600".to_string(),
            }),
            ..StatusInfo::default()
        };

        let lines = compose_label(LabelBody::Text("web01\r\n\nrack 4"), &status, &palette);
        let msgs: Vec<&str> = lines.iter().map(|l| l.msg.as_str()).collect();
        assert_eq!(msgs, vec!["web01", "rack 4", "2 Problems"]);
        assert_eq!(lines[0].color, "000000");
        assert_eq!(lines[2].color, "FF0000");

        let lines = compose_label(LabelBody::Status, &status, &palette);
        assert_eq!(lines.len(), 1);
    }
}
