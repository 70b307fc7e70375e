//! Macro expansion for trigger names, comments and expressions.
//!
//! Expansion always works on a copy; stored trigger text is never
//! rewritten. Built-in macros that cannot be resolved become the configured
//! unresolved marker, unknown user macros are left as written.

use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::OnceLock;
use trigmap_kernel::{FunctionId, Host, HostId, Item, Trigger};
use trigmap_store::{DataAccess, HostFetch, StoreError, TriggerRelations};

fn function_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\d+)\}").expect("function reference regex must compile"))
}

/// `{HOST.NAME}`, `{HOST.IP2}`, `{ITEM.LASTVALUE3}`, ... with an optional
/// 1-9 function index.
pub fn host_macro_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\{(HOST\.HOST|HOSTNAME|HOST\.NAME|HOST\.IP|IPADDRESS|HOST\.DNS|HOST\.CONN|HOST\.DESCRIPTION|ITEM\.LASTVALUE|ITEM\.VALUE)([1-9]?)\}",
        )
        .expect("host macro regex must compile")
    })
}

fn user_macro_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\$[A-Z0-9_.]+\}").expect("user macro regex must compile"))
}

/// `{functionid}` references in order of appearance, duplicates kept.
pub fn function_refs(expression: &str) -> Vec<FunctionId> {
    function_ref_re()
        .captures_iter(expression)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Built-in macros that read a host (and, for item values, an item).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMacro {
    Host,
    Name,
    Ip,
    Dns,
    Conn,
    Description,
    ItemValue,
}

impl HostMacro {
    /// Parse a macro name without braces or index, e.g. `HOST.CONN`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "HOST.HOST" | "HOSTNAME" => Some(HostMacro::Host),
            "HOST.NAME" => Some(HostMacro::Name),
            "HOST.IP" | "IPADDRESS" => Some(HostMacro::Ip),
            "HOST.DNS" => Some(HostMacro::Dns),
            "HOST.CONN" => Some(HostMacro::Conn),
            "HOST.DESCRIPTION" => Some(HostMacro::Description),
            "ITEM.LASTVALUE" | "ITEM.VALUE" => Some(HostMacro::ItemValue),
            _ => None,
        }
    }

    pub fn resolve(self, host: &Host, item: Option<&Item>) -> Option<String> {
        match self {
            HostMacro::Host => Some(host.host.clone()),
            HostMacro::Name => Some(host.display_name().to_string()),
            HostMacro::Ip => host.main_interface().map(|iface| iface.ip.clone()),
            HostMacro::Dns => host.main_interface().map(|iface| iface.dns.clone()),
            HostMacro::Conn => host
                .main_interface()
                .map(|iface| iface.connection().to_string()),
            HostMacro::Description => Some(host.description.clone()),
            HostMacro::ItemValue => item.and_then(|item| item.lastvalue.clone()),
        }
    }
}

/// `{$MACRO}` definitions for a set of hosts, their template chains and
/// the global scope.
#[derive(Debug, Clone, Default)]
pub struct UserMacros {
    by_host: BTreeMap<HostId, BTreeMap<String, String>>,
    global: BTreeMap<String, String>,
    templates: BTreeMap<HostId, Vec<HostId>>,
}

impl UserMacros {
    /// Load macros for `hosts` and every template reachable through their
    /// template links.
    pub fn load<'a, D>(
        data: &D,
        hosts: impl IntoIterator<Item = &'a Host>,
    ) -> Result<Self, StoreError>
    where
        D: DataAccess + ?Sized,
    {
        let mut templates: BTreeMap<HostId, Vec<HostId>> = BTreeMap::new();
        let mut pending: BTreeSet<HostId> = BTreeSet::new();
        for host in hosts {
            templates.insert(host.hostid, host.templates.clone());
            pending.extend(host.templates.iter().copied());
        }
        pending.retain(|id| !templates.contains_key(id));

        while !pending.is_empty() {
            let batch = std::mem::take(&mut pending);
            let fetched = data.fetch_hosts(&HostFetch::by_ids(batch.iter().copied()))?;
            for id in &batch {
                templates.entry(*id).or_default();
            }
            for host in fetched {
                pending.extend(
                    host.templates
                        .iter()
                        .copied()
                        .filter(|id| !templates.contains_key(id)),
                );
                templates.insert(host.hostid, host.templates);
            }
        }

        let mut macros = Self {
            templates,
            ..Self::default()
        };
        let scope: BTreeSet<HostId> = macros.templates.keys().copied().collect();
        for user_macro in data.fetch_user_macros(&scope)? {
            let slot = match user_macro.hostid {
                Some(hostid) => macros.by_host.entry(hostid).or_default(),
                None => &mut macros.global,
            };
            slot.insert(user_macro.name, user_macro.value);
        }
        Ok(macros)
    }

    /// First definition found walking each host, then its templates
    /// breadth-first, then the global scope.
    pub fn resolve(&self, name: &str, hostids: &[HostId]) -> Option<&str> {
        for hostid in hostids {
            let mut seen = BTreeSet::new();
            let mut queue = VecDeque::from([*hostid]);
            while let Some(id) = queue.pop_front() {
                if !seen.insert(id) {
                    continue;
                }
                if let Some(value) = self.by_host.get(&id).and_then(|m| m.get(name)) {
                    return Some(value);
                }
                queue.extend(self.templates.get(&id).into_iter().flatten().copied());
            }
        }
        self.global.get(name).map(String::as_str)
    }

    pub fn expand(&self, text: &str, hostids: &[HostId]) -> String {
        user_macro_re()
            .replace_all(text, |caps: &Captures| {
                self.resolve(&caps[0], hostids)
                    .unwrap_or(&caps[0])
                    .to_string()
            })
            .into_owned()
    }
}

/// Expands the text fields of triggers whose relations are already loaded.
pub struct TriggerExpander<'a> {
    relations: &'a TriggerRelations,
    macros: &'a UserMacros,
    marker: &'a str,
}

impl<'a> TriggerExpander<'a> {
    pub fn new(relations: &'a TriggerRelations, macros: &'a UserMacros, marker: &'a str) -> Self {
        Self {
            relations,
            macros,
            marker,
        }
    }

    pub fn expand_description(&self, trigger: &Trigger) -> String {
        self.expand_text(trigger, &trigger.description)
    }

    pub fn expand_comments(&self, trigger: &Trigger) -> String {
        self.expand_text(trigger, &trigger.comments)
    }

    /// `{functionid}` → `{host:key.function(parameter)}`, then user macros.
    pub fn expand_expression(&self, trigger: &Trigger) -> String {
        let explicit = function_ref_re().replace_all(&trigger.expression, |caps: &Captures| {
            caps[1]
                .parse::<FunctionId>()
                .ok()
                .and_then(|functionid| trigger.function(functionid))
                .and_then(|function| {
                    let item = self.relations.item(function.itemid)?;
                    let host = self.relations.host(item.hostid)?;
                    Some(format!(
                        "{{{}:{}.{}({})}}",
                        host.host, item.key, function.function, function.parameter
                    ))
                })
                .unwrap_or_else(|| self.marker.to_string())
        });
        self.macros.expand(&explicit, &self.host_order(trigger))
    }

    fn expand_text(&self, trigger: &Trigger, text: &str) -> String {
        let refs = function_refs(&trigger.expression);
        let resolved = host_macro_re().replace_all(text, |caps: &Captures| {
            let index: usize = caps[2].parse().unwrap_or(1);
            refs.get(index - 1)
                .and_then(|functionid| trigger.function(*functionid))
                .and_then(|function| {
                    let item = self.relations.item(function.itemid)?;
                    let host = self.relations.host(item.hostid)?;
                    HostMacro::parse(&caps[1])?.resolve(host, Some(item))
                })
                .unwrap_or_else(|| self.marker.to_string())
        });
        self.macros.expand(&resolved, &self.host_order(trigger))
    }

    /// Owning hosts in order of first reference in the expression.
    fn host_order(&self, trigger: &Trigger) -> Vec<HostId> {
        let mut seen = BTreeSet::new();
        function_refs(&trigger.expression)
            .into_iter()
            .filter_map(|functionid| trigger.function(functionid))
            .filter_map(|function| self.relations.item(function.itemid))
            .map(|item| item.hostid)
            .filter(|hostid| seen.insert(*hostid))
            .collect()
    }
}
