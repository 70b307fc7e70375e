//! Hosts, templates, host groups, items and the records hanging off them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type HostId = u64;
pub type GroupId = u64;
pub type ItemId = u64;
pub type InterfaceId = u64;
pub type MaintenanceId = u64;

/// Hosts and templates share one table; templates carry `Template` status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    #[default]
    Monitored,
    NotMonitored,
    Template,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    #[default]
    Agent,
    Snmp,
    Ipmi,
    Jmx,
}

impl InterfaceType {
    /// Preference order when a macro asks for "the" host address.
    pub fn priority(self) -> u8 {
        match self {
            InterfaceType::Agent => 4,
            InterfaceType::Snmp => 3,
            InterfaceType::Jmx => 2,
            InterfaceType::Ipmi => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInterface {
    pub interfaceid: InterfaceId,
    #[serde(default, rename = "type")]
    pub kind: InterfaceType,
    #[serde(default)]
    pub main: bool,
    #[serde(default = "default_useip")]
    pub useip: bool,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub port: String,
}

fn default_useip() -> bool {
    true
}

impl HostInterface {
    /// Address the agent connects to (`{HOST.CONN}`).
    pub fn connection(&self) -> &str {
        if self.useip { &self.ip } else { &self.dns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub hostid: HostId,
    /// Technical name.
    pub host: String,
    /// Visible name; empty means "same as `host`".
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: HostStatus,
    #[serde(default)]
    pub maintenance_status: bool,
    #[serde(default)]
    pub maintenanceid: Option<MaintenanceId>,
    #[serde(default)]
    pub groups: Vec<GroupId>,
    /// Templates linked to this host (or template).
    #[serde(default)]
    pub templates: Vec<HostId>,
    #[serde(default)]
    pub interfaces: Vec<HostInterface>,
    #[serde(default)]
    pub inventory: BTreeMap<String, String>,
}

impl Host {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.host
        } else {
            &self.name
        }
    }

    pub fn is_template(&self) -> bool {
        self.status == HostStatus::Template
    }

    pub fn is_monitored(&self) -> bool {
        self.status == HostStatus::Monitored
    }

    /// Main interface with the highest type priority.
    pub fn main_interface(&self) -> Option<&HostInterface> {
        self.interfaces
            .iter()
            .filter(|iface| iface.main)
            .max_by_key(|iface| iface.kind.priority())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub groupid: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Active,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub itemid: ItemId,
    pub hostid: HostId,
    #[serde(default)]
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub lastvalue: Option<String>,
    #[serde(default)]
    pub lastclock: Option<i64>,
    /// Names of applications the item belongs to.
    #[serde(default)]
    pub applications: Vec<String>,
}

impl Item {
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub itemid: ItemId,
    pub clock: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintenance {
    pub maintenanceid: MaintenanceId,
    pub name: String,
}

/// A `{$MACRO}` definition; `hostid: None` is a global macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMacro {
    #[serde(default)]
    pub hostid: Option<HostId>,
    #[serde(rename = "macro")]
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(interfaceid: InterfaceId, kind: InterfaceType, main: bool, ip: &str) -> HostInterface {
        HostInterface {
            interfaceid,
            kind,
            main,
            useip: true,
            ip: ip.to_string(),
            dns: format!("if{interfaceid}.example"),
            port: String::new(),
        }
    }

    #[test]
    fn main_interface_prefers_agent_over_snmp() {
        let host = Host {
            hostid: 1,
            host: "web01".to_string(),
            name: String::new(),
            description: String::new(),
            status: HostStatus::Monitored,
            maintenance_status: false,
            maintenanceid: None,
            groups: vec![],
            templates: vec![],
            interfaces: vec![
                iface(1, InterfaceType::Snmp, true, "10.0.0.2"),
                iface(2, InterfaceType::Agent, true, "10.0.0.1"),
                iface(3, InterfaceType::Agent, false, "10.0.0.9"),
            ],
            inventory: BTreeMap::new(),
        };

        let main = host.main_interface().expect("main interface should exist");
        assert_eq!(main.ip, "10.0.0.1");
        assert_eq!(host.display_name(), "web01");
    }

    #[test]
    fn connection_follows_useip() {
        let mut interface = iface(1, InterfaceType::Agent, true, "10.0.0.1");
        assert_eq!(interface.connection(), "10.0.0.1");
        interface.useip = false;
        assert_eq!(interface.connection(), "if1.example");
    }
}
