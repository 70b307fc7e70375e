//! Trigger records: severity, status/value enums, functions, events and
//! dependency edges.

use crate::host::ItemId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type TriggerId = u64;
pub type FunctionId = u64;
pub type EventId = u64;

/// Ordinal problem importance, 0 (not classified) to 5 (disaster).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    #[default]
    NotClassified,
    Information,
    Warning,
    Average,
    High,
    Disaster,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::NotClassified,
        Severity::Information,
        Severity::Warning,
        Severity::Average,
        Severity::High,
        Severity::Disaster,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::NotClassified => "Not classified",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Average => "Average",
            Severity::High => "High",
            Severity::Disaster => "Disaster",
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| format!("invalid severity {value} (expected 0..=5)"))
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.as_u8()
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid severity `{s}` (expected 0..=5)"))?;
        Severity::try_from(raw)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerValue {
    #[default]
    Ok,
    Problem,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    #[default]
    Normal,
    Unknown,
}

/// How a trigger came into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFlags {
    #[default]
    Normal,
    Discovered,
    Prototype,
}

/// One `{functionid}` reference of a trigger expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFunction {
    pub functionid: FunctionId,
    pub itemid: ItemId,
    pub function: String,
    #[serde(default)]
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub triggerid: TriggerId,
    pub description: String,
    pub expression: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub status: TriggerStatus,
    #[serde(default)]
    pub value: TriggerValue,
    #[serde(default)]
    pub state: TriggerState,
    #[serde(default)]
    pub priority: Severity,
    #[serde(default)]
    pub lastchange: i64,
    #[serde(default)]
    pub templateid: Option<TriggerId>,
    #[serde(default)]
    pub flags: TriggerFlags,
    #[serde(default)]
    pub functions: Vec<TriggerFunction>,
    /// Discovery rule the trigger was created by (discovered triggers only).
    #[serde(default)]
    pub discovery_ruleid: Option<ItemId>,
}

impl Trigger {
    pub fn is_enabled(&self) -> bool {
        self.status == TriggerStatus::Enabled
    }

    pub fn is_problem(&self) -> bool {
        self.value == TriggerValue::Problem
    }

    pub fn is_discovered(&self) -> bool {
        self.flags == TriggerFlags::Discovered
    }

    /// Items referenced by the trigger's functions.
    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.functions.iter().map(|f| f.itemid).collect()
    }

    pub fn function(&self, functionid: FunctionId) -> Option<&TriggerFunction> {
        self.functions.iter().find(|f| f.functionid == functionid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub eventid: EventId,
    /// Trigger the event was generated for.
    pub objectid: TriggerId,
    pub clock: i64,
    #[serde(default)]
    pub ns: i64,
    pub value: TriggerValue,
    #[serde(default)]
    pub acknowledged: bool,
}

impl Event {
    pub fn is_problem(&self) -> bool {
        self.value == TriggerValue::Problem
    }
}

/// `triggerid_down` depends on `triggerid_up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub triggerid_down: TriggerId,
    pub triggerid_up: TriggerId,
}

impl DependencyEdge {
    pub fn new(triggerid_down: TriggerId, triggerid_up: TriggerId) -> Self {
        Self {
            triggerid_down,
            triggerid_up,
        }
    }
}
