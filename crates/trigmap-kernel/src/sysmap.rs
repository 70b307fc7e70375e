//! Network map definitions: maps, elements (selements), links, icon maps.

use crate::host::{GroupId, HostId};
use crate::trigger::{Severity, TriggerId};
use serde::{Deserialize, Serialize};

pub type SysmapId = u64;
pub type SelementId = u64;
pub type LinkId = u64;
pub type ImageId = u64;
pub type IconMapId = u64;

/// Closed set of element kinds a map node can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Host,
    HostGroup,
    Trigger,
    Map,
    Image,
}

/// What a selement points at. Images reference their icon directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SelementTarget {
    Host(HostId),
    HostGroup(GroupId),
    Trigger(TriggerId),
    Map(SysmapId),
    Image,
}

impl SelementTarget {
    pub fn element_type(&self) -> ElementType {
        match self {
            SelementTarget::Host(_) => ElementType::Host,
            SelementTarget::HostGroup(_) => ElementType::HostGroup,
            SelementTarget::Trigger(_) => ElementType::Trigger,
            SelementTarget::Map(_) => ElementType::Map,
            SelementTarget::Image => ElementType::Image,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSubtype {
    /// A single node (for host-group elements: the group as a whole).
    #[default]
    HostGroup,
    /// Host-group area: expanded into one host node per member at render time.
    HostGroupElements,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaType {
    #[default]
    Fit,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelType {
    #[default]
    Label,
    Ip,
    Name,
    Status,
    Nothing,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelLocation {
    /// Inherit the map-wide location.
    #[default]
    Default,
    Bottom,
    Left,
    Right,
    Top,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowUnack {
    #[default]
    All,
    Unack,
    Both,
}

impl ShowUnack {
    pub fn shows_all(self) -> bool {
        matches!(self, ShowUnack::All | ShowUnack::Both)
    }

    pub fn shows_unack(self) -> bool {
        matches!(self, ShowUnack::Unack | ShowUnack::Both)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLabel {
    #[serde(default)]
    pub label_type: LabelType,
    /// Template used when `label_type` is `Custom`.
    #[serde(default)]
    pub label_string: String,
}

/// Map-wide label settings. With `advanced` off a single mode applies to
/// every element type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLabels {
    #[serde(default)]
    pub label_type: LabelType,
    #[serde(default)]
    pub advanced: bool,
    #[serde(default)]
    pub host: TypeLabel,
    #[serde(default)]
    pub host_group: TypeLabel,
    #[serde(default)]
    pub trigger: TypeLabel,
    #[serde(default)]
    pub map: TypeLabel,
    #[serde(default)]
    pub image: TypeLabel,
}

impl MapLabels {
    /// Effective label mode and custom template for one element type.
    pub fn for_element(&self, element_type: ElementType) -> (LabelType, &str) {
        if !self.advanced {
            return (self.label_type, "");
        }
        let per_type = match element_type {
            ElementType::Host => &self.host,
            ElementType::HostGroup => &self.host_group,
            ElementType::Trigger => &self.trigger,
            ElementType::Map => &self.map,
            ElementType::Image => &self.image,
        };
        (per_type.label_type, per_type.label_string.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selement {
    pub selementid: SelementId,
    pub element: SelementTarget,
    #[serde(default)]
    pub elementsubtype: ElementSubtype,
    #[serde(default)]
    pub areatype: AreaType,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub iconid_off: Option<ImageId>,
    #[serde(default)]
    pub iconid_on: Option<ImageId>,
    #[serde(default)]
    pub iconid_maintenance: Option<ImageId>,
    #[serde(default)]
    pub iconid_disabled: Option<ImageId>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub label_location: LabelLocation,
    /// Application name restricting which host triggers count.
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub use_iconmap: bool,
}

impl Selement {
    pub fn element_type(&self) -> ElementType {
        self.element.element_type()
    }

    pub fn is_area(&self) -> bool {
        matches!(self.element, SelementTarget::HostGroup(_))
            && self.elementsubtype == ElementSubtype::HostGroupElements
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawType {
    #[default]
    Line,
    Bold,
    Dot,
    Dashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTrigger {
    pub triggerid: TriggerId,
    #[serde(default)]
    pub drawtype: DrawType,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysmapLink {
    pub linkid: LinkId,
    pub selementid1: SelementId,
    pub selementid2: SelementId,
    #[serde(default)]
    pub drawtype: DrawType,
    #[serde(default = "default_link_color")]
    pub color: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub linktriggers: Vec<LinkTrigger>,
}

fn default_link_color() -> String {
    "000000".to_string()
}

impl SysmapLink {
    pub fn touches(&self, selementid: SelementId) -> bool {
        self.selementid1 == selementid || self.selementid2 == selementid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sysmap {
    pub sysmapid: SysmapId,
    pub name: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub labels: MapLabels,
    #[serde(default = "default_map_label_location")]
    pub label_location: LabelLocation,
    #[serde(default)]
    pub highlight: bool,
    #[serde(default)]
    pub expandproblem: bool,
    #[serde(default)]
    pub show_unack: ShowUnack,
    #[serde(default)]
    pub severity_min: Severity,
    #[serde(default)]
    pub iconmapid: Option<IconMapId>,
    #[serde(default)]
    pub selements: Vec<Selement>,
    #[serde(default)]
    pub links: Vec<SysmapLink>,
}

fn default_map_label_location() -> LabelLocation {
    LabelLocation::Bottom
}

impl Sysmap {
    pub fn selement(&self, selementid: SelementId) -> Option<&Selement> {
        self.selements.iter().find(|s| s.selementid == selementid)
    }

    /// Element label location with `Default` resolved against the map.
    pub fn label_location_of(&self, selement: &Selement) -> LabelLocation {
        match selement.label_location {
            LabelLocation::Default => match self.label_location {
                LabelLocation::Default => LabelLocation::Bottom,
                location => location,
            },
            location => location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconMapping {
    /// Host inventory field the expression is matched against.
    pub inventory_field: String,
    pub expression: String,
    pub iconid: ImageId,
    #[serde(default)]
    pub sortorder: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconMap {
    pub iconmapid: IconMapId,
    #[serde(default)]
    pub name: String,
    pub default_iconid: ImageId,
    #[serde(default)]
    pub mappings: Vec<IconMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub imageid: ImageId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}
