//! Icon and status-line resolution per element type.
//!
//! Each resolver turns folded [`ElementCounts`] into the icon to draw and
//! the coloured status lines shown under the label. Host-group and map
//! elements keep a problem icon when maintenance or disabled hosts are
//! also present and report those alongside; host elements let maintenance
//! and disabled states take the icon.

use crate::aggregate::ElementCounts;
use serde::Serialize;
use trigmap_kernel::{ElementType, ImageId, Palette, Selement, Severity, ShowUnack};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconType {
    #[default]
    Off,
    On,
    Maintenance,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub msg: String,
    pub color: String,
}

impl StatusLine {
    fn new(msg: impl Into<String>, color: &str) -> Self {
        Self {
            msg: msg.into(),
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<StatusLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unack: Option<StatusLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<StatusLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<StatusLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusLine>,
    /// Disabled-host marker of container elements. Not drawn in labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<StatusLine>,
}

impl StatusInfo {
    pub fn is_empty(&self) -> bool {
        self.problem.is_none()
            && self.unack.is_none()
            && self.maintenance.is_none()
            && self.ok.is_none()
            && self.status.is_none()
            && self.disabled.is_none()
    }

    /// Lines drawn under a label, in drawing order. Empty messages are
    /// skipped.
    pub fn label_lines(&self) -> impl Iterator<Item = &StatusLine> {
        [
            &self.problem,
            &self.unack,
            &self.maintenance,
            &self.ok,
            &self.status,
        ]
        .into_iter()
        .flatten()
        .filter(|line| !line.msg.is_empty())
    }
}

/// The four icon variants of an element, with unset variants falling back
/// to the "off" icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementIcons {
    pub off: Option<ImageId>,
    pub on: Option<ImageId>,
    pub maintenance: Option<ImageId>,
    pub disabled: Option<ImageId>,
}

impl ElementIcons {
    pub fn of(selement: &Selement) -> Self {
        let off = selement.iconid_off;
        Self {
            off,
            on: selement.iconid_on.or(off),
            maintenance: selement.iconid_maintenance.or(off),
            disabled: selement.iconid_disabled.or(off),
        }
    }

    pub fn pick(&self, icon_type: IconType) -> Option<ImageId> {
        match icon_type {
            IconType::Off => self.off,
            IconType::On => self.on,
            IconType::Maintenance => self.maintenance,
            IconType::Disabled => self.disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStatus {
    pub iconid: Option<ImageId>,
    pub icon_type: IconType,
    pub info: StatusInfo,
}

impl ElementStatus {
    /// Resolve the icon and status lines of `selement` from its counts.
    pub fn resolve(
        selement: &Selement,
        counts: &ElementCounts,
        show_unack: ShowUnack,
        palette: &Palette,
    ) -> Self {
        let (icon_type, info) = match selement.element_type() {
            ElementType::Trigger => trigger_status(counts, show_unack, palette),
            ElementType::Host => host_status(counts, show_unack, palette),
            ElementType::HostGroup | ElementType::Map => {
                container_status(counts, show_unack, palette)
            }
            ElementType::Image => (IconType::Off, StatusInfo::default()),
        };
        Self {
            iconid: ElementIcons::of(selement).pick(icon_type),
            icon_type,
            info,
        }
    }
}

fn problem_color(counts: &ElementCounts, palette: &Palette) -> String {
    if counts.priority > Severity::Average {
        palette.red.clone()
    } else {
        palette.dark_red.clone()
    }
}

/// Problem and unacknowledged lines shared by host and container elements.
fn problem_lines(counts: &ElementCounts, show_unack: ShowUnack, palette: &Palette) -> StatusInfo {
    let mut info = StatusInfo::default();
    if counts.problem == 0 {
        return info;
    }
    if show_unack.shows_all() {
        let msg = if counts.problem > 1 {
            format!("{} Problems", counts.problem)
        } else if let Some(title) = &counts.problem_title {
            title.clone()
        } else {
            "1 Problem".to_string()
        };
        info.problem = Some(StatusLine {
            msg,
            color: problem_color(counts, palette),
        });
    }
    if show_unack.shows_unack() && counts.problem_unack > 0 {
        info.unack = Some(StatusLine::new(
            format!("{} Unacknowledged", counts.problem_unack),
            &palette.dark_red,
        ));
    }
    info
}

fn trigger_status(
    counts: &ElementCounts,
    show_unack: ShowUnack,
    palette: &Palette,
) -> (IconType, StatusInfo) {
    let mut info = StatusInfo::default();
    let visible = counts.problem > 0
        && ((counts.problem_unack > 0 && show_unack == ShowUnack::Unack) || show_unack.shows_all());

    if visible {
        info.unack = Some(StatusLine {
            msg: "PROBLEM".to_string(),
            color: problem_color(counts, palette),
        });
        (IconType::On, info)
    } else if counts.trigger_disabled > 0 {
        info.status = Some(StatusLine::new("DISABLED", &palette.dark_red));
        (IconType::Disabled, info)
    } else {
        info.ok = Some(StatusLine::new("OK", &palette.dark_green));
        (IconType::Off, info)
    }
}

fn host_status(
    counts: &ElementCounts,
    show_unack: ShowUnack,
    palette: &Palette,
) -> (IconType, StatusInfo) {
    let mut info = problem_lines(counts, show_unack, palette);
    let has_problem = !info.is_empty();
    let mut icon_type = if has_problem { IconType::On } else { IconType::Off };

    if counts.maintenance > 0 {
        icon_type = IconType::Maintenance;
        let title = counts.maintenance_title.as_deref().unwrap_or_default();
        info.maintenance = Some(StatusLine::new(
            format!("MAINTENANCE ({title})"),
            &palette.orange,
        ));
    } else if counts.disabled > 0 {
        icon_type = IconType::Disabled;
        info.status = Some(StatusLine::new("DISABLED", &palette.dark_red));
    } else if !has_problem {
        info.ok = Some(StatusLine::new("OK", &palette.dark_green));
    }
    (icon_type, info)
}

fn container_status(
    counts: &ElementCounts,
    show_unack: ShowUnack,
    palette: &Palette,
) -> (IconType, StatusInfo) {
    let mut info = problem_lines(counts, show_unack, palette);
    let has_problem = !info.is_empty();
    let mut icon_type = if has_problem { IconType::On } else { IconType::Off };
    let mut has_status = false;

    if counts.maintenance > 0 {
        if !has_problem {
            icon_type = IconType::Maintenance;
        }
        info.maintenance = Some(StatusLine::new(
            format!("{} Maintenance", counts.maintenance),
            &palette.orange,
        ));
        has_status = true;
    } else if counts.disabled > 0 {
        if !has_problem {
            icon_type = IconType::Disabled;
        }
        info.disabled = Some(StatusLine::new("DISABLED", &palette.dark_red));
        has_status = true;
    }

    if !has_status && !has_problem {
        info.ok = Some(StatusLine::new("OK", &palette.dark_green));
    }
    (icon_type, info)
}

/// Halo drawn around an element icon when map highlighting is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Highlight {
    #[default]
    None,
    /// Severity-coloured problem halo.
    Problem,
    /// Maintenance or disabled square.
    Status,
}

impl Highlight {
    pub fn of(enabled: bool, element_type: ElementType, icon_type: IconType) -> Self {
        if !enabled {
            return Highlight::None;
        }
        let problem = icon_type == IconType::On;
        let status = matches!(icon_type, IconType::Maintenance | IconType::Disabled);
        match element_type {
            ElementType::HostGroup | ElementType::Map if problem => Highlight::Problem,
            _ if status => Highlight::Status,
            _ if problem => Highlight::Problem,
            _ => Highlight::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::selement;
    use trigmap_kernel::SelementTarget;

    fn counts(problem: u32, problem_unack: u32, priority: Severity) -> ElementCounts {
        ElementCounts {
            problem,
            problem_unack,
            priority,
            ..ElementCounts::default()
        }
    }

    fn icons(element: SelementTarget) -> Selement {
        Selement {
            iconid_off: Some(1),
            iconid_on: Some(2),
            iconid_maintenance: Some(3),
            iconid_disabled: None,
            ..selement(1, element)
        }
    }

    #[test]
    fn trigger_problem_line_uses_severity_colour() {
        let palette = Palette::default();
        let trigger = icons(SelementTarget::Trigger(5));

        let status = ElementStatus::resolve(
            &trigger,
            &counts(1, 0, Severity::High),
            ShowUnack::All,
            &palette,
        );
        assert_eq!(status.icon_type, IconType::On);
        assert_eq!(status.iconid, Some(2));
        let line = status.info.unack.expect("problem line should be set");
        assert_eq!((line.msg.as_str(), line.color.as_str()), ("PROBLEM", "FF0000"));

        let status = ElementStatus::resolve(
            &trigger,
            &counts(1, 0, Severity::Average),
            ShowUnack::All,
            &palette,
        );
        assert_eq!(
            status.info.unack.map(|l| l.color),
            Some("960000".to_string())
        );
    }

    #[test]
    fn acknowledged_trigger_problem_hides_in_unack_mode() {
        let palette = Palette::default();
        let trigger = icons(SelementTarget::Trigger(5));
        let status = ElementStatus::resolve(
            &trigger,
            &counts(1, 0, Severity::High),
            ShowUnack::Unack,
            &palette,
        );
        assert_eq!(status.icon_type, IconType::Off);
        assert!(status.info.ok.is_some());

        let disabled = ElementCounts {
            trigger_disabled: 1,
            ..ElementCounts::default()
        };
        let status = ElementStatus::resolve(&trigger, &disabled, ShowUnack::All, &palette);
        assert_eq!(status.icon_type, IconType::Disabled);
        assert_eq!(status.iconid, Some(1), "missing disabled icon falls back to off");
        assert_eq!(status.info.status.map(|l| l.msg), Some("DISABLED".to_string()));
    }

    #[test]
    fn host_maintenance_takes_the_icon_but_keeps_problem_lines() {
        let palette = Palette::default();
        let host = icons(SelementTarget::Host(10));
        let counts = ElementCounts {
            maintenance: 1,
            maintenance_title: Some("Patch window".to_string()),
            ..counts(2, 1, Severity::Warning)
        };

        let status = ElementStatus::resolve(&host, &counts, ShowUnack::Both, &palette);
        assert_eq!(status.icon_type, IconType::Maintenance);
        assert_eq!(status.iconid, Some(3));
        let lines: Vec<&str> = status.info.label_lines().map(|l| l.msg.as_str()).collect();
        assert_eq!(
            lines,
            vec!["2 Problems", "1 Unacknowledged", "MAINTENANCE (Patch window)"]
        );
    }

    #[test]
    fn group_problem_keeps_icon_and_reports_maintenance_alongside() {
        let palette = Palette::default();
        let group = icons(SelementTarget::HostGroup(7));
        let counts = ElementCounts {
            maintenance: 2,
            problem_title: Some("Disk full on db01".to_string()),
            ..counts(1, 1, Severity::Disaster)
        };

        let status = ElementStatus::resolve(&group, &counts, ShowUnack::All, &palette);
        assert_eq!(status.icon_type, IconType::On);
        let problem = status.info.problem.expect("problem line should be set");
        assert_eq!(problem.msg, "Disk full on db01");
        assert_eq!(
            status.info.maintenance.map(|l| l.msg),
            Some("2 Maintenance".to_string())
        );
        assert!(status.info.ok.is_none());
    }

    #[test]
    fn group_with_disabled_hosts_reports_disabled_outside_label_lines() {
        let palette = Palette::default();
        let group = icons(SelementTarget::Map(3));
        let counts = ElementCounts {
            disabled: 3,
            ..ElementCounts::default()
        };
        let status = ElementStatus::resolve(&group, &counts, ShowUnack::All, &palette);
        assert_eq!(status.icon_type, IconType::Disabled);
        assert!(status.info.disabled.is_some());
        assert_eq!(status.info.label_lines().count(), 0);
    }

    #[test]
    fn healthy_elements_are_ok_and_images_carry_no_status() {
        let palette = Palette::default();
        for element in [
            SelementTarget::Host(1),
            SelementTarget::HostGroup(1),
            SelementTarget::Map(1),
            SelementTarget::Trigger(1),
        ] {
            let status = ElementStatus::resolve(
                &icons(element),
                &ElementCounts::default(),
                ShowUnack::All,
                &palette,
            );
            assert_eq!(status.icon_type, IconType::Off);
            assert_eq!(status.info.ok.map(|l| l.msg), Some("OK".to_string()));
        }

        let image = ElementStatus::resolve(
            &icons(SelementTarget::Image),
            &counts(3, 3, Severity::Disaster),
            ShowUnack::All,
            &palette,
        );
        assert_eq!(image.icon_type, IconType::Off);
        assert!(image.info.is_empty());
    }

    #[test]
    fn highlight_follows_icon_type() {
        assert_eq!(
            Highlight::of(false, ElementType::Host, IconType::On),
            Highlight::None
        );
        assert_eq!(
            Highlight::of(true, ElementType::Host, IconType::On),
            Highlight::Problem
        );
        assert_eq!(
            Highlight::of(true, ElementType::Host, IconType::Maintenance),
            Highlight::Status
        );
        assert_eq!(
            Highlight::of(true, ElementType::Map, IconType::Disabled),
            Highlight::Status
        );
        assert_eq!(
            Highlight::of(true, ElementType::HostGroup, IconType::Off),
            Highlight::None
        );
    }
}
