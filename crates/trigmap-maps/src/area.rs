//! Host-group areas: expansion into per-host elements, grid layout inside
//! the area, and the connector anchor on an area's perimeter.
//!
//! Expansion never mutates the map it reads. Synthetic elements and links
//! are appended to copies with IDs allocated above the highest existing
//! ones, so they cannot collide with persisted IDs.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use trigmap_kernel::{
    AreaType, ElementSubtype, Image, ImageId, LabelLocation, SelementId, Selement,
    SelementTarget, Sysmap, SysmapLink,
};
use trigmap_store::{DataAccess, HostFetch, StoreError};

/// Inset between an area's border and its grid.
pub const AREA_INSET: i64 = 5;
/// Keeps icon highlights inside the area.
pub const AREA_HIGHLIGHT_OFFSET: i64 = 20;
pub const DEFAULT_ICON_SIZE: (i64, i64) = (48, 48);

/// Icon dimensions used for layout.
pub trait IconMetrics {
    /// Width and height of `iconid`, `None` when unknown.
    fn icon_size(&self, iconid: ImageId) -> Option<(i64, i64)>;

    fn size_or_default(&self, iconid: Option<ImageId>) -> (i64, i64) {
        iconid
            .and_then(|id| self.icon_size(id))
            .unwrap_or(DEFAULT_ICON_SIZE)
    }
}

/// Every icon is the default size.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIconMetrics;

impl IconMetrics for DefaultIconMetrics {
    fn icon_size(&self, _iconid: ImageId) -> Option<(i64, i64)> {
        None
    }
}

/// Sizes of stored images. Images without dimensions fall back to the
/// default size.
#[derive(Debug, Clone, Default)]
pub struct ImageMetrics {
    sizes: BTreeMap<ImageId, (i64, i64)>,
}

impl ImageMetrics {
    pub fn from_images(images: impl IntoIterator<Item = Image>) -> Self {
        Self {
            sizes: images
                .into_iter()
                .filter(|image| image.width > 0 && image.height > 0)
                .map(|image| (image.imageid, (image.width, image.height)))
                .collect(),
        }
    }
}

impl IconMetrics for ImageMetrics {
    fn icon_size(&self, iconid: ImageId) -> Option<(i64, i64)> {
        self.sizes.get(&iconid).copied()
    }
}

/// One expanded host-group area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// The area element itself.
    pub selementid: SelementId,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Synthetic host elements, in host name order.
    pub members: Vec<SelementId>,
}

/// A map's elements and links after area expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandedMap {
    pub selements: Vec<Selement>,
    pub links: Vec<SysmapLink>,
    pub areas: Vec<Area>,
}

impl ExpandedMap {
    pub fn selement(&self, selementid: SelementId) -> Option<&Selement> {
        self.selements.iter().find(|s| s.selementid == selementid)
    }

    pub fn area(&self, selementid: SelementId) -> Option<&Area> {
        self.areas.iter().find(|area| area.selementid == selementid)
    }
}

/// Expand every host-group area of `map` into one host element per group
/// member and clone the links touching the area once per member.
///
/// Areas over an empty group produce nothing. Links joining two areas are
/// never multiplied.
pub fn expand_areas<D>(data: &D, map: &Sysmap) -> Result<ExpandedMap, StoreError>
where
    D: DataAccess + ?Sized,
{
    let mut next_selementid = map.selements.iter().map(|s| s.selementid).max().unwrap_or(0) + 1;
    let mut next_linkid = map.links.iter().map(|l| l.linkid).max().unwrap_or(0) + 1;
    let area_ids: BTreeSet<SelementId> = map
        .selements
        .iter()
        .filter(|s| s.is_area())
        .map(|s| s.selementid)
        .collect();

    let mut selements = map.selements.clone();
    let mut links = map.links.clone();
    let mut areas = Vec::new();

    for source in map.selements.iter().filter(|s| s.is_area()) {
        let SelementTarget::HostGroup(groupid) = source.element else {
            continue;
        };
        let mut hosts = data.fetch_hosts(&HostFetch::by_groups([groupid]))?;
        if hosts.is_empty() {
            debug!(selementid = source.selementid, groupid, "area over empty host group");
            continue;
        }
        hosts.sort_by(|a, b| {
            a.display_name()
                .cmp(b.display_name())
                .then(a.hostid.cmp(&b.hostid))
        });

        let (x, y, width, height) = match source.areatype {
            AreaType::Custom => (source.x, source.y, source.width, source.height),
            AreaType::Fit => (0, 0, map.width, map.height),
        };

        let mut members = Vec::with_capacity(hosts.len());
        for host in &hosts {
            let selementid = next_selementid;
            next_selementid += 1;
            selements.push(Selement {
                selementid,
                element: SelementTarget::Host(host.hostid),
                elementsubtype: ElementSubtype::HostGroup,
                ..source.clone()
            });
            members.push(selementid);
        }

        for link in &map.links {
            if area_ids.contains(&link.selementid1) && area_ids.contains(&link.selementid2) {
                continue;
            }
            let first_end = link.selementid1 == source.selementid;
            if !first_end && link.selementid2 != source.selementid {
                continue;
            }
            for member in &members {
                let mut clone = link.clone();
                clone.linkid = next_linkid;
                next_linkid += 1;
                if first_end {
                    clone.selementid1 = *member;
                } else {
                    clone.selementid2 = *member;
                }
                links.push(clone);
            }
        }

        debug!(
            selementid = source.selementid,
            groupid,
            members = members.len(),
            "host group area expanded"
        );
        areas.push(Area {
            selementid: source.selementid,
            x,
            y,
            width,
            height,
            members,
        });
    }

    Ok(ExpandedMap {
        selements,
        links,
        areas,
    })
}

/// Place every area member on a square grid inside its area.
///
/// `icon_of` yields the icon an element is drawn with; its size decides
/// the offset from the cell according to the element's label location.
pub fn layout_areas(
    expanded: &mut ExpandedMap,
    map: &Sysmap,
    icon_of: impl Fn(SelementId) -> Option<ImageId>,
    metrics: &dyn IconMetrics,
) {
    let mut positions: BTreeMap<SelementId, (i64, i64)> = BTreeMap::new();

    for area in &expanded.areas {
        let count = area.members.len() as f64;
        let per_row = count.sqrt().ceil().max(1.0);

        let ax = (area.x + AREA_INSET) as f64;
        let ay = (area.y + AREA_INSET) as f64;
        let x_offset = ((area.width - AREA_INSET) as f64 / per_row).floor();
        let y_offset = ((area.height - AREA_INSET) as f64 / per_row).floor();
        let border = AREA_HIGHLIGHT_OFFSET as f64;

        for (index, selementid) in area.members.iter().enumerate() {
            let Some(selement) = expanded.selement(*selementid) else {
                continue;
            };
            let (icon_w, icon_h) = metrics.size_or_default(icon_of(*selementid));
            let (icon_w, icon_h) = (icon_w as f64, icon_h as f64);

            let (x, y) = match map.label_location_of(selement) {
                LabelLocation::Top => (
                    ax + x_offset / 2.0 - icon_w / 2.0,
                    ay + y_offset
                        - icon_h
                        - if icon_h >= icon_w {
                            0.0
                        } else {
                            (icon_w - icon_h).abs() / 2.0
                        }
                        - border,
                ),
                LabelLocation::Left => (
                    ax + x_offset - icon_w - border,
                    ay + y_offset / 2.0 - icon_h / 2.0,
                ),
                LabelLocation::Right => (ax + border, ay + y_offset / 2.0 - icon_h / 2.0),
                LabelLocation::Bottom | LabelLocation::Default => (
                    ax + x_offset / 2.0 - icon_w / 2.0,
                    ay + (icon_w - icon_h).abs() / 2.0 + border,
                ),
            };

            let column = (index as f64 % per_row).floor();
            let row = (index as f64 / per_row).floor();
            positions.insert(
                *selementid,
                (
                    (x + column * x_offset) as i64,
                    (y + row * y_offset) as i64,
                ),
            );
        }
    }

    for selement in &mut expanded.selements {
        if let Some((x, y)) = positions.get(&selement.selementid) {
            selement.x = *x;
            selement.y = *y;
        }
    }
}

/// Point on the perimeter of an area (given by its centre and size) where
/// a connector towards `toward` attaches.
pub fn area_link_anchor(center: (f64, f64), size: (f64, f64), toward: (f64, f64)) -> (f64, f64) {
    let (cx, cy) = center;
    let (tx, ty) = toward;
    let half_width = size.0 / 2.0;
    let half_height = size.1 / 2.0;
    let dx = (tx - cx).abs();
    let dy = (ty - cy).abs();

    let horizontal = |offset: f64| if tx < cx { cx - offset } else { cx + offset };
    let vertical = |offset: f64| if ty > cy { cy + offset } else { cy - offset };

    if dy == 0.0 {
        (horizontal(half_width), ty)
    } else if dx == 0.0 {
        (tx, vertical(half_height))
    } else {
        let along_x = dx * (half_height / dy);
        // Beyond the diagonal the connector leaves through the top/bottom edge.
        if half_height / along_x > half_height / half_width {
            (horizontal(along_x), vertical(half_height))
        } else {
            let along_y = dy * (half_width / dx);
            (horizontal(half_width), vertical(along_y))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{host, link, map, selement};
    use trigmap_store::{MemoryStore, StoreRecord};

    fn area(selementid: SelementId, groupid: u64) -> Selement {
        Selement {
            elementsubtype: ElementSubtype::HostGroupElements,
            areatype: AreaType::Custom,
            x: 100,
            y: 100,
            width: 205,
            height: 205,
            ..selement(selementid, SelementTarget::HostGroup(groupid))
        }
    }

    fn linked_map(selements: Vec<Selement>, links: Vec<SysmapLink>) -> Sysmap {
        Sysmap {
            links,
            ..map(1, selements)
        }
    }

    fn group_store() -> MemoryStore {
        MemoryStore::from_records(vec![
            StoreRecord::Host(host(11, "web03", &[5])),
            StoreRecord::Host(host(12, "web01", &[5])),
            StoreRecord::Host(host(13, "web02", &[5])),
            StoreRecord::Host(host(20, "db01", &[6])),
        ])
    }

    #[test]
    fn area_expands_one_element_per_host_and_clones_links() {
        let store = group_store();
        let map = linked_map(
            vec![
                area(7, 5),
                selement(8, SelementTarget::Host(20)),
                area(9, 6),
            ],
            vec![link(30, 7, 8), link(31, 8, 7), link(32, 7, 9)],
        );

        let expanded = expand_areas(&store, &map).expect("expansion should succeed");
        let first = expanded.area(7).expect("area 7 should expand");
        assert_eq!(first.members, vec![10, 11, 12]);
        let hosts: Vec<SelementTarget> = first
            .members
            .iter()
            .map(|id| expanded.selement(*id).expect("member should exist").element)
            .collect();
        assert_eq!(
            hosts,
            vec![
                SelementTarget::Host(12),
                SelementTarget::Host(13),
                SelementTarget::Host(11),
            ]
        );

        // Link 32 joins two areas and is never multiplied.
        assert_eq!(expanded.links.len(), 3 + 3 + 3);
        let from_members: Vec<(SelementId, SelementId)> = expanded.links[3..6]
            .iter()
            .map(|l| (l.selementid1, l.selementid2))
            .collect();
        assert_eq!(from_members, vec![(10, 8), (11, 8), (12, 8)]);
        let to_members: Vec<SelementId> =
            expanded.links[6..].iter().map(|l| l.selementid2).collect();
        assert_eq!(to_members, vec![10, 11, 12]);
        let linkids: BTreeSet<u64> = expanded.links.iter().map(|l| l.linkid).collect();
        assert_eq!(linkids.len(), expanded.links.len());

        let second = expanded.area(9).expect("area 9 should expand");
        assert_eq!(second.members, vec![13]);
        assert_eq!((second.x, second.y), (100, 100));
    }

    #[test]
    fn empty_group_area_contributes_nothing() {
        let store = group_store();
        let map = linked_map(vec![area(1, 99)], vec![link(1, 1, 1)]);
        let expanded = expand_areas(&store, &map).expect("expansion should succeed");
        assert!(expanded.areas.is_empty());
        assert_eq!(expanded.selements.len(), 1);
        assert_eq!(expanded.links.len(), 1);
    }

    #[test]
    fn fit_area_spans_the_whole_map() {
        let store = group_store();
        let fit = Selement {
            areatype: AreaType::Fit,
            ..area(1, 6)
        };
        let expanded = expand_areas(&store, &linked_map(vec![fit], Vec::new()))
            .expect("expansion should succeed");
        let area = expanded.area(1).expect("area should expand");
        assert_eq!((area.x, area.y, area.width, area.height), (0, 0, 800, 600));
    }

    #[test]
    fn grid_layout_places_members_in_square_cells() {
        let store = group_store();
        let map = linked_map(vec![area(7, 5)], Vec::new());
        let mut expanded = expand_areas(&store, &map).expect("expansion should succeed");
        layout_areas(&mut expanded, &map, |_| Some(1), &DefaultIconMetrics);

        // 3 members -> 2 per row; cell = floor(200 / 2) = 100.
        let positions: Vec<(i64, i64)> = [10, 11, 12]
            .iter()
            .map(|id| {
                let s = expanded.selement(*id).expect("member should exist");
                (s.x, s.y)
            })
            .collect();
        assert_eq!(positions, vec![(131, 125), (231, 125), (131, 225)]);
    }

    #[test]
    fn image_metrics_fall_back_to_default_size() {
        let metrics = ImageMetrics::from_images([
            Image {
                imageid: 1,
                name: "Server".to_string(),
                width: 96,
                height: 64,
            },
            Image {
                imageid: 2,
                name: "Broken".to_string(),
                width: 0,
                height: 0,
            },
        ]);
        assert_eq!(metrics.size_or_default(Some(1)), (96, 64));
        assert_eq!(metrics.size_or_default(Some(2)), DEFAULT_ICON_SIZE);
        assert_eq!(metrics.size_or_default(None), DEFAULT_ICON_SIZE);
    }

    #[test]
    fn anchor_lands_on_the_facing_edge() {
        let center = (100.0, 100.0);
        let size = (200.0, 100.0);
        assert_eq!(area_link_anchor(center, size, (400.0, 100.0)), (200.0, 100.0));
        assert_eq!(area_link_anchor(center, size, (100.0, 0.0)), (100.0, 50.0));
        // Steep: leaves through the bottom edge.
        assert_eq!(area_link_anchor(center, size, (110.0, 300.0)), (102.5, 150.0));
        // Shallow: leaves through the left edge.
        assert_eq!(area_link_anchor(center, size, (-300.0, 120.0)), (0.0, 105.0));
    }
}
