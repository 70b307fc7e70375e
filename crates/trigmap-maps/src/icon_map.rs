//! Inventory-driven icon selection for host elements.

use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;
use trigmap_kernel::{IconMap, ImageId};

/// Icon for a host with the given inventory.
///
/// Mappings are tried in `sortorder`; the first whose expression matches
/// its inventory field wins. Hosts without inventory, and hosts no mapping
/// matches, get the icon map's default. Invalid expressions never match.
pub fn icon_by_mapping(icon_map: &IconMap, inventory: &BTreeMap<String, String>) -> ImageId {
    if inventory.is_empty() {
        return icon_map.default_iconid;
    }

    let mut mappings: Vec<_> = icon_map.mappings.iter().collect();
    mappings.sort_by_key(|m| m.sortorder);

    for mapping in mappings {
        let Some(value) = inventory.get(&mapping.inventory_field) else {
            continue;
        };
        match Regex::new(&mapping.expression) {
            Ok(re) if re.is_match(value) => return mapping.iconid,
            Ok(_) => {}
            Err(e) => warn!(
                iconmapid = icon_map.iconmapid,
                expression = %mapping.expression,
                "skipping invalid icon mapping expression: {e}"
            ),
        }
    }
    icon_map.default_iconid
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigmap_kernel::IconMapping;

    fn icon_map() -> IconMap {
        IconMap {
            iconmapid: 1,
            name: "By OS".to_string(),
            default_iconid: 100,
            mappings: vec![
                IconMapping {
                    inventory_field: "os".to_string(),
                    expression: "^Linux".to_string(),
                    iconid: 102,
                    sortorder: 2,
                },
                IconMapping {
                    inventory_field: "os".to_string(),
                    expression: "([".to_string(),
                    iconid: 109,
                    sortorder: 0,
                },
                IconMapping {
                    inventory_field: "os".to_string(),
                    expression: "Linux 6".to_string(),
                    iconid: 101,
                    sortorder: 1,
                },
            ],
        }
    }

    fn inventory(os: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("os".to_string(), os.to_string())])
    }

    #[test]
    fn first_match_by_sortorder_wins() {
        assert_eq!(icon_by_mapping(&icon_map(), &inventory("Linux 6.1")), 101);
        assert_eq!(icon_by_mapping(&icon_map(), &inventory("Linux 5.15")), 102);
    }

    #[test]
    fn unmatched_or_missing_inventory_uses_default() {
        assert_eq!(icon_by_mapping(&icon_map(), &inventory("FreeBSD")), 100);
        assert_eq!(icon_by_mapping(&icon_map(), &BTreeMap::new()), 100);
        let other_field = BTreeMap::from([("location".to_string(), "Linux 6".to_string())]);
        assert_eq!(icon_by_mapping(&icon_map(), &other_field), 100);
    }
}
