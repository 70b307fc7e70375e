use crate::cli::CommonArgs;
use crate::support::{load_store_or_exit, print_json, render_context_or_exit, snapshot_ref_or_exit};
use serde_json::json;
use trigmap_kernel::{Severity, SysmapId};
use trigmap_maps::{IconType, MapStateOptions, map_state};

pub fn run(common: &CommonArgs, sysmapid: SysmapId, severity_min: Option<Severity>) {
    let (store, path) = load_store_or_exit(common);
    let ctx = render_context_or_exit(common);
    let options = MapStateOptions { severity_min };

    let state = map_state(&store, &ctx, sysmapid, &options).unwrap_or_else(|e| {
        eprintln!("error: failed to compute state of map {sysmapid}: {e}");
        std::process::exit(1);
    });

    if common.json {
        print_json(&json!({
            "action": "map.state",
            "storePath": path.display().to_string(),
            "storeRef": snapshot_ref_or_exit(&store),
            "now": ctx.now,
            "map": state
        }));
        return;
    }

    println!(
        "trigmap map-state {} \"{}\"\n  Elements: {}\n  Links: {}",
        state.sysmapid,
        state.name,
        state.elements.len(),
        state.links.len()
    );
    for element in state.elements.values() {
        let icon = match element.status.icon_type {
            IconType::Off => "off",
            IconType::On => "on",
            IconType::Maintenance => "maintenance",
            IconType::Disabled => "disabled",
        };
        let label: Vec<&str> = element.label.iter().map(|line| line.msg.as_str()).collect();
        println!(
            "    - {} {:?} [{icon}] {}",
            element.selementid,
            element.element_type,
            label.join(" | ")
        );
    }
    for link in &state.links {
        println!(
            "    - link {}: {} -> {} {:?} #{}",
            link.linkid, link.selementid1, link.selementid2, link.drawtype, link.color
        );
    }
}
