use crate::cli::{CommonArgs, DepCommands};
use crate::support::{print_json, resolve_principal, store_path_or_exit};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use trigmap_kernel::{ApiError, HostId, TriggerId};
use trigmap_store::{MemoryStore, mutate_store_jsonl, store_snapshot_ref};
use trigmap_triggers::{
    DependencyChange, DependencyRequest, add_dependencies, delete_dependencies,
    sync_template_dependencies,
};

pub fn run(common: &CommonArgs, command: DepCommands) {
    match command {
        DepCommands::Add {
            triggerid,
            depends_on,
        } => run_add(common, triggerid, depends_on),
        DepCommands::Delete { triggerids } => run_delete(common, triggerids),
        DepCommands::Sync { templates, hosts } => run_sync(common, templates, hosts),
    }
}

fn run_add(common: &CommonArgs, triggerid: TriggerId, depends_on: TriggerId) {
    let path = store_path_or_exit(common);
    let user = common.user;
    let (change, store_ref) = mutate_or_exit(&path, "add dependency", |store| {
        let principal = resolve_principal(store, user)?;
        let change = add_dependencies(
            store,
            &principal,
            &[DependencyRequest::new(triggerid, depends_on)],
        )?;
        let changed = !change.inserted.is_empty();
        Ok((change, changed))
    });

    if common.json {
        print_change("dep.add", &path, &store_ref, &change);
    } else {
        println!(
            "trigmap dep add\n  Added: {triggerid} -> {depends_on}\n  Edges inserted: {}\n  Path: {}",
            change.inserted.len(),
            path.display()
        );
        for edge in &change.inserted {
            println!("    - {} -> {}", edge.triggerid_down, edge.triggerid_up);
        }
    }
}

fn run_delete(common: &CommonArgs, triggerids: Vec<TriggerId>) {
    let path = store_path_or_exit(common);
    let user = common.user;
    let (change, store_ref) = mutate_or_exit(&path, "delete dependencies", |store| {
        let principal = resolve_principal(store, user)?;
        let change = delete_dependencies(store, &principal, &triggerids)?;
        let changed = change.deleted > 0;
        Ok((change, changed))
    });

    if common.json {
        print_change("dep.delete", &path, &store_ref, &change);
    } else {
        println!(
            "trigmap dep delete\n  Triggers: {}\n  Edges deleted: {}\n  Path: {}",
            join_ids(&change.triggerids),
            change.deleted,
            path.display()
        );
    }
}

fn run_sync(common: &CommonArgs, templates: Vec<HostId>, hosts: Vec<HostId>) {
    let path = store_path_or_exit(common);
    let templateids: BTreeSet<HostId> = templates.into_iter().collect();
    let hostids: Option<BTreeSet<HostId>> =
        (!hosts.is_empty()).then(|| hosts.into_iter().collect());
    let (change, store_ref) = mutate_or_exit(&path, "sync template dependencies", |store| {
        let change = sync_template_dependencies(store, &templateids, hostids.as_ref())?;
        let changed = change.deleted > 0 || !change.inserted.is_empty();
        Ok((change, changed))
    });

    if common.json {
        print_change("dep.sync", &path, &store_ref, &change);
    } else {
        println!(
            "trigmap dep sync\n  Triggers: {}\n  Edges deleted: {}\n  Edges inserted: {}\n  Path: {}",
            join_ids(&change.triggerids),
            change.deleted,
            change.inserted.len(),
            path.display()
        );
    }
}

/// Apply `mutation` under the store lock; returns the change together with
/// the reference of the resulting snapshot.
fn mutate_or_exit<F>(path: &Path, what: &str, mutation: F) -> (DependencyChange, String)
where
    F: FnOnce(&mut MemoryStore) -> Result<(DependencyChange, bool), ApiError>,
{
    let result = mutate_store_jsonl::<_, ApiError, _>(path, |store| {
        let (change, changed) = mutation(store)?;
        let store_ref =
            store_snapshot_ref(store).map_err(|e| ApiError::Store(e.to_string()))?;
        Ok(((change, store_ref), changed))
    });
    result.unwrap_or_else(|e| {
        eprintln!("error: failed to {what}: {e}");
        std::process::exit(1);
    })
}

fn print_change(action: &str, path: &Path, store_ref: &str, change: &DependencyChange) {
    let inserted: Vec<_> = change
        .inserted
        .iter()
        .map(|edge| {
            json!({
                "triggeridDown": edge.triggerid_down,
                "triggeridUp": edge.triggerid_up
            })
        })
        .collect();
    print_json(&json!({
        "action": action,
        "storePath": path.display().to_string(),
        "storeRef": store_ref,
        "triggerids": change.triggerids,
        "inserted": inserted,
        "deleted": change.deleted
    }));
}

fn join_ids(ids: &[TriggerId]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    ids.join(", ")
}
