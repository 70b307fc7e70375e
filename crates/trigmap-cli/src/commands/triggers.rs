use crate::cli::{CommonArgs, TriggerArgs};
use crate::support::{
    load_store_or_exit, principal_or_exit, print_json, render_context_or_exit,
    snapshot_ref_or_exit,
};
use serde_json::json;
use trigmap_kernel::TriggerValue;
use trigmap_triggers::{SortOrder, TriggerQuery, TriggerSearch, count_triggers, get_triggers};

pub fn run(common: &CommonArgs, args: TriggerArgs) {
    let (store, path) = load_store_or_exit(common);
    let ctx = render_context_or_exit(common);
    let principal = principal_or_exit(&store, common);
    let count_only = args.count;
    let query = build_query(args);

    if count_only {
        let count = count_triggers(&store, &principal, &ctx, &query).unwrap_or_else(|e| {
            eprintln!("error: trigger query failed: {e}");
            std::process::exit(1);
        });
        if common.json {
            print_json(&json!({
                "action": "triggers.count",
                "storePath": path.display().to_string(),
                "storeRef": snapshot_ref_or_exit(&store),
                "count": count
            }));
        } else {
            println!("{count}");
        }
        return;
    }

    let result = get_triggers(&store, &principal, &ctx, &query).unwrap_or_else(|e| {
        eprintln!("error: trigger query failed: {e}");
        std::process::exit(1);
    });

    if common.json {
        print_json(&json!({
            "action": "triggers.get",
            "storePath": path.display().to_string(),
            "storeRef": snapshot_ref_or_exit(&store),
            "count": result.len(),
            "triggers": result.triggers
        }));
        return;
    }

    println!("trigmap triggers ({} found)", result.len());
    for view in &result.triggers {
        let trigger = &view.trigger;
        let value = match trigger.value {
            TriggerValue::Ok => "OK",
            TriggerValue::Problem => "PROBLEM",
        };
        let hosts = view
            .hosts
            .as_ref()
            .map(|hosts| {
                let names: Vec<&str> = hosts.iter().map(|h| h.host.as_str()).collect();
                format!(" [{}]", names.join(", "))
            })
            .unwrap_or_default();
        println!(
            "  {:>6}  {:<14} {:<7} {}{}",
            trigger.triggerid,
            trigger.priority.label(),
            value,
            trigger.description,
            hosts
        );
    }
}

fn build_query(args: TriggerArgs) -> TriggerQuery {
    let non_empty = |ids: Vec<u64>| (!ids.is_empty()).then_some(ids);
    TriggerQuery {
        triggerids: non_empty(args.triggerids),
        hostids: non_empty(args.hostids),
        groupids: non_empty(args.groupids),
        host: args.host,
        group: args.group,
        search: args.search.map(|description| TriggerSearch {
            description: Some(description),
            ..TriggerSearch::default()
        }),
        min_severity: args.min_severity,
        monitored: args.monitored,
        only_true: args.only_true,
        skip_dependent: args.skip_dependent,
        with_unacknowledged_events: args.unacknowledged,
        select_hosts: args.select_hosts,
        select_dependencies: args.select_dependencies,
        select_last_event: args.select_last_event,
        expand_description: args.expand_description,
        sortfield: args.sort,
        sortorder: if args.desc {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        },
        limit: args.limit,
        ..TriggerQuery::default()
    }
}
