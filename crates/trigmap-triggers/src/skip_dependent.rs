//! Post-query filter dropping triggers masked by an upstream problem.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;
use trigmap_kernel::{Trigger, TriggerId};
use trigmap_store::{DataAccess, EdgeDirection, StoreError, TriggerFetch, TriggerRelations};

/// Keep only candidates that are not disabled and have no PROBLEM trigger
/// reachable upstream. Disabled upstream triggers (directly, via an item or
/// via an unmonitored host) are cut out of the graph: they neither block
/// nor relay the state of what lies above them.
///
/// Pure: applying it to its own output returns the same set.
pub fn filter_by_skip_dependent<D>(
    data: &D,
    triggers: Vec<Trigger>,
) -> Result<Vec<Trigger>, StoreError>
where
    D: DataAccess + ?Sized,
{
    if triggers.is_empty() {
        return Ok(triggers);
    }

    let candidates: BTreeSet<TriggerId> = triggers.iter().map(|t| t.triggerid).collect();
    let up_map = upstream_closure(data, &candidates)?;

    let upstream_ids: BTreeSet<TriggerId> = up_map
        .values()
        .flatten()
        .copied()
        .filter(|id| !candidates.contains(id))
        .collect();
    let upstream = if upstream_ids.is_empty() {
        Vec::new()
    } else {
        data.fetch_triggers(&TriggerFetch::by_ids(upstream_ids))?
    };

    let relations = TriggerRelations::load(data, triggers.iter().chain(upstream.iter()))?;
    let known: BTreeMap<TriggerId, &Trigger> = triggers
        .iter()
        .chain(upstream.iter())
        .map(|t| (t.triggerid, t))
        .collect();
    let state = |id: TriggerId| -> UpstreamState {
        match known.get(&id) {
            None => UpstreamState::Disabled,
            Some(t) if relations.is_disabled(t) => UpstreamState::Disabled,
            Some(t) if t.is_problem() => UpstreamState::Problem,
            Some(_) => UpstreamState::Relay,
        }
    };

    let before = triggers.len();
    let kept: Vec<Trigger> = triggers
        .iter()
        .filter(|t| state(t.triggerid) != UpstreamState::Disabled)
        .filter(|t| !blocked_upstream(t.triggerid, &up_map, &state))
        .cloned()
        .collect();
    debug!(
        candidates = before,
        kept = kept.len(),
        "dependent triggers skipped"
    );
    Ok(kept)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpstreamState {
    Disabled,
    Problem,
    Relay,
}

/// Every persisted up-edge reachable from `start`, keyed by down trigger.
fn upstream_closure<D>(
    data: &D,
    start: &BTreeSet<TriggerId>,
) -> Result<BTreeMap<TriggerId, BTreeSet<TriggerId>>, StoreError>
where
    D: DataAccess + ?Sized,
{
    let mut up_map: BTreeMap<TriggerId, BTreeSet<TriggerId>> = BTreeMap::new();
    let mut seen = start.clone();
    let mut frontier = start.clone();
    while !frontier.is_empty() {
        let mut next = BTreeSet::new();
        for edge in data.fetch_dependency_edges(&frontier, EdgeDirection::Up)? {
            up_map
                .entry(edge.triggerid_down)
                .or_default()
                .insert(edge.triggerid_up);
            if seen.insert(edge.triggerid_up) {
                next.insert(edge.triggerid_up);
            }
        }
        frontier = next;
    }
    Ok(up_map)
}

fn blocked_upstream(
    triggerid: TriggerId,
    up_map: &BTreeMap<TriggerId, BTreeSet<TriggerId>>,
    state: &impl Fn(TriggerId) -> UpstreamState,
) -> bool {
    let mut visited = BTreeSet::from([triggerid]);
    let mut queue = VecDeque::from([triggerid]);
    while let Some(current) = queue.pop_front() {
        let Some(ups) = up_map.get(&current) else {
            continue;
        };
        for up in ups {
            if !visited.insert(*up) {
                continue;
            }
            match state(*up) {
                UpstreamState::Problem => return true,
                UpstreamState::Relay => queue.push_back(*up),
                UpstreamState::Disabled => {}
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use trigmap_kernel::{DependencyEdge, TriggerStatus, TriggerValue};
    use trigmap_store::{DependencyWriter, MemoryStore};

    fn chain(edges: &[(TriggerId, TriggerId)], setup: impl FnOnce(&mut Fixture)) -> MemoryStore {
        let mut fixture = Fixture::default();
        fixture.host(10, "web01", &[]);
        for triggerid in 1..=4 {
            fixture.trigger(triggerid, 10);
        }
        setup(&mut fixture);
        let mut store = fixture.build();
        let edges: Vec<DependencyEdge> = edges
            .iter()
            .map(|(down, up)| DependencyEdge::new(*down, *up))
            .collect();
        store
            .insert_dependency_edges(&edges)
            .expect("fixture edges should insert");
        store
    }

    fn ids(triggers: &[Trigger]) -> Vec<TriggerId> {
        triggers.iter().map(|t| t.triggerid).collect()
    }

    fn candidates(store: &MemoryStore, ids: &[TriggerId]) -> Vec<Trigger> {
        store
            .fetch_triggers(&TriggerFetch::by_ids(ids.iter().copied()))
            .expect("candidates should fetch")
    }

    #[test]
    fn problem_upstream_blocks_dependent() {
        let store = chain(&[(1, 2)], |f| f.trigger_mut(2).value = TriggerValue::Problem);
        let kept = filter_by_skip_dependent(&store, candidates(&store, &[1, 2]))
            .expect("filter should run");
        assert_eq!(ids(&kept), vec![2]);
    }

    #[test]
    fn disabled_problem_upstream_does_not_block() {
        let store = chain(&[(1, 2)], |f| {
            let up = f.trigger_mut(2);
            up.value = TriggerValue::Problem;
            up.status = TriggerStatus::Disabled;
        });
        let kept =
            filter_by_skip_dependent(&store, candidates(&store, &[1])).expect("filter should run");
        assert_eq!(ids(&kept), vec![1]);
    }

    #[test]
    fn problem_propagates_through_enabled_ok_relays_only() {
        let store = chain(&[(1, 2), (2, 3), (4, 3)], |f| {
            f.trigger_mut(3).value = TriggerValue::Problem;
        });
        let kept = filter_by_skip_dependent(&store, candidates(&store, &[1, 4]))
            .expect("filter should run");
        assert!(kept.is_empty());

        let cut = chain(&[(1, 2), (2, 3)], |f| {
            f.trigger_mut(3).value = TriggerValue::Problem;
            f.trigger_mut(2).status = TriggerStatus::Disabled;
        });
        let kept =
            filter_by_skip_dependent(&cut, candidates(&cut, &[1])).expect("filter should run");
        assert_eq!(ids(&kept), vec![1]);
    }

    #[test]
    fn disabled_candidates_are_removed() {
        let store = chain(&[], |f| f.trigger_mut(4).status = TriggerStatus::Disabled);
        let kept = filter_by_skip_dependent(&store, candidates(&store, &[3, 4]))
            .expect("filter should run");
        assert_eq!(ids(&kept), vec![3]);
    }

    #[test]
    fn filter_is_idempotent() {
        let store = chain(&[(1, 2), (3, 4)], |f| f.trigger_mut(2).value = TriggerValue::Problem);
        let once = filter_by_skip_dependent(&store, candidates(&store, &[1, 2, 3, 4]))
            .expect("filter should run");
        let twice = filter_by_skip_dependent(&store, once.clone()).expect("filter should run");
        assert_eq!(once, twice);
        assert_eq!(ids(&once), vec![2, 3, 4]);
    }

    #[test]
    fn preexisting_cycle_terminates() {
        let store = chain(&[(1, 2), (2, 1)], |_| {});
        let kept = filter_by_skip_dependent(&store, candidates(&store, &[1]))
            .expect("filter should run");
        assert_eq!(ids(&kept), vec![1]);
    }
}
