//! Per-element counters folded from the element's hosts and triggers.

use serde::Serialize;
use std::collections::BTreeMap;
use trigmap_kernel::{
    ElementType, Host, HostStatus, Maintenance, MaintenanceId, RenderContext, Severity,
};
use trigmap_triggers::TriggerView;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementCounts {
    /// Hosts not monitored.
    pub disabled: u32,
    /// Monitored hosts under maintenance.
    pub maintenance: u32,
    pub problem: u32,
    pub problem_unack: u32,
    /// Highest severity among problem triggers.
    pub priority: Severity,
    pub trigger_disabled: u32,
    pub lately_changed: bool,
    /// Every problem with an event is acknowledged; false without events.
    pub ack: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_title: Option<String>,
}

pub struct FoldSettings<'a> {
    /// Triggers below this severity are ignored entirely.
    pub severity_min: Severity,
    pub expand_problem: bool,
    pub now: i64,
    pub blink_period_secs: i64,
    pub maintenances: &'a BTreeMap<MaintenanceId, Maintenance>,
}

impl<'a> FoldSettings<'a> {
    pub fn new(
        ctx: &RenderContext,
        severity_min: Severity,
        expand_problem: bool,
        maintenances: &'a BTreeMap<MaintenanceId, Maintenance>,
    ) -> Self {
        Self {
            severity_min,
            expand_problem,
            now: ctx.now,
            blink_period_secs: ctx.config.blink_period_secs,
            maintenances,
        }
    }
}

impl ElementCounts {
    pub fn fold<'v>(
        element_type: ElementType,
        hosts: impl IntoIterator<Item = &'v Host>,
        triggers: impl IntoIterator<Item = &'v TriggerView>,
        settings: &FoldSettings<'_>,
    ) -> Self {
        let mut counts = Self::default();

        let mut last_host = None;
        for host in hosts {
            if host.status == HostStatus::NotMonitored {
                counts.disabled += 1;
            } else if host.maintenance_status {
                counts.maintenance += 1;
            }
            last_host = Some(host);
        }

        let mut has_event = false;
        let mut last_problem = None;
        for view in triggers {
            let trigger = &view.trigger;
            if trigger.priority < settings.severity_min {
                continue;
            }
            if !trigger.is_enabled() {
                counts.trigger_disabled += 1;
                continue;
            }
            if trigger.is_problem() {
                counts.problem += 1;
                counts.priority = counts.priority.max(trigger.priority);
                last_problem = Some(view);
                if let Some(event) = &view.last_event {
                    if !event.acknowledged {
                        counts.problem_unack += 1;
                    }
                    has_event = true;
                }
            }
            if settings.now - trigger.lastchange < settings.blink_period_secs {
                counts.lately_changed = true;
            }
        }
        counts.ack = has_event && counts.problem_unack == 0;

        if settings.expand_problem
            && counts.problem == 1
            && let Some(view) = last_problem
        {
            counts.problem_title = Some(view.trigger.description.clone());
        }

        if element_type == ElementType::Host
            && counts.maintenance == 1
            && let Some(maintenanceid) = last_host.and_then(|h| h.maintenanceid)
        {
            counts.maintenance_title = settings
                .maintenances
                .get(&maintenanceid)
                .map(|m| m.name.clone());
        }

        counts
    }
}
