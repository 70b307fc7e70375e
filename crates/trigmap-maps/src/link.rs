//! Link styling from link triggers.

use crate::label::LabelLine;
use serde::Serialize;
use std::collections::BTreeMap;
use trigmap_kernel::{DrawType, LinkId, SelementId, Severity, SysmapLink, Trigger, TriggerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkState {
    pub linkid: LinkId,
    pub selementid1: SelementId,
    pub selementid2: SelementId,
    pub drawtype: DrawType,
    pub color: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<LabelLine>,
}

/// Style of `link` given the current state of its triggers.
///
/// Link triggers are visited by trigger ID. Each enabled problem trigger
/// whose severity is at least the highest seen so far replaces the link's
/// draw type and colour, so the most severe problem wins and ties go to the
/// highest trigger ID. Unknown triggers are ignored.
pub fn link_state(link: &SysmapLink, triggers: &BTreeMap<TriggerId, Trigger>) -> LinkState {
    let mut state = LinkState {
        linkid: link.linkid,
        selementid1: link.selementid1,
        selementid2: link.selementid2,
        drawtype: link.drawtype,
        color: link.color.clone(),
        label: Vec::new(),
    };

    let mut linktriggers: Vec<_> = link.linktriggers.iter().collect();
    linktriggers.sort_by_key(|lt| lt.triggerid);

    let mut max_severity = Severity::NotClassified;
    for linktrigger in linktriggers {
        if linktrigger.triggerid == 0 {
            continue;
        }
        let Some(trigger) = triggers.get(&linktrigger.triggerid) else {
            continue;
        };
        if trigger.is_enabled() && trigger.is_problem() && trigger.priority >= max_severity {
            state.drawtype = linktrigger.drawtype;
            state.color = linktrigger.color.clone();
            max_severity = trigger.priority;
        }
    }
    state
}
