//! What to load, in which order, and how
//!
//! Every extracted kind maps to one upsert statement. Node kinds come first
//! (trials before everything else), then relationship kinds, so an edge batch
//! only ever runs after both of its endpoint kinds have been loaded.

use super::statement::{EdgeUpsert, Endpoint, UpsertStatement};
use crate::ingest::RecordKind;

/// Load recipe for one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindPlan {
    pub kind: RecordKind,
    pub statement: UpsertStatement,
    /// Rows with a null in any of these are dropped
    pub required: Vec<&'static str>,
    /// Columns holding dedupe keys, re-normalized before loading
    pub dedupe_columns: &'static [&'static str],
}

impl KindPlan {
    pub fn file_name(&self) -> &'static str {
        self.kind.file_name()
    }
}

const TRIAL: Endpoint = Endpoint::new("Trial", "nctId", "nctId");

/// Node label and merge key for a node kind
pub fn node_identity(kind: RecordKind) -> Option<(&'static str, &'static str)> {
    let identity = match kind {
        RecordKind::Trial => ("Trial", "nctId"),
        RecordKind::Organization => ("Organization", "key"),
        RecordKind::Condition => ("Condition", "key"),
        RecordKind::Intervention => ("Intervention", "key"),
        RecordKind::Arm => ("Arm", "armId"),
        RecordKind::Site => ("Site", "siteId"),
        RecordKind::Contact => ("Contact", "contactId"),
        RecordKind::Investigator => ("Investigator", "investigatorId"),
        RecordKind::Outcome => ("Outcome", "outcomeId"),
        RecordKind::Result => ("Result", "resultId"),
        RecordKind::ParticipantFlowGroup => ("ParticipantFlowGroup", "flowGroupId"),
        RecordKind::BaselineGroup => ("BaselineGroup", "baselineGroupId"),
        RecordKind::BaselineMeasure => ("BaselineMeasure", "baselineMeasureId"),
        RecordKind::AdverseEventGroup => ("AdverseEventGroup", "eventGroupId"),
        RecordKind::AdverseEvent => ("AdverseEvent", "adverseEventId"),
        RecordKind::EligibilityCriterion => ("EligibilityCriterion", "criterionId"),
        RecordKind::Publication => ("Publication", "publicationId"),
        RecordKind::Version => ("Version", "versionId"),
        _ => return None,
    };
    Some(identity)
}

/// Trial -> scoped child, joined on `targetId`
fn scoped(rel_type: &'static str, label: &'static str, key: &'static str) -> UpsertStatement {
    UpsertStatement::edge(rel_type, TRIAL, Endpoint::new(label, key, "targetId"))
}

fn edge_statement(kind: RecordKind) -> Option<UpsertStatement> {
    let statement = match kind {
        RecordKind::Sponsors => UpsertStatement::Edge(EdgeUpsert {
            rel_type: "SPONSORS",
            source: Endpoint::new("Organization", "key", "orgKey"),
            target: TRIAL,
            discriminant: &["role"],
            properties: &[],
        }),
        RecordKind::Studies => {
            UpsertStatement::edge("STUDIES", TRIAL, Endpoint::new("Condition", "key", "conditionKey"))
        }
        RecordKind::UsesIntervention => UpsertStatement::edge(
            "USES_INTERVENTION",
            TRIAL,
            Endpoint::new("Intervention", "key", "interventionKey"),
        ),
        RecordKind::ArmContainsIntervention => UpsertStatement::edge(
            "CONTAINS",
            Endpoint::new("Arm", "armId", "armId"),
            Endpoint::new("Intervention", "key", "interventionKey"),
        ),
        RecordKind::HasResult => UpsertStatement::edge(
            "HAS_RESULT",
            Endpoint::new("Outcome", "outcomeId", "outcomeId"),
            Endpoint::new("Result", "resultId", "resultId"),
        ),
        RecordKind::Achieved => UpsertStatement::Edge(EdgeUpsert {
            rel_type: "ACHIEVED",
            source: Endpoint::new("ParticipantFlowGroup", "flowGroupId", "flowGroupId"),
            target: TRIAL,
            discriminant: &["periodTitle", "milestoneType"],
            properties: &["numSubjects"],
        }),
        RecordKind::HasStat => UpsertStatement::Edge(EdgeUpsert {
            rel_type: "HAS_STAT",
            source: Endpoint::new("AdverseEvent", "adverseEventId", "adverseEventId"),
            target: Endpoint::new("AdverseEventGroup", "eventGroupId", "eventGroupId"),
            discriminant: &[],
            properties: &["numEvents", "numAffected", "numAtRisk"],
        }),
        RecordKind::HasArm => scoped("HAS_ARM", "Arm", "armId"),
        RecordKind::HasSite => scoped("HAS_SITE", "Site", "siteId"),
        RecordKind::HasContact => scoped("HAS_CONTACT", "Contact", "contactId"),
        RecordKind::HasInvestigator => scoped("HAS_INVESTIGATOR", "Investigator", "investigatorId"),
        RecordKind::HasOutcome => scoped("HAS_OUTCOME", "Outcome", "outcomeId"),
        RecordKind::HasVersion => scoped("HAS_VERSION", "Version", "versionId"),
        RecordKind::HasPublication => scoped("HAS_PUBLICATION", "Publication", "publicationId"),
        RecordKind::HasFlowGroup => scoped("HAS_FLOW_GROUP", "ParticipantFlowGroup", "flowGroupId"),
        RecordKind::HasBaselineGroup => scoped("HAS_BASELINE_GROUP", "BaselineGroup", "baselineGroupId"),
        RecordKind::HasBaselineMeasure => scoped("HAS_BASELINE_MEASURE", "BaselineMeasure", "baselineMeasureId"),
        RecordKind::HasEventGroup => scoped("HAS_EVENT_GROUP", "AdverseEventGroup", "eventGroupId"),
        RecordKind::ReportedEvent => scoped("REPORTED_EVENT", "AdverseEvent", "adverseEventId"),
        RecordKind::HasCriterion => scoped("HAS_CRITERION", "EligibilityCriterion", "criterionId"),
        _ => return None,
    };
    Some(statement)
}

fn dedupe_columns(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Organization | RecordKind::Condition | RecordKind::Intervention => &["key"],
        RecordKind::Sponsors => &["orgKey"],
        RecordKind::Studies => &["conditionKey"],
        RecordKind::UsesIntervention | RecordKind::ArmContainsIntervention => &["interventionKey"],
        _ => &[],
    }
}

/// Recipe for `kind`
pub fn plan_for(kind: RecordKind) -> Option<KindPlan> {
    let statement = match node_identity(kind) {
        Some((label, key)) => UpsertStatement::node(label, key),
        None => edge_statement(kind)?,
    };
    Some(KindPlan {
        kind,
        required: statement.key_columns(),
        statement,
        dedupe_columns: dedupe_columns(kind),
    })
}

/// Every kind in dependency order
pub fn load_plan() -> Vec<KindPlan> {
    RecordKind::ALL.iter().copied().filter_map(plan_for).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_kind_is_planned_nodes_first() {
        let plan = load_plan();
        assert_eq!(plan.len(), RecordKind::ALL.len());
        assert_eq!(plan[0].kind, RecordKind::Trial);

        let first_edge = plan.iter().position(|p| !p.kind.is_node()).unwrap();
        assert!(plan[first_edge..].iter().all(|p| !p.kind.is_node()));
        assert!(plan[..first_edge]
            .iter()
            .all(|p| matches!(p.statement, UpsertStatement::Node(_))));
    }

    #[test]
    fn test_edge_endpoints_reference_loaded_labels() {
        let plan = load_plan();
        let labels: HashSet<&str> = plan
            .iter()
            .filter_map(|p| match p.statement {
                UpsertStatement::Node(n) => Some(n.label),
                _ => None,
            })
            .collect();

        for p in &plan {
            if let UpsertStatement::Edge(edge) = p.statement {
                assert!(labels.contains(edge.source.label), "{}", p.kind);
                assert!(labels.contains(edge.target.label), "{}", p.kind);
            }
        }
    }

    #[test]
    fn test_required_keys() {
        assert_eq!(plan_for(RecordKind::Trial).unwrap().required, vec!["nctId"]);
        assert_eq!(plan_for(RecordKind::Sponsors).unwrap().required, vec!["orgKey", "nctId", "role"]);
        assert_eq!(plan_for(RecordKind::HasArm).unwrap().required, vec!["nctId", "targetId"]);
        assert_eq!(plan_for(RecordKind::Condition).unwrap().dedupe_columns, &["key"]);
        assert!(plan_for(RecordKind::Arm).unwrap().dedupe_columns.is_empty());
    }
}
