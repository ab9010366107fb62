//! Typed entity and relationship records
//!
//! Each record kind is written to its own JSON Lines file with camelCase
//! keys. Relationship records are flat joins (source key, target key and
//! attributes) so the loader can merge them in any order once their
//! endpoint kinds are loaded.

use serde::Serialize;
use std::fmt;

/// Every entity and relationship kind produced by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    // Nodes
    Trial,
    Organization,
    Condition,
    Intervention,
    Arm,
    Site,
    Contact,
    Investigator,
    Outcome,
    Result,
    ParticipantFlowGroup,
    BaselineGroup,
    BaselineMeasure,
    AdverseEventGroup,
    AdverseEvent,
    EligibilityCriterion,
    Publication,
    Version,
    // Relationships
    Sponsors,
    Studies,
    UsesIntervention,
    HasArm,
    ArmContainsIntervention,
    HasSite,
    HasContact,
    HasInvestigator,
    HasOutcome,
    HasResult,
    HasVersion,
    Achieved,
    HasStat,
    HasPublication,
    HasFlowGroup,
    HasBaselineGroup,
    HasBaselineMeasure,
    HasEventGroup,
    ReportedEvent,
    HasCriterion,
}

impl RecordKind {
    pub const ALL: [RecordKind; 38] = [
        RecordKind::Trial,
        RecordKind::Organization,
        RecordKind::Condition,
        RecordKind::Intervention,
        RecordKind::Arm,
        RecordKind::Site,
        RecordKind::Contact,
        RecordKind::Investigator,
        RecordKind::Outcome,
        RecordKind::Result,
        RecordKind::ParticipantFlowGroup,
        RecordKind::BaselineGroup,
        RecordKind::BaselineMeasure,
        RecordKind::AdverseEventGroup,
        RecordKind::AdverseEvent,
        RecordKind::EligibilityCriterion,
        RecordKind::Publication,
        RecordKind::Version,
        RecordKind::Sponsors,
        RecordKind::Studies,
        RecordKind::UsesIntervention,
        RecordKind::HasArm,
        RecordKind::ArmContainsIntervention,
        RecordKind::HasSite,
        RecordKind::HasContact,
        RecordKind::HasInvestigator,
        RecordKind::HasOutcome,
        RecordKind::HasResult,
        RecordKind::HasVersion,
        RecordKind::Achieved,
        RecordKind::HasStat,
        RecordKind::HasPublication,
        RecordKind::HasFlowGroup,
        RecordKind::HasBaselineGroup,
        RecordKind::HasBaselineMeasure,
        RecordKind::HasEventGroup,
        RecordKind::ReportedEvent,
        RecordKind::HasCriterion,
    ];

    /// Intermediate file holding records of this kind
    pub fn file_name(&self) -> &'static str {
        match self {
            RecordKind::Trial => "trials.jsonl",
            RecordKind::Organization => "organizations.jsonl",
            RecordKind::Condition => "conditions.jsonl",
            RecordKind::Intervention => "interventions.jsonl",
            RecordKind::Arm => "arms.jsonl",
            RecordKind::Site => "sites.jsonl",
            RecordKind::Contact => "contacts.jsonl",
            RecordKind::Investigator => "investigators.jsonl",
            RecordKind::Outcome => "outcomes.jsonl",
            RecordKind::Result => "results.jsonl",
            RecordKind::ParticipantFlowGroup => "participant_flow_groups.jsonl",
            RecordKind::BaselineGroup => "baseline_groups.jsonl",
            RecordKind::BaselineMeasure => "baseline_measures.jsonl",
            RecordKind::AdverseEventGroup => "adverse_event_groups.jsonl",
            RecordKind::AdverseEvent => "adverse_events.jsonl",
            RecordKind::EligibilityCriterion => "eligibility.jsonl",
            RecordKind::Publication => "publications.jsonl",
            RecordKind::Version => "versions.jsonl",
            RecordKind::Sponsors => "trial_sponsoredby_rel.jsonl",
            RecordKind::Studies => "trial_studies_rel.jsonl",
            RecordKind::UsesIntervention => "trial_uses_intervention_rel.jsonl",
            RecordKind::HasArm => "trial_has_arm_rel.jsonl",
            RecordKind::ArmContainsIntervention => "arm_contains_intervention_rel.jsonl",
            RecordKind::HasSite => "trial_has_site_rel.jsonl",
            RecordKind::HasContact => "trial_has_contact_rel.jsonl",
            RecordKind::HasInvestigator => "trial_has_investigator_rel.jsonl",
            RecordKind::HasOutcome => "trial_has_outcome_rel.jsonl",
            RecordKind::HasResult => "outcome_has_result_rel.jsonl",
            RecordKind::HasVersion => "trial_has_version_rel.jsonl",
            RecordKind::Achieved => "participantflow_has_achievement_rel.jsonl",
            RecordKind::HasStat => "adverseevent_has_stat_rel.jsonl",
            RecordKind::HasPublication => "trial_has_publication_rel.jsonl",
            RecordKind::HasFlowGroup => "trial_has_flow_group_rel.jsonl",
            RecordKind::HasBaselineGroup => "trial_has_baseline_group_rel.jsonl",
            RecordKind::HasBaselineMeasure => "trial_has_baseline_measure_rel.jsonl",
            RecordKind::HasEventGroup => "trial_has_event_group_rel.jsonl",
            RecordKind::ReportedEvent => "trial_reported_event_rel.jsonl",
            RecordKind::HasCriterion => "trial_has_criterion_rel.jsonl",
        }
    }

    /// True for entity kinds, false for relationship kinds
    pub fn is_node(&self) -> bool {
        (*self as usize) < (RecordKind::Sponsors as usize)
    }

    pub fn name(&self) -> &'static str {
        self.file_name().trim_end_matches(".jsonl")
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Eligibility criterion section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Inclusion,
    Exclusion,
}

impl Section {
    /// Short tag used inside criterion ids
    pub fn tag(&self) -> &'static str {
        match self {
            Section::Inclusion => "IN",
            Section::Exclusion => "EX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialNode {
    pub nct_id: String,
    pub org_study_id: Option<String>,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
    pub acronym: Option<String>,
    pub overall_status: Option<String>,
    pub status_verified_date: Option<String>,
    pub start_date: Option<String>,
    pub primary_completion_date: Option<String>,
    pub completion_date: Option<String>,
    pub study_first_submit_date: Option<String>,
    pub study_first_post_date: Option<String>,
    pub last_update_post_date: Option<String>,
    pub study_type: Option<String>,
    pub phases: Vec<String>,
    pub intervention_model: Option<String>,
    pub allocation: Option<String>,
    pub primary_purpose: Option<String>,
    pub masking: Option<String>,
    pub enrollment_count: Option<i64>,
    pub enrollment_type: Option<String>,
    pub brief_summary: Option<String>,
    pub detailed_description: Option<String>,
    pub has_results: bool,
    pub ipd_sharing: Option<String>,
    pub version_holder: Option<String>,
    pub raw_json_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationNode {
    pub key: String,
    pub name: String,
    pub class: Option<String>,
    pub raw_source_field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionNode {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionNode {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub intervention_type: Option<String>,
    pub description: Option<String>,
    pub other_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmNode {
    pub arm_id: String,
    pub nct_id: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub arm_type: Option<String>,
    pub description: Option<String>,
    pub intervention_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteNode {
    pub site_id: String,
    pub nct_id: String,
    pub facility: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactNode {
    pub contact_id: String,
    pub nct_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigatorNode {
    pub investigator_id: String,
    pub nct_id: String,
    pub name: Option<String>,
    pub affiliation: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeNode {
    pub outcome_id: String,
    pub nct_id: String,
    pub outcome_type: String,
    pub measure: Option<String>,
    pub description: Option<String>,
    pub time_frame: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultNode {
    pub result_id: String,
    pub nct_id: String,
    pub outcome_title: Option<String>,
    pub group_id: Option<String>,
    pub value: Option<String>,
    pub spread: Option<String>,
    pub param_type: Option<String>,
    pub unit_of_measure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGroupNode {
    pub flow_group_id: String,
    pub nct_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineGroupNode {
    pub baseline_group_id: String,
    pub nct_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineMeasureNode {
    pub baseline_measure_id: String,
    pub nct_id: String,
    pub title: Option<String>,
    pub param_type: Option<String>,
    pub unit_of_measure: Option<String>,
    /// The source measure object as compact JSON
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGroupNode {
    pub event_group_id: String,
    pub nct_id: String,
    pub group_id: Option<String>,
    pub title: Option<String>,
    pub serious_num_affected: Option<i64>,
    pub other_num_affected: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdverseEventNode {
    pub adverse_event_id: String,
    pub nct_id: String,
    pub term: Option<String>,
    pub organ_system: Option<String>,
    pub assessment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionNode {
    pub criterion_id: String,
    pub nct_id: String,
    #[serde(rename = "type")]
    pub section: Section,
    pub text: String,
    pub sequence: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationNode {
    pub publication_id: String,
    pub nct_id: String,
    pub pmid: Option<String>,
    pub citation: Option<String>,
    #[serde(rename = "type")]
    pub ref_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNode {
    pub version_id: String,
    pub nct_id: String,
}

/// Organization -[SPONSORS {role}]-> Trial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorLink {
    pub org_key: String,
    pub org_name: String,
    pub nct_id: String,
    pub role: String,
}

/// Trial -[STUDIES]-> Condition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLink {
    pub nct_id: String,
    pub condition_key: String,
    pub condition_name: String,
}

/// Trial -[USES_INTERVENTION]-> Intervention
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionLink {
    pub nct_id: String,
    pub intervention_key: String,
    pub intervention_name: String,
}

/// Arm -[CONTAINS]-> Intervention
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmInterventionLink {
    pub arm_id: String,
    pub intervention_key: String,
    pub intervention_name: String,
}

/// Outcome -[HAS_RESULT]-> Result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLink {
    pub outcome_id: String,
    pub result_id: String,
}

/// ParticipantFlowGroup -[ACHIEVED {periodTitle, milestoneType}]-> Trial
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementLink {
    pub flow_group_id: String,
    pub nct_id: String,
    pub period_title: String,
    pub milestone_type: String,
    pub num_subjects: Option<i64>,
}

/// AdverseEvent -[HAS_STAT]-> AdverseEventGroup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatLink {
    pub adverse_event_id: String,
    pub event_group_id: String,
    pub nct_id: String,
    pub num_events: Option<i64>,
    pub num_affected: Option<i64>,
    pub num_at_risk: Option<i64>,
}

/// Trial -> trial-scoped child, for the kinds that carry no attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedLink {
    #[serde(skip)]
    pub kind: RecordKind,
    pub nct_id: String,
    pub target_id: String,
}

/// One extracted record of any kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Trial(TrialNode),
    Organization(OrganizationNode),
    Condition(ConditionNode),
    Intervention(InterventionNode),
    Arm(ArmNode),
    Site(SiteNode),
    Contact(ContactNode),
    Investigator(InvestigatorNode),
    Outcome(OutcomeNode),
    Result(ResultNode),
    FlowGroup(FlowGroupNode),
    BaselineGroup(BaselineGroupNode),
    BaselineMeasure(BaselineMeasureNode),
    EventGroup(EventGroupNode),
    AdverseEvent(AdverseEventNode),
    Criterion(CriterionNode),
    Publication(PublicationNode),
    Version(VersionNode),
    Sponsor(SponsorLink),
    Studies(ConditionLink),
    UsesIntervention(InterventionLink),
    ArmContains(ArmInterventionLink),
    HasResult(ResultLink),
    Achievement(AchievementLink),
    EventStat(EventStatLink),
    Scoped(ScopedLink),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Trial(_) => RecordKind::Trial,
            Record::Organization(_) => RecordKind::Organization,
            Record::Condition(_) => RecordKind::Condition,
            Record::Intervention(_) => RecordKind::Intervention,
            Record::Arm(_) => RecordKind::Arm,
            Record::Site(_) => RecordKind::Site,
            Record::Contact(_) => RecordKind::Contact,
            Record::Investigator(_) => RecordKind::Investigator,
            Record::Outcome(_) => RecordKind::Outcome,
            Record::Result(_) => RecordKind::Result,
            Record::FlowGroup(_) => RecordKind::ParticipantFlowGroup,
            Record::BaselineGroup(_) => RecordKind::BaselineGroup,
            Record::BaselineMeasure(_) => RecordKind::BaselineMeasure,
            Record::EventGroup(_) => RecordKind::AdverseEventGroup,
            Record::AdverseEvent(_) => RecordKind::AdverseEvent,
            Record::Criterion(_) => RecordKind::EligibilityCriterion,
            Record::Publication(_) => RecordKind::Publication,
            Record::Version(_) => RecordKind::Version,
            Record::Sponsor(_) => RecordKind::Sponsors,
            Record::Studies(_) => RecordKind::Studies,
            Record::UsesIntervention(_) => RecordKind::UsesIntervention,
            Record::ArmContains(_) => RecordKind::ArmContainsIntervention,
            Record::HasResult(_) => RecordKind::HasResult,
            Record::Achievement(_) => RecordKind::Achieved,
            Record::EventStat(_) => RecordKind::HasStat,
            Record::Scoped(link) => link.kind,
        }
    }

    /// Link a trial to one of its scoped children.
    pub fn scoped(kind: RecordKind, nct_id: &str, target_id: impl Into<String>) -> Self {
        Record::Scoped(ScopedLink {
            kind,
            nct_id: nct_id.to_string(),
            target_id: target_id.into(),
        })
    }

    /// Serialize as one JSON Lines entry (without the newline)
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
