//! Record extraction from clinical-trial documents
//!
//! One document in, a set of typed records out. Extraction of a document is
//! all-or-nothing: records are staged in memory and the cross-document
//! seen-sets are only updated once the whole document has been walked, so a
//! failing document leaves no trace apart from its dead-letter entry.

use super::eligibility;
use super::normalize::{self, dedupe_key, normalize_intervention_name, UNKNOWN};
use super::path::{self, ShapeError};
use super::records::*;
use rustc_hash::FxHashSet;
use serde_json::Value;
use thiserror::Error;

const PROTOCOL: &str = "protocolSection";

static ABSENT: Value = Value::Null;

/// Why a single document produced no records
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("document has no nctId")]
    MissingIdentifier,

    #[error("malformed document: {0}")]
    Shape(#[from] ShapeError),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Node kinds deduplicated across documents by normalized key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SeenKind {
    Trial,
    Organization,
    Condition,
    Intervention,
}

/// Per-run extraction state
///
/// Owns the seen-sets that suppress duplicate node records across the
/// documents of one run. Relationship records are never deduplicated.
#[derive(Debug, Default)]
pub struct ExtractionContext {
    source: String,
    trials: FxHashSet<String>,
    organizations: FxHashSet<String>,
    conditions: FxHashSet<String>,
    interventions: FxHashSet<String>,
}

impl ExtractionContext {
    /// `source` names the input and is recorded in each trial's `rawJsonPath`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    fn seen(&self, kind: SeenKind) -> &FxHashSet<String> {
        match kind {
            SeenKind::Trial => &self.trials,
            SeenKind::Organization => &self.organizations,
            SeenKind::Condition => &self.conditions,
            SeenKind::Intervention => &self.interventions,
        }
    }

    fn seen_mut(&mut self, kind: SeenKind) -> &mut FxHashSet<String> {
        match kind {
            SeenKind::Trial => &mut self.trials,
            SeenKind::Organization => &mut self.organizations,
            SeenKind::Condition => &mut self.conditions,
            SeenKind::Intervention => &mut self.interventions,
        }
    }

    /// Number of distinct trials extracted so far
    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    /// Walk one document and return its records.
    pub fn extract(&mut self, doc: &Value) -> ExtractResult<Vec<Record>> {
        let nct_id = document_id(doc).ok_or(ExtractError::MissingIdentifier)?;

        let mut staged = Staged {
            ctx: self,
            doc,
            protocol: path::lookup_or(doc, PROTOCOL, &ABSENT),
            nct: nct_id,
            records: Vec::new(),
            pending: FxHashSet::default(),
        };
        staged.trial();
        staged.sponsors()?;
        staged.conditions()?;
        staged.interventions()?;
        staged.arms()?;
        staged.sites()?;
        staged.contacts()?;
        staged.outcomes()?;
        staged.results()?;
        staged.participant_flow()?;
        staged.baseline()?;
        staged.adverse_events()?;
        staged.eligibility();
        staged.references()?;
        staged.version();

        let Staged { records, pending, .. } = staged;
        for (kind, key) in pending {
            self.seen_mut(kind).insert(key);
        }
        Ok(records)
    }
}

/// Best-effort trial identifier of a document
pub fn document_id(doc: &Value) -> Option<String> {
    path::text(doc, "protocolSection.identificationModule.nctId").and_then(|id| normalize::clean_name(&id))
}

struct Staged<'a> {
    ctx: &'a ExtractionContext,
    doc: &'a Value,
    protocol: &'a Value,
    nct: String,
    records: Vec<Record>,
    pending: FxHashSet<(SeenKind, String)>,
}

impl<'a> Staged<'a> {
    fn emit(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Emit a deduplicated node unless its key was already seen in this run
    /// or earlier in this document.
    fn emit_once(&mut self, kind: SeenKind, key: &str, record: Record) {
        if self.ctx.seen(kind).contains(key) {
            return;
        }
        if self.pending.insert((kind, key.to_string())) {
            self.records.push(record);
        }
    }

    fn ps_text(&self, field: &str) -> Option<String> {
        path::text(self.protocol, field)
    }

    fn trial(&mut self) {
        let ps = self.protocol;
        let node = TrialNode {
            nct_id: self.nct.clone(),
            org_study_id: path::text(ps, "identificationModule.orgStudyIdInfo.id"),
            brief_title: path::text(ps, "identificationModule.briefTitle"),
            official_title: path::text(ps, "identificationModule.officialTitle"),
            acronym: path::text(ps, "identificationModule.acronym"),
            overall_status: path::text(ps, "statusModule.overallStatus"),
            status_verified_date: path::text(ps, "statusModule.statusVerifiedDate"),
            start_date: path::text(ps, "statusModule.startDateStruct.date"),
            primary_completion_date: path::text(ps, "statusModule.primaryCompletionDateStruct.date"),
            completion_date: path::text(ps, "statusModule.completionDateStruct.date"),
            study_first_submit_date: path::text(ps, "statusModule.studyFirstSubmitDate"),
            study_first_post_date: path::text(ps, "statusModule.studyFirstPostDateStruct.date"),
            last_update_post_date: path::text(ps, "statusModule.lastUpdatePostDateStruct.date"),
            study_type: path::text(ps, "designModule.studyType"),
            phases: path::text_list(ps, "designModule.phases"),
            intervention_model: path::text(ps, "designModule.designInfo.interventionModel"),
            allocation: path::text(ps, "designModule.designInfo.allocation"),
            primary_purpose: path::text(ps, "designModule.designInfo.primaryPurpose"),
            masking: path::text(ps, "designModule.designInfo.maskingInfo.masking"),
            enrollment_count: path::integer(ps, "designModule.enrollmentInfo.count"),
            enrollment_type: path::text(ps, "designModule.enrollmentInfo.type"),
            brief_summary: path::text(ps, "descriptionModule.briefSummary"),
            detailed_description: path::text(ps, "descriptionModule.detailedDescription"),
            has_results: path::flag(self.doc, "hasResults").unwrap_or(false),
            ipd_sharing: path::text(ps, "ipdSharingStatementModule.ipdSharing"),
            version_holder: self.version_holder(),
            raw_json_path: format!("{}::{}", self.ctx.source, self.nct),
        };
        let nct = self.nct.clone();
        self.emit_once(SeenKind::Trial, &nct, Record::Trial(node));
    }

    fn organization(&mut self, name: &str, class: Option<String>, source_field: &str, role: &str) {
        let Some(name) = normalize::clean_name(name) else {
            return;
        };
        let key = dedupe_key(&name);
        self.emit_once(
            SeenKind::Organization,
            &key,
            Record::Organization(OrganizationNode {
                key: key.clone(),
                name: name.clone(),
                class,
                raw_source_field: source_field.to_string(),
            }),
        );
        self.emit(Record::Sponsor(SponsorLink {
            org_key: key,
            org_name: name,
            nct_id: self.nct.clone(),
            role: role.to_string(),
        }));
    }

    fn sponsors(&mut self) -> ExtractResult<()> {
        if let Some(lead) = self.ps_text("sponsorCollaboratorsModule.leadSponsor.name") {
            let class = self.ps_text("sponsorCollaboratorsModule.leadSponsor.class");
            self.organization(&lead, class, "sponsorCollaboratorsModule.leadSponsor", "lead_sponsor");
        }
        let field = "sponsorCollaboratorsModule.collaborators";
        for collaborator in path::object_list(self.protocol, field)? {
            if let Some(name) = path::text(collaborator, "name") {
                let class = path::text(collaborator, "class");
                self.organization(&name, class, field, "collaborator");
            }
        }
        Ok(())
    }

    fn conditions(&mut self) -> ExtractResult<()> {
        let field = "conditionsModule.conditions";
        for condition in path::list(self.protocol, field)? {
            let name = match condition {
                Value::Null => continue,
                Value::String(s) => s,
                _ => return Err(ShapeError::new(field, "a list of strings").into()),
            };
            let Some(name) = normalize::clean_name(name) else {
                continue;
            };
            let key = dedupe_key(&name);
            self.emit_once(
                SeenKind::Condition,
                &key,
                Record::Condition(ConditionNode {
                    key: key.clone(),
                    name: name.clone(),
                }),
            );
            self.emit(Record::Studies(ConditionLink {
                nct_id: self.nct.clone(),
                condition_key: key,
                condition_name: name,
            }));
        }
        Ok(())
    }

    fn interventions(&mut self) -> ExtractResult<()> {
        for item in path::object_list(self.protocol, "armsInterventionsModule.interventions")? {
            let Some(name) = path::text(item, "name").and_then(|n| normalize_intervention_name(&n)) else {
                continue;
            };
            let key = dedupe_key(&name);
            self.emit_once(
                SeenKind::Intervention,
                &key,
                Record::Intervention(InterventionNode {
                    key: key.clone(),
                    name: name.clone(),
                    intervention_type: path::text(item, "type"),
                    description: path::text(item, "description"),
                    other_names: path::text_list(item, "otherNames"),
                }),
            );
            self.emit(Record::UsesIntervention(InterventionLink {
                nct_id: self.nct.clone(),
                intervention_key: key,
                intervention_name: name,
            }));
        }
        Ok(())
    }

    fn arms(&mut self) -> ExtractResult<()> {
        for group in path::object_list(self.protocol, "armsInterventionsModule.armGroups")? {
            let label = path::text(group, "label");
            let arm_id = normalize::arm_id(&self.nct, label.as_deref());
            let declared = path::text_list(group, "interventionNames");

            for name in declared.iter().filter_map(|n| normalize_intervention_name(n)) {
                self.emit(Record::ArmContains(ArmInterventionLink {
                    arm_id: arm_id.clone(),
                    intervention_key: dedupe_key(&name),
                    intervention_name: name,
                }));
            }
            self.emit(Record::Arm(ArmNode {
                arm_id: arm_id.clone(),
                nct_id: self.nct.clone(),
                label,
                arm_type: path::text(group, "type"),
                description: path::text(group, "description"),
                intervention_names: declared,
            }));
            self.emit(Record::scoped(RecordKind::HasArm, &self.nct, arm_id));
        }
        Ok(())
    }

    fn sites(&mut self) -> ExtractResult<()> {
        for location in path::object_list(self.protocol, "contactsLocationsModule.locations")? {
            let facility = path::text(location, "facility");
            let city = path::text(location, "city");
            let country = path::text(location, "country");
            let site_id = normalize::site_id(&self.nct, facility.as_deref(), city.as_deref(), country.as_deref());
            self.emit(Record::Site(SiteNode {
                site_id: site_id.clone(),
                nct_id: self.nct.clone(),
                facility,
                city,
                state: path::text(location, "state"),
                zip: path::text(location, "zip"),
                country,
                status: path::text(location, "status"),
                latitude: path::lookup(location, "geoPoint.lat").and_then(Value::as_f64),
                longitude: path::lookup(location, "geoPoint.lon").and_then(Value::as_f64),
            }));
            self.emit(Record::scoped(RecordKind::HasSite, &self.nct, site_id));
        }
        Ok(())
    }

    fn contacts(&mut self) -> ExtractResult<()> {
        for contact in path::object_list(self.protocol, "contactsLocationsModule.centralContacts")? {
            let name = path::text(contact, "name");
            let contact_id = normalize::contact_id(&self.nct, name.as_deref());
            self.emit(Record::Contact(ContactNode {
                contact_id: contact_id.clone(),
                nct_id: self.nct.clone(),
                name,
                role: path::text(contact, "role"),
                phone: path::text(contact, "phone"),
                email: path::text(contact, "email"),
            }));
            self.emit(Record::scoped(RecordKind::HasContact, &self.nct, contact_id));
        }

        for official in path::object_list(self.protocol, "contactsLocationsModule.overallOfficials")? {
            let name = path::text(official, "name");
            let investigator_id = normalize::investigator_id(&self.nct, name.as_deref());
            self.emit(Record::Investigator(InvestigatorNode {
                investigator_id: investigator_id.clone(),
                nct_id: self.nct.clone(),
                name,
                affiliation: path::text(official, "affiliation"),
                role: path::text(official, "role"),
            }));
            self.emit(Record::scoped(RecordKind::HasInvestigator, &self.nct, investigator_id));
        }
        Ok(())
    }

    fn outcomes(&mut self) -> ExtractResult<()> {
        let lists = [
            ("primary", "outcomesModule.primaryOutcomes"),
            ("secondary", "outcomesModule.secondaryOutcomes"),
            ("other", "outcomesModule.otherOutcomes"),
        ];
        for (outcome_type, field) in lists {
            for outcome in path::object_list(self.protocol, field)? {
                let measure = path::text(outcome, "measure").or_else(|| path::text(outcome, "title"));
                let outcome_id = normalize::outcome_id(&self.nct, measure.as_deref());
                self.emit(Record::Outcome(OutcomeNode {
                    outcome_id: outcome_id.clone(),
                    nct_id: self.nct.clone(),
                    outcome_type: outcome_type.to_string(),
                    measure,
                    description: path::text(outcome, "description"),
                    time_frame: path::text(outcome, "timeFrame"),
                }));
                self.emit(Record::scoped(RecordKind::HasOutcome, &self.nct, outcome_id));
            }
        }
        Ok(())
    }

    /// outcome measure -> class -> category -> measurement
    fn results(&mut self) -> ExtractResult<()> {
        let field = "resultsSection.outcomeMeasuresModule.outcomeMeasures";
        for measure in path::object_list(self.doc, field)? {
            let title = path::text(measure, "title");
            let label = title.clone().or_else(|| path::text(measure, "type"));
            let outcome_id = normalize::outcome_id(&self.nct, title.as_deref());

            for class in path::object_list(measure, "classes")? {
                for category in path::object_list(class, "categories")? {
                    for measurement in path::object_list(category, "measurements")? {
                        let group_id = path::text(measurement, "groupId");
                        let result_id = normalize::result_id(&self.nct, label.as_deref(), group_id.as_deref());
                        self.emit(Record::Result(ResultNode {
                            result_id: result_id.clone(),
                            nct_id: self.nct.clone(),
                            outcome_title: title.clone(),
                            group_id,
                            value: path::text(measurement, "value"),
                            spread: path::text(measurement, "spread"),
                            param_type: path::text(measure, "paramType"),
                            unit_of_measure: path::text(measure, "unitOfMeasure"),
                        }));
                        self.emit(Record::HasResult(ResultLink {
                            outcome_id: outcome_id.clone(),
                            result_id,
                        }));
                    }
                }
            }
        }
        Ok(())
    }

    /// group x period x milestone x achievement
    fn participant_flow(&mut self) -> ExtractResult<()> {
        let Some(flow) = path::lookup(self.doc, "resultsSection.participantFlowModule") else {
            return Ok(());
        };

        for group in path::object_list(flow, "groups")? {
            let group_key = path::text(group, "id").or_else(|| path::text(group, "title"));
            let flow_group_id = normalize::flow_group_id(&self.nct, group_key.as_deref());
            self.emit(Record::FlowGroup(FlowGroupNode {
                flow_group_id: flow_group_id.clone(),
                nct_id: self.nct.clone(),
                title: path::text(group, "title"),
                description: path::text(group, "description"),
            }));
            self.emit(Record::scoped(RecordKind::HasFlowGroup, &self.nct, flow_group_id));
        }

        for period in path::object_list(flow, "periods")? {
            let period_title = path::text(period, "title").unwrap_or_else(|| UNKNOWN.to_string());
            for milestone in path::object_list(period, "milestones")? {
                let milestone_type = path::text(milestone, "type").unwrap_or_else(|| UNKNOWN.to_string());
                for achievement in path::object_list(milestone, "achievements")? {
                    let group_id = path::text(achievement, "groupId");
                    self.emit(Record::Achievement(AchievementLink {
                        flow_group_id: normalize::flow_group_id(&self.nct, group_id.as_deref()),
                        nct_id: self.nct.clone(),
                        period_title: period_title.clone(),
                        milestone_type: milestone_type.clone(),
                        num_subjects: path::integer(achievement, "numSubjects"),
                    }));
                }
            }
        }
        Ok(())
    }

    fn baseline(&mut self) -> ExtractResult<()> {
        let Some(baseline) = path::lookup(self.doc, "resultsSection.baselineCharacteristicsModule") else {
            return Ok(());
        };

        for group in path::object_list(baseline, "groups")? {
            let group_key = path::text(group, "title").or_else(|| path::text(group, "id"));
            let baseline_group_id = normalize::baseline_group_id(&self.nct, group_key.as_deref());
            self.emit(Record::BaselineGroup(BaselineGroupNode {
                baseline_group_id: baseline_group_id.clone(),
                nct_id: self.nct.clone(),
                title: path::text(group, "title"),
                description: path::text(group, "description"),
            }));
            self.emit(Record::scoped(RecordKind::HasBaselineGroup, &self.nct, baseline_group_id));
        }

        for measure in path::object_list(baseline, "measures")? {
            let title = path::text(measure, "title");
            let baseline_measure_id = normalize::baseline_measure_id(&self.nct, title.as_deref());
            self.emit(Record::BaselineMeasure(BaselineMeasureNode {
                baseline_measure_id: baseline_measure_id.clone(),
                nct_id: self.nct.clone(),
                title,
                param_type: path::text(measure, "paramType"),
                unit_of_measure: path::text(measure, "unitOfMeasure"),
                raw: measure.to_string(),
            }));
            self.emit(Record::scoped(RecordKind::HasBaselineMeasure, &self.nct, baseline_measure_id));
        }
        Ok(())
    }

    fn adverse_events(&mut self) -> ExtractResult<()> {
        let Some(events) = path::lookup(self.doc, "resultsSection.adverseEventsModule") else {
            return Ok(());
        };

        for group in path::object_list(events, "eventGroups")? {
            let group_id = path::text(group, "id");
            let event_group_id = normalize::event_group_id(&self.nct, group_id.as_deref());
            self.emit(Record::EventGroup(EventGroupNode {
                event_group_id: event_group_id.clone(),
                nct_id: self.nct.clone(),
                group_id,
                title: path::text(group, "title"),
                serious_num_affected: path::integer(group, "seriousNumAffected"),
                other_num_affected: path::integer(group, "otherNumAffected"),
            }));
            self.emit(Record::scoped(RecordKind::HasEventGroup, &self.nct, event_group_id));
        }

        for event in path::object_list(events, "seriousEvents")? {
            let term = path::text(event, "term");
            let adverse_event_id = normalize::adverse_event_id(&self.nct, term.as_deref());
            self.emit(Record::AdverseEvent(AdverseEventNode {
                adverse_event_id: adverse_event_id.clone(),
                nct_id: self.nct.clone(),
                term,
                organ_system: path::text(event, "organSystem"),
                assessment_type: path::text(event, "assessmentType"),
            }));
            self.emit(Record::scoped(RecordKind::ReportedEvent, &self.nct, adverse_event_id.clone()));

            for stat in path::object_list(event, "stats")? {
                let group_id = path::text(stat, "groupId");
                self.emit(Record::EventStat(EventStatLink {
                    adverse_event_id: adverse_event_id.clone(),
                    event_group_id: normalize::event_group_id(&self.nct, group_id.as_deref()),
                    nct_id: self.nct.clone(),
                    num_events: path::integer(stat, "numEvents"),
                    num_affected: path::integer(stat, "numAffected"),
                    num_at_risk: path::integer(stat, "numAtRisk"),
                }));
            }
        }
        Ok(())
    }

    fn eligibility(&mut self) {
        let Some(text) = self.ps_text("eligibilityModule.eligibilityCriteria") else {
            return;
        };
        for criterion in eligibility::segment(&text) {
            let criterion_id = normalize::criterion_id(&self.nct, criterion.section.tag(), criterion.sequence);
            self.emit(Record::Criterion(CriterionNode {
                criterion_id: criterion_id.clone(),
                nct_id: self.nct.clone(),
                section: criterion.section,
                text: criterion.text,
                sequence: criterion.sequence,
            }));
            self.emit(Record::scoped(RecordKind::HasCriterion, &self.nct, criterion_id));
        }
    }

    fn references(&mut self) -> ExtractResult<()> {
        for reference in path::object_list(self.protocol, "referencesModule.references")? {
            let pmid = path::text(reference, "pmid");
            let ref_type = path::text(reference, "type");
            let publication_id = normalize::publication_id(&self.nct, pmid.as_deref(), ref_type.as_deref());
            self.emit(Record::Publication(PublicationNode {
                publication_id: publication_id.clone(),
                nct_id: self.nct.clone(),
                pmid,
                citation: path::text(reference, "citation"),
                ref_type,
            }));
            self.emit(Record::scoped(RecordKind::HasPublication, &self.nct, publication_id));
        }
        Ok(())
    }

    fn version_holder(&self) -> Option<String> {
        path::text(self.doc, "derivedSection.miscInfoModule.versionHolder")
            .or_else(|| self.ps_text("derivedSection.miscInfoModule.versionHolder"))
            .and_then(|holder| normalize::clean_name(&holder))
    }

    fn version(&mut self) {
        let Some(holder) = self.version_holder() else {
            return;
        };
        self.emit(Record::Version(VersionNode {
            version_id: holder.clone(),
            nct_id: self.nct.clone(),
        }));
        self.emit(Record::scoped(RecordKind::HasVersion, &self.nct, holder));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(records: &[Record], kind: RecordKind) -> Vec<&Record> {
        records.iter().filter(|r| r.kind() == kind).collect()
    }

    fn trial(nct: &str) -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": nct, "briefTitle": "A study"},
                "statusModule": {"overallStatus": "COMPLETED", "startDateStruct": {"date": "2020-01"}},
                "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE3"], "enrollmentInfo": {"count": 120}},
                "sponsorCollaboratorsModule": {
                    "leadSponsor": {"name": "Acme Pharma ", "class": "INDUSTRY"},
                    "collaborators": [{"name": "acme pharma", "class": "INDUSTRY"}]
                },
                "conditionsModule": {"conditions": ["Diabetes", " diabetes ", null]},
                "armsInterventionsModule": {
                    "interventions": [
                        {"type": "DRUG", "name": "Drug: Metformin "},
                        {"type": "DRUG", "name": "Metformin"},
                        {"type": "OTHER", "name": "Other:  "}
                    ],
                    "armGroups": [{"label": "Arm A", "type": "EXPERIMENTAL", "interventionNames": ["Drug: Metformin"]}]
                }
            },
            "hasResults": true
        })
    }

    #[test]
    fn test_missing_identifier() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let doc = json!({"protocolSection": {"identificationModule": {"briefTitle": "No id"}}});
        assert_eq!(ctx.extract(&doc), Err(ExtractError::MissingIdentifier));
        assert_eq!(ctx.extract(&json!(42)), Err(ExtractError::MissingIdentifier));
        assert_eq!(
            ctx.extract(&json!({"protocolSection": {"identificationModule": {"nctId": "  "}}})),
            Err(ExtractError::MissingIdentifier)
        );
        assert_eq!(ctx.trial_count(), 0);
    }

    #[test]
    fn test_trial_fields() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let records = ctx.extract(&trial("NCT001")).unwrap();
        let trials = kinds(&records, RecordKind::Trial);
        assert_eq!(trials.len(), 1);
        match trials[0] {
            Record::Trial(t) => {
                assert_eq!(t.nct_id, "NCT001");
                assert_eq!(t.overall_status.as_deref(), Some("COMPLETED"));
                assert_eq!(t.start_date.as_deref(), Some("2020-01"));
                assert_eq!(t.phases, vec!["PHASE3".to_string()]);
                assert_eq!(t.enrollment_count, Some(120));
                assert!(t.has_results);
                assert_eq!(t.raw_json_path, "input.jsonl::NCT001");
                assert_eq!(t.masking, None);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_dedup_within_and_across_documents() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let first = ctx.extract(&trial("NCT001")).unwrap();
        assert_eq!(kinds(&first, RecordKind::Organization).len(), 1);
        assert_eq!(kinds(&first, RecordKind::Sponsors).len(), 2);
        assert_eq!(kinds(&first, RecordKind::Condition).len(), 1);
        assert_eq!(kinds(&first, RecordKind::Studies).len(), 2);
        assert_eq!(kinds(&first, RecordKind::Intervention).len(), 1);
        assert_eq!(kinds(&first, RecordKind::UsesIntervention).len(), 2);

        match kinds(&first, RecordKind::Intervention)[0] {
            Record::Intervention(i) => {
                assert_eq!(i.name, "Metformin");
                assert_eq!(i.key, "metformin");
            }
            other => panic!("unexpected record {:?}", other),
        }

        let second = ctx.extract(&trial("NCT002")).unwrap();
        assert!(kinds(&second, RecordKind::Organization).is_empty());
        assert!(kinds(&second, RecordKind::Condition).is_empty());
        assert!(kinds(&second, RecordKind::Intervention).is_empty());
        // Relationships are always emitted
        assert_eq!(kinds(&second, RecordKind::UsesIntervention).len(), 2);
        assert_eq!(kinds(&second, RecordKind::Trial).len(), 1);

        // Same trial again: the node is suppressed, its relationships are not
        let again = ctx.extract(&trial("NCT001")).unwrap();
        assert!(kinds(&again, RecordKind::Trial).is_empty());
        assert_eq!(kinds(&again, RecordKind::HasArm).len(), 1);
        assert_eq!(ctx.trial_count(), 2);
    }

    #[test]
    fn test_arm_records() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let records = ctx.extract(&trial("NCT001")).unwrap();
        match kinds(&records, RecordKind::Arm)[0] {
            Record::Arm(arm) => {
                assert_eq!(arm.arm_id, "NCT001::Arm A");
                assert_eq!(arm.intervention_names, vec!["Drug: Metformin".to_string()]);
            }
            other => panic!("unexpected record {:?}", other),
        }
        match kinds(&records, RecordKind::ArmContainsIntervention)[0] {
            Record::ArmContains(link) => assert_eq!(link.intervention_key, "metformin"),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_failed_document_leaves_seen_sets_untouched() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let mut doc = trial("NCT001");
        doc["protocolSection"]["contactsLocationsModule"] = json!({"locations": "not a list"});

        let err = ctx.extract(&doc).unwrap_err();
        assert!(matches!(err, ExtractError::Shape(_)));
        assert_eq!(ctx.trial_count(), 0);

        let records = ctx.extract(&trial("NCT001")).unwrap();
        assert_eq!(kinds(&records, RecordKind::Trial).len(), 1);
        assert_eq!(kinds(&records, RecordKind::Organization).len(), 1);
    }

    #[test]
    fn test_condition_of_wrong_type_fails_document() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let mut doc = trial("NCT001");
        doc["protocolSection"]["conditionsModule"]["conditions"] = json!(["Asthma", 7]);
        assert!(matches!(ctx.extract(&doc), Err(ExtractError::Shape(_))));
    }

    #[test]
    fn test_results_unrolled() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let mut doc = trial("NCT001");
        doc["resultsSection"] = json!({
            "outcomeMeasuresModule": {"outcomeMeasures": [{
                "type": "PRIMARY",
                "title": "HbA1c change",
                "unitOfMeasure": "percent",
                "classes": [
                    {"categories": [{"measurements": [
                        {"groupId": "OG000", "value": "-1.2", "spread": "0.3"},
                        {"groupId": "OG001", "value": "-0.4"}
                    ]}]},
                    {"categories": []},
                    {}
                ]
            }, {"title": "No classes"}]},
            "participantFlowModule": {
                "groups": [{"id": "FG000", "title": "Metformin"}],
                "periods": [{"title": "Overall Study", "milestones": [
                    {"type": "STARTED", "achievements": [{"groupId": "FG000", "numSubjects": "60"}]},
                    {"type": "COMPLETED", "achievements": [{"groupId": "FG000", "numSubjects": "55"}]}
                ]}]
            },
            "adverseEventsModule": {
                "eventGroups": [{"id": "EG000", "title": "Metformin", "seriousNumAffected": 2}],
                "seriousEvents": [{"term": "Nausea", "organSystem": "GI", "stats": [
                    {"groupId": "EG000", "numEvents": 3, "numAffected": 2, "numAtRisk": 60}
                ]}]
            }
        });

        let records = ctx.extract(&doc).unwrap();
        let results = kinds(&records, RecordKind::Result);
        assert_eq!(results.len(), 2);
        match results[0] {
            Record::Result(r) => {
                assert_eq!(r.result_id, "NCT001::HbA1c change::OG000");
                assert_eq!(r.value.as_deref(), Some("-1.2"));
                assert_eq!(r.unit_of_measure.as_deref(), Some("percent"));
            }
            other => panic!("unexpected record {:?}", other),
        }
        match kinds(&records, RecordKind::HasResult)[0] {
            Record::HasResult(link) => assert_eq!(link.outcome_id, "NCT001::HbA1c change"),
            other => panic!("unexpected record {:?}", other),
        }

        let achievements = kinds(&records, RecordKind::Achieved);
        assert_eq!(achievements.len(), 2);
        match achievements[1] {
            Record::Achievement(a) => {
                assert_eq!(a.flow_group_id, "NCT001::PF::FG000");
                assert_eq!(a.milestone_type, "COMPLETED");
                assert_eq!(a.num_subjects, Some(55));
            }
            other => panic!("unexpected record {:?}", other),
        }

        assert_eq!(kinds(&records, RecordKind::AdverseEventGroup).len(), 1);
        match kinds(&records, RecordKind::HasStat)[0] {
            Record::EventStat(stat) => {
                assert_eq!(stat.adverse_event_id, "NCT001::AE::Nausea");
                assert_eq!(stat.event_group_id, "NCT001::AEG::EG000");
                assert_eq!(stat.num_at_risk, Some(60));
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_eligibility_and_version() {
        let mut ctx = ExtractionContext::new("input.jsonl");
        let mut doc = trial("NCT001");
        doc["protocolSection"]["eligibilityModule"] =
            json!({"eligibilityCriteria": "Inclusion Criteria:\n- Age >= 18\nExclusion Criteria:\n- Pregnant"});
        doc["derivedSection"] = json!({"miscInfoModule": {"versionHolder": "2024-05-01"}});

        let records = ctx.extract(&doc).unwrap();
        let criteria: Vec<_> = kinds(&records, RecordKind::EligibilityCriterion)
            .into_iter()
            .map(|r| match r {
                Record::Criterion(c) => (c.criterion_id.clone(), c.text.clone(), c.sequence),
                other => panic!("unexpected record {:?}", other),
            })
            .collect();
        assert_eq!(
            criteria,
            vec![
                ("NCT001::IN::#0".to_string(), "Age >= 18".to_string(), 0),
                ("NCT001::EX::#0".to_string(), "Pregnant".to_string(), 0),
            ]
        );
        assert_eq!(kinds(&records, RecordKind::HasCriterion).len(), 2);
        assert_eq!(kinds(&records, RecordKind::Version).len(), 1);
        assert_eq!(kinds(&records, RecordKind::HasVersion).len(), 1);
    }
}
