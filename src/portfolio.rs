//! Intervention portfolio: every trial using an intervention, flattened
//!
//! One row per combination of the trial's conditions, sponsors, site
//! countries and arms, with absent joins contributing nulls. Metrics over
//! the rows are row-weighted, except the distinct counts and arm complexity.

use crate::backend::{BackendResult, GraphBackend, Row};
use crate::ingest::normalize::{dedupe_key, normalize_intervention_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Read query producing portfolio rows on Cypher stores; binds `$key`
pub const PORTFOLIO_QUERY: &str = "\
MATCH (i:Intervention {key: $key})<-[:USES_INTERVENTION]-(t:Trial)
OPTIONAL MATCH (t)-[:STUDIES]->(c:Condition)
OPTIONAL MATCH (o:Organization)-[:SPONSORS]->(t)
OPTIONAL MATCH (t)-[:HAS_SITE]->(s:Site)
OPTIONAL MATCH (t)-[:HAS_ARM]->(a:Arm)
RETURN t.nctId AS nct_id, t.phases AS phases, t.studyType AS study_type,
       t.allocation AS allocation, t.masking AS masking, t.overallStatus AS status,
       t.enrollmentCount AS enrollment, c.name AS condition, o.name AS sponsor,
       s.country AS country, a.label AS arm_label";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRow {
    pub nct_id: String,
    pub phases: Vec<String>,
    pub study_type: Option<String>,
    pub allocation: Option<String>,
    pub masking: Option<String>,
    pub status: Option<String>,
    pub enrollment: Option<i64>,
    pub condition: Option<String>,
    pub sponsor: Option<String>,
    pub country: Option<String>,
    pub arm_label: Option<String>,
}

fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl PortfolioRow {
    /// Decode one record of [`PORTFOLIO_QUERY`]
    pub fn from_record(row: &Row) -> Self {
        let phases = match row.get("phases") {
            Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        let enrollment = match row.get("enrollment") {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Self {
            nct_id: text(row, "nct_id").unwrap_or_default(),
            phases,
            study_type: text(row, "study_type"),
            allocation: text(row, "allocation"),
            masking: text(row, "masking"),
            status: text(row, "status"),
            enrollment,
            condition: text(row, "condition"),
            sponsor: text(row, "sponsor"),
            country: text(row, "country"),
            arm_label: text(row, "arm_label"),
        }
    }

    /// Phases joined for display
    pub fn phase_text(&self) -> String {
        self.phases.join(", ")
    }
}

/// Rows for one intervention; empty when nothing matched
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Portfolio {
    pub intervention: String,
    pub rows: Vec<PortfolioRow>,
}

impl Portfolio {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metrics(&self) -> PortfolioMetrics {
        PortfolioMetrics::compute(&self.rows)
    }
}

/// Fetch the portfolio of `name`.
///
/// The name is normalized like an extracted intervention name, so
/// `"Drug: Metformin "` and `"metformin"` find the same trials.
pub async fn intervention_portfolio(backend: &dyn GraphBackend, name: &str) -> BackendResult<Portfolio> {
    let Some(normalized) = normalize_intervention_name(name) else {
        return Ok(Portfolio {
            intervention: name.trim().to_string(),
            rows: Vec::new(),
        });
    };
    let rows = backend.intervention_portfolio(&dedupe_key(&normalized)).await?;
    Ok(Portfolio {
        intervention: normalized,
        rows,
    })
}

/// Aggregate indicators of a portfolio
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub total_trials: usize,
    pub condition_diversity: usize,
    pub sponsor_diversity: usize,
    pub geographic_spread: usize,
    /// Share of rows whose status is COMPLETED
    pub completion_ratio: f64,
    /// Share of rows with a phase mentioning 3
    pub phase_maturity: f64,
    /// Mean over rows that report an enrollment
    pub avg_enrollment: Option<f64>,
    /// Mean number of distinct arm labels per trial
    pub arm_complexity: f64,
    pub repurposing_strength: f64,
}

fn distinct<'a>(values: impl Iterator<Item = &'a Option<String>>) -> usize {
    values.flatten().collect::<BTreeSet<_>>().len()
}

fn share(rows: &[PortfolioRow], predicate: impl Fn(&PortfolioRow) -> bool) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().filter(|r| predicate(r)).count() as f64 / rows.len() as f64
}

impl PortfolioMetrics {
    pub fn compute(rows: &[PortfolioRow]) -> Self {
        let mut arms_per_trial: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for row in rows {
            let arms = arms_per_trial.entry(row.nct_id.as_str()).or_default();
            if let Some(label) = &row.arm_label {
                arms.insert(label.as_str());
            }
        }

        let enrollments: Vec<i64> = rows.iter().filter_map(|r| r.enrollment).collect();
        let avg_enrollment = if enrollments.is_empty() {
            None
        } else {
            Some(enrollments.iter().sum::<i64>() as f64 / enrollments.len() as f64)
        };

        let arm_complexity = if arms_per_trial.is_empty() {
            0.0
        } else {
            arms_per_trial.values().map(BTreeSet::len).sum::<usize>() as f64 / arms_per_trial.len() as f64
        };

        let condition_diversity = distinct(rows.iter().map(|r| &r.condition));
        let completion_ratio = share(rows, |r| r.status.as_deref() == Some("COMPLETED"));
        let phase_maturity = share(rows, |r| r.phases.iter().any(|p| p.contains('3')));

        Self {
            total_trials: arms_per_trial.len(),
            condition_diversity,
            sponsor_diversity: distinct(rows.iter().map(|r| &r.sponsor)),
            geographic_spread: distinct(rows.iter().map(|r| &r.country)),
            completion_ratio,
            phase_maturity,
            avg_enrollment,
            arm_complexity,
            repurposing_strength: condition_diversity as f64 * phase_maturity * completion_ratio,
        }
    }
}
