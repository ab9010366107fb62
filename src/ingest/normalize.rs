//! Entity normalization and identifier synthesis
//!
//! Dedupe keys are computed here and nowhere else, so extraction and
//! loading fold names the same way.

/// Category prefixes removed from intervention names
pub const INTERVENTION_PREFIXES: [&str; 5] = ["Drug:", "Other:", "Device:", "Procedure:", "Biological:"];

/// Outcome ids keep at most this many characters of the measure text
pub const OUTCOME_MEASURE_CHARS: usize = 120;

/// Placeholder for a missing identifier part
pub const UNKNOWN: &str = "unknown";

const SEPARATOR: &str = "::";

/// Case-folded, trimmed form used to collapse spellings of one entity.
pub fn dedupe_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Trim a free-text name, returning `None` when nothing is left.
pub fn clean_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strip category prefixes (`"Drug: Metformin"` -> `"Metformin"`).
///
/// Prefixes match case-insensitively and repeatedly. Names that are empty
/// after stripping are discarded.
pub fn normalize_intervention_name(name: &str) -> Option<String> {
    let mut current = name.trim();
    loop {
        let stripped = INTERVENTION_PREFIXES.iter().find_map(|prefix| {
            let head = current.get(..prefix.len())?;
            if head.eq_ignore_ascii_case(prefix) {
                Some(current[prefix.len()..].trim_start())
            } else {
                None
            }
        });
        match stripped {
            Some(rest) => current = rest,
            None => break,
        }
    }
    clean_name(current)
}

/// First `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn part(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}

/// Join identifier parts with `::`.
pub fn composite_id(parts: &[&str]) -> String {
    parts.join(SEPARATOR)
}

pub fn arm_id(nct_id: &str, label: Option<&str>) -> String {
    composite_id(&[nct_id, part(label)])
}

pub fn site_id(nct_id: &str, facility: Option<&str>, city: Option<&str>, country: Option<&str>) -> String {
    composite_id(&[nct_id, "SITE", part(facility), part(city), part(country)])
}

pub fn contact_id(nct_id: &str, name: Option<&str>) -> String {
    composite_id(&[nct_id, "CONTACT", part(name)])
}

pub fn investigator_id(nct_id: &str, name: Option<&str>) -> String {
    composite_id(&[nct_id, "PI", part(name)])
}

pub fn outcome_id(nct_id: &str, measure: Option<&str>) -> String {
    composite_id(&[nct_id, truncate_chars(part(measure), OUTCOME_MEASURE_CHARS)])
}

pub fn result_id(nct_id: &str, outcome: Option<&str>, group_id: Option<&str>) -> String {
    composite_id(&[nct_id, part(outcome), part(group_id)])
}

pub fn flow_group_id(nct_id: &str, group: Option<&str>) -> String {
    composite_id(&[nct_id, "PF", part(group)])
}

pub fn baseline_group_id(nct_id: &str, group: Option<&str>) -> String {
    composite_id(&[nct_id, "BG", part(group)])
}

pub fn baseline_measure_id(nct_id: &str, title: Option<&str>) -> String {
    composite_id(&[nct_id, "BM", part(title)])
}

pub fn event_group_id(nct_id: &str, group_id: Option<&str>) -> String {
    composite_id(&[nct_id, "AEG", part(group_id)])
}

pub fn adverse_event_id(nct_id: &str, term: Option<&str>) -> String {
    composite_id(&[nct_id, "AE", part(term)])
}

pub fn criterion_id(nct_id: &str, section_tag: &str, sequence: usize) -> String {
    format!("{nct_id}{SEPARATOR}{section_tag}{SEPARATOR}#{sequence}")
}

/// External reference id when present, else a trial-scoped id by type.
pub fn publication_id(nct_id: &str, pmid: Option<&str>, ref_type: Option<&str>) -> String {
    match pmid.and_then(clean_name) {
        Some(pmid) => pmid,
        None => {
            let kind = match ref_type {
                Some(t) if !t.trim().is_empty() => t,
                _ => "other",
            };
            composite_id(&[nct_id, "REF", kind])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_key_folds_case_and_whitespace() {
        assert_eq!(dedupe_key("  Type 2 Diabetes "), "type 2 diabetes");
        assert_eq!(dedupe_key("TYPE 2 diabetes"), dedupe_key("type 2 Diabetes\t"));
    }

    #[test]
    fn test_intervention_prefixes() {
        assert_eq!(normalize_intervention_name("Drug: Metformin ").as_deref(), Some("Metformin"));
        assert_eq!(normalize_intervention_name("Metformin").as_deref(), Some("Metformin"));
        assert_eq!(normalize_intervention_name("biological:  Vaccine X").as_deref(), Some("Vaccine X"));
        assert_eq!(normalize_intervention_name("Other: Drug: Aspirin").as_deref(), Some("Aspirin"));
        assert_eq!(normalize_intervention_name("Device:   "), None);
        assert_eq!(normalize_intervention_name(""), None);
        // A prefix in the middle of a name is kept
        assert_eq!(
            normalize_intervention_name("Placebo Drug: none").as_deref(),
            Some("Placebo Drug: none")
        );
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(arm_id("NCT1", Some("Arm A")), "NCT1::Arm A");
        assert_eq!(arm_id("NCT1", None), "NCT1::unknown");
        assert_eq!(flow_group_id("NCT1", Some("FG000")), "NCT1::PF::FG000");
        assert_eq!(criterion_id("NCT1", "IN", 0), "NCT1::IN::#0");
        assert_eq!(publication_id("NCT1", Some("123"), Some("RESULT")), "123");
        assert_eq!(publication_id("NCT1", None, Some("BACKGROUND")), "NCT1::REF::BACKGROUND");
        assert_eq!(publication_id("NCT1", Some(" "), None), "NCT1::REF::other");

        let long = "x".repeat(300);
        let id = outcome_id("NCT1", Some(&long));
        assert_eq!(id.len(), "NCT1::".len() + OUTCOME_MEASURE_CHARS);
    }
}
