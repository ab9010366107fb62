//! Eligibility text segmentation
//!
//! Free-text eligibility blocks are split into one criterion per line under
//! INCLUSION/EXCLUSION headings.

use super::records::Section;

const BULLETS: [char; 2] = ['*', '-'];

/// One parsed criterion line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub section: Section,
    pub text: String,
    /// Zero-based position within its section
    pub sequence: usize,
}

fn heading(line: &str) -> Option<Section> {
    let lower = line.to_lowercase();
    if !lower.contains("criteria") {
        return None;
    }
    if lower.contains("inclusion") {
        Some(Section::Inclusion)
    } else if lower.contains("exclusion") {
        Some(Section::Exclusion)
    } else {
        None
    }
}

/// Split an eligibility block into criteria.
///
/// Heading lines switch the current section and are not criteria
/// themselves. Lines before the first heading belong to INCLUSION. Leading
/// bullet markers are removed and blank lines ignored.
pub fn segment(text: &str) -> Vec<Criterion> {
    let mut section = Section::Inclusion;
    let mut inclusion = 0usize;
    let mut exclusion = 0usize;
    let mut criteria = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(next) = heading(line) {
            section = next;
            continue;
        }

        let body = line.trim_start_matches(|c: char| BULLETS.contains(&c) || c.is_whitespace());
        if body.is_empty() {
            continue;
        }

        let counter = match section {
            Section::Inclusion => &mut inclusion,
            Section::Exclusion => &mut exclusion,
        };
        criteria.push(Criterion {
            section,
            text: body.to_string(),
            sequence: *counter,
        });
        *counter += 1;
    }

    criteria
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(criteria: &[Criterion], section: Section) -> Vec<(&str, usize)> {
        criteria
            .iter()
            .filter(|c| c.section == section)
            .map(|c| (c.text.as_str(), c.sequence))
            .collect()
    }

    #[test]
    fn test_basic_sections() {
        let criteria = segment("Inclusion Criteria:\n- Age >= 18\nExclusion Criteria:\n- Pregnant");
        assert_eq!(criteria.len(), 2);
        assert_eq!(texts(&criteria, Section::Inclusion), vec![("Age >= 18", 0)]);
        assert_eq!(texts(&criteria, Section::Exclusion), vec![("Pregnant", 0)]);
    }

    #[test]
    fn test_lines_before_heading_default_to_inclusion() {
        let text = "* Adults only\n\nEXCLUSION CRITERIA\n* Prior surgery\n  - Active infection\n";
        let criteria = segment(text);
        assert_eq!(texts(&criteria, Section::Inclusion), vec![("Adults only", 0)]);
        assert_eq!(
            texts(&criteria, Section::Exclusion),
            vec![("Prior surgery", 0), ("Active infection", 1)]
        );
    }

    #[test]
    fn test_sequences_are_per_section() {
        let text = "inclusion criteria:\n1. A\n2. B\nexclusion criteria:\n1. C\ninclusion criteria (continued):\n3. D";
        let criteria = segment(text);
        assert_eq!(
            texts(&criteria, Section::Inclusion),
            vec![("1. A", 0), ("2. B", 1), ("3. D", 2)]
        );
        assert_eq!(texts(&criteria, Section::Exclusion), vec![("1. C", 0)]);
    }

    #[test]
    fn test_text_without_headings() {
        let criteria = segment("Healthy volunteers");
        assert_eq!(criteria.len(), 1);
        assert_eq!(criteria[0].section, Section::Inclusion);
        assert_eq!(criteria[0].text, "Healthy volunteers");
    }

    #[test]
    fn test_bullet_only_lines_are_skipped() {
        assert!(segment("-\n*\n   ").is_empty());
    }
}
