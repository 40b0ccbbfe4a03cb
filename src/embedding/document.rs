//! Search-document builder used at index time
//!
//! Produces the passage text embedded for each catalog record. Tag fields are
//! repeated so the vector leans toward categorical intent over incidental
//! prose; administrative fields go last as low-weight context.

use crate::catalog::CatalogRecord;
use crate::query::phrase_acronym;

/// How many times tag content is repeated relative to free text
pub const TAG_REPETITIONS: usize = 3;

/// Build the weighted text blob embedded for `record`
pub fn build_search_text(record: &CatalogRecord) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !record.name.trim().is_empty() {
        parts.push(record.name.trim().to_string());
    }

    let tags = record.all_tags();
    if !tags.is_empty() {
        let line = tags.join(", ");
        for _ in 0..TAG_REPETITIONS {
            parts.push(line.clone());
        }

        let acronyms: Vec<String> = tags.iter().filter_map(|t| phrase_acronym(t)).collect();
        if !acronyms.is_empty() {
            parts.push(acronyms.join(" "));
        }
    }

    for field in [&record.keywords, &record.overview, &record.industry_expertise] {
        if !field.trim().is_empty() {
            parts.push(field.trim().to_string());
        }
    }

    let roster: Vec<String> = record
        .specialists
        .iter()
        .map(|s| match (s.role.is_empty(), s.experience.is_empty()) {
            (false, false) => format!("{} ({})", s.role, s.experience),
            (false, true) => s.role.clone(),
            _ => s.experience.clone(),
        })
        .collect();
    if !roster.is_empty() {
        parts.push(roster.join("; "));
    }

    for field in [&record.brief, &record.documents, &record.partner_confirmation] {
        if !field.trim().is_empty() {
            parts.push(field.trim().to_string());
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Specialist;

    fn record() -> CatalogRecord {
        CatalogRecord {
            name: "Acme Growth".to_string(),
            primary_tags: "Search Engine Optimization, Content".to_string(),
            secondary_tags: "PR".to_string(),
            keywords: "link building".to_string(),
            overview: "We grow organic traffic.".to_string(),
            specialists: vec![Specialist {
                role: "SEO Lead".to_string(),
                experience: "8 years".to_string(),
            }],
            brief: "brief.pdf".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tags_are_repeated() {
        let text = build_search_text(&record());
        let line = "search engine optimization, content, pr";
        assert_eq!(text.matches(line).count(), TAG_REPETITIONS);
    }

    #[test]
    fn test_acronym_appended_for_multi_word_tags() {
        let text = build_search_text(&record());
        assert!(text.lines().any(|l| l == "seo"));
    }

    #[test]
    fn test_field_order() {
        let text = build_search_text(&record());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Acme Growth");
        assert_eq!(*lines.last().unwrap(), "brief.pdf");
        assert!(text.contains("SEO Lead (8 years)"));
        let overview = text.find("organic traffic").unwrap();
        let roster = text.find("SEO Lead").unwrap();
        assert!(overview < roster);
    }

    #[test]
    fn test_empty_record_builds_empty_text() {
        assert_eq!(build_search_text(&CatalogRecord::default()), "");
    }
}
