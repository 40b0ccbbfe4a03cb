//! Catalog records and the sources they are read from
//!
//! The catalog is a spreadsheet of teams. Its header row drives the shape of
//! each row, so rows are mapped onto a typed [`CatalogRecord`] once, here at
//! the boundary. Columns we do not recognise are kept in `extra`.

mod identity;
mod source;

pub use identity::{stable_identity, StableIdentity};
pub use source::{CachedCatalogSource, FileCatalogSource, SheetCatalogSource};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::query::canonical_phrase;

/// Upper bound on specialist role/experience pairs per team
pub const MAX_SPECIALISTS: usize = 6;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed catalog data: {0}")]
    Parse(String),

    #[error("Catalog source is not configured: {0}")]
    MissingConfiguration(String),
}

/// One specialist slot on a team roster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specialist {
    pub role: String,
    pub experience: String,
}

/// A directory entry ("team")
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub name: String,
    /// Comma-separated primary categories ("Type" column)
    #[serde(default)]
    pub primary_tags: String,
    /// Comma-separated secondary categories
    #[serde(default)]
    pub secondary_tags: String,
    /// Loose free-text keywords
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub industry_expertise: String,
    #[serde(default)]
    pub specialists: Vec<Specialist>,
    #[serde(default)]
    pub partner: String,
    #[serde(default)]
    pub partner_confirmation: String,
    #[serde(default)]
    pub brief: String,
    #[serde(default)]
    pub documents: String,
    /// Columns without a typed field
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Timestamp,
    Name,
    PrimaryTags,
    SecondaryTags,
    Keywords,
    Overview,
    IndustryExpertise,
    Partner,
    PartnerConfirmation,
    Brief,
    Documents,
}

fn column_for(header: &str) -> Option<Column> {
    let column = match header {
        "timestamp" | "submitted at" | "created at" => Column::Timestamp,
        "name" | "team name" | "team" | "display name" => Column::Name,
        "type" | "primary type" | "category" | "categories" => Column::PrimaryTags,
        "secondary type" | "subtype" | "sub type" | "secondary category" | "services" => {
            Column::SecondaryTags
        }
        "keywords" | "keyword" | "tags" => Column::Keywords,
        "overview" | "team overview" | "description" => Column::Overview,
        "industry expertise" | "industries" | "industry" => Column::IndustryExpertise,
        "partner" | "partner name" => Column::Partner,
        "partner confirmation" | "partner confirmed" | "confirmed by partner" => {
            Column::PartnerConfirmation
        }
        "brief" | "team brief" => Column::Brief,
        "documents" | "docs" | "attachments" => Column::Documents,
        _ => return None,
    };
    Some(column)
}

fn specialist_header() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"^specialist\s*(\d+)\s*(role|experience)$").ok())
        .as_ref()
}

/// Lowercase and collapse whitespace so header lookups ignore formatting
fn header_key(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn split_csv(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(canonical_phrase)
        .filter(|tag| !tag.is_empty())
        .collect()
}

impl CatalogRecord {
    /// Map one header-keyed spreadsheet row onto a typed record
    pub fn from_row<'a, I>(row: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = CatalogRecord::default();
        let mut roster: BTreeMap<usize, Specialist> = BTreeMap::new();

        for (header, value) in row {
            let key = header_key(header);
            let value = value.trim().to_string();

            if let Some(column) = column_for(&key) {
                let slot = match column {
                    Column::Timestamp => &mut record.timestamp,
                    Column::Name => &mut record.name,
                    Column::PrimaryTags => &mut record.primary_tags,
                    Column::SecondaryTags => &mut record.secondary_tags,
                    Column::Keywords => &mut record.keywords,
                    Column::Overview => &mut record.overview,
                    Column::IndustryExpertise => &mut record.industry_expertise,
                    Column::Partner => &mut record.partner,
                    Column::PartnerConfirmation => &mut record.partner_confirmation,
                    Column::Brief => &mut record.brief,
                    Column::Documents => &mut record.documents,
                };
                *slot = value;
                continue;
            }

            let specialist = specialist_header().and_then(|re| re.captures(&key));
            if let Some(caps) = specialist {
                let slot: usize = caps[1].parse().unwrap_or(0);
                if (1..=MAX_SPECIALISTS).contains(&slot) {
                    let entry = roster.entry(slot).or_default();
                    if &caps[2] == "role" {
                        entry.role = value;
                    } else {
                        entry.experience = value;
                    }
                }
                continue;
            }

            if !header.trim().is_empty() {
                record.extra.insert(header.trim().to_string(), value);
            }
        }

        record.specialists = roster
            .into_values()
            .filter(|s| !s.role.is_empty() || !s.experience.is_empty())
            .collect();
        record
    }

    /// Canonical entries of the primary tag CSV
    pub fn primary_tag_list(&self) -> Vec<String> {
        split_csv(&self.primary_tags)
    }

    /// Canonical entries of the secondary tag CSV
    pub fn secondary_tag_list(&self) -> Vec<String> {
        split_csv(&self.secondary_tags)
    }

    /// Primary then secondary tags, canonical and de-duplicated
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags = self.primary_tag_list();
        for tag in self.secondary_tag_list() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    pub fn identity(&self) -> StableIdentity {
        stable_identity(self)
    }
}

/// Where catalog records come from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// All records, in source order
    async fn list_records(&self) -> Result<Vec<CatalogRecord>, CatalogError>;
}

/// Turn a spreadsheet values grid (header row first) into records.
///
/// Short rows are padded with empty cells; fully blank rows are skipped.
pub fn records_from_grid(grid: &[Vec<String>]) -> Vec<CatalogRecord> {
    let Some((headers, rows)) = grid.split_first() else {
        return Vec::new();
    };

    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            CatalogRecord::from_row(
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| (h.as_str(), row.get(i).map(String::as_str).unwrap_or(""))),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_maps_known_headers() {
        let row = [
            ("Timestamp", "2024-03-01 10:00"),
            ("Team Name", "  Acme Growth "),
            ("Type", "SEO, Content"),
            ("Secondary Type", "PR"),
            ("Keywords", "link building"),
            ("Partner Confirmation", "yes"),
            ("Specialist 1 Role", "SEO Lead"),
            ("Specialist 1 Experience", "8 years"),
            ("Specialist 2 Role", "Writer"),
            ("Favourite Colour", "green"),
        ];

        let record = CatalogRecord::from_row(row);
        assert_eq!(record.name, "Acme Growth");
        assert_eq!(record.primary_tags, "SEO, Content");
        assert_eq!(record.secondary_tags, "PR");
        assert_eq!(record.partner_confirmation, "yes");
        assert_eq!(record.specialists.len(), 2);
        assert_eq!(record.specialists[0].role, "SEO Lead");
        assert_eq!(record.specialists[0].experience, "8 years");
        assert_eq!(record.extra.get("Favourite Colour").map(String::as_str), Some("green"));
    }

    #[test]
    fn test_specialist_roster_is_bounded() {
        let headers: Vec<String> = (1..=9).map(|i| format!("Specialist {i} Role")).collect();
        let row: Vec<(&str, &str)> = headers.iter().map(|h| (h.as_str(), "Engineer")).collect();

        let record = CatalogRecord::from_row(row);
        assert_eq!(record.specialists.len(), MAX_SPECIALISTS);
    }

    #[test]
    fn test_tag_lists_are_canonical() {
        let record = CatalogRecord {
            primary_tags: "SEO, CI/CD , ,Content-Marketing".to_string(),
            secondary_tags: "seo, PR".to_string(),
            ..Default::default()
        };
        assert_eq!(record.primary_tag_list(), vec!["seo", "ci cd", "content marketing"]);
        assert_eq!(record.all_tags(), vec!["seo", "ci cd", "content marketing", "pr"]);
    }

    #[test]
    fn test_records_from_grid() {
        let grid = vec![
            vec!["Name".to_string(), "Type".to_string()],
            vec!["Acme".to_string(), "SEO".to_string()],
            vec![String::new()],
            vec!["Short".to_string()],
        ];
        let records = records_from_grid(&grid);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "Short");
        assert_eq!(records[1].primary_tags, "");
    }
}
