//! Declarative ranking tables
//!
//! Adding a category rule is a data change here; the fusion engine iterates
//! both tables uniformly. All phrases are canonical (see
//! [`canonical_phrase`](crate::query::canonical_phrase)).

use crate::query::contains_phrase;

/// A canonical category with strict tag-presence guardrails
#[derive(Debug, Clone, Copy)]
pub struct AnchorIntent {
    pub name: &'static str,
    /// Phrases whose presence in the query signals the intent
    pub detection_tokens: &'static [&'static str],
    /// Tags that satisfy the intent
    pub canonical_synonyms: &'static [&'static str],
    pub bonus: f32,
    pub penalty: f32,
}

impl AnchorIntent {
    /// Whether the canonical query text names this intent
    pub fn detected_in(&self, canonical_query: &str) -> bool {
        self.detection_tokens
            .iter()
            .any(|token| contains_phrase(canonical_query, token))
    }

    /// Whether any canonical tag carries the intent
    pub fn satisfied_by(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| {
            self.canonical_synonyms
                .iter()
                .any(|synonym| contains_phrase(tag, synonym))
        })
    }
}

pub const ANCHOR_INTENTS: &[AnchorIntent] = &[
    AnchorIntent {
        name: "seo",
        detection_tokens: &["seo", "search engine optimization", "search engine optimisation"],
        canonical_synonyms: &["seo", "search engine optimization", "search engine optimisation"],
        bonus: 0.12,
        penalty: 0.22,
    },
    AnchorIntent {
        name: "pr",
        detection_tokens: &["pr", "public relations"],
        canonical_synonyms: &["pr", "public relations", "media relations", "communications"],
        bonus: 0.10,
        penalty: 0.18,
    },
    AnchorIntent {
        name: "ci cd",
        detection_tokens: &[
            "ci cd",
            "continuous integration",
            "continuous delivery",
            "continuous deployment",
        ],
        canonical_synonyms: &[
            "ci cd",
            "devops",
            "continuous integration",
            "continuous delivery",
            "continuous deployment",
            "release engineering",
        ],
        bonus: 0.12,
        penalty: 0.20,
    },
];

/// Loosely related terms that earn a soft nudge, never a penalty
#[derive(Debug, Clone, Copy)]
pub struct SynonymFamily {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

impl SynonymFamily {
    pub fn detected_in(&self, canonical_query: &str) -> bool {
        self.members
            .iter()
            .any(|member| contains_phrase(canonical_query, member))
    }

    /// Whether any of `fields` (canonical text) mentions a member
    pub fn mentioned_in(&self, fields: &[String]) -> bool {
        fields.iter().any(|field| {
            self.members
                .iter()
                .any(|member| contains_phrase(field, member))
        })
    }
}

pub const SYNONYM_FAMILIES: &[SynonymFamily] = &[
    SynonymFamily {
        name: "ai ml",
        members: &[
            "ai",
            "ml",
            "artificial intelligence",
            "machine learning",
            "deep learning",
            "data science",
            "llm",
        ],
    },
    SynonymFamily {
        name: "mobile",
        members: &["mobile", "ios", "android", "react native", "flutter"],
    },
    SynonymFamily {
        name: "design",
        members: &["design", "ui ux", "ux", "ui", "product design", "branding"],
    },
    SynonymFamily {
        name: "web",
        members: &["web", "website", "web development", "frontend", "backend", "full stack"],
    },
];
