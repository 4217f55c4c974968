//! OpenAlex `/works` response types and normalization.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use lithybrid_core::CandidatePaper;

/// Fields requested with `select=`; keeps responses small.
pub const WORK_FIELDS: &[&str] = &[
    "id",
    "display_name",
    "title",
    "publication_year",
    "doi",
    "ids",
    "cited_by_count",
    "primary_location",
    "host_venue",
    "authorships",
    "abstract_inverted_index",
];

#[derive(Debug, Deserialize)]
pub struct WorksResponse {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub results: Vec<Work>,
}

#[derive(Debug, Deserialize)]
pub struct Meta {
    pub count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Work {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub ids: Option<WorkIds>,
    pub cited_by_count: Option<u64>,
    pub primary_location: Option<Location>,
    pub host_venue: Option<Venue>,
    #[serde(default)]
    pub authorships: Vec<Authorship>,
    pub abstract_inverted_index: Option<HashMap<String, Vec<u32>>>,
}

#[derive(Debug, Deserialize)]
pub struct WorkIds {
    pub doi: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Location {
    pub landing_page_url: Option<String>,
    pub source: Option<Venue>,
}

#[derive(Debug, Deserialize)]
pub struct Venue {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Authorship {
    pub author: Option<Author>,
}

#[derive(Debug, Deserialize)]
pub struct Author {
    pub display_name: Option<String>,
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| normalize_ws(&v)).filter(|v| !v.is_empty())
}

/// Bare DOI ("10.1/x") from either form OpenAlex uses.
pub fn bare_doi(doi: &str) -> Option<String> {
    let doi = doi.trim();
    let doi = doi
        .strip_prefix("https://doi.org/")
        .or_else(|| doi.strip_prefix("http://doi.org/"))
        .unwrap_or(doi);
    if doi.is_empty() {
        None
    } else {
        Some(doi.to_string())
    }
}

/// Rebuild abstract text from `{token: [positions]}`.
///
/// On a position collision the lexicographically first token wins, so the
/// output is deterministic.
pub fn inverted_index_to_text(index: &HashMap<String, Vec<u32>>) -> String {
    let mut positions: BTreeMap<u32, &str> = BTreeMap::new();
    for (token, at) in index {
        for p in at {
            positions
                .entry(*p)
                .and_modify(|cur| {
                    if token.as_str() < *cur {
                        *cur = token.as_str();
                    }
                })
                .or_insert(token.as_str());
        }
    }
    normalize_ws(&positions.into_values().collect::<Vec<_>>().join(" "))
}

impl Work {
    /// Normalize into a candidate. Works without an id or title are dropped.
    pub fn into_candidate(self) -> Option<CandidatePaper> {
        let provider_id = non_empty(self.id)?;
        let title = non_empty(self.display_name).or_else(|| non_empty(self.title))?;

        let doi = self
            .doi
            .as_deref()
            .and_then(bare_doi)
            .or_else(|| self.ids.and_then(|ids| ids.doi).as_deref().and_then(bare_doi));

        let (landing_page, location_venue) = match self.primary_location {
            Some(loc) => (
                non_empty(loc.landing_page_url),
                loc.source.and_then(|s| non_empty(s.display_name)),
            ),
            None => (None, None),
        };
        let venue =
            location_venue.or_else(|| self.host_venue.and_then(|v| non_empty(v.display_name)));

        let authors = self
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|x| non_empty(x.display_name)))
            .collect();

        let abstract_text = self
            .abstract_inverted_index
            .map(|inv| inverted_index_to_text(&inv))
            .filter(|s| !s.is_empty());

        Some(CandidatePaper {
            url: landing_page.or_else(|| Some(provider_id.clone())),
            provider_id,
            title,
            authors,
            year: self.publication_year,
            venue,
            abstract_text,
            citation_count: self.cited_by_count,
            doi,
        })
    }
}
