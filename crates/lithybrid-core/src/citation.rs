//! APA 7 reference formatting.
//!
//! Author rules:
//! - each author rendered `Last, F. M.`;
//! - one author as is, 2 to 20 joined with `, ` and `, & ` before the last;
//! - more than 20: the first 19, then `, ... `, then the final author.

use crate::models::{CandidatePaper, Citation};

/// Authors listed in full before APA switches to the ellipsis form.
pub const APA_MAX_LISTED_AUTHORS: usize = 20;

/// Render one display name as `Last, F. M.`.
///
/// Accepts both "Given Middle Last" and "Last, Given Middle". Returns `None`
/// for blank names.
pub fn format_author(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let (last, given): (&str, Vec<&str>) = match name.split_once(',') {
        Some((last, given)) if !last.trim().is_empty() && !given.trim().is_empty() => {
            (last.trim(), given.split_whitespace().collect())
        }
        _ => {
            // A comma with nothing on one side is just punctuation.
            let bare = name.trim_matches(|c: char| c == ',' || c.is_whitespace());
            let mut parts: Vec<&str> = bare.split_whitespace().collect();
            match parts.pop() {
                Some(last) => (last, parts),
                None => return None,
            }
        }
    };

    let initials: Vec<String> = given.iter().filter_map(|part| initials_of(part)).collect();

    if initials.is_empty() {
        Some(last.to_string())
    } else {
        Some(format!("{}, {}", last, initials.join(" ")))
    }
}

// "Jean-Paul" -> "J.-P.", "A." -> "A."
fn initials_of(given: &str) -> Option<String> {
    let pieces: Vec<String> = given
        .split('-')
        .filter_map(|piece| piece.chars().find(|c| c.is_alphabetic()))
        .map(|c| format!("{}.", c.to_uppercase()))
        .collect();
    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join("-"))
    }
}

/// Render an author list per the APA 7 rules above.
pub fn format_authors(authors: &[String]) -> String {
    let names: Vec<String> = authors.iter().filter_map(|a| format_author(a)).collect();
    match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        n if n <= APA_MAX_LISTED_AUTHORS => {
            format!("{}, & {}", names[..n - 1].join(", "), names[n - 1])
        }
        n => format!(
            "{}, ... {}",
            names[..APA_MAX_LISTED_AUTHORS - 1].join(", "),
            names[n - 1]
        ),
    }
}

/// Link for a reference: DOI as `https://doi.org/...` unless already a URL,
/// otherwise the landing page URL.
pub fn reference_link(doi: Option<&str>, url: Option<&str>) -> Option<String> {
    match doi.map(str::trim).filter(|d| !d.is_empty()) {
        Some(doi) if doi.starts_with("http") => Some(doi.to_string()),
        Some(doi) => Some(format!(
            "https://doi.org/{}",
            doi.trim_start_matches("doi:")
        )),
        None => url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
    }
}

/// Full APA 7 reference for a paper.
///
/// `Authors (Year). Title. Venue. Link`, with `n.d.` for a missing year.
pub fn format_apa(paper: &CandidatePaper) -> String {
    let year = paper
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());

    let authors = format_authors(&paper.authors);
    let mut out = if authors.is_empty() {
        format!("({}).", year)
    } else {
        format!("{} ({}).", authors, year)
    };

    let title = paper.title.trim();
    if !title.is_empty() {
        out.push(' ');
        out.push_str(&sentence(title));
    }

    if let Some(venue) = paper.venue.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        out.push(' ');
        out.push_str(&sentence(venue));
    }

    if let Some(link) = reference_link(paper.doi.as_deref(), paper.url.as_deref()) {
        out.push(' ');
        out.push_str(&link);
    }

    out
}

// Terminate with a period unless the text already ends a sentence.
fn sentence(text: &str) -> String {
    if text.ends_with(['.', '?', '!']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

impl Citation {
    /// Build the `index`-th citation (1-based) from a ranked paper.
    pub fn from_paper(index: usize, paper: &CandidatePaper) -> Self {
        Self {
            index,
            provider_id: paper.provider_id.clone(),
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            year: paper.year,
            venue: paper.venue.clone(),
            doi: paper.doi.clone(),
            url: paper.url.clone(),
            apa: format_apa(paper),
        }
    }
}

/// Plain-text bibliography, one numbered reference per line.
pub fn render_bibliography(citations: &[Citation]) -> String {
    let mut out = String::new();
    for citation in citations {
        out.push_str(&format!("{}. {}\n", citation.index, citation.apa));
    }
    out
}
