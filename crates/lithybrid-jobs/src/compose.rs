//! Extractive summary composition.
//!
//! Each ranked paper contributes a citation and, when it has an abstract, a
//! short snippet (its leading sentences). The summary is the "reduce" step:
//! a header naming the query, then a representative selection of snippets
//! (first, middle and last, then the longest distinct ones), each tagged
//! with its citation marker.

use std::collections::HashSet;
use std::fmt::Write as _;

use thiserror::Error;

use lithybrid_core::{defaults, CandidatePaper, Citation, JobOutput};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("summary is {bytes} bytes, limit is {max}")]
    TooLarge { bytes: usize, max: usize },
}

/// First `sentences` sentences of `text`, whitespace-collapsed and cut to
/// at most `max_chars` characters. `None` for blank text.
pub fn extract_snippet(text: &str, sentences: usize, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    let mut end = collapsed.len();
    let mut seen = 0;
    let mut chars = collapsed.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '?' | '!') && chars.peek().map_or(true, |(_, n)| *n == ' ') {
            seen += 1;
            if seen == sentences {
                end = i + c.len_utf8();
                break;
            }
        }
    }

    let snippet: String = collapsed[..end].chars().take(max_chars).collect();
    let snippet = snippet.trim_end().to_string();
    (!snippet.is_empty()).then_some(snippet)
}

/// Accumulates citations and snippets for one job.
#[derive(Debug)]
pub struct SummaryComposer {
    query: String,
    max_bytes: usize,
    citations: Vec<Citation>,
    /// `(citation index, snippet)` in ranked order.
    snippets: Vec<(usize, String)>,
    snippet_bytes: usize,
}

impl SummaryComposer {
    pub fn new(query: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            query: query.into(),
            max_bytes,
            citations: Vec::new(),
            snippets: Vec::new(),
            snippet_bytes: 0,
        }
    }

    pub fn citation_count(&self) -> usize {
        self.citations.len()
    }

    /// Add the next ranked paper.
    ///
    /// Fails once the collected snippets alone exceed the byte limit.
    pub fn push(&mut self, paper: &CandidatePaper) -> Result<(), ComposeError> {
        let index = self.citations.len() + 1;
        self.citations.push(Citation::from_paper(index, paper));

        let snippet = paper.abstract_text.as_deref().and_then(|text| {
            extract_snippet(text, defaults::SNIPPET_SENTENCES, defaults::SNIPPET_MAX_CHARS)
        });
        if let Some(snippet) = snippet {
            self.snippet_bytes += snippet.len();
            if self.snippet_bytes > self.max_bytes {
                return Err(ComposeError::TooLarge {
                    bytes: self.snippet_bytes,
                    max: self.max_bytes,
                });
            }
            self.snippets.push((index, snippet));
        }
        Ok(())
    }

    /// Positions of the snippets that make it into the summary, in output order.
    fn selection(&self) -> Vec<usize> {
        let n = self.snippets.len();
        if n == 0 {
            return Vec::new();
        }

        let mut picked: Vec<usize> = Vec::new();
        let mut texts: HashSet<&str> = HashSet::new();
        for pos in [0, n / 2, n - 1] {
            if texts.insert(self.snippets[pos].1.as_str()) {
                picked.push(pos);
            }
        }

        let mut rest: Vec<usize> = (0..n).filter(|pos| !picked.contains(pos)).collect();
        // Stable sort keeps ranked order among equal lengths.
        rest.sort_by(|a, b| self.snippets[*b].1.len().cmp(&self.snippets[*a].1.len()));
        for pos in rest {
            if picked.len() >= 3 + defaults::SUMMARY_EXTRA_SNIPPETS {
                break;
            }
            if texts.insert(self.snippets[pos].1.as_str()) {
                picked.push(pos);
            }
        }
        picked
    }

    /// Assemble the summary and hand back the full output.
    pub fn finish(self, papers_considered: usize) -> Result<JobOutput, ComposeError> {
        let mut summary = String::new();
        let _ = writeln!(
            summary,
            "Automatic map-reduce summary for query: \"{}\"",
            self.query
        );
        let _ = writeln!(
            summary,
            "Collected {} snippets from {} papers.",
            self.snippets.len(),
            self.citations.len()
        );

        let selection = self.selection();
        if selection.is_empty() {
            summary.push_str("\nNo abstracts were available; see the references.\n");
        } else {
            summary.push('\n');
            for pos in selection {
                let (index, snippet) = &self.snippets[pos];
                let _ = writeln!(summary, "- {} [{}]", snippet, index);
            }
        }

        if summary.len() > self.max_bytes {
            return Err(ComposeError::TooLarge {
                bytes: summary.len(),
                max: self.max_bytes,
            });
        }

        Ok(JobOutput {
            summary,
            citations: self.citations,
            papers_considered,
        })
    }
}
