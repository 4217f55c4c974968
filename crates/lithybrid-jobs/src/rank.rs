//! Candidate ranking.

use std::collections::HashSet;

use lithybrid_core::CandidatePaper;

/// Deduplicate by provider id, then order by citation count (desc),
/// publication year (desc, unknown last), and provider order; keep `limit`.
pub fn rank(candidates: Vec<CandidatePaper>, limit: usize) -> Vec<CandidatePaper> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<(usize, CandidatePaper)> = candidates
        .into_iter()
        .filter(|paper| seen.insert(paper.provider_id.clone()))
        .enumerate()
        .collect();

    ranked.sort_by(|(pos_a, a), (pos_b, b)| {
        b.citation_count
            .unwrap_or(0)
            .cmp(&a.citation_count.unwrap_or(0))
            .then_with(|| b.year.cmp(&a.year))
            .then_with(|| pos_a.cmp(pos_b))
    });
    ranked.truncate(limit);
    ranked.into_iter().map(|(_, paper)| paper).collect()
}
