//! Deduplication of overlapping sub-query results.

use std::collections::HashSet;

use crate::facet::{QueryGroup, SearchHit, SubqueryHits};

/// A retained hit and where it was first seen.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedHit {
    pub natural_key: String,
    pub hit: SearchHit,
    pub group: QueryGroup,
}

/// Hits a query group returned, and how many of them were new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupContribution {
    pub group: QueryGroup,
    pub raw: usize,
    pub new_unique: usize,
}

/// Fraction of an expected catalog size covered by the unique set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub expected: usize,
    pub unique: usize,
}

impl Coverage {
    /// `unique / expected`, 0 when nothing is expected.
    pub fn ratio(&self) -> f64 {
        match self.expected {
            0 => 0.0,
            n => self.unique as f64 / n as f64,
        }
    }

    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.unique)
    }

    pub fn is_complete(&self) -> bool {
        self.unique >= self.expected
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Retained hits, in first-seen order.
    pub hits: Vec<MergedHit>,
    pub raw_count: usize,
    pub unique_count: usize,
    /// Hits without a natural key; counted in `raw_count`, never retained.
    pub keyless: usize,
    /// One entry per group, in order of first appearance.
    pub contributions: Vec<GroupContribution>,
    pub truncated_queries: usize,
    pub failed_queries: usize,
}

impl MergeReport {
    pub fn duplicates_removed(&self) -> usize {
        self.raw_count - self.unique_count
    }

    /// `(raw - unique) / raw`, 0 when there were no hits.
    pub fn overlap_ratio(&self) -> f64 {
        match self.raw_count {
            0 => 0.0,
            n => self.duplicates_removed() as f64 / n as f64,
        }
    }

    pub fn coverage(&self, expected_total: usize) -> Coverage {
        Coverage {
            expected: expected_total,
            unique: self.unique_count,
        }
    }

    pub fn contribution(&self, group: &QueryGroup) -> Option<&GroupContribution> {
        self.contributions.iter().find(|c| &c.group == group)
    }
}

/// Merges sub-query hits keeping the first occurrence of each natural key.
pub struct ResultAggregator {
    natural_key: String,
}

impl ResultAggregator {
    pub fn new(natural_key: impl Into<String>) -> Self {
        Self {
            natural_key: natural_key.into(),
        }
    }

    /// Later duplicates are dropped without comparing their content.
    pub fn merge(&self, results: &[SubqueryHits]) -> MergeReport {
        let mut report = MergeReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for sub in results {
            if sub.truncated {
                report.truncated_queries += 1;
            }
            if sub.error.is_some() {
                report.failed_queries += 1;
            }

            let slot = match report
                .contributions
                .iter()
                .position(|c| c.group == sub.query.group)
            {
                Some(i) => i,
                None => {
                    report.contributions.push(GroupContribution {
                        group: sub.query.group.clone(),
                        raw: 0,
                        new_unique: 0,
                    });
                    report.contributions.len() - 1
                }
            };

            for hit in &sub.hits {
                report.raw_count += 1;
                report.contributions[slot].raw += 1;

                let Some(key) = hit.attribute(&self.natural_key) else {
                    report.keyless += 1;
                    continue;
                };

                if seen.insert(key.clone()) {
                    report.contributions[slot].new_unique += 1;
                    report.hits.push(MergedHit {
                        natural_key: key,
                        hit: hit.clone(),
                        group: sub.query.group.clone(),
                    });
                }
            }
        }

        report.unique_count = report.hits.len();
        tracing::info!(
            raw = report.raw_count,
            unique = report.unique_count,
            keyless = report.keyless,
            "Merged sub-query results"
        );
        report
    }
}
