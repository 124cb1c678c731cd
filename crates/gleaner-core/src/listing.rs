//! Replays merged listing hits through the harvest orchestrator.
//!
//! The listing catalog is fetched in bulk by the facet planner, but its
//! results still go through the same mode rules, snapshot archive and
//! failure ledger as the per-page catalogs. [`ListingPipeline`] serves the
//! already-fetched records from memory as a [`FetchParse`].

use std::collections::HashMap;

use crate::aggregate::MergeReport;
use crate::facet::SearchHit;
use crate::models::{ParseOutcome, RawPayload, Record, WorkKey};
use crate::source::WorkKeySource;
use crate::traits::FetchParse;

pub struct ListingPipeline {
    entries: HashMap<WorkKey, (Record, RawPayload)>,
    order: Vec<WorkKey>,
}

impl ListingPipeline {
    /// Builds the pipeline from `(key, record, raw)` triples; the first
    /// triple for a key wins.
    pub fn new(items: impl IntoIterator<Item = (WorkKey, Record, RawPayload)>) -> Self {
        let mut entries = HashMap::new();
        let mut order = Vec::new();
        for (key, record, raw) in items {
            if entries.contains_key(&key) {
                continue;
            }
            order.push(key.clone());
            entries.insert(key, (record, raw));
        }
        Self { entries, order }
    }

    /// Converts each retained hit with `convert`; the natural key becomes the
    /// work key and the hit's JSON the snapshot.
    pub fn from_merge<C>(report: &MergeReport, convert: C) -> Self
    where
        C: Fn(&SearchHit) -> Record,
    {
        Self::new(report.hits.iter().map(|merged| {
            (
                WorkKey::Code(merged.natural_key.clone()),
                convert(&merged.hit),
                RawPayload(merged.hit.to_json()),
            )
        }))
    }

    /// Keys in merged order.
    pub fn keys(&self) -> &[WorkKey] {
        &self.order
    }

    /// A work-key source covering every listed key.
    pub fn source(&self) -> WorkKeySource {
        WorkKeySource::List(self.order.iter().map(WorkKey::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FetchParse for ListingPipeline {
    async fn fetch_parse(&self, key: &WorkKey) -> ParseOutcome {
        match self.entries.get(key) {
            Some((record, _)) if record.is_blank() => {
                ParseOutcome::NoData("Listing hit has no usable fields".to_string())
            }
            Some((record, raw)) => ParseOutcome::Success {
                record: record.clone(),
                raw: raw.clone(),
            },
            None => ParseOutcome::NoData("Key not present in merged listing".to_string()),
        }
    }
}
