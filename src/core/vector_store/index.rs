//! Optional HNSW accelerator for vector search (feature `ann`).
//!
//! The index only narrows the candidate set; threshold, payload filtering
//! and final ranking happen in the store so results are identical to the
//! exact-scan path.

use super::VectorRecord;
use hnsw_rs::prelude::*;
use std::collections::HashMap;

const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 64;

pub struct AnnIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    ids: Vec<String>,
}

impl AnnIndex {
    /// Build an index over the live records. Returns `None` for empty sets.
    pub fn build<'a, I>(records: I) -> Option<AnnIndex>
    where
        I: Iterator<Item = &'a VectorRecord>,
    {
        let records: Vec<&VectorRecord> = records.collect();
        if records.is_empty() {
            return None;
        }
        let hnsw = Hnsw::new(
            MAX_NB_CONNECTION,
            records.len().max(16),
            MAX_LAYER,
            EF_CONSTRUCTION,
            DistCosine {},
        );
        let mut ids = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            hnsw.insert_slice((&record.vector, position));
            ids.push(record.id.clone());
        }
        Some(AnnIndex { hnsw, ids })
    }

    fn nearest(&self, query: &[f32], count: usize) -> Vec<&str> {
        self.hnsw
            .search(query, count, EF_SEARCH)
            .into_iter()
            .filter_map(|neighbour| self.ids.get(neighbour.d_id).map(String::as_str))
            .collect()
    }
}

/// Candidate records for a query: index-narrowed when available, full scan
/// otherwise. Filtered searches always scan — the index cannot know which
/// neighbours the payload filter will discard, and a narrowed set could
/// starve the result.
pub fn candidates<'a>(
    index: Option<&AnnIndex>,
    records: &'a HashMap<String, VectorRecord>,
    query: &[f32],
    top_k: usize,
    has_filter: bool,
) -> Vec<&'a VectorRecord> {
    match index {
        Some(index) if !has_filter => {
            let fetch = (top_k.max(1)) * 8;
            index
                .nearest(query, fetch.min(records.len()))
                .into_iter()
                .filter_map(|id| records.get(id))
                .collect()
        }
        _ => records.values().collect(),
    }
}
