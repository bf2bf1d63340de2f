//! Predicate narrowing and result limiting for image listings.

use crate::models::{image::ImageRecord, operation::ListRequest};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Conjunctive predicates applied to a listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub owner_id: Option<String>,
    pub content_type: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, record: &ImageRecord) -> bool {
        self.owner_id
            .as_deref()
            .is_none_or(|owner| record.owner_id == owner)
            && self
                .content_type
                .as_deref()
                .is_none_or(|ct| record.content_type == ct)
    }
}

impl From<&ListRequest> for ListFilter {
    fn from(req: &ListRequest) -> Self {
        Self {
            owner_id: non_empty(req.owner_id.as_deref()),
            content_type: non_empty(req.content_type.as_deref()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Resolve the requested limit: default when absent, clamped to `1..=MAX_LIST_LIMIT`.
pub fn effective_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

/// Keep matching records in input order, stopping after `limit` matches.
pub fn filter<I>(
    records: I,
    predicates: &ListFilter,
    limit: usize,
) -> impl Iterator<Item = ImageRecord>
where
    I: IntoIterator<Item = ImageRecord>,
{
    records
        .into_iter()
        .filter(move |record| predicates.matches(record))
        .take(limit)
}
