use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config;
use crate::database::entity::Entity;
use crate::database::query::{DateBound, EntityQuery};
use crate::database::repository::{RepoError, Repository};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Invalid page size: {0}")]
    InvalidPageSize(i64),

    #[error("Invalid page index: {0}")]
    InvalidPageIndex(i64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One page of results plus navigation metadata. `count` is the size of this
/// page; `total_count` counts every matching row before pagination.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub total_count: i64,
    pub total_page: i64,
    pub page_index: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn assemble(results: Vec<T>, total_count: i64, page_index: i64, page_size: i64) -> Self {
        Self {
            count: results.len() as i64,
            total_count,
            total_page: (total_count + page_size - 1) / page_size,
            page_index,
            page_size,
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            total_count: self.total_count,
            total_page: self.total_page,
            page_index: self.page_index,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// Caller-facing listing parameters: 1-based page index, page size, optional
/// substring search, optional created-date range, and free-form exact-match
/// fields. Pagination-only keys never reach the exact-match filter set.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageFilter {
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub date_from: Option<DateBound>,
    pub date_to: Option<DateBound>,
    #[serde(skip)]
    pub fields: Map<String, Value>,
}

impl PageFilter {
    pub fn page_index(&self) -> i64 {
        self.page_index.unwrap_or(1)
    }

    /// Requested size, clamped to the configured ceiling.
    pub fn page_size(&self) -> i64 {
        let pagination = &config::config().pagination;
        self.page_size
            .unwrap_or(pagination.default_page_size)
            .min(pagination.max_page_size)
    }

    pub fn date_range(&self) -> Option<(DateBound, DateBound)> {
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        if !value.is_null() {
            self.fields.insert(name.to_string(), value);
        }
        self
    }
}

fn check_page_size(page_size: i64) -> Result<(), PageError> {
    if page_size <= 0 {
        return Err(PageError::InvalidPageSize(page_size));
    }
    Ok(())
}

/// Checked `(page_index - 1) * page_size`. Both values are caller-supplied;
/// an index large enough to overflow the offset is rejected, never wrapped.
fn page_offset(page_index: i64, page_size: i64) -> Result<i64, PageError> {
    page_index
        .checked_sub(1)
        .and_then(|i| i.checked_mul(page_size))
        .ok_or(PageError::InvalidPageIndex(page_index))
}

pub struct Paginator;

impl Paginator {
    /// Apply offset/limit to the filtered query and count the same query
    /// unpaginated. A page index past the end yields an empty result list
    /// with the total untouched.
    pub async fn get_page<T: Entity>(
        repo: &Repository<T>,
        query: EntityQuery,
        page_index: i64,
        page_size: i64,
    ) -> Result<Page<T>, PageError> {
        check_page_size(page_size)?;
        let page_index = page_index.max(1);
        let offset = page_offset(page_index, page_size)?;

        let total_count = repo.count(&query).await?;

        let mut page_query = query;
        page_query.limit(page_size).map_err(RepoError::from)?;
        page_query.offset(offset).map_err(RepoError::from)?;
        let results = repo.select(&page_query).await?;

        Ok(Page::assemble(results, total_count, page_index, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_yields_empty_page() {
        let page: Page<i32> = Page::assemble(vec![], 0, 1, 10);
        assert_eq!(page.count, 0);
        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_page, 0);
        assert!(page.results.is_empty());
    }

    #[test]
    fn twenty_five_items_across_pages_of_ten() {
        // page 1: full page
        let page = Page::assemble((0..10).collect::<Vec<_>>(), 25, 1, 10);
        assert_eq!(page.count, 10);
        assert_eq!(page.total_page, 3);

        // page 3: remainder
        let page = Page::assemble((0..5).collect::<Vec<_>>(), 25, 3, 10);
        assert_eq!(page.count, 5);
        assert_eq!(page.total_page, 3);

        // page 4: past the end, total unchanged
        let page = Page::assemble(Vec::<i32>::new(), 25, 4, 10);
        assert_eq!(page.count, 0);
        assert_eq!(page.total_count, 25);
        assert_eq!(page.total_page, 3);
    }

    #[test]
    fn exact_multiple_has_no_phantom_page() {
        let page = Page::assemble((0..10).collect::<Vec<_>>(), 30, 1, 10);
        assert_eq!(page.total_page, 3);
    }

    #[test]
    fn non_positive_page_size_is_a_caller_error() {
        assert!(matches!(check_page_size(0), Err(PageError::InvalidPageSize(0))));
        assert!(matches!(check_page_size(-5), Err(PageError::InvalidPageSize(-5))));
        assert!(check_page_size(10).is_ok());
    }

    #[test]
    fn huge_page_index_is_rejected_not_wrapped() {
        assert!(matches!(
            page_offset(i64::MAX, 10),
            Err(PageError::InvalidPageIndex(i64::MAX))
        ));
        assert_eq!(page_offset(3, 10).unwrap(), 20);
        assert_eq!(page_offset(1, 10).unwrap(), 0);
    }

    #[test]
    fn page_filter_defaults() {
        let filter = PageFilter::default();
        assert_eq!(filter.page_index(), 1);
        assert_eq!(filter.page_size(), 10);
    }

    #[test]
    fn page_size_is_clamped_to_configured_max() {
        let max = config::config().pagination.max_page_size;
        let filter = PageFilter {
            page_size: Some(max + 1),
            ..Default::default()
        };
        assert_eq!(filter.page_size(), max);

        // Non-positive sizes still reach the explicit page-size check
        let filter = PageFilter {
            page_size: Some(-5),
            ..Default::default()
        };
        assert_eq!(filter.page_size(), -5);
    }

    #[test]
    fn map_preserves_page_metadata_and_order() {
        let page = Page::assemble(vec![3, 1, 2], 3, 1, 10);
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.results, vec![30, 10, 20]);
        assert_eq!(mapped.count, 3);
        assert_eq!(mapped.total_count, 3);
    }
}
