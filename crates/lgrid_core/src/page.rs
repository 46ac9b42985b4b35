use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Value;

/// Result of one data fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPage<T> {
    pub data: Vec<T>,
    /// Rows in the source before filtering. `None` or negative: not counted.
    #[serde(default)]
    pub total_rows: Option<i64>,
    /// Rows matching the filters.
    #[serde(default)]
    pub active_rows: Option<i64>,
    pub current_page: usize,
    pub page_size: usize,
    /// Aggregate per column key; only present when calculations were requested.
    #[serde(default)]
    pub calculation_values: IndexMap<String, Value>,
}

impl<T> DataPage<T> {
    pub fn empty(current_page: usize, page_size: usize) -> Self {
        Self {
            data: Vec::new(),
            total_rows: None,
            active_rows: None,
            current_page,
            page_size,
            calculation_values: IndexMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.data.len()
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows.filter(|n| *n >= 0).map(|n| n as u64)
    }

    pub fn active_rows(&self) -> Option<u64> {
        self.active_rows.filter(|n| *n >= 0).map(|n| n as u64)
    }

    /// `data.len() <= page_size` unless the page size is unlimited.
    pub fn respects_page_size(&self) -> bool {
        self.page_size == 0 || self.data.len() <= self.page_size
    }
}

/// 1-based pagination over a (possibly unknown) row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
    row_count: Option<u64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            row_count: None,
        }
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Default::default()
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn row_count(&self) -> Option<u64> {
        self.row_count
    }

    pub fn set_row_count(&mut self, row_count: Option<u64>) {
        self.row_count = row_count;
    }

    /// Number of pages, `None` when the row count is unknown.
    pub fn page_count(&self) -> Option<usize> {
        let rows = self.row_count? as usize;
        if self.page_size == 0 {
            return Some(1);
        }
        Some(rows.div_ceil(self.page_size).max(1))
    }

    pub fn is_first_page(&self) -> bool {
        self.page <= 1
    }

    pub fn is_last_page(&self) -> bool {
        self.page_count().is_some_and(|count| self.page >= count)
    }

    pub fn next(&mut self) -> bool {
        if self.is_last_page() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn previous(&mut self) -> bool {
        if self.is_first_page() {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Jumps to `page`, clamped to the known page range.
    pub fn go_to(&mut self, page: usize) -> bool {
        let mut target = page.max(1);
        if let Some(count) = self.page_count() {
            target = target.min(count);
        }
        let changed = target != self.page;
        self.page = target;
        changed
    }

    /// Changes the page size and returns to the first page.
    pub fn set_page_size(&mut self, page_size: usize) -> bool {
        if page_size == self.page_size {
            return false;
        }
        self.page_size = page_size;
        self.page = 1;
        true
    }

    /// Pulls the current page back inside the range after the row count shrank.
    pub fn clamp_to_rows(&mut self) -> bool {
        match self.page_count() {
            Some(count) if self.page > count => {
                self.page = count;
                true
            }
            _ => false,
        }
    }

    /// 1-based inclusive range of rows shown, e.g. `(11, 20)`.
    pub fn row_range(&self, rows_on_page: usize) -> Option<(u64, u64)> {
        if rows_on_page == 0 {
            return None;
        }
        let start = if self.page_size == 0 {
            1
        } else {
            ((self.page - 1) * self.page_size) as u64 + 1
        };
        Some((start, start + rows_on_page as u64 - 1))
    }
}

/// Counters and aggregates of the last applied page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageState {
    pub loading: bool,
    pub total_rows: Option<u64>,
    pub active_rows: Option<u64>,
    pub calculation_values: IndexMap<String, Value>,
}

impl PageState {
    pub fn apply<T>(&mut self, page: &DataPage<T>) {
        self.total_rows = page.total_rows();
        self.active_rows = page.active_rows();
        self.calculation_values = page.calculation_values.clone();
    }

    pub fn calculation(&self, column_key: &str) -> Option<&Value> {
        self.calculation_values.get(column_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_respects_bounds() {
        let mut p = Pagination::new(10);
        p.set_row_count(Some(25));
        assert_eq!(p.page_count(), Some(3));
        assert!(p.is_first_page());
        assert!(!p.previous());

        assert!(p.next());
        assert!(p.next());
        assert!(p.is_last_page());
        assert!(!p.next());
        assert_eq!(p.row_range(5), Some((21, 25)));

        assert!(p.go_to(1));
        assert!(!p.go_to(0));
        assert!(p.go_to(99));
        assert_eq!(p.page(), 3);
    }

    #[test]
    fn unknown_row_count_never_ends() {
        let mut p = Pagination::new(10);
        assert_eq!(p.page_count(), None);
        assert!(p.next());
        assert!(p.go_to(50));
        assert_eq!(p.page(), 50);
    }

    #[test]
    fn page_size_change_resets_page() {
        let mut p = Pagination::new(10);
        p.go_to(4);
        assert!(p.set_page_size(50));
        assert_eq!(p.page(), 1);
        assert!(!p.set_page_size(50));
    }

    #[test]
    fn shrinking_rows_clamps_page() {
        let mut p = Pagination::new(10);
        p.go_to(5);
        p.set_row_count(Some(12));
        assert!(p.clamp_to_rows());
        assert_eq!(p.page(), 2);
    }

    #[test]
    fn negative_counts_mean_unknown() {
        let mut page: DataPage<u8> = DataPage::empty(1, 10);
        page.total_rows = Some(-1);
        assert_eq!(page.total_rows(), None);
        assert!(page.respects_page_size());
    }
}
