//! Translates column state into storage-independent data requests.
//!
//! The composer only reads [`ColumnSet`] and [`GroupLevels`]; the resulting
//! [`DataRequest`] is evaluated in memory by the local loader or serialized
//! to the remote controller.

use serde::{Deserialize, Serialize};

use crate::{
    CalculationType, ColumnSet, FilterClause, GridFeatures, GroupLevels, MAX_SORTED_COLUMNS,
    ModelFilter, SortDirection,
};

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub column_key: String,
    pub field: String,
    pub direction: SortDirection,
}

impl SortOption {
    pub fn asc(column_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            column_key: column_key.into(),
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            column_key: column_key.into(),
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Aggregate requested for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationOption {
    pub column_key: String,
    pub field: String,
    pub calculation: CalculationType,
}

/// Everything a loader needs to produce one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Fields the caller needs populated; empty means all.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filter: ModelFilter,
    #[serde(default)]
    pub sort: Vec<SortOption>,
    /// 1-based page number.
    pub page: usize,
    /// Rows per page; 0 returns every row.
    pub page_size: usize,
    #[serde(default)]
    pub calculations: Vec<CalculationOption>,
    #[serde(default = "default_count_rows")]
    pub count_rows: bool,
}

fn default_count_rows() -> bool {
    true
}

impl Default for DataRequest {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            filter: ModelFilter::default(),
            sort: Vec::new(),
            page: 1,
            page_size: 0,
            calculations: Vec::new(),
            count_rows: true,
        }
    }
}

impl DataRequest {
    /// Number of rows to skip before the requested page.
    pub fn skip(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.page.saturating_sub(1) * self.page_size
        }
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page.max(1);
        self.page_size = page_size;
        self
    }
}

/// Builds filter, sort and calculation requests from the grid state.
pub struct QueryComposer<'a> {
    columns: &'a ColumnSet,
    groups: &'a GroupLevels,
    features: GridFeatures,
}

impl<'a> QueryComposer<'a> {
    pub fn new(columns: &'a ColumnSet, groups: &'a GroupLevels, features: GridFeatures) -> Self {
        Self {
            columns,
            groups,
            features,
        }
    }

    /// Conjunction of all active column filters, skipping `ignored`.
    ///
    /// Pass the column whose own filter picker is being populated as
    /// `ignored` so the column does not filter against itself.
    pub fn model_filter(&self, ignored: Option<&str>) -> ModelFilter {
        if !self.features.contains(GridFeatures::FILTER) {
            return ModelFilter::default();
        }

        let clauses = self
            .columns
            .ordered()
            .into_iter()
            .filter(|c| c.allow_filter && c.has_active_filter())
            .filter(|c| ignored != Some(c.unique_key.as_str()))
            .filter_map(|c| {
                c.filter.clone().map(|filter| FilterClause {
                    column_key: c.unique_key.clone(),
                    field: c.field.clone(),
                    filter,
                })
            })
            .collect();

        ModelFilter { clauses }
    }

    /// Group keys first (ascending, deduplicated), then up to
    /// [`MAX_SORTED_COLUMNS`] user sorts by `sorting_order`. A user sort on a
    /// column already present from grouping overrides its direction in place.
    pub fn sort_options(&self) -> Vec<SortOption> {
        let mut options: Vec<SortOption> = Vec::new();

        if self.features.contains(GridFeatures::GROUP) {
            for key in self.groups.keys() {
                if options.iter().any(|o| o.column_key == *key) {
                    continue;
                }
                if let Some(column) = self.columns.get(key) {
                    options.push(SortOption::asc(&column.unique_key, &column.field));
                }
            }
        }

        if !self.features.contains(GridFeatures::SORT) {
            return options;
        }

        let mut sorted: Vec<_> = self
            .columns
            .iter()
            .filter(|c| c.allow_sort && c.sort_direction.is_active())
            .collect();
        sorted.sort_by_key(|c| (c.sorting_order.unwrap_or(usize::MAX), c.index));

        for column in sorted.into_iter().take(MAX_SORTED_COLUMNS) {
            match options
                .iter_mut()
                .find(|o| o.column_key == column.unique_key)
            {
                Some(existing) => existing.direction = column.sort_direction,
                None => options.push(SortOption {
                    column_key: column.unique_key.clone(),
                    field: column.field.clone(),
                    direction: column.sort_direction,
                }),
            }
        }

        options
    }

    pub fn calculation_options(&self) -> Vec<CalculationOption> {
        if !self.features.contains(GridFeatures::CALCULATIONS) {
            return Vec::new();
        }

        self.columns
            .ordered()
            .into_iter()
            .filter(|c| c.calculation.is_active())
            .map(|c| CalculationOption {
                column_key: c.unique_key.clone(),
                field: c.field.clone(),
                calculation: c.calculation,
            })
            .collect()
    }

    /// Full request for one page.
    pub fn request(&self, page: usize, page_size: usize) -> DataRequest {
        let page_size = if self.features.contains(GridFeatures::PAGING) {
            page_size
        } else {
            0
        };

        DataRequest {
            fields: self
                .columns
                .iter()
                .filter(|c| c.visible)
                .map(|c| c.field.clone())
                .collect(),
            filter: self.model_filter(None),
            sort: self.sort_options(),
            page: page.max(1),
            page_size,
            calculations: self.calculation_options(),
            count_rows: self.features.contains(GridFeatures::COUNT_ROWS),
        }
    }

    /// Request used to fetch the candidate values of one column's filter.
    pub fn selector_request(&self, column_key: &str) -> DataRequest {
        DataRequest {
            fields: self
                .columns
                .get(column_key)
                .map(|c| vec![c.field.clone()])
                .unwrap_or_default(),
            filter: self.model_filter(Some(column_key)),
            sort: Vec::new(),
            page: 1,
            page_size: 0,
            calculations: Vec::new(),
            count_rows: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellValueType, ColumnFilter, ColumnState, Value};

    fn columns() -> ColumnSet {
        let mut amount = ColumnState::new("Amount", "Amount", 2);
        amount.value_type = CellValueType::Decimal;
        ColumnSet::new(vec![
            ColumnState::new("Name", "Name", 0),
            ColumnState::new("Status", "Status", 1),
            amount,
            ColumnState::new("City", "City", 3),
        ])
    }

    #[test]
    fn model_filter_skips_ignored_column() {
        let mut columns = columns();
        columns.set_filter("Status", Some(ColumnFilter::Equals(Value::from("Active"))));
        columns.set_filter("Name", Some(ColumnFilter::Contains("a".into())));
        let groups = GroupLevels::default();

        let composer = QueryComposer::new(&columns, &groups, GridFeatures::default());
        assert_eq!(composer.model_filter(None).len(), 2);

        let filter = composer.model_filter(Some("Status"));
        assert_eq!(filter.len(), 1);
        assert!(!filter.touches("Status"));
    }

    #[test]
    fn disabled_filter_feature_or_column_drops_clause() {
        let mut columns = columns();
        columns.set_filter("Status", Some(ColumnFilter::Equals(Value::from("Active"))));
        let groups = GroupLevels::default();

        let composer = QueryComposer::new(
            &columns,
            &groups,
            GridFeatures::default() - GridFeatures::FILTER,
        );
        assert!(composer.model_filter(None).is_empty());

        columns.get_mut("Status").unwrap().allow_filter = false;
        let composer = QueryComposer::new(&columns, &groups, GridFeatures::default());
        assert!(composer.model_filter(None).is_empty());
    }

    #[test]
    fn group_keys_sort_first_and_user_direction_wins() {
        let mut columns = columns();
        columns.toggle_sort("Name", true);
        columns.set_sort("City", SortDirection::Descending, true);

        let mut groups = GroupLevels::default();
        groups.add_level(vec!["City".into()]);
        groups.add_level(vec!["Status".into(), "City".into()]);

        let composer = QueryComposer::new(&columns, &groups, GridFeatures::default());
        let options = composer.sort_options();

        assert_eq!(
            options,
            vec![
                SortOption::desc("City", "City"),
                SortOption::asc("Status", "Status"),
                SortOption::asc("Name", "Name"),
            ]
        );
        assert_eq!(options, composer.sort_options());
    }

    #[test]
    fn calculation_options_follow_columns() {
        let mut columns = columns();
        columns.set_calculation("Amount", CalculationType::Sum);
        let groups = GroupLevels::default();

        let composer = QueryComposer::new(&columns, &groups, GridFeatures::default());
        let calculations = composer.calculation_options();
        assert_eq!(calculations.len(), 1);
        assert_eq!(calculations[0].calculation, CalculationType::Sum);

        let composer = QueryComposer::new(
            &columns,
            &groups,
            GridFeatures::default() - GridFeatures::CALCULATIONS,
        );
        assert!(composer.calculation_options().is_empty());
    }

    #[test]
    fn request_skip_uses_one_based_pages() {
        let request = DataRequest::default().with_page(2, 10);
        assert_eq!(request.skip(), 10);
        assert_eq!(DataRequest::default().with_page(3, 0).skip(), 0);
    }
}
