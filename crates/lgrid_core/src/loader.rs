use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    CancelToken, DataPage, DataRequest, FieldProvider, GridError, SortDirection, Value, aggregate,
};

/// Produces pages for the grid. Implemented over an in-memory collection
/// ([`LocalLoader`]) and over HTTP ([`crate::RemoteLoader`]).
#[async_trait]
pub trait DataPageLoader<T>: Send + Sync {
    async fn get_data_page(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<DataPage<T>, GridError>;

    /// Distinct, sorted values of `field` among the rows matching
    /// `request.filter`, used to populate filter pickers.
    async fn get_selector_values(
        &self,
        field: &str,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>, GridError>;

    async fn get_calculations(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<IndexMap<String, Value>, GridError>;
}

/// In-memory collection shared between the grid, its loader and its row
/// controller. Guards are never held across an await; a lock poisoned by a
/// panicking writer is recovered.
pub struct SharedItems<T> {
    items: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for SharedItems<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> SharedItems<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        match self.items.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        match self.items.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<T: Clone> SharedItems<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.read().clone()
    }
}

/// Evaluates requests against a snapshot of an in-memory collection:
/// filter, then sort, then skip/take.
pub struct LocalLoader<T> {
    items: SharedItems<T>,
    provider: Arc<dyn FieldProvider<T>>,
}

impl<T> LocalLoader<T> {
    pub fn new(items: SharedItems<T>, provider: Arc<dyn FieldProvider<T>>) -> Self {
        Self { items, provider }
    }

    pub fn items(&self) -> &SharedItems<T> {
        &self.items
    }

    fn filtered<'a>(&self, snapshot: &'a [T], request: &DataRequest) -> Vec<&'a T> {
        snapshot
            .iter()
            .filter(|item| {
                request
                    .filter
                    .matches(|field| self.provider.value(item, field))
            })
            .collect()
    }

    fn sort(&self, rows: &mut [&T], request: &DataRequest) {
        if request.sort.is_empty() {
            return;
        }

        // Resolve accessors once per sort key instead of once per comparison.
        let keys: Vec<_> = request
            .sort
            .iter()
            .filter(|s| s.direction.is_active())
            .filter_map(|s| self.provider.field(&s.field).map(|d| (d, s.direction)))
            .collect();

        rows.sort_by(|a, b| {
            for (definition, direction) in &keys {
                let ordering = definition.value(a).cmp(&definition.value(b));
                let ordering = match direction {
                    SortDirection::Descending => ordering.reverse(),
                    _ => ordering,
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
    }
}

#[async_trait]
impl<T> DataPageLoader<T> for LocalLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get_data_page(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<DataPage<T>, GridError> {
        cancel.check()?;

        let snapshot = self.items.snapshot();
        let mut rows = self.filtered(&snapshot, request);
        cancel.check()?;

        self.sort(&mut rows, request);
        cancel.check()?;

        let (total_rows, active_rows) = if request.count_rows {
            (Some(snapshot.len() as i64), Some(rows.len() as i64))
        } else {
            (None, None)
        };

        let calculation_values =
            aggregate::calculate_all(&rows, &request.calculations, |item, field| {
                self.provider.value(item, field)
            });

        let take = if request.page_size == 0 {
            usize::MAX
        } else {
            request.page_size
        };

        let data: Vec<T> = rows
            .into_iter()
            .skip(request.skip())
            .take(take)
            .cloned()
            .collect();

        log::debug!(
            "Local page {} ({} rows of {:?} active)",
            request.page,
            data.len(),
            active_rows
        );

        Ok(DataPage {
            data,
            total_rows,
            active_rows,
            current_page: request.page,
            page_size: request.page_size,
            calculation_values,
        })
    }

    async fn get_selector_values(
        &self,
        field: &str,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>, GridError> {
        cancel.check()?;

        let snapshot = self.items.snapshot();
        let mut values: Vec<Value> = self
            .filtered(&snapshot, request)
            .into_iter()
            .map(|item| self.provider.value(item, field))
            .collect();

        values.sort();
        values.dedup();
        Ok(values)
    }

    async fn get_calculations(
        &self,
        request: &DataRequest,
        cancel: &CancelToken,
    ) -> Result<IndexMap<String, Value>, GridError> {
        cancel.check()?;

        let snapshot = self.items.snapshot();
        let rows = self.filtered(&snapshot, request);
        Ok(aggregate::calculate_all(
            &rows,
            &request.calculations,
            |item, field| self.provider.value(item, field),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CalculationOption, CalculationType, CellValueType, ColumnFilter, FilterClause,
        ModelFilter, SortOption, StaticFields,
    };

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Item {
        name: String,
        status: &'static str,
        amount: i64,
    }

    fn loader(count: usize) -> LocalLoader<Item> {
        let items = (0..count)
            .map(|i| Item {
                name: format!("item-{:02}", i),
                status: if i % 2 == 0 { "Active" } else { "Closed" },
                amount: i as i64,
            })
            .collect();

        let provider = StaticFields::<Item>::new()
            .field("Name", CellValueType::Text, |i| Value::from(&i.name))
            .field("Status", CellValueType::Text, |i| Value::from(i.status))
            .field("Amount", CellValueType::Integer, |i| Value::Int(i.amount));

        LocalLoader::new(SharedItems::new(items), Arc::new(provider))
    }

    fn active_filter() -> ModelFilter {
        ModelFilter {
            clauses: vec![FilterClause {
                column_key: "Status".into(),
                field: "Status".into(),
                filter: ColumnFilter::Equals(Value::from("Active")),
            }],
        }
    }

    #[test]
    fn shared_items_recover_from_a_poisoned_lock() {
        let items = SharedItems::new(vec![1, 2]);
        let writer = items.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = writer.write();
            panic!("writer crashed");
        })
        .join();
        assert!(crashed.is_err());

        items.write().push(3);
        assert_eq!(items.snapshot(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn filters_sorts_and_pages() {
        let loader = loader(10);
        let request = DataRequest {
            filter: active_filter(),
            sort: vec![SortOption::desc("Amount", "Amount")],
            calculations: vec![CalculationOption {
                column_key: "Amount".into(),
                field: "Amount".into(),
                calculation: CalculationType::Sum,
            }],
            ..DataRequest::default()
        }
        .with_page(2, 2);

        let page = loader
            .get_data_page(&request, &CancelToken::new())
            .await
            .expect("page");

        let amounts: Vec<i64> = page.data.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![4, 2]);
        assert_eq!(page.total_rows, Some(10));
        assert_eq!(page.active_rows, Some(5));
        assert_eq!(page.calculation_values.get("Amount"), Some(&Value::Int(20)));
        assert!(page.respects_page_size());
    }

    #[tokio::test]
    async fn counting_can_be_disabled() {
        let loader = loader(3);
        let request = DataRequest {
            count_rows: false,
            ..DataRequest::default()
        };
        let page = loader
            .get_data_page(&request, &CancelToken::new())
            .await
            .expect("page");
        assert_eq!(page.data.len(), 3);
        assert_eq!(page.total_rows, None);
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let loader = loader(3);
        let token = CancelToken::new();
        token.cancel();
        let result = loader.get_data_page(&DataRequest::default(), &token).await;
        assert!(matches!(result, Err(GridError::Cancelled)));
    }

    #[tokio::test]
    async fn selector_values_are_distinct() {
        let loader = loader(6);
        let values = loader
            .get_selector_values("Status", &DataRequest::default(), &CancelToken::new())
            .await
            .expect("values");
        assert_eq!(values, vec![Value::from("Active"), Value::from("Closed")]);
    }
}
