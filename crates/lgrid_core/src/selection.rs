use std::sync::Arc;

use crate::FieldAccessor;

/// Equality strategy used to match selected items.
pub type ItemComparer<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Selected items of a grid, matched through a configurable comparer.
///
/// In single-selection mode adding an item replaces the previous selection.
pub struct Selection<T> {
    items: Vec<T>,
    comparer: ItemComparer<T>,
    multiple: bool,
}

impl<T> Selection<T> {
    pub fn with_comparer(comparer: ItemComparer<T>, multiple: bool) -> Self {
        Self {
            items: Vec::new(),
            comparer,
            multiple,
        }
    }

    /// Compares items by a key field resolved once at configuration time.
    /// Rows with equal keys match, null keys included.
    pub fn with_key_field(accessor: FieldAccessor<T>, multiple: bool) -> Self
    where
        T: 'static,
    {
        let comparer: ItemComparer<T> =
            Arc::new(move |a: &T, b: &T| accessor(a) == accessor(b));
        Self::with_comparer(comparer, multiple)
    }

    /// Single selection applies when the grid shows neither a selection
    /// column nor a custom selection toolbar.
    pub fn is_multiple_for(selection_column: bool, custom_toolbar: bool) -> bool {
        selection_column || custom_toolbar
    }

    pub fn comparer(&self) -> ItemComparer<T> {
        Arc::clone(&self.comparer)
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.iter().any(|selected| (self.comparer)(selected, item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn remove(&mut self, item: &T) -> bool {
        match self
            .items
            .iter()
            .position(|selected| (self.comparer)(selected, item))
        {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear_all(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> Selection<T> {
    /// Adds an item unless it is already selected.
    pub fn add(&mut self, item: &T) -> bool {
        if self.contains(item) {
            return false;
        }
        if !self.multiple {
            self.items.clear();
        }
        self.items.push(item.clone());
        true
    }

    /// Returns whether the item is selected afterwards.
    pub fn toggle(&mut self, item: &T) -> bool {
        if self.remove(item) {
            return false;
        }
        self.add(item);
        true
    }

    /// Selects every item of the loaded page. In single-selection mode only
    /// the first item is kept.
    pub fn select_all(&mut self, page: &[T]) {
        for item in page {
            if !self.multiple && !self.items.is_empty() {
                break;
            }
            self.add(item);
        }
    }

    /// Drops the selected items that appear on the loaded page.
    pub fn clear_page(&mut self, page: &[T]) {
        for item in page {
            self.remove(item);
        }
    }

    /// Whether every item of the page is selected.
    pub fn all_selected(&self, page: &[T]) -> bool {
        !page.is_empty() && page.iter().all(|item| self.contains(item))
    }
}

impl<T: PartialEq + 'static> Selection<T> {
    /// Compares items with `PartialEq`.
    pub fn with_default_comparer(multiple: bool) -> Self {
        Self::with_comparer(Arc::new(|a: &T, b: &T| a == b), multiple)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("items", &self.items)
            .field("multiple", &self.multiple)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[derive(Debug, Clone, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    fn person(id: i64, name: &str) -> Person {
        Person {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn key_field_comparer_ignores_other_fields() {
        let mut selection = Selection::<Person>::with_key_field(Arc::new(|p: &Person| Value::Int(p.id)), true);
        selection.add(&person(1, "Ann"));

        assert!(selection.contains(&person(1, "Ann (edited)")));
        assert!(!selection.contains(&person(2, "Ann")));
        assert!(!selection.add(&person(1, "Other")));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn default_comparer_uses_value_equality() {
        let mut selection = Selection::with_default_comparer(true);
        selection.add(&person(1, "Ann"));
        assert!(selection.contains(&person(1, "Ann")));
        assert!(!selection.contains(&person(1, "Bob")));
    }

    #[test]
    fn single_selection_behaves_like_radio_buttons() {
        let mut selection = Selection::with_default_comparer(Selection::<Person>::is_multiple_for(false, false));
        selection.add(&person(1, "Ann"));
        selection.add(&person(2, "Bob"));

        assert_eq!(selection.items(), &[person(2, "Bob")]);

        selection.select_all(&[person(3, "Cid"), person(4, "Dee")]);
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn select_all_and_clear_operate_on_page() {
        let page = vec![person(1, "Ann"), person(2, "Bob")];
        let mut selection = Selection::with_default_comparer(true);
        selection.add(&person(9, "Zed"));

        selection.select_all(&page);
        assert_eq!(selection.len(), 3);
        assert!(selection.all_selected(&page));

        selection.clear_page(&page);
        assert_eq!(selection.items(), &[person(9, "Zed")]);

        selection.clear_all();
        assert!(selection.is_empty());
    }

    #[test]
    fn toggle_flips_membership() {
        let mut selection = Selection::with_default_comparer(true);
        assert!(selection.toggle(&person(1, "Ann")));
        assert!(!selection.toggle(&person(1, "Ann")));
        assert!(selection.is_empty());
    }

    #[test]
    fn null_key_rows_can_be_selected() {
        let mut selection = Selection::<Person>::with_key_field(Arc::new(|_: &Person| Value::Null), true);
        assert!(selection.add(&person(1, "Ann")));
        assert!(selection.contains(&person(1, "Ann")));
        assert!(selection.remove(&person(1, "Ann")));
        assert!(selection.is_empty());
    }
}
