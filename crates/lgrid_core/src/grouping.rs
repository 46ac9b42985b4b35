use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{FieldProvider, Value};

/// Ordered group levels. Each level groups by one or more column keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupLevels {
    levels: Vec<Vec<String>>,
}

impl GroupLevels {
    pub fn new(levels: Vec<Vec<String>>) -> Self {
        let mut groups = Self::default();
        for level in levels {
            groups.add_level(level);
        }
        groups
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// All grouped keys, level by level.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.levels.iter().flatten()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    /// Appends a level. Empty levels are ignored.
    pub fn add_level(&mut self, keys: Vec<String>) -> bool {
        if keys.is_empty() {
            return false;
        }
        self.levels.push(keys);
        true
    }

    pub fn remove_level(&mut self, level: usize) -> Option<Vec<String>> {
        if level < self.levels.len() {
            Some(self.levels.remove(level))
        } else {
            None
        }
    }

    /// Removes a key from whichever level holds it, dropping emptied levels.
    pub fn remove_key(&mut self, key: &str) -> bool {
        let before = self.keys().count();
        for level in &mut self.levels {
            level.retain(|k| k != key);
        }
        self.levels.retain(|level| !level.is_empty());
        before != self.keys().count()
    }

    pub fn move_level(&mut self, from: usize, to: usize) -> bool {
        if from >= self.levels.len() || to >= self.levels.len() {
            return false;
        }
        let level = self.levels.remove(from);
        self.levels.insert(to, level);
        true
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Drops keys that are no longer part of the column set.
    pub fn retain_known(&mut self, known: impl Fn(&str) -> bool) {
        for level in &mut self.levels {
            level.retain(|k| known(k));
        }
        self.levels.retain(|level| !level.is_empty());
    }
}

/// A row as presented by the grid body: either a group header or an item.
#[derive(Debug, PartialEq)]
pub enum GridRow<'a, T> {
    Group {
        level: usize,
        /// Key values of every level down to this one.
        path: Vec<Value>,
        row_count: usize,
        collapsed: bool,
    },
    Item {
        /// Position of the item in the loaded page.
        index: usize,
        item: &'a T,
    },
}

/// Collapsed group paths.
#[derive(Debug, Clone, Default)]
pub struct GroupCollapseState {
    collapsed: HashSet<Vec<String>>,
}

impl GroupCollapseState {
    fn path_key(path: &[Value]) -> Vec<String> {
        path.iter().map(Value::as_display_string).collect()
    }

    pub fn is_collapsed(&self, path: &[Value]) -> bool {
        self.collapsed.contains(&Self::path_key(path))
    }

    /// Returns the new collapsed state of the path.
    pub fn toggle(&mut self, path: &[Value]) -> bool {
        let key = Self::path_key(path);
        if !self.collapsed.remove(&key) {
            self.collapsed.insert(key);
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.collapsed.clear();
    }
}

/// Interleaves group headers with the (already group-sorted) page rows.
///
/// `fields` maps each group level to the item fields of its keys.
pub fn group_rows<'a, T>(
    data: &'a [T],
    level_fields: &[Vec<String>],
    provider: &dyn FieldProvider<T>,
    collapse: &GroupCollapseState,
) -> Vec<GridRow<'a, T>> {
    if level_fields.is_empty() {
        return data
            .iter()
            .enumerate()
            .map(|(index, item)| GridRow::Item { index, item })
            .collect();
    }

    let level_value = |item: &T, level: usize| -> Value {
        let values: Vec<Value> = level_fields[level]
            .iter()
            .map(|field| provider.value(item, field))
            .collect();
        if values.len() == 1 {
            values.into_iter().next().unwrap_or_default()
        } else {
            Value::Text(
                values
                    .iter()
                    .map(Value::as_display_string)
                    .collect::<Vec<_>>()
                    .join(" / "),
            )
        }
    };

    let paths: Vec<Vec<Value>> = data
        .iter()
        .map(|item| {
            (0..level_fields.len())
                .map(|level| level_value(item, level))
                .collect()
        })
        .collect();

    let mut rows = Vec::with_capacity(data.len() * 2);
    let mut previous: Option<&Vec<Value>> = None;

    for (index, item) in data.iter().enumerate() {
        let path = &paths[index];

        let first_changed = match previous {
            None => 0,
            Some(prev) => prev
                .iter()
                .zip(path.iter())
                .position(|(a, b)| a != b)
                .unwrap_or(level_fields.len()),
        };

        let mut hidden = false;
        for level in 0..level_fields.len() {
            let prefix = &path[..=level];
            let collapsed_above = (0..level).any(|l| collapse.is_collapsed(&path[..=l]));
            if collapsed_above {
                hidden = true;
                break;
            }

            if level >= first_changed {
                let row_count = paths[index..]
                    .iter()
                    .take_while(|p| p[..=level] == *prefix)
                    .count();
                rows.push(GridRow::Group {
                    level,
                    path: prefix.to_vec(),
                    row_count,
                    collapsed: collapse.is_collapsed(prefix),
                });
            }
        }

        let last = level_fields.len() - 1;
        if !hidden && !collapse.is_collapsed(&path[..=last]) {
            rows.push(GridRow::Item { index, item });
        }

        previous = Some(path);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellValueType, StaticFields};

    #[derive(Debug, Default, PartialEq)]
    struct Row {
        city: &'static str,
        name: &'static str,
    }

    fn provider() -> StaticFields<Row> {
        StaticFields::new()
            .field("City", CellValueType::Text, |r: &Row| Value::from(r.city))
            .field("Name", CellValueType::Text, |r: &Row| Value::from(r.name))
    }

    #[test]
    fn levels_deduplicate_on_removal() {
        let mut groups = GroupLevels::new(vec![vec!["a".into()], vec!["b".into(), "c".into()]]);
        assert!(groups.contains("c"));
        assert!(groups.remove_key("a"));
        assert_eq!(groups.levels(), &[vec!["b".to_string(), "c".to_string()]]);
        assert!(!groups.add_level(vec![]));
        assert!(groups.move_level(0, 0));
    }

    #[test]
    fn headers_are_inserted_on_key_change() {
        let data = vec![
            Row { city: "Lyon", name: "a" },
            Row { city: "Lyon", name: "b" },
            Row { city: "Nice", name: "c" },
        ];
        let provider = provider();
        let collapse = GroupCollapseState::default();

        let rows = group_rows(&data, &[vec!["City".into()]], &provider, &collapse);
        assert_eq!(rows.len(), 5);
        assert!(matches!(rows[0], GridRow::Group { row_count: 2, .. }));
        assert!(matches!(rows[1], GridRow::Item { index: 0, .. }));
        assert!(matches!(rows[3], GridRow::Group { row_count: 1, .. }));
    }

    #[test]
    fn collapsed_groups_hide_items() {
        let data = vec![
            Row { city: "Lyon", name: "a" },
            Row { city: "Lyon", name: "b" },
            Row { city: "Nice", name: "c" },
        ];
        let provider = provider();
        let mut collapse = GroupCollapseState::default();
        assert!(collapse.toggle(&[Value::from("Lyon")]));

        let rows = group_rows(&data, &[vec!["City".into()]], &provider, &collapse);
        assert_eq!(rows.len(), 3);
        assert!(matches!(rows[0], GridRow::Group { collapsed: true, .. }));
        assert!(matches!(rows[2], GridRow::Item { index: 2, .. }));
    }
}
