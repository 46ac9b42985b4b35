use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CalculationType, ColumnFilter, ColumnSet, ColumnWidth, GroupLevels, SortDirection};

/// Schema version written into every saved profile.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Label of the implicit profile at index 0.
pub const DEFAULT_PROFILE_LABEL: &str = "Default";

/// `{StateId}-{index}`
pub fn profile_id(state_id: &str, index: u32) -> String {
    format!("{}-{}", state_id, index)
}

pub fn default_profile_id(state_id: &str) -> String {
    profile_id(state_id, 0)
}

/// Index part of a profile id, if the id belongs to `state_id`.
pub fn profile_index(state_id: &str, id: &str) -> Option<u32> {
    id.strip_prefix(state_id)?.strip_prefix('-')?.parse().ok()
}

/// Storage key of the "last selected profile" pointer.
pub fn last_profile_key(state_id: &str) -> String {
    format!("{}-last-profile", state_id)
}

/// Persisted state of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileColumn {
    pub key: String,
    pub order: usize,
    pub visible: bool,
    pub width: ColumnWidth,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub sorting_order: Option<usize>,
    #[serde(default)]
    pub filter: Option<ColumnFilter>,
    #[serde(default)]
    pub calculation: CalculationType,
}

/// A named snapshot of a grid's layout, sort, filter, grouping and page size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridViewProfile {
    pub id: String,
    pub state_id: String,
    pub label: String,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub columns: Vec<ProfileColumn>,
    #[serde(default)]
    pub groups: GroupLevels,
    pub page_size: usize,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Bumped on every save.
    #[serde(default)]
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    PROFILE_SCHEMA_VERSION
}

impl GridViewProfile {
    pub fn new(state_id: &str, index: u32, label: impl Into<String>, is_shared: bool) -> Self {
        Self {
            id: profile_id(state_id, index),
            state_id: state_id.to_string(),
            label: label.into(),
            is_shared,
            columns: Vec::new(),
            groups: GroupLevels::default(),
            page_size: 0,
            version: PROFILE_SCHEMA_VERSION,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// The implicit default profile, captured from the grid's baseline state.
    pub fn default_for(
        state_id: &str,
        columns: &ColumnSet,
        groups: &GroupLevels,
        page_size: usize,
    ) -> Self {
        let mut profile = Self::new(state_id, 0, DEFAULT_PROFILE_LABEL, false);
        profile.capture(columns, groups, page_size);
        profile
    }

    pub fn index(&self) -> Option<u32> {
        profile_index(&self.state_id, &self.id)
    }

    pub fn is_default(&self) -> bool {
        self.index() == Some(0)
    }

    /// Overwrites the snapshot content with the current grid state. Returns
    /// whether anything changed.
    pub fn capture(&mut self, columns: &ColumnSet, groups: &GroupLevels, page_size: usize) -> bool {
        let captured: Vec<ProfileColumn> = columns
            .ordered()
            .into_iter()
            .map(|c| ProfileColumn {
                key: c.unique_key.clone(),
                order: c.order,
                visible: c.visible,
                width: c.calculated_width,
                frozen: c.frozen,
                sort_direction: c.sort_direction,
                sorting_order: c.sorting_order,
                filter: c.filter.clone(),
                calculation: c.calculation,
            })
            .collect();

        let changed =
            captured != self.columns || *groups != self.groups || page_size != self.page_size;

        self.columns = captured;
        self.groups = groups.clone();
        self.page_size = page_size;
        changed
    }

    /// Applies the snapshot to the grid state and returns the page size to use.
    ///
    /// Columns unknown to the grid are ignored; grid columns missing from the
    /// snapshot keep their current settings and are ordered after the
    /// snapshot's columns.
    pub fn apply(&self, columns: &mut ColumnSet, groups: &mut GroupLevels) -> usize {
        let mut ordered: Vec<&ProfileColumn> = self.columns.iter().collect();
        ordered.sort_by_key(|c| c.order);

        let mut keys = Vec::with_capacity(ordered.len());
        for saved in ordered {
            let Some(column) = columns.get_mut(&saved.key) else {
                log::debug!("Profile {} references unknown column {}", self.id, saved.key);
                continue;
            };

            column.visible = saved.visible || !column.allow_hide;
            column.calculated_width = saved.width;
            column.frozen = saved.frozen && column.visible;
            column.sort_direction = saved.sort_direction;
            column.sorting_order = saved
                .sort_direction
                .is_active()
                .then_some(saved.sorting_order.unwrap_or(usize::MAX));
            column.filter = saved.filter.clone().filter(|f| !f.is_blank());
            column.calculation = if saved.calculation.supports(column.value_type) {
                saved.calculation
            } else {
                CalculationType::None
            };
            keys.push(saved.key.clone());
        }

        columns.apply_key_order(&keys);
        columns.normalize_sorting();
        columns.update_header_spans();

        *groups = self.groups.clone();
        groups.retain_known(|key| columns.get(key).is_some());

        self.page_size
    }

    /// Whether `other` holds the same layout content, ignoring identity and
    /// bookkeeping fields.
    pub fn same_content(&self, other: &GridViewProfile) -> bool {
        self.columns == other.columns
            && self.groups == other.groups
            && self.page_size == other.page_size
    }

    pub fn mark_saved(&mut self) {
        self.revision += 1;
        self.version = PROFILE_SCHEMA_VERSION;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnState, Value};

    fn columns() -> ColumnSet {
        ColumnSet::new(vec![
            ColumnState::new("Name", "Name", 0),
            ColumnState::new("Status", "Status", 1),
            ColumnState::new("Amount", "Amount", 2),
        ])
    }

    #[test]
    fn ids_follow_state_id_pattern() {
        assert_eq!(profile_id("people", 3), "people-3");
        assert_eq!(profile_index("people", "people-3"), Some(3));
        assert_eq!(profile_index("people", "people-x"), None);
        assert_eq!(profile_index("people", "orders-1"), None);
        assert_eq!(last_profile_key("people"), "people-last-profile");
    }

    #[test]
    fn index_zero_is_default() {
        let profile = GridViewProfile::new("people", 0, "Default", false);
        assert!(profile.is_default());
        assert!(!GridViewProfile::new("people", 2, "Mine", false).is_default());
    }

    #[test]
    fn capture_then_apply_restores_state() {
        let mut source = columns();
        source.move_column("Amount", 1);
        source.set_visible("Status", false);
        source.set_width("Name", ColumnWidth::Pixels(180.0));
        source.set_frozen("Name", true);
        source.toggle_sort("Name", false);
        source.set_filter("Status", Some(ColumnFilter::Equals(Value::from("Active"))));
        let groups = GroupLevels::new(vec![vec!["Status".into()]]);

        let mut profile = GridViewProfile::new("people", 1, "Mine", false);
        assert!(profile.capture(&source, &groups, 50));

        let json = serde_json::to_string(&profile).unwrap();
        let restored: GridViewProfile = serde_json::from_str(&json).unwrap();

        let mut target = columns();
        let mut target_groups = GroupLevels::default();
        let page_size = restored.apply(&mut target, &mut target_groups);

        assert_eq!(page_size, 50);
        assert_eq!(target_groups, groups);
        assert_eq!(target, source);
    }

    #[test]
    fn unknown_columns_are_ignored_and_missing_ones_go_last() {
        let mut profile = GridViewProfile::new("people", 1, "Mine", false);
        profile.columns = vec![
            ProfileColumn {
                key: "Gone".into(),
                order: 1,
                visible: true,
                width: ColumnWidth::default(),
                frozen: false,
                sort_direction: SortDirection::None,
                sorting_order: None,
                filter: None,
                calculation: CalculationType::None,
            },
            ProfileColumn {
                key: "Amount".into(),
                order: 2,
                visible: true,
                width: ColumnWidth::Pixels(90.0),
                frozen: false,
                sort_direction: SortDirection::None,
                sorting_order: None,
                filter: None,
                calculation: CalculationType::Sum,
            },
        ];
        profile.groups = GroupLevels::new(vec![vec!["Gone".into()]]);

        let mut target = columns();
        let mut groups = GroupLevels::default();
        profile.apply(&mut target, &mut groups);

        let order: Vec<&str> = target.ordered().iter().map(|c| c.unique_key.as_str()).collect();
        assert_eq!(order, ["Amount", "Name", "Status"]);
        assert!(target.is_order_permutation());
        assert!(groups.is_empty());
        // Text column cannot carry a sum.
        assert_eq!(target.get("Amount").unwrap().calculation, CalculationType::None);
    }

    #[test]
    fn capture_reports_changes() {
        let source = columns();
        let mut profile = GridViewProfile::default_for("people", &source, &GroupLevels::default(), 20);
        assert!(!profile.capture(&source, &GroupLevels::default(), 20));
        assert!(profile.capture(&source, &GroupLevels::default(), 50));
    }

    #[test]
    fn old_documents_get_defaults() {
        let json = r#"{
            "id": "people-2",
            "state_id": "people",
            "label": "Old",
            "page_size": 10,
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let profile: GridViewProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.version, PROFILE_SCHEMA_VERSION);
        assert_eq!(profile.revision, 0);
        assert!(profile.columns.is_empty());
    }
}
