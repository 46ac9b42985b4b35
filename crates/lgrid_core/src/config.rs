use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::GridError;

bitflags! {
    /// Grid-wide feature switches.
    ///
    /// A column-level setting only takes effect while the matching grid
    /// feature is enabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GridFeatures: u32 {
        const SORT = 1 << 0;
        const FILTER = 1 << 1;
        const GROUP = 1 << 2;
        const PAGING = 1 << 3;
        /// Count total/active rows on every fetch.
        const COUNT_ROWS = 1 << 4;
        const CALCULATIONS = 1 << 5;
        const PROFILES = 1 << 6;
        const SHARED_PROFILES = 1 << 7;
        const COLUMN_RESIZE = 1 << 8;
        const COLUMN_REORDER = 1 << 9;
        const COLUMN_HIDE = 1 << 10;
        const FREEZE = 1 << 11;
        const ADD = 1 << 12;
        const EDIT = 1 << 13;
        const DELETE = 1 << 14;
    }
}

impl Default for GridFeatures {
    fn default() -> Self {
        GridFeatures::SORT
            | GridFeatures::FILTER
            | GridFeatures::GROUP
            | GridFeatures::PAGING
            | GridFeatures::COUNT_ROWS
            | GridFeatures::CALCULATIONS
            | GridFeatures::PROFILES
            | GridFeatures::COLUMN_RESIZE
            | GridFeatures::COLUMN_REORDER
            | GridFeatures::COLUMN_HIDE
            | GridFeatures::FREEZE
    }
}

/// Where personal profiles are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileStorageMode {
    #[default]
    Local,
    Remote,
}

/// When profile changes are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileSaveMode {
    /// Every layout/sort/filter/group/page-size change is persisted.
    #[default]
    Automatic,
    /// Changes are persisted only through the save button.
    Explicit,
}

/// Remote controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Base path of the paged-query / row controller, e.g. `api/people`.
    pub controller_uri: String,

    /// Base path of the profile endpoints.
    #[serde(default = "default_profiles_uri")]
    pub profiles_uri: String,
}

impl RemoteEndpoint {
    pub fn new(controller_uri: impl Into<String>) -> Self {
        Self {
            controller_uri: controller_uri.into(),
            profiles_uri: default_profiles_uri(),
        }
    }
}

fn default_profiles_uri() -> String {
    "api/gridview-profiles".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Persistence namespace of the grid instance. Required.
    pub state_id: String,
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
    pub features: GridFeatures,
    pub profile_storage: ProfileStorageMode,
    pub profile_save_mode: ProfileSaveMode,
    pub remote: Option<RemoteEndpoint>,
    /// Field used to compare selected items instead of value equality.
    pub key_field: Option<String>,
    pub selection_column: bool,
    pub custom_selection_toolbar: bool,
    pub shared_profile_policy: String,
    pub edit_policy: Option<String>,
    pub group_indent_width: f64,
    pub selection_column_width: f64,
    pub app_namespace: String,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            state_id: String::new(),
            page_size: 20,
            page_size_options: vec![10, 20, 50, 100],
            features: GridFeatures::default(),
            profile_storage: ProfileStorageMode::default(),
            profile_save_mode: ProfileSaveMode::default(),
            remote: None,
            key_field: None,
            selection_column: false,
            custom_selection_toolbar: false,
            shared_profile_policy: "GridViewProfileAdmin".to_string(),
            edit_policy: None,
            group_indent_width: 24.0,
            selection_column_width: 40.0,
            app_namespace: "lgrid".to_string(),
        }
    }
}

impl GridOptions {
    pub fn new(state_id: impl Into<String>) -> Self {
        Self {
            state_id: state_id.into(),
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_page_size_options(mut self, options: Vec<usize>) -> Self {
        self.page_size_options = options;
        self
    }

    /// The configured page size is always allowed; otherwise the size must
    /// be one of `page_size_options` when that list is not empty.
    pub fn allows_page_size(&self, page_size: usize) -> bool {
        page_size > 0
            && (page_size == self.page_size
                || self.page_size_options.is_empty()
                || self.page_size_options.contains(&page_size))
    }

    /// Sizes offered by the pager, ascending, including `current`.
    pub fn page_size_choices(&self, current: usize) -> Vec<usize> {
        let mut choices = self.page_size_options.clone();
        choices.extend([self.page_size, current]);
        choices.retain(|size| *size > 0);
        choices.sort_unstable();
        choices.dedup();
        choices
    }

    pub fn with_features(mut self, features: GridFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_remote(mut self, remote: RemoteEndpoint) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = Some(key_field.into());
        self
    }

    pub fn with_profile_storage(mut self, mode: ProfileStorageMode) -> Self {
        self.profile_storage = mode;
        self
    }

    pub fn with_save_mode(mut self, mode: ProfileSaveMode) -> Self {
        self.profile_save_mode = mode;
        self
    }

    pub fn has(&self, feature: GridFeatures) -> bool {
        self.features.contains(feature)
    }

    /// A grid cannot persist per-instance state without a state id.
    pub fn validate(&self) -> Result<(), GridError> {
        if self.state_id.trim().is_empty() {
            return Err(GridError::MissingStateId);
        }
        Ok(())
    }

    pub fn from_json_str(content: &str) -> Result<Self, GridError> {
        let options: GridOptions = serde_json::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self, GridError> {
        let content = fs::read_to_string(path).map_err(GridError::IoError)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_must_be_offered() {
        let options = GridOptions::new("grid").with_page_size(15);

        assert!(options.allows_page_size(15));
        assert!(options.allows_page_size(50));
        assert!(!options.allows_page_size(7));
        assert!(!options.allows_page_size(0));
        assert_eq!(options.page_size_choices(15), vec![10, 15, 20, 50, 100]);

        let open = options.with_page_size_options(Vec::new());
        assert!(open.allows_page_size(7));
    }

    #[test]
    fn blank_state_id_is_rejected() {
        let options = GridOptions::new("   ");
        assert!(matches!(options.validate(), Err(GridError::MissingStateId)));
    }

    #[test]
    fn json_config_fills_defaults() {
        let options = GridOptions::from_json_str(
            r#"{
                "state_id": "people",
                "page_size": 50,
                "remote": { "controller_uri": "api/people" }
            }"#,
        )
        .expect("valid config");

        assert_eq!(options.page_size, 50);
        assert_eq!(options.features, GridFeatures::default());
        let remote = options.remote.expect("remote");
        assert_eq!(remote.profiles_uri, "api/gridview-profiles");
        assert_eq!(options.shared_profile_policy, "GridViewProfileAdmin");
    }

    #[test]
    fn json_config_without_state_id_fails() {
        assert!(matches!(
            GridOptions::from_json_str("{}"),
            Err(GridError::MissingStateId)
        ));
    }
}
