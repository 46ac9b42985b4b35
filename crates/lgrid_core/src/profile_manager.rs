use std::sync::Arc;

use log::{info, warn};

use crate::profile::{default_profile_id, last_profile_key, profile_index};
use crate::storage::{LocalStorage, LocalStorageExt, namespaced_key};
use crate::{
    CancelToken, ColumnSet, GridError, GridViewProfile, GroupLevels, OperationSlot,
    ProfileSaveMode, ProfileStore, ProfileValidationError, TaskKind,
};

/// Lifecycle of the profile catalog of one grid instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileState {
    Uninitialized,
    /// No remembered profile; the default is active.
    DefaultLoaded,
    /// The remembered profile was found and is active.
    Restored,
    /// A profile was explicitly loaded, added or re-loaded after removal.
    ProfileActive,
}

/// What caused an update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// A layout, sort, filter, group or page-size change.
    Change,
    /// The explicit save button.
    SaveButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Kept in memory until an explicit save.
    Deferred,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub state_id: String,
    pub namespace: String,
    pub save_mode: ProfileSaveMode,
    pub shared_enabled: bool,
}

pub struct ProfileManager {
    settings: ProfileSettings,
    personal: Arc<dyn ProfileStore>,
    shared: Option<Arc<dyn ProfileStore>>,
    storage: Arc<dyn LocalStorage>,
    shared_admin: bool,
    /// Persisted versions, default profile first.
    profiles: Vec<GridViewProfile>,
    /// The active profile including unsaved changes.
    working: Option<GridViewProfile>,
    state: ProfileState,
    dirty: bool,
    load_slot: OperationSlot,
    save_slot: OperationSlot,
    remove_slot: OperationSlot,
}

impl ProfileManager {
    pub fn new(
        settings: ProfileSettings,
        personal: Arc<dyn ProfileStore>,
        shared: Option<Arc<dyn ProfileStore>>,
        storage: Arc<dyn LocalStorage>,
    ) -> Self {
        Self {
            settings,
            personal,
            shared,
            storage,
            shared_admin: false,
            profiles: Vec::new(),
            working: None,
            state: ProfileState::Uninitialized,
            dirty: false,
            load_slot: OperationSlot::new(TaskKind::ProfileLoad),
            save_slot: OperationSlot::new(TaskKind::ProfileSave),
            remove_slot: OperationSlot::new(TaskKind::ProfileRemove),
        }
    }

    pub fn state(&self) -> ProfileState {
        self.state
    }

    pub fn state_id(&self) -> &str {
        &self.settings.state_id
    }

    pub fn profiles(&self) -> &[GridViewProfile] {
        &self.profiles
    }

    pub fn user_profiles(&self) -> impl Iterator<Item = &GridViewProfile> {
        self.profiles.iter().filter(|p| !p.is_shared)
    }

    pub fn shared_profiles(&self) -> impl Iterator<Item = &GridViewProfile> {
        self.profiles.iter().filter(|p| p.is_shared)
    }

    pub fn find(&self, id: &str) -> Option<&GridViewProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn active(&self) -> Option<&GridViewProfile> {
        self.working.as_ref()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.working.as_ref().map(|p| p.id.as_str())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn is_shared_admin(&self) -> bool {
        self.shared_admin
    }

    pub fn set_shared_admin(&mut self, shared_admin: bool) {
        self.shared_admin = shared_admin;
    }

    /// Whether the active profile can be written by the current user.
    pub fn can_save_active(&self) -> bool {
        self.working
            .as_ref()
            .is_some_and(|p| !p.is_shared || self.shared_admin)
    }

    fn default_id(&self) -> String {
        default_profile_id(&self.settings.state_id)
    }

    fn pointer_key(&self) -> String {
        namespaced_key(
            &self.settings.namespace,
            &last_profile_key(&self.settings.state_id),
        )
    }

    fn store_for(&self, profile: &GridViewProfile) -> Result<Arc<dyn ProfileStore>, GridError> {
        if profile.is_shared {
            return self.shared.clone().ok_or_else(|| {
                GridError::NotSupported("no remote store configured for shared profiles".into())
            });
        }
        Ok(Arc::clone(&self.personal))
    }

    /// Loads the catalog and resolves the profile to apply first.
    ///
    /// Fetch failures degrade to an empty catalog; the default profile is
    /// synthesized from `baseline` when no saved default exists.
    pub async fn initialize(&mut self, baseline: GridViewProfile) -> GridViewProfile {
        let ticket = self.load_slot.start();
        let cancel = ticket.cancel_token().clone();
        let state_id = self.settings.state_id.clone();

        let mut catalog = Vec::new();
        match self.shared.clone().filter(|_| self.settings.shared_enabled) {
            // Shared and personal profiles behind one store: list both at once.
            Some(shared) if Arc::ptr_eq(&shared, &self.personal) => {
                let listed = shared.list_all(&state_id, &cancel).await;
                catalog.extend(degrade(listed, "profiles"));
            }
            Some(shared) => {
                let listed = shared.list_shared(&state_id, &cancel).await;
                catalog.extend(degrade(listed, "shared profiles"));
                let listed = self.personal.list_user(&state_id, &cancel).await;
                catalog.extend(degrade(listed, "user profiles"));
            }
            None => {
                let listed = self.personal.list_user(&state_id, &cancel).await;
                catalog.extend(degrade(listed, "user profiles"));
            }
        }
        self.load_slot.finish(&ticket);

        catalog.retain(|p| {
            let known = profile_index(&state_id, &p.id).is_some();
            if !known {
                warn!("Ignoring profile {} outside of grid {}", p.id, state_id);
            }
            known
        });

        match catalog.iter().position(GridViewProfile::is_default) {
            Some(0) => {}
            Some(pos) => {
                let default = catalog.remove(pos);
                catalog.insert(0, default);
            }
            None => catalog.insert(0, baseline),
        }
        self.profiles = catalog;

        let pointer: Result<Option<String>, GridError> =
            self.storage.get_item(&self.pointer_key()).await;
        let remembered = match pointer {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to read last profile of {}: {}", state_id, e);
                None
            }
        };

        let restored = remembered.and_then(|id| self.find(&id).cloned());
        let (active, state) = match restored {
            Some(profile) => (profile, ProfileState::Restored),
            None => (self.profiles[0].clone(), ProfileState::DefaultLoaded),
        };

        info!(
            "Loaded {} profiles for {} (active: {})",
            self.profiles.len(),
            state_id,
            active.id
        );

        self.working = Some(active.clone());
        self.state = state;
        self.dirty = false;
        active
    }

    /// Activates a profile and remembers it as the last selected one.
    ///
    /// Unknown ids and unavailable snapshots fall back to the catalog copy,
    /// then to the default profile.
    pub async fn load_profile(&mut self, id: &str) -> GridViewProfile {
        let entry = match self.find(id) {
            Some(entry) => entry.clone(),
            None => {
                warn!("Profile {} not found, loading default", id);
                self.default_profile()
            }
        };

        let profile = match self.store_for(&entry) {
            Ok(store) => {
                let ticket = self.load_slot.start();
                let fetched = store
                    .get(&self.settings.state_id, &entry.id, ticket.cancel_token())
                    .await;
                self.load_slot.finish(&ticket);

                match fetched {
                    Ok(Some(fresh)) => fresh,
                    Ok(None) => entry,
                    Err(e) => {
                        warn!("Failed to fetch profile {}: {}", entry.id, e);
                        entry
                    }
                }
            }
            Err(_) => entry,
        };

        if let Some(existing) = self.profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile.clone();
        }

        self.remember(&profile.id).await;
        self.working = Some(profile.clone());
        self.state = ProfileState::ProfileActive;
        self.dirty = false;
        profile
    }

    /// Persisted copy of the active profile, dropping unsaved changes.
    pub fn discard_changes(&mut self) -> Option<GridViewProfile> {
        let id = self.active_id()?.to_string();
        let persisted = self.find(&id).cloned()?;
        self.working = Some(persisted.clone());
        self.dirty = false;
        Some(persisted)
    }

    /// Captures the grid state into the active profile and persists it when
    /// the trigger and save mode allow it.
    ///
    /// Shared profiles are written only through the save button and only by
    /// shared-profile administrators. Personal profiles are written on every
    /// change in automatic mode.
    pub async fn update_profile(
        &mut self,
        columns: &ColumnSet,
        groups: &GroupLevels,
        page_size: usize,
        trigger: SaveTrigger,
    ) -> Result<SaveOutcome, GridError> {
        let Some(working) = self.working.as_mut() else {
            log::debug!("Profile update before initialization ignored");
            return Ok(SaveOutcome::Unchanged);
        };

        working.capture(columns, groups, page_size);
        // Dirty while the captured state differs from the persisted copy, so
        // undoing a change clears it again.
        self.dirty = self
            .profiles
            .iter()
            .find(|p| p.id == working.id)
            .is_none_or(|persisted| !persisted.same_content(working));

        let persist = match trigger {
            SaveTrigger::SaveButton => {
                if working.is_shared && !self.shared_admin {
                    return Err(ProfileValidationError::NotAuthorized.into());
                }
                true
            }
            SaveTrigger::Change => {
                !working.is_shared && self.settings.save_mode == ProfileSaveMode::Automatic
            }
        };

        if !persist {
            return Ok(if self.dirty {
                SaveOutcome::Deferred
            } else {
                SaveOutcome::Unchanged
            });
        }

        if trigger == SaveTrigger::Change && !self.dirty {
            return Ok(SaveOutcome::Unchanged);
        }

        let mut candidate = working.clone();
        candidate.mark_saved();
        self.persist(candidate).await?;
        Ok(SaveOutcome::Saved)
    }

    async fn persist(&mut self, profile: GridViewProfile) -> Result<(), GridError> {
        let store = self.store_for(&profile)?;
        let ticket = self.save_slot.start();
        let result = store.save(&profile, ticket.cancel_token()).await;
        let current = self.save_slot.finish(&ticket);

        result?;
        if !current {
            return Err(GridError::Cancelled);
        }

        info!("Saved profile {} (revision {})", profile.id, profile.revision);

        match self.profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => self.profiles.push(profile.clone()),
        }

        if self.active_id() == Some(profile.id.as_str()) {
            self.working = Some(profile);
            self.dirty = false;
        }
        Ok(())
    }

    /// Creates a profile from the current grid state and activates it.
    pub async fn add_profile(
        &mut self,
        label: &str,
        is_shared: bool,
        columns: &ColumnSet,
        groups: &GroupLevels,
        page_size: usize,
    ) -> Result<GridViewProfile, GridError> {
        let label = self.validate_label(label, None)?;
        if is_shared {
            if !self.settings.shared_enabled {
                return Err(ProfileValidationError::SharedProfilesDisabled.into());
            }
            if !self.shared_admin {
                return Err(ProfileValidationError::NotAuthorized.into());
            }
        }

        let mut profile =
            GridViewProfile::new(&self.settings.state_id, self.next_index(), label, is_shared);
        profile.capture(columns, groups, page_size);
        profile.mark_saved();

        self.persist(profile.clone()).await?;
        self.working = Some(profile.clone());
        self.dirty = false;

        self.remember(&profile.id).await;
        self.state = ProfileState::ProfileActive;
        Ok(profile)
    }

    pub async fn rename_profile(&mut self, id: &str, label: &str) -> Result<(), GridError> {
        let mut profile = self
            .find(id)
            .cloned()
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;

        if profile.is_default() {
            return Err(ProfileValidationError::DefaultProfileIsPermanent.into());
        }
        if profile.is_shared && !self.shared_admin {
            return Err(ProfileValidationError::NotAuthorized.into());
        }

        profile.label = self.validate_label(label, Some(id))?;
        profile.mark_saved();

        let store = self.store_for(&profile)?;
        let ticket = self.save_slot.start();
        let result = store.save(&profile, ticket.cancel_token()).await;
        self.save_slot.finish(&ticket);
        result?;

        if let Some(working) = self.working.as_mut().filter(|w| w.id == id) {
            working.label = profile.label.clone();
            working.revision = profile.revision;
        }
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.id == id) {
            *existing = profile;
        }
        Ok(())
    }

    /// Deletes a profile. When it was active, the default profile is loaded
    /// and returned so the caller can apply it.
    pub async fn remove_profile(&mut self, id: &str) -> Result<Option<GridViewProfile>, GridError> {
        let profile = self
            .find(id)
            .cloned()
            .ok_or_else(|| GridError::NotFound(id.to_string()))?;

        if profile.is_default() {
            return Err(ProfileValidationError::DefaultProfileIsPermanent.into());
        }
        if profile.is_shared && !self.shared_admin {
            return Err(ProfileValidationError::NotAuthorized.into());
        }

        let store = self.store_for(&profile)?;
        let ticket = self.remove_slot.start();
        let result = store
            .delete(&self.settings.state_id, id, ticket.cancel_token())
            .await;
        self.remove_slot.finish(&ticket);
        result?;

        self.profiles.retain(|p| p.id != id);
        info!("Removed profile {}", id);

        if self.active_id() == Some(id) {
            let default_id = self.default_id();
            return Ok(Some(self.load_profile(&default_id).await));
        }
        Ok(None)
    }

    /// Trims the label and checks it is non-empty and unused (exact,
    /// case-sensitive match) by any other profile of the catalog.
    pub fn validate_label(&self, label: &str, except: Option<&str>) -> Result<String, GridError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ProfileValidationError::EmptyName.into());
        }

        let taken = self
            .profiles
            .iter()
            .filter(|p| Some(p.id.as_str()) != except)
            .any(|p| p.label == label);
        if taken {
            return Err(ProfileValidationError::DuplicateName(label.to_string()).into());
        }
        Ok(label.to_string())
    }

    pub fn next_index(&self) -> u32 {
        self.profiles
            .iter()
            .filter_map(|p| profile_index(&self.settings.state_id, &p.id))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn default_profile(&self) -> GridViewProfile {
        let default_id = self.default_id();
        self.profiles
            .iter()
            .find(|p| p.id == default_id)
            .cloned()
            .unwrap_or_else(|| GridViewProfile::new(&self.settings.state_id, 0, "Default", false))
    }

    async fn remember(&self, id: &str) {
        if let Err(e) = self.storage.set_item(&self.pointer_key(), &id.to_string()).await {
            warn!("Failed to remember last profile {}: {}", id, e);
        }
    }
}

fn degrade(result: Result<Vec<GridViewProfile>, GridError>, what: &str) -> Vec<GridViewProfile> {
    match result {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!("Failed to fetch {}: {}", what, e);
            Vec::new()
        }
    }
}

impl std::fmt::Debug for ProfileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileManager")
            .field("state_id", &self.settings.state_id)
            .field("state", &self.state)
            .field("profiles", &self.profiles.len())
            .field("active", &self.active_id())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::{ColumnState, ColumnWidth, LocalProfileStore};

    /// Profile store accepting shared profiles, optionally failing every call.
    #[derive(Default)]
    struct MemoryProfiles {
        profiles: Mutex<Vec<GridViewProfile>>,
        failing: bool,
    }

    #[async_trait]
    impl ProfileStore for MemoryProfiles {
        async fn list_shared(
            &self,
            _state_id: &str,
            _cancel: &CancelToken,
        ) -> Result<Vec<GridViewProfile>, GridError> {
            if self.failing {
                return Err(GridError::Transport("offline".into()));
            }
            Ok(self.profiles.lock().unwrap().clone())
        }

        async fn list_user(
            &self,
            _state_id: &str,
            _cancel: &CancelToken,
        ) -> Result<Vec<GridViewProfile>, GridError> {
            Ok(Vec::new())
        }

        async fn get(
            &self,
            _state_id: &str,
            id: &str,
            _cancel: &CancelToken,
        ) -> Result<Option<GridViewProfile>, GridError> {
            Ok(self.profiles.lock().unwrap().iter().find(|p| p.id == id).cloned())
        }

        async fn save(
            &self,
            profile: &GridViewProfile,
            _cancel: &CancelToken,
        ) -> Result<(), GridError> {
            let mut profiles = self.profiles.lock().unwrap();
            profiles.retain(|p| p.id != profile.id);
            profiles.push(profile.clone());
            Ok(())
        }

        async fn delete(
            &self,
            _state_id: &str,
            id: &str,
            _cancel: &CancelToken,
        ) -> Result<(), GridError> {
            self.profiles.lock().unwrap().retain(|p| p.id != id);
            Ok(())
        }
    }

    struct Fixture {
        manager: ProfileManager,
        storage: Arc<MemoryStorage>,
        columns: ColumnSet,
        groups: GroupLevels,
    }

    fn fixture(save_mode: ProfileSaveMode, shared: Option<Arc<MemoryProfiles>>) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let personal = Arc::new(LocalProfileStore::new(storage.clone(), "app"));
        let settings = ProfileSettings {
            state_id: "people".into(),
            namespace: "app".into(),
            save_mode,
            shared_enabled: shared.is_some(),
        };
        let shared = shared.map(|s| s as Arc<dyn ProfileStore>);

        Fixture {
            manager: ProfileManager::new(settings, personal, shared, storage.clone()),
            storage,
            columns: ColumnSet::new(vec![
                ColumnState::new("Name", "Name", 0),
                ColumnState::new("Status", "Status", 1),
            ]),
            groups: GroupLevels::default(),
        }
    }

    impl Fixture {
        fn baseline(&self) -> GridViewProfile {
            GridViewProfile::default_for("people", &self.columns, &self.groups, 20)
        }
    }

    #[tokio::test]
    async fn initialize_synthesizes_default() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        let active = f.manager.initialize(f.baseline()).await;

        assert!(active.is_default());
        assert_eq!(f.manager.state(), ProfileState::DefaultLoaded);
        assert_eq!(f.manager.profiles().len(), 1);
    }

    #[tokio::test]
    async fn remembered_profile_is_restored() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;
        let added = f
            .manager
            .add_profile("Wide", false, &f.columns, &f.groups, 50)
            .await
            .unwrap();
        assert_eq!(added.id, "people-1");

        let mut again = fixture(ProfileSaveMode::Automatic, None);
        again.manager = ProfileManager::new(
            ProfileSettings {
                state_id: "people".into(),
                namespace: "app".into(),
                save_mode: ProfileSaveMode::Automatic,
                shared_enabled: false,
            },
            Arc::new(LocalProfileStore::new(f.storage.clone(), "app")),
            None,
            f.storage.clone(),
        );
        let active = again.manager.initialize(again.baseline()).await;

        assert_eq!(active.id, "people-1");
        assert_eq!(active.page_size, 50);
        assert_eq!(again.manager.state(), ProfileState::Restored);
    }

    #[tokio::test]
    async fn duplicate_and_empty_labels_are_rejected() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;
        f.manager
            .add_profile("MyView", false, &f.columns, &f.groups, 20)
            .await
            .unwrap();

        let duplicate = f
            .manager
            .add_profile("MyView", false, &f.columns, &f.groups, 20)
            .await;
        assert!(matches!(
            duplicate,
            Err(GridError::Validation(ProfileValidationError::DuplicateName(_)))
        ));

        let empty = f
            .manager
            .add_profile("  ", false, &f.columns, &f.groups, 20)
            .await;
        assert!(matches!(
            empty,
            Err(GridError::Validation(ProfileValidationError::EmptyName))
        ));

        // Case-sensitive match only.
        assert!(
            f.manager
                .add_profile("myview", false, &f.columns, &f.groups, 20)
                .await
                .is_ok()
        );
        assert_eq!(f.manager.profiles().len(), 3);
    }

    #[tokio::test]
    async fn explicit_mode_defers_until_save_button() {
        let mut f = fixture(ProfileSaveMode::Explicit, None);
        f.manager.initialize(f.baseline()).await;
        f.manager
            .add_profile("Mine", false, &f.columns, &f.groups, 20)
            .await
            .unwrap();

        f.columns.set_width("Name", ColumnWidth::Pixels(120.0));
        let outcome = f
            .manager
            .update_profile(&f.columns, &f.groups, 20, SaveTrigger::Change)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Deferred);
        assert!(f.manager.has_unsaved_changes());

        let outcome = f
            .manager
            .update_profile(&f.columns, &f.groups, 20, SaveTrigger::SaveButton)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);
        assert!(!f.manager.has_unsaved_changes());
        assert_eq!(f.manager.find("people-1").unwrap().revision, 2);
    }

    #[tokio::test]
    async fn reverting_a_change_clears_unsaved_flag() {
        let mut f = fixture(ProfileSaveMode::Explicit, None);
        f.manager.initialize(f.baseline()).await;

        f.columns.set_visible("Status", false);
        f.manager
            .update_profile(&f.columns, &f.groups, 20, SaveTrigger::Change)
            .await
            .unwrap();
        assert!(f.manager.has_unsaved_changes());

        f.columns.set_visible("Status", true);
        let outcome = f
            .manager
            .update_profile(&f.columns, &f.groups, 20, SaveTrigger::Change)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Unchanged);
        assert!(!f.manager.has_unsaved_changes());
    }

    #[tokio::test]
    async fn automatic_mode_saves_on_change() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;

        let unchanged = f
            .manager
            .update_profile(&f.columns, &f.groups, 20, SaveTrigger::Change)
            .await
            .unwrap();
        assert_eq!(unchanged, SaveOutcome::Unchanged);

        let saved = f
            .manager
            .update_profile(&f.columns, &f.groups, 50, SaveTrigger::Change)
            .await
            .unwrap();
        assert_eq!(saved, SaveOutcome::Saved);
        assert_eq!(f.manager.active().unwrap().page_size, 50);
    }

    #[tokio::test]
    async fn default_profile_cannot_be_removed() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;

        let result = f.manager.remove_profile("people-0").await;
        assert!(matches!(
            result,
            Err(GridError::Validation(
                ProfileValidationError::DefaultProfileIsPermanent
            ))
        ));
        assert_eq!(f.manager.profiles().len(), 1);
    }

    #[tokio::test]
    async fn removing_active_profile_falls_back_to_default() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;
        f.manager
            .add_profile("Mine", false, &f.columns, &f.groups, 50)
            .await
            .unwrap();

        let fallback = f.manager.remove_profile("people-1").await.unwrap();
        let fallback = fallback.expect("default loaded");
        assert!(fallback.is_default());
        assert_eq!(f.manager.active_id(), Some("people-0"));
        assert_eq!(f.manager.state(), ProfileState::ProfileActive);
    }

    #[tokio::test]
    async fn shared_profiles_need_admin_and_explicit_save() {
        let shared = Arc::new(MemoryProfiles::default());
        let mut f = fixture(ProfileSaveMode::Automatic, Some(shared.clone()));
        f.manager.initialize(f.baseline()).await;

        let denied = f
            .manager
            .add_profile("Team", true, &f.columns, &f.groups, 20)
            .await;
        assert!(matches!(
            denied,
            Err(GridError::Validation(ProfileValidationError::NotAuthorized))
        ));

        f.manager.set_shared_admin(true);
        let team = f
            .manager
            .add_profile("Team", true, &f.columns, &f.groups, 20)
            .await
            .unwrap();
        assert_eq!(shared.profiles.lock().unwrap().len(), 1);

        let outcome = f
            .manager
            .update_profile(&f.columns, &f.groups, 100, SaveTrigger::Change)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Deferred);
        assert_eq!(shared.profiles.lock().unwrap()[0].page_size, 20);

        f.manager
            .update_profile(&f.columns, &f.groups, 100, SaveTrigger::SaveButton)
            .await
            .unwrap();
        assert_eq!(shared.profiles.lock().unwrap()[0].page_size, 100);
        assert_eq!(f.manager.active_id(), Some(team.id.as_str()));
    }

    #[tokio::test]
    async fn failing_fetch_degrades_to_default() {
        let shared = Arc::new(MemoryProfiles {
            failing: true,
            ..Default::default()
        });
        let mut f = fixture(ProfileSaveMode::Automatic, Some(shared));
        let active = f.manager.initialize(f.baseline()).await;
        assert!(active.is_default());
    }

    #[tokio::test]
    async fn rename_validates_against_other_labels() {
        let mut f = fixture(ProfileSaveMode::Automatic, None);
        f.manager.initialize(f.baseline()).await;
        f.manager
            .add_profile("One", false, &f.columns, &f.groups, 20)
            .await
            .unwrap();
        f.manager
            .add_profile("Two", false, &f.columns, &f.groups, 20)
            .await
            .unwrap();

        assert!(f.manager.rename_profile("people-2", "One").await.is_err());
        f.manager.rename_profile("people-2", "Two").await.unwrap();
        f.manager.rename_profile("people-2", "Three").await.unwrap();
        assert_eq!(f.manager.active().unwrap().label, "Three");
    }
}
