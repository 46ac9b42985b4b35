use std::sync::Arc;

use async_trait::async_trait;

use crate::storage::{LocalStorage, LocalStorageExt, namespaced_key};
use crate::{CancelToken, GridError, GridViewProfile, HttpRequest, HttpTransport, send_checked};

/// Persistence target for profiles of one or more grids.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list_shared(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError>;

    async fn list_user(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError>;

    async fn list_all(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        let mut profiles = self.list_shared(state_id, cancel).await?;
        profiles.extend(self.list_user(state_id, cancel).await?);
        Ok(profiles)
    }

    async fn get(
        &self,
        state_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Option<GridViewProfile>, GridError>;

    /// Creates or replaces the profile with the same id.
    async fn save(&self, profile: &GridViewProfile, cancel: &CancelToken) -> Result<(), GridError>;

    async fn delete(&self, state_id: &str, id: &str, cancel: &CancelToken)
    -> Result<(), GridError>;
}

/// Personal profiles kept in the host's local storage, one document per
/// grid state id.
pub struct LocalProfileStore {
    storage: Arc<dyn LocalStorage>,
    namespace: String,
}

impl LocalProfileStore {
    pub fn new(storage: Arc<dyn LocalStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    fn key(&self, state_id: &str) -> String {
        namespaced_key(&self.namespace, &format!("{}-profiles", state_id))
    }

    async fn load(&self, state_id: &str) -> Result<Vec<GridViewProfile>, GridError> {
        let profiles: Option<Vec<GridViewProfile>> =
            self.storage.get_item(&self.key(state_id)).await?;
        Ok(profiles.unwrap_or_default())
    }

    async fn store(&self, state_id: &str, profiles: Vec<GridViewProfile>) -> Result<(), GridError> {
        if profiles.is_empty() {
            return self.storage.remove_item(&self.key(state_id)).await;
        }
        self.storage.set_item(&self.key(state_id), &profiles).await
    }
}

#[async_trait]
impl ProfileStore for LocalProfileStore {
    async fn list_shared(
        &self,
        _state_id: &str,
        _cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        Ok(Vec::new())
    }

    async fn list_user(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        cancel.check()?;
        self.load(state_id).await
    }

    async fn get(
        &self,
        state_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Option<GridViewProfile>, GridError> {
        cancel.check()?;
        Ok(self.load(state_id).await?.into_iter().find(|p| p.id == id))
    }

    async fn save(&self, profile: &GridViewProfile, cancel: &CancelToken) -> Result<(), GridError> {
        if profile.is_shared {
            return Err(GridError::NotSupported(
                "shared profiles are stored remotely".to_string(),
            ));
        }
        cancel.check()?;

        let mut profiles = self.load(&profile.state_id).await?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }
        self.store(&profile.state_id, profiles).await
    }

    async fn delete(
        &self,
        state_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<(), GridError> {
        cancel.check()?;

        let mut profiles = self.load(state_id).await?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Ok(());
        }
        self.store(state_id, profiles).await
    }
}

/// Path builders for the profile endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePaths {
    base: String,
}

impl ProfilePaths {
    pub fn new(profiles_uri: &str) -> Self {
        Self {
            base: profiles_uri.trim_end_matches('/').to_string(),
        }
    }

    pub fn shared(&self, state_id: &str) -> String {
        format!("{}/{}/shared", self.base, encode(state_id))
    }

    pub fn user(&self, state_id: &str) -> String {
        format!("{}/{}/user", self.base, encode(state_id))
    }

    pub fn all(&self, state_id: &str) -> String {
        format!("{}/{}/all", self.base, encode(state_id))
    }

    pub fn one(&self, state_id: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base, encode(state_id), encode(id))
    }

    pub fn collection(&self, state_id: &str) -> String {
        format!("{}/{}", self.base, encode(state_id))
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Profiles stored by the backend, scoped to the current user's auth context.
pub struct RemoteProfileStore {
    transport: Arc<dyn HttpTransport>,
    paths: ProfilePaths,
}

impl RemoteProfileStore {
    pub fn new(transport: Arc<dyn HttpTransport>, profiles_uri: &str) -> Self {
        Self {
            transport,
            paths: ProfilePaths::new(profiles_uri),
        }
    }

    async fn list(&self, path: String, cancel: &CancelToken) -> Result<Vec<GridViewProfile>, GridError> {
        let response = send_checked(self.transport.as_ref(), HttpRequest::get(path), cancel).await?;
        response.json()
    }
}

#[async_trait]
impl ProfileStore for RemoteProfileStore {
    async fn list_shared(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        self.list(self.paths.shared(state_id), cancel).await
    }

    async fn list_user(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        self.list(self.paths.user(state_id), cancel).await
    }

    async fn list_all(
        &self,
        state_id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<GridViewProfile>, GridError> {
        self.list(self.paths.all(state_id), cancel).await
    }

    async fn get(
        &self,
        state_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Option<GridViewProfile>, GridError> {
        let request = HttpRequest::get(self.paths.one(state_id, id));
        match send_checked(self.transport.as_ref(), request, cancel).await {
            Ok(response) => Ok(Some(response.json()?)),
            Err(GridError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, profile: &GridViewProfile, cancel: &CancelToken) -> Result<(), GridError> {
        let request = HttpRequest::put(self.paths.collection(&profile.state_id)).with_json(profile)?;
        send_checked(self.transport.as_ref(), request, cancel).await?;
        Ok(())
    }

    async fn delete(
        &self,
        state_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<(), GridError> {
        let request = HttpRequest::delete(self.paths.one(state_id, id));
        send_checked(self.transport.as_ref(), request, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn profile(index: u32, label: &str) -> GridViewProfile {
        GridViewProfile::new("people", index, label, false)
    }

    #[test]
    fn profile_paths_are_scoped_by_state_id() {
        let paths = ProfilePaths::new("api/gridview-profiles/");
        assert_eq!(paths.shared("people"), "api/gridview-profiles/people/shared");
        assert_eq!(paths.user("people"), "api/gridview-profiles/people/user");
        assert_eq!(paths.all("people"), "api/gridview-profiles/people/all");
        assert_eq!(paths.one("people", "people-2"), "api/gridview-profiles/people/people-2");
        assert_eq!(paths.collection("my grid"), "api/gridview-profiles/my%20grid");
    }

    #[tokio::test]
    async fn local_store_upserts_and_deletes() {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalProfileStore::new(storage.clone(), "app");
        let cancel = CancelToken::new();

        store.save(&profile(1, "One"), &cancel).await.unwrap();
        store.save(&profile(2, "Two"), &cancel).await.unwrap();

        let mut renamed = profile(1, "Uno");
        renamed.revision = 3;
        store.save(&renamed, &cancel).await.unwrap();

        let listed = store.list_user("people", &cancel).await.unwrap();
        let labels: Vec<&str> = listed.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["Uno", "Two"]);
        assert!(store.list_shared("people", &cancel).await.unwrap().is_empty());

        store.delete("people", "people-1", &cancel).await.unwrap();
        store.delete("people", "people-2", &cancel).await.unwrap();
        assert!(store.get("people", "people-2", &cancel).await.unwrap().is_none());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn local_store_refuses_shared_profiles() {
        let store = LocalProfileStore::new(Arc::new(MemoryStorage::new()), "app");
        let shared = GridViewProfile::new("people", 1, "Team", true);
        let result = store.save(&shared, &CancelToken::new()).await;
        assert!(matches!(result, Err(GridError::NotSupported(_))));
    }

    #[tokio::test]
    async fn corrupted_local_document_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_raw("app:people-profiles", "[{\"broken\"".into())
            .await
            .unwrap();
        let store = LocalProfileStore::new(storage, "app");
        let result = store.list_user("people", &CancelToken::new()).await;
        assert!(matches!(result, Err(GridError::Serialization(_))));
    }
}
