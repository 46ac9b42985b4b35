use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::remote::{ControllerPaths, HttpRequest, HttpTransport, send_checked};
use crate::{
    CancelToken, FieldAccessor, GridError, HostShell, ItemComparer, OperationSlot, SharedItems,
    TaskKind, Translator,
};

/// Applies row mutations to the backing collection.
#[async_trait]
pub trait RowController<T>: Send + Sync {
    async fn add(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError>;

    async fn update(&self, original: &T, item: &T, cancel: &CancelToken) -> Result<(), GridError>;

    async fn delete(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError>;
}

/// Mutates the shared in-memory collection directly.
pub struct LocalRowController<T> {
    items: SharedItems<T>,
    comparer: ItemComparer<T>,
}

impl<T> LocalRowController<T> {
    pub fn new(items: SharedItems<T>, comparer: ItemComparer<T>) -> Self {
        Self { items, comparer }
    }
}

#[async_trait]
impl<T> RowController<T> for LocalRowController<T>
where
    T: Clone + Send + Sync,
{
    async fn add(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        cancel.check()?;
        self.items.write().push(item.clone());
        Ok(())
    }

    async fn update(&self, original: &T, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        cancel.check()?;
        let mut items = self.items.write();
        let existing = items
            .iter_mut()
            .find(|candidate| (self.comparer)(candidate, original))
            .ok_or_else(|| GridError::NotFound("row is no longer in the collection".into()))?;
        *existing = item.clone();
        Ok(())
    }

    async fn delete(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        cancel.check()?;
        let mut items = self.items.write();
        let pos = items
            .iter()
            .position(|candidate| (self.comparer)(candidate, item))
            .ok_or_else(|| GridError::NotFound("row is no longer in the collection".into()))?;
        items.remove(pos);
        Ok(())
    }
}

/// Sends row mutations to the controller: `POST` to add, `PUT` to edit and
/// `DELETE ?key=` to remove.
pub struct RemoteRowController<T> {
    transport: Arc<dyn HttpTransport>,
    paths: ControllerPaths,
    key_of: FieldAccessor<T>,
    _item: PhantomData<fn(&T)>,
}

impl<T> RemoteRowController<T> {
    pub fn new(transport: Arc<dyn HttpTransport>, controller_uri: &str, key_of: FieldAccessor<T>) -> Self {
        Self {
            transport,
            paths: ControllerPaths::new(controller_uri),
            key_of,
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T> RowController<T> for RemoteRowController<T>
where
    T: Serialize + Send + Sync,
{
    async fn add(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        let request = HttpRequest::post(self.paths.base()).with_json(item)?;
        send_checked(self.transport.as_ref(), request, cancel).await?;
        Ok(())
    }

    async fn update(&self, _original: &T, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        let request = HttpRequest::put(self.paths.base()).with_json(item)?;
        send_checked(self.transport.as_ref(), request, cancel).await?;
        Ok(())
    }

    async fn delete(&self, item: &T, cancel: &CancelToken) -> Result<(), GridError> {
        let key = (self.key_of)(item);
        if key.is_null() {
            return Err(GridError::NotSupported("row has no key value".into()));
        }
        let request =
            HttpRequest::delete(self.paths.base()).with_query("key", key.as_display_string());
        send_checked(self.transport.as_ref(), request, cancel).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditMode<T> {
    Adding,
    Editing { original: T },
}

/// An add or edit in progress. The draft survives a rejected save so the
/// user can correct it.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession<T> {
    pub mode: EditMode<T>,
    pub draft: T,
    /// Messages of the last rejected save.
    pub errors: Vec<String>,
}

impl<T> EditSession<T> {
    pub fn is_adding(&self) -> bool {
        matches!(self.mode, EditMode::Adding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Added,
    Updated,
    Deleted,
}

impl RowOutcome {
    fn message(&self) -> &'static str {
        match self {
            RowOutcome::Added => "Row added",
            RowOutcome::Updated => "Row saved",
            RowOutcome::Deleted => "Row deleted",
        }
    }
}

/// Drives add/edit/delete through a [`RowController`] and notifies the host
/// on success. The caller reloads the data after every outcome.
pub struct RowActions<T> {
    controller: Arc<dyn RowController<T>>,
    shell: Arc<dyn HostShell>,
    translator: Arc<dyn Translator>,
    session: Option<EditSession<T>>,
    slot: OperationSlot,
}

impl<T: Clone> RowActions<T> {
    pub fn new(
        controller: Arc<dyn RowController<T>>,
        shell: Arc<dyn HostShell>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            controller,
            shell,
            translator,
            session: None,
            slot: OperationSlot::new(TaskKind::RowMutation),
        }
    }

    pub fn session(&self) -> Option<&EditSession<T>> {
        self.session.as_ref()
    }

    pub fn draft_mut(&mut self) -> Option<&mut T> {
        self.session.as_mut().map(|s| &mut s.draft)
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    pub fn begin_add(&mut self, draft: T) {
        self.session = Some(EditSession {
            mode: EditMode::Adding,
            draft,
            errors: Vec::new(),
        });
    }

    pub fn begin_edit(&mut self, item: &T) {
        self.session = Some(EditSession {
            mode: EditMode::Editing {
                original: item.clone(),
            },
            draft: item.clone(),
            errors: Vec::new(),
        });
    }

    pub fn cancel_edit(&mut self) -> Option<EditSession<T>> {
        self.slot.cancel();
        self.session.take()
    }

    /// Saves the open session. On failure the session stays open with the
    /// draft untouched; validation messages are recorded on it.
    pub async fn save(&mut self) -> Result<RowOutcome, GridError> {
        let Some(session) = self.session.as_ref() else {
            return Err(GridError::NotSupported("no row is being edited".into()));
        };

        let ticket = self.slot.start();
        let (result, outcome) = match &session.mode {
            EditMode::Adding => (
                self.controller.add(&session.draft, ticket.cancel_token()).await,
                RowOutcome::Added,
            ),
            EditMode::Editing { original } => (
                self.controller
                    .update(original, &session.draft, ticket.cancel_token())
                    .await,
                RowOutcome::Updated,
            ),
        };
        self.slot.finish(&ticket);

        match result {
            Ok(()) => {
                self.session = None;
                self.notify(outcome);
                Ok(outcome)
            }
            Err(err) => {
                if let (GridError::RowValidation(errors), Some(session)) =
                    (&err, self.session.as_mut())
                {
                    session.errors = errors.clone();
                }
                log::warn!("Row save rejected: {}", err);
                Err(err)
            }
        }
    }

    pub async fn delete(&mut self, item: &T) -> Result<RowOutcome, GridError> {
        let ticket = self.slot.start();
        let result = self.controller.delete(item, ticket.cancel_token()).await;
        self.slot.finish(&ticket);
        result?;

        self.notify(RowOutcome::Deleted);
        Ok(RowOutcome::Deleted)
    }

    fn notify(&self, outcome: RowOutcome) {
        self.shell
            .notify_success(&self.translator.translate(outcome.message()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{IdentityTranslator, LogShell};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    fn item(id: i64, name: &str) -> Item {
        Item {
            id,
            name: name.into(),
        }
    }

    fn by_id() -> ItemComparer<Item> {
        Arc::new(|a: &Item, b: &Item| a.id == b.id)
    }

    struct Rejecting;

    #[async_trait]
    impl RowController<Item> for Rejecting {
        async fn add(&self, _item: &Item, _cancel: &CancelToken) -> Result<(), GridError> {
            Err(GridError::RowValidation(vec!["Name is required".into()]))
        }

        async fn update(&self, _o: &Item, _i: &Item, _cancel: &CancelToken) -> Result<(), GridError> {
            Err(GridError::remote(500, "boom"))
        }

        async fn delete(&self, _item: &Item, _cancel: &CancelToken) -> Result<(), GridError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);

    impl HostShell for Notices {
        fn show_error(&self, _error: &GridError) {}

        fn notify_success(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn local_controller_edits_in_place() {
        let items = SharedItems::new(vec![item(1, "Ann"), item(2, "Bob")]);
        let notices = Arc::new(Notices::default());
        let mut actions = RowActions::new(
            Arc::new(LocalRowController::new(items.clone(), by_id())),
            notices.clone(),
            Arc::new(IdentityTranslator),
        );

        actions.begin_edit(&item(2, "Bob"));
        actions.draft_mut().unwrap().name = "Robert".into();
        assert_eq!(actions.save().await.unwrap(), RowOutcome::Updated);
        assert!(!actions.is_editing());

        actions.begin_add(item(3, "Cid"));
        assert_eq!(actions.save().await.unwrap(), RowOutcome::Added);

        actions.delete(&item(1, "Ann")).await.unwrap();

        assert_eq!(items.snapshot(), vec![item(2, "Robert"), item(3, "Cid")]);
        assert_eq!(
            *notices.0.lock().unwrap(),
            vec!["Row saved", "Row added", "Row deleted"]
        );
    }

    #[tokio::test]
    async fn validation_failure_keeps_draft_open() {
        let mut actions = RowActions::new(
            Arc::new(Rejecting),
            Arc::new(LogShell),
            Arc::new(IdentityTranslator),
        );

        actions.begin_add(item(0, ""));
        let result = actions.save().await;
        assert!(matches!(result, Err(GridError::RowValidation(_))));

        let session = actions.session().expect("still editing");
        assert!(session.is_adding());
        assert_eq!(session.errors, vec!["Name is required"]);
        assert_eq!(session.draft, item(0, ""));
    }

    #[tokio::test]
    async fn other_failures_keep_draft_too() {
        let mut actions = RowActions::new(
            Arc::new(Rejecting),
            Arc::new(LogShell),
            Arc::new(IdentityTranslator),
        );

        actions.begin_edit(&item(1, "Ann"));
        assert!(actions.save().await.is_err());
        assert!(actions.is_editing());
        assert!(actions.session().unwrap().errors.is_empty());
    }

    #[tokio::test]
    async fn null_key_rows_can_be_edited_and_deleted() {
        let items = SharedItems::new(vec![item(1, "Ann")]);
        let by_null_key = crate::Selection::<Item>::with_key_field(
            Arc::new(|_: &Item| crate::Value::Null),
            true,
        )
        .comparer();
        let controller = LocalRowController::new(items.clone(), by_null_key);
        let cancel = CancelToken::new();

        controller
            .update(&item(1, "Ann"), &item(1, "Anna"), &cancel)
            .await
            .unwrap();
        assert_eq!(items.snapshot(), vec![item(1, "Anna")]);

        controller.delete(&item(1, "Anna"), &cancel).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn missing_row_is_reported() {
        let controller = LocalRowController::new(SharedItems::new(vec![item(1, "Ann")]), by_id());
        let result = controller.delete(&item(7, "Ghost"), &CancelToken::new()).await;
        assert!(matches!(result, Err(GridError::NotFound(_))));
    }
}
