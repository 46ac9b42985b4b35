use std::sync::Arc;

use log::{debug, error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::layout::{LayoutParams, compute_layout, header_intrinsic_width};
use crate::render::{RenderInput, RenderNode, render_grid};
use crate::{
    CalculationType, CancelToken, ColumnFilter, ColumnSet, ColumnState, ColumnWidth, DataPage,
    DataPageLoader, DataRequest, FieldAccessor, FieldProvider, GridContext, GridError,
    GridFeatures, GridLayout, GridOptions, GridRow, GridViewProfile, GroupCollapseState,
    GroupLevels, HttpTransport, LocalLoader, LocalProfileStore, LocalRowController, OperationSlot,
    PageState, Pagination, ProfileManager, ProfileSettings, ProfileStorageMode, ProfileStore,
    QueryComposer, RemoteLoader, RemoteProfileStore, RemoteRowController, RowActions,
    RowController, RowOutcome, SaveOutcome, SaveTrigger, Selection, SharedItems, SortDirection,
    TaskKind, Ticket, Value, group_rows,
};

/// Item types a grid can bind to.
pub trait GridItem: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> GridItem for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{}

/// Result of one pass through the fetch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was applied; carries the number of loaded rows.
    Applied(usize),
    /// A newer fetch superseded this one; nothing was applied.
    Stale,
    Cancelled,
    /// The loader failed; the error went to the host shell.
    Failed,
    /// Another fetch is in flight; it was cancelled and a reload runs once
    /// it settles. Also returned when a cancelled job settles with that
    /// reload still due.
    Deferred,
    /// The requested state is already loaded; no fetch was made.
    Unchanged,
    /// Neither a remote endpoint nor an in-memory collection is bound.
    NoLoader,
}

/// A prepared data fetch. It owns everything it needs, so the host can run
/// it while the grid stays available for other calls.
pub struct FetchJob<T> {
    ticket: Ticket,
    request: DataRequest,
    loader: Arc<dyn DataPageLoader<T>>,
}

impl<T> FetchJob<T> {
    pub fn request(&self) -> &DataRequest {
        &self.request
    }

    pub fn generation(&self) -> u64 {
        self.ticket.generation
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.ticket.cancel_token()
    }

    /// Loads the page. Dropping the returned future, even before it is
    /// first polled, cancels the job.
    pub fn run(self) -> impl std::future::Future<Output = FetchResult<T>> {
        let abandon = AbandonGuard(Some(self.ticket.clone()));
        async move {
            let result = self
                .loader
                .get_data_page(&self.request, self.ticket.cancel_token())
                .await;
            abandon.disarm();

            FetchResult {
                ticket: self.ticket,
                result,
            }
        }
    }
}

// Abandons the ticket when a running job is dropped before completion, so
// the grid stops reporting it as loading.
struct AbandonGuard(Option<Ticket>);

impl AbandonGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if let Some(ticket) = self.0.take() {
            ticket.abandon();
        }
    }
}

pub struct FetchResult<T> {
    ticket: Ticket,
    result: Result<DataPage<T>, GridError>,
}

impl<T> FetchResult<T> {
    pub fn generation(&self) -> u64 {
        self.ticket.generation
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// The grid engine: column state, query composition, paging, profiles,
/// selection and row actions for one grid instance.
pub struct GridView<T> {
    options: GridOptions,
    context: GridContext,
    provider: Arc<dyn FieldProvider<T>>,
    columns: ColumnSet,
    groups: GroupLevels,
    collapse: GroupCollapseState,
    pagination: Pagination,
    page_state: PageState,
    data: Vec<T>,
    selection: Selection<T>,
    profiles: ProfileManager,
    items: Option<SharedItems<T>>,
    loader: Option<Arc<dyn DataPageLoader<T>>>,
    row_actions: Option<RowActions<T>>,
    fetch_slot: OperationSlot,
    selector_slot: OperationSlot,
    calculation_slot: OperationSlot,
    reload_pending: bool,
    can_edit: bool,
    initialized: bool,
}

impl<T: GridItem> GridView<T> {
    /// Builds a grid over a remote controller when `options.remote` is set,
    /// over `items` otherwise.
    pub fn new(
        options: GridOptions,
        context: GridContext,
        provider: Arc<dyn FieldProvider<T>>,
        items: Option<SharedItems<T>>,
    ) -> Result<Self, GridError> {
        options.validate()?;

        let columns = build_columns(provider.as_ref());
        let transport = match (&options.remote, &context.transport) {
            (Some(_), None) => {
                return Err(GridError::NotSupported(
                    "a remote endpoint requires an HTTP transport".into(),
                ));
            }
            (_, transport) => transport.clone(),
        };

        let loader: Option<Arc<dyn DataPageLoader<T>>> = match (&options.remote, &transport, &items)
        {
            (Some(remote), Some(transport), _) => Some(Arc::new(RemoteLoader::new(
                Arc::clone(transport),
                &remote.controller_uri,
            ))),
            (None, _, Some(items)) => Some(Arc::new(LocalLoader::new(
                items.clone(),
                Arc::clone(&provider),
            ))),
            _ => None,
        };

        let key_accessor = options
            .key_field
            .as_deref()
            .and_then(|key| provider.field(key))
            .map(|definition| definition.accessor);
        if options.key_field.is_some() && key_accessor.is_none() {
            warn!(
                "Key field {:?} is not a field of grid {}; using item equality",
                options.key_field, options.state_id
            );
        }

        let multiple =
            Selection::<T>::is_multiple_for(options.selection_column, options.custom_selection_toolbar);
        let selection = match &key_accessor {
            Some(accessor) => Selection::with_key_field(Arc::clone(accessor), multiple),
            None => Selection::with_default_comparer(multiple),
        };

        let row_features = GridFeatures::ADD | GridFeatures::EDIT | GridFeatures::DELETE;
        let controller: Option<Arc<dyn RowController<T>>> = if !options.features.intersects(row_features) {
            None
        } else {
            match (&options.remote, &transport, &items) {
                (Some(remote), Some(transport), _) => {
                    let key_of: FieldAccessor<T> = match &key_accessor {
                        Some(accessor) => Arc::clone(accessor),
                        None => Arc::new(|_: &T| Value::Null),
                    };
                    Some(Arc::new(RemoteRowController::new(
                        Arc::clone(transport),
                        &remote.controller_uri,
                        key_of,
                    )))
                }
                (None, _, Some(items)) => Some(Arc::new(LocalRowController::new(
                    items.clone(),
                    selection.comparer(),
                ))),
                _ => None,
            }
        };
        let row_actions = controller.map(|controller| {
            RowActions::new(
                controller,
                Arc::clone(&context.shell),
                Arc::clone(&context.translator),
            )
        });

        let profiles = build_profile_manager(&options, &context, transport.clone());

        Ok(Self {
            pagination: Pagination::new(options.page_size),
            options,
            context,
            provider,
            columns,
            groups: GroupLevels::default(),
            collapse: GroupCollapseState::default(),
            page_state: PageState::default(),
            data: Vec::new(),
            selection,
            profiles,
            items,
            loader,
            row_actions,
            fetch_slot: OperationSlot::new(TaskKind::DataFetch),
            selector_slot: OperationSlot::new(TaskKind::SelectorValues),
            calculation_slot: OperationSlot::new(TaskKind::Calculations),
            reload_pending: false,
            can_edit: true,
            initialized: false,
        })
    }

    /// Grid over an in-memory collection.
    pub fn local(
        options: GridOptions,
        context: GridContext,
        provider: Arc<dyn FieldProvider<T>>,
        items: Vec<T>,
    ) -> Result<Self, GridError> {
        Self::new(options, context, provider, Some(SharedItems::new(items)))
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn groups(&self) -> &GroupLevels {
        &self.groups
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn page_state(&self) -> &PageState {
        &self.page_state
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn items(&self) -> Option<&SharedItems<T>> {
        self.items.as_ref()
    }

    pub fn selection(&self) -> &Selection<T> {
        &self.selection
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn row_actions(&self) -> Option<&RowActions<T>> {
        self.row_actions.as_ref()
    }

    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.fetch_slot.is_running()
    }

    pub fn has_pending_reload(&self) -> bool {
        self.reload_pending
    }

    pub fn can_edit(&self) -> bool {
        self.can_edit
    }

    fn has(&self, feature: GridFeatures) -> bool {
        self.options.has(feature)
    }

    fn composer(&self) -> QueryComposer<'_> {
        QueryComposer::new(&self.columns, &self.groups, self.options.features)
    }

    fn require(&self, feature: GridFeatures, what: &str) -> Result<(), GridError> {
        if self.has(feature) {
            Ok(())
        } else {
            Err(GridError::NotSupported(format!("{} is disabled for this grid", what)))
        }
    }

    fn column(&self, key: &str) -> Result<&ColumnState, GridError> {
        self.columns
            .get(key)
            .ok_or_else(|| GridError::NotFound(format!("column {}", key)))
    }

    /// Resolves host policies, restores the remembered profile and loads the
    /// first page.
    pub async fn initialize(&mut self) -> Result<FetchOutcome, GridError> {
        self.options.validate()?;

        if self.has(GridFeatures::SHARED_PROFILES) {
            let admin = self
                .context
                .policy
                .is_in_policy(&self.options.shared_profile_policy)
                .await;
            self.profiles.set_shared_admin(admin);
        }
        if let Some(policy) = self.options.edit_policy.clone() {
            self.can_edit = self.context.policy.is_in_policy(&policy).await;
        }

        if self.has(GridFeatures::PROFILES) {
            let baseline = GridViewProfile::default_for(
                &self.options.state_id,
                &self.columns,
                &self.groups,
                self.pagination.page_size(),
            );
            let active = self.profiles.initialize(baseline).await;
            self.apply_profile(&active);
        }

        self.initialized = true;
        Ok(self.refresh_async().await)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn apply_profile(&mut self, profile: &GridViewProfile) {
        let page_size = profile.apply(&mut self.columns, &mut self.groups);
        if page_size > 0 {
            self.pagination.set_page_size(page_size);
        }
        self.pagination.go_to(1);
        self.collapse.clear();
    }

    /// Rebuilds the column list after the item schema changed, keeping the
    /// active profile's settings for columns that still exist.
    pub async fn replace_fields(&mut self, provider: Arc<dyn FieldProvider<T>>) -> FetchOutcome {
        self.columns = build_columns(provider.as_ref());
        if let (Some(items), true) = (&self.items, self.options.remote.is_none()) {
            self.loader = Some(Arc::new(LocalLoader::new(items.clone(), Arc::clone(&provider))));
        }
        self.provider = provider;

        if let Some(active) = self.profiles.active().cloned() {
            self.apply_profile(&active);
        } else {
            let columns = &self.columns;
            self.groups.retain_known(|key| columns.get(key).is_some());
        }
        self.refresh_async().await
    }

    /// Starts a fetch for the current state.
    ///
    /// While another fetch is in flight, that fetch is cancelled and the new
    /// one is deferred: `None` is returned and [`has_pending_reload`]
    /// reports true. The reload runs when the cancelled job is handed to
    /// [`settle_fetch`]; until then further triggers stay deferred.
    ///
    /// [`has_pending_reload`]: GridView::has_pending_reload
    /// [`settle_fetch`]: GridView::settle_fetch
    pub fn prepare_fetch(&mut self) -> Option<FetchJob<T>> {
        let Some(loader) = self.loader.clone() else {
            self.data.clear();
            self.page_state = PageState::default();
            self.pagination.set_row_count(Some(0));
            return None;
        };

        if self.fetch_slot.is_running() {
            if self.fetch_slot.cancel_current() {
                debug!(
                    "Fetch generation {} still running; cancelling and deferring reload",
                    self.fetch_slot.generation()
                );
            }
            self.reload_pending = true;
            return None;
        }

        self.reload_pending = false;
        let request = self
            .composer()
            .request(self.pagination.page(), self.pagination.page_size());
        let ticket = self.fetch_slot.start();
        self.page_state.loading = true;

        debug!(
            "Fetch generation {} for {}: page {} size {}",
            ticket.generation, self.options.state_id, request.page, request.page_size
        );

        Some(FetchJob {
            ticket,
            request,
            loader,
        })
    }

    /// Applies a finished fetch. Results of superseded or cancelled
    /// generations are dropped without touching the loaded page; when such a
    /// result frees the slot for a deferred reload, `Deferred` is returned.
    pub fn apply_fetch(&mut self, fetched: FetchResult<T>) -> FetchOutcome {
        let FetchResult { ticket, result } = fetched;
        let current = self.fetch_slot.is_current(&ticket);
        self.fetch_slot.finish(&ticket);
        self.page_state.loading = self.fetch_slot.is_running();

        if !current {
            if self.reload_pending && !self.fetch_slot.is_running() {
                debug!(
                    "Fetch generation {} settled; deferred reload is due",
                    ticket.generation
                );
                return FetchOutcome::Deferred;
            }
            debug!(
                "Dropping stale fetch generation {} after {} ms",
                ticket.generation,
                ticket.elapsed_ms()
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(page) => {
                if !page.respects_page_size() {
                    warn!(
                        "Loader returned {} rows for page size {}",
                        page.data.len(),
                        page.page_size
                    );
                }

                self.page_state.apply(&page);
                self.pagination.set_row_count(page.active_rows());
                if self.pagination.clamp_to_rows() {
                    debug!("Page moved back to {} after row count shrank", self.pagination.page());
                    self.reload_pending = true;
                }

                self.data = page.data;
                debug!(
                    "Fetch generation {} applied {} rows in {} ms",
                    ticket.generation,
                    self.data.len(),
                    ticket.elapsed_ms()
                );
                FetchOutcome::Applied(self.data.len())
            }
            Err(e) if e.is_cancelled() => {
                debug!("Fetch generation {} cancelled", ticket.generation);
                FetchOutcome::Cancelled
            }
            Err(e) => {
                error!("Data fetch for {} failed: {}", self.options.state_id, e);
                self.context.shell.show_error(&e);
                FetchOutcome::Failed
            }
        }
    }

    /// Cancels the in-flight fetch, if any, drops a deferred reload and
    /// clears the loading state.
    pub fn abort_fetch(&mut self) -> bool {
        let cancelled = self.fetch_slot.cancel();
        self.reload_pending = false;
        self.page_state.loading = false;
        cancelled
    }

    /// Applies a job run by the host and then runs any reload that was
    /// deferred while it was in flight.
    pub async fn settle_fetch(&mut self, fetched: FetchResult<T>) -> FetchOutcome {
        let outcome = self.apply_fetch(fetched);
        if self.reload_pending && !self.fetch_slot.is_running() {
            return self.refresh_async().await;
        }
        outcome
    }

    /// Runs the fetch pipeline until no reload is pending.
    pub async fn refresh_async(&mut self) -> FetchOutcome {
        loop {
            let Some(job) = self.prepare_fetch() else {
                return if self.reload_pending {
                    FetchOutcome::Deferred
                } else {
                    FetchOutcome::NoLoader
                };
            };

            let fetched = job.run().await;
            let outcome = self.apply_fetch(fetched);
            if !self.reload_pending {
                return outcome;
            }
        }
    }

    async fn persist_change(&mut self) {
        if !self.has(GridFeatures::PROFILES) {
            return;
        }
        let result = self
            .profiles
            .update_profile(
                &self.columns,
                &self.groups,
                self.pagination.page_size(),
                SaveTrigger::Change,
            )
            .await;
        if let Err(e) = result {
            warn!("Failed to persist profile change: {}", e);
            self.context.shell.show_error(&e);
        }
    }

    /// Moves a column to a 1-based display position. Called back by the
    /// rendering layer after a drag.
    pub async fn set_column_order_async(
        &mut self,
        key: &str,
        position: usize,
    ) -> Result<(), GridError> {
        self.require(GridFeatures::COLUMN_REORDER, "Column reordering")?;
        self.column(key)?;
        self.columns.move_column(key, position);
        self.persist_change().await;
        Ok(())
    }

    /// Stores a user-resized width. Called back by the rendering layer.
    pub async fn update_column_width_async(
        &mut self,
        key: &str,
        width: ColumnWidth,
    ) -> Result<(), GridError> {
        self.require(GridFeatures::COLUMN_RESIZE, "Column resizing")?;
        self.column(key)?;
        self.columns.set_width(key, width);
        self.persist_change().await;
        Ok(())
    }

    pub async fn set_column_visible(&mut self, key: &str, visible: bool) -> Result<(), GridError> {
        self.require(GridFeatures::COLUMN_HIDE, "Column hiding")?;
        self.column(key)?;
        if !self.columns.set_visible(key, visible) {
            return Err(GridError::NotSupported(format!("column {} cannot be hidden", key)));
        }
        self.persist_change().await;
        Ok(())
    }

    pub async fn set_column_frozen(&mut self, key: &str, frozen: bool) -> Result<(), GridError> {
        self.require(GridFeatures::FREEZE, "Column freezing")?;
        self.column(key)?;
        self.columns.set_frozen(key, frozen);
        self.persist_change().await;
        Ok(())
    }

    /// Restores declaration order and initial widths.
    pub async fn reset_columns(&mut self) {
        self.columns.reset_order();
        self.columns.reset_widths();
        self.persist_change().await;
    }

    pub async fn toggle_sort(
        &mut self,
        key: &str,
        additive: bool,
    ) -> Result<(SortDirection, FetchOutcome), GridError> {
        self.require(GridFeatures::SORT, "Sorting")?;
        self.column(key)?;
        let direction = self
            .columns
            .toggle_sort(key, additive)
            .ok_or_else(|| GridError::NotSupported(format!("column {} cannot be sorted", key)))?;

        self.persist_change().await;
        Ok((direction, self.refresh_async().await))
    }

    pub async fn set_filter(
        &mut self,
        key: &str,
        filter: Option<ColumnFilter>,
    ) -> Result<FetchOutcome, GridError> {
        self.require(GridFeatures::FILTER, "Filtering")?;
        if !self.column(key)?.allow_filter {
            return Err(GridError::NotSupported(format!("column {} cannot be filtered", key)));
        }

        self.columns.set_filter(key, filter);
        self.pagination.go_to(1);
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    pub async fn clear_filters(&mut self) -> FetchOutcome {
        self.columns.clear_filters();
        self.pagination.go_to(1);
        self.persist_change().await;
        self.refresh_async().await
    }

    /// Changes a column's footer aggregate. Only the aggregates are
    /// reloaded; the loaded page is kept.
    pub async fn set_calculation(
        &mut self,
        key: &str,
        calculation: CalculationType,
    ) -> Result<(), GridError> {
        self.require(GridFeatures::CALCULATIONS, "Calculations")?;
        self.column(key)?;
        if !self.columns.set_calculation(key, calculation) {
            return Err(GridError::NotSupported(format!(
                "{} is not available for column {}",
                calculation.label(),
                key
            )));
        }
        self.persist_change().await;
        self.recalculate().await
    }

    /// Reloads footer aggregates over the rows matching the current filters
    /// without fetching a page.
    pub async fn recalculate(&mut self) -> Result<(), GridError> {
        let request = self
            .composer()
            .request(self.pagination.page(), self.pagination.page_size());
        if request.calculations.is_empty() {
            self.page_state.calculation_values.clear();
            return Ok(());
        }
        let Some(loader) = self.loader.clone() else {
            return Ok(());
        };

        let ticket = self.calculation_slot.start();
        let result = loader.get_calculations(&request, ticket.cancel_token()).await;
        let current = self.calculation_slot.is_current(&ticket);
        self.calculation_slot.finish(&ticket);
        if !current {
            return Err(GridError::Cancelled);
        }

        match result {
            Ok(values) => {
                debug!("Recalculated {} aggregates for {}", values.len(), self.options.state_id);
                self.page_state.calculation_values = values;
                Ok(())
            }
            Err(e) => {
                error!("Calculations for {} failed: {}", self.options.state_id, e);
                self.context.shell.show_error(&e);
                Err(e)
            }
        }
    }

    /// Candidate values for a column's filter picker, filtered by every
    /// other column's filter.
    pub async fn selector_values(&mut self, key: &str) -> Result<Vec<Value>, GridError> {
        let column = self.column(key)?;
        let field = column.field.clone();
        let Some(loader) = self.loader.clone() else {
            return Ok(Vec::new());
        };

        let request = self.composer().selector_request(key);
        let ticket = self.selector_slot.start();
        let result = loader
            .get_selector_values(&field, &request, ticket.cancel_token())
            .await;
        let current = self.selector_slot.is_current(&ticket);
        self.selector_slot.finish(&ticket);

        if !current {
            return Err(GridError::Cancelled);
        }
        result
    }

    pub async fn set_page(&mut self, page: usize) -> FetchOutcome {
        if !self.pagination.go_to(page) {
            return FetchOutcome::Unchanged;
        }
        self.refresh_async().await
    }

    pub async fn next_page(&mut self) -> FetchOutcome {
        let page = self.pagination.page() + 1;
        self.set_page(page).await
    }

    pub async fn previous_page(&mut self) -> FetchOutcome {
        let page = self.pagination.page().saturating_sub(1);
        self.set_page(page).await
    }

    /// Changes the page size to one of the offered sizes and goes back to
    /// the first page.
    pub async fn set_page_size(&mut self, page_size: usize) -> Result<FetchOutcome, GridError> {
        if !self.options.allows_page_size(page_size) {
            return Err(GridError::NotSupported(format!(
                "page size {} is not offered",
                page_size
            )));
        }
        if !self.pagination.set_page_size(page_size) {
            return Ok(FetchOutcome::Unchanged);
        }
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    /// Appends a group level over the given column keys.
    pub async fn add_group(&mut self, keys: Vec<String>) -> Result<FetchOutcome, GridError> {
        self.require(GridFeatures::GROUP, "Grouping")?;
        for key in &keys {
            if !self.column(key)?.allow_group {
                return Err(GridError::NotSupported(format!("column {} cannot be grouped", key)));
            }
        }
        let keys: Vec<String> = keys.into_iter().filter(|k| !self.groups.contains(k)).collect();
        if !self.groups.add_level(keys) {
            return Ok(FetchOutcome::Unchanged);
        }

        self.collapse.clear();
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    pub async fn remove_group(&mut self, level: usize) -> Result<FetchOutcome, GridError> {
        self.groups
            .remove_level(level)
            .ok_or_else(|| GridError::NotFound(format!("group level {}", level)))?;
        self.collapse.clear();
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    /// Takes a column out of grouping, whichever level holds it. Levels left
    /// empty are dropped.
    pub async fn ungroup_column(&mut self, key: &str) -> Result<FetchOutcome, GridError> {
        if !self.groups.remove_key(key) {
            return Ok(FetchOutcome::Unchanged);
        }
        self.collapse.clear();
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    pub async fn move_group(&mut self, from: usize, to: usize) -> Result<FetchOutcome, GridError> {
        if !self.groups.move_level(from, to) {
            return Err(GridError::NotFound(format!("group level {}", from)));
        }
        self.collapse.clear();
        self.persist_change().await;
        Ok(self.refresh_async().await)
    }

    pub fn toggle_group_collapse(&mut self, path: &[Value]) -> bool {
        self.collapse.toggle(path)
    }

    /// Loaded rows interleaved with group headers.
    pub fn rows(&self) -> Vec<GridRow<'_, T>> {
        let level_fields: Vec<Vec<String>> = if self.has(GridFeatures::GROUP) {
            self.groups
                .levels()
                .iter()
                .map(|level| {
                    level
                        .iter()
                        .filter_map(|key| self.columns.get(key).map(|c| c.field.clone()))
                        .collect()
                })
                .collect()
        } else {
            Vec::new()
        };

        group_rows(&self.data, &level_fields, self.provider.as_ref(), &self.collapse)
    }

    fn group_level_count(&self) -> usize {
        if self.has(GridFeatures::GROUP) {
            self.groups.len()
        } else {
            0
        }
    }

    pub fn layout(&self, total_width: f64) -> GridLayout {
        let params = LayoutParams {
            total_width,
            group_levels: self.group_level_count(),
            group_indent_width: self.options.group_indent_width,
            selection_column_width: self
                .options
                .selection_column
                .then_some(self.options.selection_column_width),
        };
        compute_layout(&self.columns.visible(), params, header_intrinsic_width)
    }

    pub fn render(&self, total_width: f64) -> RenderNode {
        let layout = self.layout(total_width);
        let is_selected = |item: &T| self.selection.contains(item);
        let mut page_state = self.page_state.clone();
        page_state.loading = self.is_loading();

        let input = RenderInput {
            columns: self.columns.visible(),
            layout: &layout,
            rows: self.rows(),
            provider: self.provider.as_ref(),
            is_selected: &is_selected,
            selection_column: self.options.selection_column,
            group_levels: self.group_level_count(),
            page: &page_state,
            pagination: &self.pagination,
            show_footer: self.has(GridFeatures::CALCULATIONS),
            show_pager: self.has(GridFeatures::PAGING),
            page_size_options: self.options.page_size_choices(self.pagination.page_size()),
            translator: self.context.translator.as_ref(),
        };
        render_grid(&input)
    }

    pub fn select(&mut self, item: &T) -> bool {
        self.selection.add(item)
    }

    pub fn deselect(&mut self, item: &T) -> bool {
        self.selection.remove(item)
    }

    pub fn toggle_selection(&mut self, item: &T) -> bool {
        self.selection.toggle(item)
    }

    /// Selects the rows of the loaded page only.
    pub fn select_all(&mut self) {
        self.selection.select_all(&self.data);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear_all();
    }

    /// Header checkbox: selects the loaded page, or drops it from the
    /// selection when it is already fully selected. Rows selected on other
    /// pages are kept. Returns whether the page is selected afterwards.
    pub fn toggle_page_selection(&mut self) -> bool {
        if self.selection.all_selected(&self.data) {
            self.selection.clear_page(&self.data);
            false
        } else {
            self.selection.select_all(&self.data);
            true
        }
    }

    pub fn is_selected(&self, item: &T) -> bool {
        self.selection.contains(item)
    }

    fn row_actions_mut(&mut self, feature: GridFeatures, what: &str) -> Result<&mut RowActions<T>, GridError> {
        self.require(feature, what)?;
        if !self.can_edit {
            return Err(GridError::Unauthorized(format!("{} is not allowed", what)));
        }
        self.row_actions
            .as_mut()
            .ok_or_else(|| GridError::NotSupported("no row controller is bound".into()))
    }

    pub fn begin_add(&mut self) -> Result<(), GridError> {
        let draft = self.provider.create_item();
        self.row_actions_mut(GridFeatures::ADD, "Adding rows")?
            .begin_add(draft);
        Ok(())
    }

    pub fn begin_edit(&mut self, item: &T) -> Result<(), GridError> {
        self.row_actions_mut(GridFeatures::EDIT, "Editing rows")?
            .begin_edit(item);
        Ok(())
    }

    pub fn draft_mut(&mut self) -> Option<&mut T> {
        self.row_actions.as_mut().and_then(|actions| actions.draft_mut())
    }

    pub fn cancel_edit(&mut self) {
        if let Some(actions) = self.row_actions.as_mut() {
            actions.cancel_edit();
        }
    }

    /// Saves the open add/edit session and reloads on success. A rejected
    /// save leaves the session open and skips the reload.
    pub async fn save_row(&mut self) -> Result<RowOutcome, GridError> {
        let actions = self
            .row_actions
            .as_mut()
            .ok_or_else(|| GridError::NotSupported("no row controller is bound".into()))?;

        let result = actions.save().await;
        match result {
            Ok(outcome) => {
                self.refresh_async().await;
                Ok(outcome)
            }
            Err(e) => {
                if !e.is_validation() {
                    self.context.shell.show_error(&e);
                }
                Err(e)
            }
        }
    }

    pub async fn delete_row(&mut self, item: &T) -> Result<RowOutcome, GridError> {
        let result = self
            .row_actions_mut(GridFeatures::DELETE, "Deleting rows")?
            .delete(item)
            .await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.context.shell.show_error(&e);
                return Err(e);
            }
        };

        self.selection.remove(item);
        self.refresh_async().await;
        Ok(outcome)
    }

    /// Persists the active profile through the save button.
    pub async fn save_profile(&mut self) -> Result<SaveOutcome, GridError> {
        self.require(GridFeatures::PROFILES, "Profiles")?;
        self.profiles
            .update_profile(
                &self.columns,
                &self.groups,
                self.pagination.page_size(),
                SaveTrigger::SaveButton,
            )
            .await
    }

    pub async fn add_profile(
        &mut self,
        label: &str,
        is_shared: bool,
    ) -> Result<GridViewProfile, GridError> {
        self.require(GridFeatures::PROFILES, "Profiles")?;
        self.profiles
            .add_profile(
                label,
                is_shared,
                &self.columns,
                &self.groups,
                self.pagination.page_size(),
            )
            .await
    }

    pub async fn rename_profile(&mut self, id: &str, label: &str) -> Result<(), GridError> {
        self.require(GridFeatures::PROFILES, "Profiles")?;
        self.profiles.rename_profile(id, label).await
    }

    pub async fn load_profile(&mut self, id: &str) -> Result<FetchOutcome, GridError> {
        self.require(GridFeatures::PROFILES, "Profiles")?;
        let profile = self.profiles.load_profile(id).await;
        self.apply_profile(&profile);
        Ok(self.refresh_async().await)
    }

    /// Removes a profile; when it was active the default profile is applied
    /// and the data reloaded.
    pub async fn remove_profile(&mut self, id: &str) -> Result<Option<FetchOutcome>, GridError> {
        self.require(GridFeatures::PROFILES, "Profiles")?;
        match self.profiles.remove_profile(id).await? {
            Some(fallback) => {
                self.apply_profile(&fallback);
                Ok(Some(self.refresh_async().await))
            }
            None => Ok(None),
        }
    }

    /// Drops unsaved profile changes and re-applies the persisted version.
    pub async fn discard_profile_changes(&mut self) -> Option<FetchOutcome> {
        let persisted = self.profiles.discard_changes()?;
        self.apply_profile(&persisted);
        Some(self.refresh_async().await)
    }
}

fn build_columns<T>(provider: &dyn FieldProvider<T>) -> ColumnSet {
    ColumnSet::from_definitions(&provider.field_definitions(), |field| {
        provider.build_column_key(field)
    })
}

fn build_profile_manager(
    options: &GridOptions,
    context: &GridContext,
    transport: Option<Arc<dyn HttpTransport>>,
) -> ProfileManager {
    let local: Arc<dyn ProfileStore> = Arc::new(LocalProfileStore::new(
        Arc::clone(&context.storage),
        options.app_namespace.clone(),
    ));

    let remote: Option<Arc<dyn ProfileStore>> = match (&options.remote, transport) {
        (Some(remote), Some(transport)) => Some(Arc::new(RemoteProfileStore::new(
            transport,
            &remote.profiles_uri,
        ))),
        _ => None,
    };

    let personal = match (options.profile_storage, &remote) {
        (ProfileStorageMode::Remote, Some(remote)) => Arc::clone(remote),
        (ProfileStorageMode::Remote, None) => {
            warn!(
                "Remote profile storage requested for {} without a remote endpoint; using local storage",
                options.state_id
            );
            local
        }
        (ProfileStorageMode::Local, _) => local,
    };

    let shared_enabled = options.has(GridFeatures::SHARED_PROFILES) && remote.is_some();
    let settings = ProfileSettings {
        state_id: options.state_id.clone(),
        namespace: options.app_namespace.clone(),
        save_mode: options.profile_save_mode,
        shared_enabled,
    };

    ProfileManager::new(
        settings,
        personal,
        if shared_enabled { remote } else { None },
        Arc::clone(&context.storage),
    )
}

impl<T> std::fmt::Debug for GridView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridView")
            .field("state_id", &self.options.state_id)
            .field("columns", &self.columns.len())
            .field("page", &self.pagination.page())
            .field("rows", &self.data.len())
            .field("loading", &self.page_state.loading)
            .finish()
    }
}
