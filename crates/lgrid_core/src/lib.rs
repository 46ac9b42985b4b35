pub mod aggregate;
mod column;
mod config;
mod error;
mod field;
mod filter;
mod grid;
mod grouping;
mod host;
pub mod layout;
mod loader;
mod page;
pub mod profile;
mod profile_manager;
mod profile_store;
mod query;
mod remote;
pub mod render;
mod row_actions;
mod selection;
pub mod storage;
mod task;
mod value;

pub use column::{
    CalculationType, ColumnSet, ColumnState, ColumnWidth, MAX_SORTED_COLUMNS, SortDirection,
};
pub use config::{GridFeatures, GridOptions, ProfileSaveMode, ProfileStorageMode, RemoteEndpoint};
pub use error::{GridError, ProfileValidationError};
pub use field::{
    DynamicFields, DynamicProperty, DynamicRow, FieldAccessor, FieldDefinition, FieldProvider,
    StaticFields,
};
pub use filter::{ColumnFilter, FilterClause, ModelFilter};
pub use grid::{FetchJob, FetchOutcome, FetchResult, GridItem, GridView};
pub use grouping::{GridRow, GroupCollapseState, GroupLevels, group_rows};
pub use host::{
    GridContext, HostShell, IdentityTranslator, LogShell, PolicyChecker, StaticPolicies,
    Translator,
};
pub use layout::{ColumnStyle, GridLayout, GridTemplate, LayoutParams, compute_layout};
pub use loader::{DataPageLoader, LocalLoader, SharedItems};
pub use page::{DataPage, PageState, Pagination};
pub use profile::{GridViewProfile, ProfileColumn};
pub use profile_manager::{
    ProfileManager, ProfileSettings, ProfileState, SaveOutcome, SaveTrigger,
};
pub use profile_store::{LocalProfileStore, ProfilePaths, ProfileStore, RemoteProfileStore};
pub use query::{CalculationOption, DataRequest, QueryComposer, SortOption};
pub use remote::{
    ControllerPaths, HttpMethod, HttpRequest, HttpResponse, HttpTransport, RemoteLoader,
    send_checked,
};
pub use render::RenderNode;
pub use row_actions::{
    EditMode, EditSession, LocalRowController, RemoteRowController, RowActions, RowController,
    RowOutcome,
};
pub use selection::{ItemComparer, Selection};
pub use storage::{JsonFileStorage, LocalStorage, LocalStorageExt, MemoryStorage};
pub use task::{CancelToken, OperationSlot, TaskId, TaskKind, Ticket};
pub use value::{CellValueType, Value};

pub use chrono;
