use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{CellValueType, Value};

/// Reads one field of an item. Resolved once when the field is registered.
pub type FieldAccessor<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// Dictionary-backed row used when the column set is only known at runtime.
pub type DynamicRow = IndexMap<String, Value>;

/// Describes one bindable field of the item type.
pub struct FieldDefinition<T> {
    pub name: String,
    pub title: String,
    pub value_type: CellValueType,
    pub group_name: Option<String>,
    pub accessor: FieldAccessor<T>,
}

impl<T> Clone for FieldDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            title: self.title.clone(),
            value_type: self.value_type,
            group_name: self.group_name.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T> std::fmt::Debug for FieldDefinition<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("value_type", &self.value_type)
            .field("group_name", &self.group_name)
            .finish()
    }
}

impl<T> FieldDefinition<T> {
    pub fn value(&self, item: &T) -> Value {
        (self.accessor)(item)
    }
}

/// Resolves the column set for an item shape.
///
/// Typed items use [`StaticFields`]; dictionary rows use [`DynamicFields`].
/// The provider is chosen once per grid and never swapped.
pub trait FieldProvider<T>: Send + Sync {
    fn field_definitions(&self) -> Vec<FieldDefinition<T>>;

    /// Fresh item for the "add row" form.
    fn create_item(&self) -> T;

    /// Stable column key for a field name.
    fn build_column_key(&self, field: &str) -> String;

    fn field(&self, field: &str) -> Option<FieldDefinition<T>> {
        self.field_definitions()
            .into_iter()
            .find(|definition| definition.name == field)
    }

    fn value(&self, item: &T, field: &str) -> Value {
        self.field(field)
            .map(|definition| definition.value(item))
            .unwrap_or(Value::Null)
    }
}

/// Field list for a concrete item type, registered up front.
pub struct StaticFields<T> {
    fields: Vec<FieldDefinition<T>>,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: Default + 'static> StaticFields<T> {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            factory: Arc::new(T::default),
        }
    }
}

impl<T: Default + 'static> Default for StaticFields<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StaticFields<T> {
    pub fn with_factory(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            fields: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value_type: CellValueType,
        accessor: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.fields.push(FieldDefinition {
            title: name.clone(),
            name,
            value_type,
            group_name: None,
            accessor: Arc::new(accessor),
        });
        self
    }

    /// Sets the header title of the last registered field.
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.title = title.into();
        }
        self
    }

    /// Places the last registered field under a header group.
    pub fn grouped(mut self, group: impl Into<String>) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.group_name = Some(group.into());
        }
        self
    }
}

impl<T: Send + Sync> FieldProvider<T> for StaticFields<T> {
    fn field_definitions(&self) -> Vec<FieldDefinition<T>> {
        self.fields.clone()
    }

    fn create_item(&self) -> T {
        (self.factory)()
    }

    fn build_column_key(&self, field: &str) -> String {
        field.to_string()
    }

    fn field(&self, field: &str) -> Option<FieldDefinition<T>> {
        self.fields.iter().find(|d| d.name == field).cloned()
    }
}

/// Schema entry for a dynamic column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicProperty {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub value_type: CellValueType,
    #[serde(default)]
    pub group_name: Option<String>,
}

impl DynamicProperty {
    pub fn new(name: impl Into<String>, value_type: CellValueType) -> Self {
        Self {
            name: name.into(),
            title: None,
            value_type,
            group_name: None,
        }
    }
}

/// Field list for [`DynamicRow`] items, driven by a runtime schema.
#[derive(Debug, Clone, Default)]
pub struct DynamicFields {
    properties: Vec<DynamicProperty>,
}

impl DynamicFields {
    pub fn new(properties: Vec<DynamicProperty>) -> Self {
        Self { properties }
    }

    pub fn properties(&self) -> &[DynamicProperty] {
        &self.properties
    }
}

impl FieldProvider<DynamicRow> for DynamicFields {
    fn field_definitions(&self) -> Vec<FieldDefinition<DynamicRow>> {
        self.properties
            .iter()
            .map(|property| {
                let key = property.name.clone();
                FieldDefinition {
                    name: property.name.clone(),
                    title: property
                        .title
                        .clone()
                        .unwrap_or_else(|| property.name.clone()),
                    value_type: property.value_type,
                    group_name: property.group_name.clone(),
                    accessor: Arc::new(move |row: &DynamicRow| {
                        row.get(&key).cloned().unwrap_or(Value::Null)
                    }),
                }
            })
            .collect()
    }

    fn create_item(&self) -> DynamicRow {
        self.properties
            .iter()
            .map(|property| (property.name.clone(), Value::Null))
            .collect()
    }

    fn build_column_key(&self, field: &str) -> String {
        format!("row[{}]", field)
    }

    fn value(&self, item: &DynamicRow, field: &str) -> Value {
        item.get(field).cloned().unwrap_or(Value::Null)
    }
}
