use std::sync::Arc;

use lgrid_core::{
    CellValueType, DataPage, FieldProvider, GridContext, HttpResponse, MemoryStorage,
    StaticFields, Value,
};
use serde::{Deserialize, Serialize};

use crate::{FakePolicy, FakeTransport, RecordingShell};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub department: String,
    pub age: i64,
    pub salary: f64,
}

impl Person {
    pub fn new(id: i64, name: &str, status: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: status.to_string(),
            department: "Sales".to_string(),
            age: 30,
            salary: 1000.0,
        }
    }
}

/// `count` people; even ids are `Active`, odd ids `Inactive`. Names are
/// zero-padded so name order matches id order.
pub fn people(count: i64) -> Vec<Person> {
    (1..=count)
        .map(|id| Person {
            id,
            name: format!("Person {:03}", id),
            status: if id % 2 == 0 { "Active" } else { "Inactive" }.to_string(),
            department: ["Sales", "Support", "Finance"][(id % 3) as usize].to_string(),
            age: 20 + id % 40,
            salary: 1000.0 + (id as f64) * 10.0,
        })
        .collect()
}

pub fn person_fields() -> Arc<dyn FieldProvider<Person>> {
    Arc::new(
        StaticFields::<Person>::new()
            .field("Id", CellValueType::Integer, |p| Value::Int(p.id))
            .field("Name", CellValueType::Text, |p| Value::from(&p.name))
            .field("Status", CellValueType::Text, |p| Value::from(&p.status))
            .field("Department", CellValueType::Text, |p| Value::from(&p.department))
            .grouped("Work")
            .field("Age", CellValueType::Integer, |p| Value::Int(p.age))
            .grouped("Work")
            .field("Salary", CellValueType::Decimal, |p| Value::Float(p.salary)),
    )
}

/// Host capabilities backed by fakes, returned alongside so tests can
/// inspect them.
pub struct FakeHost {
    pub storage: Arc<MemoryStorage>,
    pub policy: FakePolicy,
    pub shell: RecordingShell,
    pub transport: FakeTransport,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            policy: FakePolicy::new(),
            shell: RecordingShell::new(),
            transport: FakeTransport::new(),
        }
    }

    pub fn context(&self) -> GridContext {
        GridContext::new(self.storage.clone())
            .with_policy(Arc::new(self.policy.clone()))
            .with_shell(Arc::new(self.shell.clone()))
            .with_transport(Arc::new(self.transport.clone()))
    }

    /// Same storage and fakes, but no transport.
    pub fn local_context(&self) -> GridContext {
        GridContext::new(self.storage.clone())
            .with_policy(Arc::new(self.policy.clone()))
            .with_shell(Arc::new(self.shell.clone()))
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

pub fn page_response<T: Serialize>(
    data: Vec<T>,
    current_page: usize,
    page_size: usize,
    active_rows: i64,
) -> HttpResponse {
    let page = DataPage {
        data,
        total_rows: Some(active_rows),
        active_rows: Some(active_rows),
        current_page,
        page_size,
        calculation_values: Default::default(),
    };
    match serde_json::to_string(&page) {
        Ok(body) => HttpResponse::new(200, body),
        Err(err) => HttpResponse::new(500, err.to_string()),
    }
}
