//! In-process row store used by tests and the offline demo.
//!
//! Views are backed by named tables; several views may project the same
//! table through aliases. Filters match scalar fields, the `id` of object
//! fields, and any element of array fields, which is enough to emulate the
//! relation-bearing views the client reads.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cuid2::CuidConstructor;
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::query::{ListQuery, Page, Row, SortDirection, Upload};
use crate::store::RowStore;

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    List,
    Get,
    Insert,
    AddRelation,
    Upload,
    Authenticate,
}

/// One recorded call, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    List { view: String, query: ListQuery },
    Get { view: String, id: String },
    Insert { view: String, fields: Row },
    AddRelation { view: String, id: String, relations: Row },
    Upload { view: String, file_name: String },
    Authenticate { email: String },
}

impl StoreCall {
    pub fn kind(&self) -> CallKind {
        match self {
            StoreCall::List { .. } => CallKind::List,
            StoreCall::Get { .. } => CallKind::Get,
            StoreCall::Insert { .. } => CallKind::Insert,
            StoreCall::AddRelation { .. } => CallKind::AddRelation,
            StoreCall::Upload { .. } => CallKind::Upload,
            StoreCall::Authenticate { .. } => CallKind::Authenticate,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    aliases: HashMap<String, String>,
    credentials: HashMap<String, (String, String)>,
    calls: Vec<StoreCall>,
    failures: HashMap<CallKind, VecDeque<u16>>,
    latency: HashMap<CallKind, Duration>,
    uploads: usize,
}

impl MemoryState {
    fn table_name(&self, view: &str) -> String {
        self.aliases
            .get(view)
            .cloned()
            .unwrap_or_else(|| view.to_string())
    }

    fn table(&self, view: &str) -> Option<&Vec<Row>> {
        self.tables.get(&self.table_name(view))
    }

    fn table_mut(&mut self, view: &str) -> &mut Vec<Row> {
        let name = self.table_name(view);
        self.tables.entry(name).or_default()
    }

    fn take_failure(&mut self, kind: CallKind) -> Option<StoreError> {
        self.failures
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front())
            .map(|status| StoreError::from_status(status, "injected failure"))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `view` read and write the table named `table`.
    pub async fn alias(&self, view: &str, table: &str) {
        let mut state = self.state.write().await;
        state.aliases.insert(view.to_string(), table.to_string());
    }

    /// Appends rows to the table behind `view` without recording a call.
    pub async fn seed(&self, view: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.state.write().await;
        let table = state.table_mut(view);
        for mut row in rows {
            ensure_id(&mut row);
            table.push(row);
        }
    }

    /// Registers credentials accepted by `authenticate`.
    pub async fn register_credentials(&self, email: &str, password: &str, token: &str) {
        let mut state = self.state.write().await;
        state
            .credentials
            .insert(email.to_string(), (password.to_string(), token.to_string()));
    }

    /// The next call of `kind` fails with the given HTTP status.
    pub async fn fail_next(&self, kind: CallKind, status: u16) {
        let mut state = self.state.write().await;
        state.failures.entry(kind).or_default().push_back(status);
    }

    /// Delays every call of `kind` by `delay` before it touches any table.
    pub async fn set_latency(&self, kind: CallKind, delay: Duration) {
        let mut state = self.state.write().await;
        state.latency.insert(kind, delay);
    }

    pub async fn rows(&self, view: &str) -> Vec<Row> {
        let state = self.state.read().await;
        state.table(view).cloned().unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn calls_of(&self, kind: CallKind) -> Vec<StoreCall> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Records the call, applies latency, then returns any injected failure.
    async fn begin(&self, call: StoreCall) -> StoreResult<()> {
        let kind = call.kind();
        let delay = {
            let mut state = self.state.write().await;
            state.calls.push(call);
            state.latency.get(&kind).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        match state.take_failure(kind) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn list(&self, view: &str, query: &ListQuery) -> StoreResult<Page> {
        self.begin(StoreCall::List {
            view: view.to_string(),
            query: query.clone(),
        })
        .await?;

        let state = self.state.read().await;
        let mut rows: Vec<Row> = state
            .table(view)
            .map(|rows| rows.iter().filter(|row| matches_query(row, query)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_fields(a.get(&order.field), b.get(&order.field))
                    .then_with(|| compare_fields(a.get("id"), b.get("id")));
                match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let total = rows.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);
        let nodes = rows.into_iter().skip(offset).take(limit).collect();

        Ok(Page {
            nodes,
            total_count: Some(total),
        })
    }

    async fn get(&self, view: &str, id: &str) -> StoreResult<Option<Row>> {
        self.begin(StoreCall::Get {
            view: view.to_string(),
            id: id.to_string(),
        })
        .await?;

        let state = self.state.read().await;
        Ok(state
            .table(view)
            .and_then(|rows| rows.iter().find(|row| row_id(row) == Some(id)).cloned()))
    }

    async fn insert(&self, view: &str, fields: Row) -> StoreResult<Row> {
        if !fields.is_object() {
            return Err(StoreError::invalid_row("insert expects an object"));
        }
        self.begin(StoreCall::Insert {
            view: view.to_string(),
            fields: fields.clone(),
        })
        .await?;

        let mut row = fields;
        ensure_id(&mut row);
        let mut state = self.state.write().await;
        state.table_mut(view).push(row.clone());
        Ok(row)
    }

    async fn add_relation(&self, view: &str, id: &str, relations: Row) -> StoreResult<()> {
        let Value::Object(relations_map) = relations.clone() else {
            return Err(StoreError::invalid_row("relations must be an object"));
        };
        self.begin(StoreCall::AddRelation {
            view: view.to_string(),
            id: id.to_string(),
            relations,
        })
        .await?;

        let mut state = self.state.write().await;
        let row = state
            .table_mut(view)
            .iter_mut()
            .find(|row| row_id(row) == Some(id))
            .ok_or(StoreError::NotFound)?;

        let Value::Object(fields) = row else {
            return Err(StoreError::invalid_row("stored row is not an object"));
        };
        for (field, added) in relations_map {
            let entry = fields
                .entry(field)
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(vec![entry.clone()]);
            }
            if let Value::Array(existing) = entry {
                let added = match added {
                    Value::Array(values) => values,
                    other => vec![other],
                };
                for value in added {
                    if !existing.iter().any(|current| reference_id(current) == reference_id(&value)) {
                        existing.push(value);
                    }
                }
            }
        }
        Ok(())
    }

    async fn upload(&self, view: &str, file: Upload) -> StoreResult<String> {
        self.begin(StoreCall::Upload {
            view: view.to_string(),
            file_name: file.file_name.clone(),
        })
        .await?;

        let mut state = self.state.write().await;
        state.uploads += 1;
        Ok(format!("memory://{view}/{}/{}", state.uploads, file.file_name))
    }

    async fn authenticate(&self, email: &str, password: &str) -> StoreResult<String> {
        self.begin(StoreCall::Authenticate {
            email: email.to_string(),
        })
        .await?;

        let state = self.state.read().await;
        match state.credentials.get(email) {
            Some((expected, token)) if expected == password => Ok(token.clone()),
            _ => Err(StoreError::from_status(400, "invalid credentials")),
        }
    }
}

fn ensure_id(row: &mut Row) {
    if let Value::Object(fields) = row {
        if !fields.get("id").map(Value::is_string).unwrap_or(false) {
            fields.insert("id".to_string(), Value::String(CUID.create_id()));
        }
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

/// Id carried by a relation value: a bare id or an object with an `id`.
fn reference_id(value: &Value) -> Option<&str> {
    match value {
        Value::String(id) => Some(id),
        Value::Object(fields) => fields.get("id").and_then(Value::as_str),
        _ => None,
    }
}

fn field_matches(field: Option<&Value>, expected: &str) -> bool {
    match field {
        Some(Value::Array(values)) => values.iter().any(|value| field_matches(Some(value), expected)),
        Some(Value::Object(_)) => field.and_then(reference_id) == Some(expected),
        Some(Value::String(value)) => value == expected,
        Some(Value::Bool(value)) => value.to_string() == expected,
        Some(Value::Number(value)) => value.to_string() == expected,
        _ => false,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(text) => text.to_lowercase().contains(needle),
        Value::Array(values) => values.iter().any(|value| contains_text(value, needle)),
        _ => false,
    }
}

fn parse_instant(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|instant| instant.with_timezone(&Utc))
}

fn matches_query(row: &Row, query: &ListQuery) -> bool {
    if !query
        .filters
        .iter()
        .all(|(field, expected)| field_matches(row.get(field), expected))
    {
        return false;
    }

    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let found = row
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(key, _)| key.as_str() != "id")
                    .any(|(_, value)| contains_text(value, &needle))
            })
            .unwrap_or(false);
        if !found {
            return false;
        }
    }

    if let Some(after) = query.after {
        match parse_instant(row.get("createdAt")) {
            Some(created_at) if created_at > after => {}
            _ => return false,
        }
    }

    true
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    if let (Some(left), Some(right)) = (parse_instant(a), parse_instant(b)) {
        return left.cmp(&right);
    }
    match (a, b) {
        (Some(Value::Number(left)), Some(Value::Number(right))) => left
            .as_f64()
            .partial_cmp(&right.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
