//! Query and payload types shared by every row store implementation.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A row as returned by a view. Views decide the shape.
pub type Row = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

/// Filter, sort and pagination parameters for a `list` call.
///
/// ```
/// use huddle_rowstore::ListQuery;
///
/// let query = ListQuery::new()
///     .filter("channel", "c1")
///     .newest_first("createdAt")
///     .page(10, 10);
/// let params = query.to_params();
/// assert!(params.contains(&("channel".to_string(), "c1".to_string())));
/// assert!(params.contains(&("offset".to_string(), "10".to_string())));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filters: BTreeMap<String, String>,
    pub search: Option<String>,
    /// Only rows created strictly after this instant.
    pub after: Option<DateTime<Utc>>,
    pub order: Option<SortOrder>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Empty search text is dropped.
    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.search = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    pub fn after(mut self, watermark: Option<DateTime<Utc>>) -> Self {
        self.after = watermark;
        self
    }

    pub fn newest_first(mut self, field: impl Into<String>) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            direction: SortDirection::Desc,
        });
        self
    }

    pub fn oldest_first(mut self, field: impl Into<String>) -> Self {
        self.order = Some(SortOrder {
            field: field.into(),
            direction: SortDirection::Asc,
        });
        self
    }

    pub fn page(mut self, offset: u32, limit: u32) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs as sent over HTTP.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if let Some(search) = &self.search {
            params.push(("search".to_string(), search.clone()));
        }
        if let Some(after) = &self.after {
            params.push((
                "after".to_string(),
                after.to_rfc3339_opts(SecondsFormat::Millis, true),
            ));
        }
        if let Some(order) = &self.order {
            params.push(("orderBy".to_string(), order.field.clone()));
            params.push(("order".to_string(), order.direction.as_str().to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }
}

/// One page of rows from a view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub nodes: Vec<Row>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

impl Page {
    pub fn new(nodes: Vec<Row>) -> Self {
        let total_count = Some(nodes.len() as u64);
        Self { nodes, total_count }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A file handed to the store's upload endpoint.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}
