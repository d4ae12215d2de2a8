use serde::{Deserialize, Deserializer, Serialize};

/// Link to another row, as carried by relation fields.
///
/// Views return relations in several shapes: a bare id, an object with an
/// `id` (and usually a `displayField`), or a list holding one of those.
/// All of them decode to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub id: String,
    #[serde(rename = "displayField", skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReference {
    Id(String),
    Object {
        id: String,
        #[serde(default, rename = "displayField")]
        display_field: Option<String>,
    },
    List(Vec<RawReference>),
    Nodes { nodes: Vec<RawReference> },
}

impl RawReference {
    fn into_reference(self) -> Option<Reference> {
        match self {
            RawReference::Id(id) => Some(Reference::new(id)),
            RawReference::Object { id, display_field } => Some(Reference { id, display_field }),
            RawReference::List(items) | RawReference::Nodes { nodes: items } => {
                items.into_iter().next().and_then(RawReference::into_reference)
            }
        }
    }

    fn into_references(self) -> Vec<Reference> {
        match self {
            RawReference::List(items) | RawReference::Nodes { nodes: items } => items
                .into_iter()
                .filter_map(RawReference::into_reference)
                .collect(),
            single => single.into_reference().into_iter().collect(),
        }
    }
}

impl Reference {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_field: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_field = Some(display.into());
        self
    }

    /// Display text, falling back to the id.
    pub fn label(&self) -> &str {
        self.display_field.as_deref().unwrap_or(&self.id)
    }
}

impl<'de> Deserialize<'de> for Reference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawReference::deserialize(deserializer)?
            .into_reference()
            .ok_or_else(|| serde::de::Error::custom("empty reference"))
    }
}

/// Decodes a to-many relation field (`[..]` or `{nodes: [..]}`).
pub(crate) fn deserialize_references<'de, D>(deserializer: D) -> Result<Vec<Reference>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawReference>::deserialize(deserializer)
        .map(|raw| raw.map(RawReference::into_references).unwrap_or_default())
}
