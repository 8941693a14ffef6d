use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// An entity type stored in a Gally resource collection.
///
/// The identity is a pure function of the business key fields. The locator
/// (`uri`) stays empty until the entity has been persisted remotely.
pub trait Entity: Clone + fmt::Debug {
    /// Name of the REST collection, e.g. `catalogs`.
    const RESOURCE: &'static str;

    fn identity(&self) -> String;

    fn uri(&self) -> Option<&str>;

    fn set_uri(&mut self, uri: String);

    /// JSON body sent on create/update. Bulk payloads reference other
    /// entities by their short IRI.
    fn payload(&self, bulk: bool) -> Value;

    /// Describes the first reference that has no locator yet.
    fn unresolved_reference(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub code: String,
    pub name: String,
    pub uri: Option<String>,
}

impl Catalog {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            uri: None,
        }
    }
}

impl Entity for Catalog {
    const RESOURCE: &'static str = "catalogs";

    fn identity(&self) -> String {
        self.code.clone()
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: String) {
        self.uri = Some(uri);
    }

    fn payload(&self, _bulk: bool) -> Value {
        json!({
            "code": self.code,
            "name": self.name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedCatalog {
    pub catalog: Catalog,
    pub code: String,
    pub name: String,
    pub locale: String,
    pub currency: String,
    pub uri: Option<String>,
}

impl LocalizedCatalog {
    pub fn new(
        catalog: Catalog,
        code: impl Into<String>,
        name: impl Into<String>,
        locale: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            code: code.into(),
            name: name.into(),
            locale: locale.into(),
            currency: currency.into(),
            uri: None,
        }
    }
}

impl Entity for LocalizedCatalog {
    const RESOURCE: &'static str = "localized_catalogs";

    fn identity(&self) -> String {
        self.code.clone()
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: String) {
        self.uri = Some(uri);
    }

    fn payload(&self, bulk: bool) -> Value {
        json!({
            "code": self.code,
            "name": self.name,
            "locale": self.locale,
            "currency": self.currency,
            "catalog": reference(self.catalog.uri.as_deref(), bulk),
        })
    }

    fn unresolved_reference(&self) -> Option<String> {
        self.catalog
            .uri
            .is_none()
            .then(|| format!("catalog {}", self.catalog.code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub entity: String,
    pub uri: Option<String>,
}

impl Metadata {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            uri: None,
        }
    }
}

impl Entity for Metadata {
    const RESOURCE: &'static str = "metadata";

    fn identity(&self) -> String {
        self.entity.clone()
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: String) {
        self.uri = Some(uri);
    }

    fn payload(&self, _bulk: bool) -> Value {
        json!({ "entity": self.entity })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFieldType {
    Text,
    Keyword,
    Select,
    Int,
    Boolean,
    Float,
    Price,
    Stock,
    Category,
    Reference,
    Image,
    Object,
    Date,
    Location,
}

impl SourceFieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFieldType::Text => "text",
            SourceFieldType::Keyword => "keyword",
            SourceFieldType::Select => "select",
            SourceFieldType::Int => "int",
            SourceFieldType::Boolean => "boolean",
            SourceFieldType::Float => "float",
            SourceFieldType::Price => "price",
            SourceFieldType::Stock => "stock",
            SourceFieldType::Category => "category",
            SourceFieldType::Reference => "reference",
            SourceFieldType::Image => "image",
            SourceFieldType::Object => "object",
            SourceFieldType::Date => "date",
            SourceFieldType::Location => "location",
        }
    }
}

impl fmt::Display for SourceFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translated label, bound to the localized catalog it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub localized_catalog: LocalizedCatalog,
    pub label: String,
}

impl Label {
    pub fn new(localized_catalog: LocalizedCatalog, label: impl Into<String>) -> Self {
        Self {
            localized_catalog,
            label: label.into(),
        }
    }

    pub fn payload(&self, bulk: bool) -> Value {
        json!({
            "localizedCatalog": reference(self.localized_catalog.uri.as_deref(), bulk),
            "label": self.label,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceField {
    pub metadata: Metadata,
    pub code: String,
    pub field_type: SourceFieldType,
    pub default_label: String,
    pub labels: Vec<Label>,
    pub is_system: bool,
    pub uri: Option<String>,
}

impl SourceField {
    pub fn new(
        metadata: Metadata,
        code: impl Into<String>,
        field_type: SourceFieldType,
        default_label: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            code: code.into(),
            field_type,
            default_label: default_label.into(),
            labels: Vec::new(),
            is_system: false,
            uri: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

impl Entity for SourceField {
    const RESOURCE: &'static str = "source_fields";

    fn identity(&self) -> String {
        format!("{}_{}", self.metadata.entity, self.code)
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: String) {
        self.uri = Some(uri);
    }

    fn payload(&self, bulk: bool) -> Value {
        let mut data = json!({
            "metadata": reference(self.metadata.uri.as_deref(), bulk),
            "code": self.code,
            "type": self.field_type.as_str(),
            "defaultLabel": self.default_label,
            "labels": self.labels.iter().map(|label| label.payload(bulk)).collect::<Vec<_>>(),
        });
        if self.is_system {
            data["isUsedForRules"] = Value::Bool(true);
            data["isSystem"] = Value::Bool(true);
        }
        data
    }

    fn unresolved_reference(&self) -> Option<String> {
        if self.metadata.uri.is_none() {
            return Some(format!("metadata {}", self.metadata.entity));
        }
        unresolved_label(&self.labels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFieldOption {
    pub source_field: SourceField,
    pub code: String,
    pub position: i64,
    pub default_label: String,
    pub labels: Vec<Label>,
    pub uri: Option<String>,
}

impl SourceFieldOption {
    pub fn new(
        source_field: SourceField,
        code: impl Into<String>,
        position: i64,
        default_label: impl Into<String>,
    ) -> Self {
        Self {
            source_field,
            code: code.into(),
            position,
            default_label: default_label.into(),
            labels: Vec::new(),
            uri: None,
        }
    }

    pub fn with_labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }
}

impl Entity for SourceFieldOption {
    const RESOURCE: &'static str = "source_field_options";

    fn identity(&self) -> String {
        format!("{}_{}", self.source_field.code, self.code)
    }

    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    fn set_uri(&mut self, uri: String) {
        self.uri = Some(uri);
    }

    fn payload(&self, bulk: bool) -> Value {
        json!({
            "sourceField": reference(self.source_field.uri.as_deref(), bulk),
            "code": self.code,
            "position": self.position,
            "defaultLabel": self.default_label,
            "labels": self.labels.iter().map(|label| label.payload(bulk)).collect::<Vec<_>>(),
        })
    }

    fn unresolved_reference(&self) -> Option<String> {
        if self.source_field.uri.is_none() {
            return Some(format!("source field {}", self.source_field.identity()));
        }
        unresolved_label(&self.labels)
    }
}

fn unresolved_label(labels: &[Label]) -> Option<String> {
    labels
        .iter()
        .find(|label| label.localized_catalog.uri.is_none())
        .map(|label| format!("localized catalog {}", label.localized_catalog.code))
}

fn reference(uri: Option<&str>, bulk: bool) -> Value {
    match uri {
        Some(uri) if bulk => Value::String(short_iri(uri)),
        Some(uri) => Value::String(uri.to_string()),
        None => Value::Null,
    }
}

/// Keeps the last two path segments of an IRI: `/api/metadata/3` becomes
/// `/metadata/3`.
pub(crate) fn short_iri(uri: &str) -> String {
    let mut parts = uri.rsplitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(resource), Some(_)) if !id.is_empty() && !resource.is_empty() => {
            format!("/{resource}/{id}")
        }
        _ => uri.to_string(),
    }
}
