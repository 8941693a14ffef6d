//! Desired catalog structure, loaded from a JSON file.
//!
//! ```json
//! {
//!   "catalogs": [{
//!     "code": "com", "name": "Commerce",
//!     "localized_catalogs": [
//!       { "code": "com_fr", "name": "French", "locale": "fr_FR", "currency": "EUR" }
//!     ]
//!   }],
//!   "source_fields": [{
//!     "entity": "product", "code": "color", "type": "select",
//!     "default_label": "Color", "labels": { "com_fr": "Couleur" },
//!     "options": [{ "code": "red", "position": 1, "default_label": "Red" }]
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gally_core::{
    Catalog, Label, LocalizedCatalog, Metadata, SourceField, SourceFieldOption, SourceFieldType,
};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("failed to read structure file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid structure file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{owner} has a label for unknown localized catalog {code}")]
    UnknownLocalizedCatalog { owner: String, code: String },
}

#[derive(Debug, Deserialize)]
struct StructureDocument {
    #[serde(default)]
    catalogs: Vec<CatalogDocument>,
    #[serde(default)]
    source_fields: Vec<SourceFieldDocument>,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    code: String,
    name: String,
    #[serde(default)]
    localized_catalogs: Vec<LocalizedCatalogDocument>,
}

#[derive(Debug, Deserialize)]
struct LocalizedCatalogDocument {
    code: String,
    name: String,
    locale: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SourceFieldDocument {
    entity: String,
    code: String,
    #[serde(rename = "type")]
    field_type: SourceFieldType,
    #[serde(default)]
    default_label: Option<String>,
    #[serde(default)]
    labels: IndexMap<String, String>,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    options: Vec<OptionDocument>,
}

#[derive(Debug, Deserialize)]
struct OptionDocument {
    code: String,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    default_label: Option<String>,
    #[serde(default)]
    labels: IndexMap<String, String>,
}

/// Desired entities, in file order, ready to be handed to the synchronizer.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    pub localized_catalogs: Vec<LocalizedCatalog>,
    pub source_fields: Vec<SourceField>,
    pub source_field_options: Vec<SourceFieldOption>,
}

impl Structure {
    pub fn load(path: &Path) -> Result<Self, StructureError> {
        let content = std::fs::read_to_string(path).map_err(|source| StructureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, StructureError> {
        let document: StructureDocument = serde_json::from_str(content)?;
        let mut structure = Structure::default();

        for catalog in document.catalogs {
            let parent = Catalog::new(catalog.code, catalog.name);
            for localized in catalog.localized_catalogs {
                structure.localized_catalogs.push(LocalizedCatalog::new(
                    parent.clone(),
                    localized.code,
                    localized.name,
                    localized.locale,
                    localized.currency,
                ));
            }
        }
        let known: HashMap<&str, &LocalizedCatalog> = structure
            .localized_catalogs
            .iter()
            .map(|localized| (localized.code.as_str(), localized))
            .collect();

        let mut source_fields = Vec::with_capacity(document.source_fields.len());
        let mut source_field_options = Vec::new();
        for field in document.source_fields {
            let default_label = field.default_label.unwrap_or_else(|| field.code.clone());
            let mut source_field = SourceField::new(
                Metadata::new(field.entity),
                field.code,
                field.field_type,
                default_label,
            );
            source_field.labels = labels(&known, &source_field.code, field.labels)?;
            source_field.is_system = field.is_system;

            for option in field.options {
                let default_label = option.default_label.unwrap_or_else(|| option.code.clone());
                let owner = format!("option {}_{}", source_field.code, option.code);
                let mut source_field_option = SourceFieldOption::new(
                    source_field.clone(),
                    option.code,
                    option.position,
                    default_label,
                );
                source_field_option.labels = labels(&known, &owner, option.labels)?;
                source_field_options.push(source_field_option);
            }
            source_fields.push(source_field);
        }

        structure.source_fields = source_fields;
        structure.source_field_options = source_field_options;
        Ok(structure)
    }
}

fn labels(
    known: &HashMap<&str, &LocalizedCatalog>,
    owner: &str,
    raw: IndexMap<String, String>,
) -> Result<Vec<Label>, StructureError> {
    raw.into_iter()
        .map(|(code, label)| match known.get(code.as_str()) {
            Some(localized) => Ok(Label::new((*localized).clone(), label)),
            None => Err(StructureError::UnknownLocalizedCatalog {
                owner: owner.to_string(),
                code,
            }),
        })
        .collect()
}
