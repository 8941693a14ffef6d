mod auth;
mod client;
pub mod entity;
pub mod index;
pub mod repository;
mod token;

pub use auth::{AuthClient, AuthError, AuthToken};
pub use client::{ApiErrorClass, Configuration, GallyClient, GallyError};
pub use entity::{
    Catalog, Entity, Label, LocalizedCatalog, Metadata, SourceField, SourceFieldOption,
    SourceFieldType,
};
pub use index::{Index, IndexOperation};
pub use repository::{
    BulkRepository, CatalogRepository, EntityMap, LocalizedCatalogRepository, MetadataRepository,
    Repository, SourceFieldOptionRepository, SourceFieldRepository,
};
pub use token::TokenProvider;
