//! Reconciles the declared catalog structure with a Gally instance.
//!
//! Every `sync_all_*` entry point runs in three phases: preload the remote
//! state of the synchronized kind and of everything it references, resolve
//! and upsert each desired entity, then optionally delete what is left over.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use gally_core::{
    BulkRepository, Catalog, CatalogRepository, Entity, EntityMap, GallyClient, GallyError, Label,
    LocalizedCatalog, LocalizedCatalogRepository, Metadata, MetadataRepository, Repository,
    SourceField, SourceFieldOption, SourceFieldOptionRepository, SourceFieldRepository,
};

/// Metadata the remote instance ships with; cleanup never removes them.
pub const BUILT_IN_METADATA: [&str; 2] = ["product", "category"];

type Discriminator<E> = fn(&E, &E) -> bool;

/// An entity present remotely before the run and absent from the desired
/// structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub resource: &'static str,
    pub identity: String,
}

#[derive(Debug, Clone)]
pub struct DeleteFailure {
    pub resource: &'static str,
    pub identity: String,
    pub error: String,
    pub retryable: bool,
}

/// Outcome of one `sync_all_*` call.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub synced: usize,
    /// Desired entities left untouched because they exist remotely as system
    /// entities.
    pub skipped_system: usize,
    /// Orphans kept because they are system or built-in entities.
    pub exempt: usize,
    pub dry_run: bool,
    pub orphans: Vec<Orphan>,
    pub failures: Vec<DeleteFailure>,
}

impl SyncReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn orphan_count(&self, resource: &str) -> usize {
        self.orphans
            .iter()
            .filter(|orphan| orphan.resource == resource)
            .count()
    }

    /// Number of orphans actually removed from the remote instance.
    pub fn deleted(&self) -> usize {
        if self.dry_run {
            0
        } else {
            self.orphans.len() - self.failures.len()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Logs one `delete N <resource>` line per resource, in deletion order.
    pub fn log_orphans(&self, resources: &[&'static str]) {
        for resource in resources {
            tracing::info!(
                dry_run = self.dry_run,
                "delete {} {}",
                self.orphan_count(resource),
                resource
            );
        }
    }

    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for orphan in &self.orphans {
            *counts.entry(orphan.resource).or_default() += 1;
        }
        let orphans = counts
            .iter()
            .map(|(resource, count)| format!("{count} {resource}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "synced {}, skipped {} system, exempt {}, {} {}{}",
            self.synced,
            self.skipped_system,
            self.exempt,
            if self.dry_run { "would delete" } else { "deleted" },
            if orphans.is_empty() { "nothing".to_string() } else { orphans },
            if self.failures.is_empty() {
                String::new()
            } else {
                format!(", {} deletion(s) failed", self.failures.len())
            }
        )
    }
}

pub struct StructureSynchronizer {
    catalogs: Arc<CatalogRepository>,
    localized_catalogs: Arc<LocalizedCatalogRepository>,
    metadata: Arc<MetadataRepository>,
    source_fields: Arc<SourceFieldRepository>,
    source_field_options: SourceFieldOptionRepository,
    strict_references: bool,
}

impl StructureSynchronizer {
    pub fn new(client: GallyClient) -> Self {
        let catalogs = Arc::new(CatalogRepository::new(client.clone()));
        let localized_catalogs = Arc::new(LocalizedCatalogRepository::new(
            client.clone(),
            catalogs.clone(),
        ));
        let metadata = Arc::new(MetadataRepository::new(client.clone()));
        let source_fields = Arc::new(SourceFieldRepository::new(
            client.clone(),
            metadata.clone(),
            localized_catalogs.clone(),
        ));
        let source_field_options = SourceFieldOptionRepository::new(
            client,
            source_fields.clone(),
            localized_catalogs.clone(),
        );
        Self {
            catalogs,
            localized_catalogs,
            metadata,
            source_fields,
            source_field_options,
            strict_references: false,
        }
    }

    /// Rejects references matched by more than one remote candidate instead
    /// of adopting the first one.
    pub fn with_strict_references(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }

    pub async fn sync_all_localized_catalogs(
        &self,
        localized_catalogs: &mut [LocalizedCatalog],
        clean: bool,
        dry_run: bool,
    ) -> Result<SyncReport, GallyError> {
        let mut existing_catalogs = self.catalogs.find_all().await?;
        let mut existing_localized_catalogs = self.localized_catalogs.find_all().await?;
        let mut report = SyncReport::new(dry_run);
        let mut upserted_catalogs = HashSet::new();

        for localized_catalog in localized_catalogs.iter_mut() {
            let catalog_identity = localized_catalog.catalog.identity();
            if upserted_catalogs.contains(&catalog_identity) {
                adopt_cached(&*self.catalogs, &mut localized_catalog.catalog).await;
            } else {
                self.catalogs
                    .create_or_update(&mut localized_catalog.catalog)
                    .await?;
            }
            self.sync_localized_catalog(localized_catalog, true).await?;

            existing_localized_catalogs.shift_remove(&localized_catalog.identity());
            existing_catalogs.shift_remove(&catalog_identity);
            upserted_catalogs.insert(catalog_identity);
            report.synced += 1;
        }
        tracing::info!(synced = report.synced, "localized catalogs synchronized");

        if clean {
            self.remove(&*self.localized_catalogs, existing_localized_catalogs, &mut report)
                .await;
            self.remove(&*self.catalogs, existing_catalogs, &mut report)
                .await;
            report.log_orphans(&[LocalizedCatalog::RESOURCE, Catalog::RESOURCE]);
        }
        Ok(report)
    }

    /// Upserts one localized catalog after its catalog. Outside full context
    /// both locators are looked up remotely first.
    pub async fn sync_localized_catalog(
        &self,
        localized_catalog: &mut LocalizedCatalog,
        full_context: bool,
    ) -> Result<(), GallyError> {
        if !full_context {
            let catalog_code = localized_catalog.catalog.code.clone();
            self.resolve_uri(
                &*self.catalogs,
                &mut localized_catalog.catalog,
                &[("code", catalog_code)],
                None,
            )
            .await?;
            self.catalogs
                .create_or_update(&mut localized_catalog.catalog)
                .await?;

            let code = localized_catalog.code.clone();
            self.resolve_uri(
                &*self.localized_catalogs,
                localized_catalog,
                &[("code", code)],
                None,
            )
            .await?;
        }

        if localized_catalog.catalog.uri.is_none() {
            self.catalogs
                .create_or_update(&mut localized_catalog.catalog)
                .await?;
        }
        self.localized_catalogs
            .create_or_update(localized_catalog)
            .await
    }

    pub async fn sync_all_source_fields(
        &self,
        source_fields: &mut [SourceField],
        clean: bool,
        dry_run: bool,
    ) -> Result<SyncReport, GallyError> {
        // Labels of fetched source fields hydrate from the localized catalog cache.
        self.localized_catalogs.find_all().await?;
        let mut existing_metadata = self.metadata.find_all().await?;
        let mut existing_source_fields = self.source_fields.find_all().await?;
        let mut report = SyncReport::new(dry_run);

        for source_field in source_fields.iter_mut() {
            let identity = source_field.identity();
            let remote_is_system = existing_source_fields
                .get(&identity)
                .is_some_and(|existing| existing.is_system);
            if remote_is_system {
                tracing::debug!(%identity, "keeping system source field as is");
                report.skipped_system += 1;
            } else {
                self.sync_source_field(source_field, true).await?;
                report.synced += 1;
            }
            existing_source_fields.shift_remove(&identity);
            existing_metadata.shift_remove(&source_field.metadata.identity());
        }

        let flushed = self.source_fields.run_bulk().await?;
        tracing::info!(
            synced = report.synced,
            flushed,
            skipped_system = report.skipped_system,
            "source fields synchronized"
        );

        if clean {
            let before = existing_source_fields.len() + existing_metadata.len();
            existing_source_fields.retain(|_, source_field| !source_field.is_system);
            existing_metadata
                .retain(|_, metadata| !BUILT_IN_METADATA.contains(&metadata.entity.as_str()));
            report.exempt += before - existing_source_fields.len() - existing_metadata.len();
            self.remove(&*self.source_fields, existing_source_fields, &mut report)
                .await;
            self.remove(&*self.metadata, existing_metadata, &mut report)
                .await;
            report.log_orphans(&[SourceField::RESOURCE, Metadata::RESOURCE]);
        }
        Ok(report)
    }

    /// Stages (full context) or upserts one source field. Missing metadata is
    /// created first and labels are bound to known localized catalogs.
    pub async fn sync_source_field(
        &self,
        source_field: &mut SourceField,
        full_context: bool,
    ) -> Result<(), GallyError> {
        if full_context {
            adopt_cached(&*self.metadata, &mut source_field.metadata).await;
        } else {
            self.resolve_uri(
                &*self.metadata,
                &mut source_field.metadata,
                &[],
                Some(same_entity as Discriminator<Metadata>),
            )
            .await?;

            let criteria = [
                ("metadata.entity", source_field.metadata.entity.clone()),
                ("code", source_field.code.clone()),
            ];
            self.resolve_uri(&*self.source_fields, source_field, &criteria, None)
                .await?;
        }

        if source_field.metadata.uri.is_none() {
            self.metadata
                .create_or_update(&mut source_field.metadata)
                .await?;
        }
        self.resolve_labels(&mut source_field.labels, full_context)
            .await?;

        if full_context {
            self.source_fields.add_entity_to_bulk(source_field).await
        } else {
            self.source_fields.create_or_update(source_field).await
        }
    }

    pub async fn sync_all_source_field_options(
        &self,
        options: &mut [SourceFieldOption],
        clean: bool,
        dry_run: bool,
    ) -> Result<SyncReport, GallyError> {
        self.localized_catalogs.find_all().await?;
        self.metadata.find_all().await?;
        self.source_fields.find_all().await?;
        let mut existing_options = self.source_field_options.find_all().await?;
        let mut report = SyncReport::new(dry_run);

        for option in options.iter_mut() {
            self.sync_source_field_option(option, true).await?;
            existing_options.shift_remove(&option.identity());
            report.synced += 1;
        }

        let flushed = self.source_field_options.run_bulk().await?;
        tracing::info!(
            synced = report.synced,
            flushed,
            "source field options synchronized"
        );

        if clean {
            let before = existing_options.len();
            existing_options.retain(|_, option| !option.source_field.is_system);
            report.exempt += before - existing_options.len();
            self.remove(&self.source_field_options, existing_options, &mut report)
                .await;
            report.log_orphans(&[SourceFieldOption::RESOURCE]);
        }
        Ok(report)
    }

    /// Stages (full context) or upserts one option. Its source field must be
    /// known remotely.
    pub async fn sync_source_field_option(
        &self,
        option: &mut SourceFieldOption,
        full_context: bool,
    ) -> Result<(), GallyError> {
        if !full_context {
            let criteria = [
                (
                    "metadata.entity",
                    option.source_field.metadata.entity.clone(),
                ),
                ("code", option.source_field.code.clone()),
            ];
            self.resolve_uri(&*self.source_fields, &mut option.source_field, &criteria, None)
                .await?;

            if let Some(source_field_uri) = option.source_field.uri.clone() {
                self.resolve_uri(
                    &self.source_field_options,
                    option,
                    &[("sourceField", source_field_uri)],
                    Some(same_code as Discriminator<SourceFieldOption>),
                )
                .await?;
            }
        }

        match self.source_fields.find_by_identity(&option.source_field).await {
            Some(cached) => option.source_field = cached,
            None if option.source_field.uri.is_some() => {}
            None => {
                return Err(GallyError::StructuralPrecondition(format!(
                    "source field {} of option {} does not exist, synchronize source fields first",
                    option.source_field.identity(),
                    option.identity()
                )));
            }
        }
        self.resolve_labels(&mut option.labels, full_context).await?;

        if full_context {
            self.source_field_options.add_entity_to_bulk(option).await
        } else {
            self.source_field_options.create_or_update(option).await
        }
    }

    /// Looks the entity up remotely and adopts the locator of the matching
    /// candidate. Leaves the locator empty when nothing matches.
    async fn resolve_uri<R: Repository>(
        &self,
        repository: &R,
        entity: &mut R::Entity,
        criteria: &[(&str, String)],
        discriminator: Option<Discriminator<R::Entity>>,
    ) -> Result<(), GallyError> {
        let candidates = repository.find_by(criteria, true).await?;
        let picked = pick_candidate(entity, &candidates, discriminator, self.strict_references)?;
        if let Some(uri) = picked {
            tracing::debug!(
                resource = <R::Entity as Entity>::RESOURCE,
                identity = %entity.identity(),
                %uri,
                "adopting remote locator"
            );
            entity.set_uri(uri);
        }
        Ok(())
    }

    async fn resolve_labels(
        &self,
        labels: &mut [Label],
        full_context: bool,
    ) -> Result<(), GallyError> {
        for label in labels.iter_mut() {
            if let Some(cached) = self
                .localized_catalogs
                .find_by_identity(&label.localized_catalog)
                .await
            {
                label.localized_catalog = cached;
                continue;
            }
            if !full_context && label.localized_catalog.uri.is_none() {
                let code = label.localized_catalog.code.clone();
                self.resolve_uri(
                    &*self.localized_catalogs,
                    &mut label.localized_catalog,
                    &[("code", code)],
                    None,
                )
                .await?;
            }
            if label.localized_catalog.uri.is_none() {
                return Err(GallyError::StructuralPrecondition(format!(
                    "localized catalog {} does not exist, synchronize localized catalogs first",
                    label.localized_catalog.code
                )));
            }
        }
        Ok(())
    }

    /// Records every orphan and deletes it unless running dry. Failures are
    /// collected, the remaining orphans are still processed.
    async fn remove<R: Repository>(
        &self,
        repository: &R,
        orphans: EntityMap<R::Entity>,
        report: &mut SyncReport,
    ) {
        let resource = <R::Entity as Entity>::RESOURCE;
        for (identity, entity) in orphans {
            report.orphans.push(Orphan {
                resource,
                identity: identity.clone(),
            });
            if report.dry_run {
                continue;
            }
            if let Err(err) = repository.delete(&entity).await {
                tracing::warn!(resource, %identity, error = %err, "failed to delete orphan");
                report.failures.push(DeleteFailure {
                    resource,
                    identity,
                    retryable: err.is_retryable(),
                    error: err.to_string(),
                });
            }
        }
    }
}

fn same_entity(candidate: &Metadata, desired: &Metadata) -> bool {
    candidate.entity == desired.entity
}

fn same_code(candidate: &SourceFieldOption, desired: &SourceFieldOption) -> bool {
    candidate.code == desired.code
}

/// Fills a missing locator from the repository cache.
async fn adopt_cached<R: Repository>(repository: &R, entity: &mut R::Entity) {
    if entity.uri().is_some() {
        return;
    }
    if let Some(uri) = repository
        .find_by_identity(entity)
        .await
        .and_then(|cached| cached.uri().map(str::to_owned))
    {
        entity.set_uri(uri);
    }
}

/// Chooses the remote candidate whose locator the desired entity adopts.
///
/// Without discriminator only a unique candidate is adopted. With one, the
/// first candidate it accepts wins, or an ambiguity error is raised in strict
/// mode when several are accepted.
fn pick_candidate<E: Entity>(
    desired: &E,
    candidates: &EntityMap<E>,
    discriminator: Option<Discriminator<E>>,
    strict: bool,
) -> Result<Option<String>, GallyError> {
    let Some(matches) = discriminator else {
        if candidates.len() != 1 {
            return Ok(None);
        }
        return Ok(candidates
            .values()
            .next()
            .and_then(|candidate| candidate.uri().map(str::to_owned)));
    };

    let mut accepted = candidates
        .values()
        .filter(|candidate| matches(candidate, desired));
    let Some(first) = accepted.next() else {
        return Ok(None);
    };
    let others = accepted.count();
    if strict && others > 0 {
        return Err(GallyError::AmbiguousIdentity {
            identity: desired.identity(),
            candidates: others + 1,
        });
    }
    Ok(first.uri().map(str::to_owned))
}

#[cfg(test)]
#[path = "synchronizer_tests.rs"]
mod tests;
