use std::sync::Arc;

use gally_core::{
    BulkRepository, Catalog, CatalogRepository, Configuration, GallyClient, GallyError,
    LocalizedCatalog, LocalizedCatalogRepository, Metadata, MetadataRepository, Repository,
    SourceField, SourceFieldRepository, SourceFieldType,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> GallyClient {
    Mock::given(method("POST"))
        .and(path("/api/authentication_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "token" })))
        .mount(server)
        .await;
    GallyClient::new(&Configuration {
        base_url: format!("{}/api", server.uri()),
        user: "admin@example.com".to_string(),
        password: "apassword".to_string(),
        check_ssl: true,
    })
    .unwrap()
}

fn catalog_page(from: usize, count: usize) -> Value {
    let members: Vec<Value> = (from..from + count)
        .map(|id| {
            json!({
                "@id": format!("/api/catalogs/{id}"),
                "code": format!("catalog_{id}"),
                "name": format!("Catalog {id}"),
            })
        })
        .collect();
    json!({ "hydra:member": members, "hydra:totalItems": 120 })
}

fn source_field_repository(client: &GallyClient) -> SourceFieldRepository {
    let catalogs = Arc::new(CatalogRepository::new(client.clone()));
    let localized_catalogs = Arc::new(LocalizedCatalogRepository::new(client.clone(), catalogs));
    let metadata = Arc::new(MetadataRepository::new(client.clone()));
    SourceFieldRepository::new(client.clone(), metadata, localized_catalogs)
}

fn product_metadata() -> Metadata {
    let mut metadata = Metadata::new("product");
    metadata.uri = Some("/api/metadata/1".to_string());
    metadata
}

#[tokio::test]
async fn find_all_pages_until_short_page() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    for (page, from, count) in [("1", 1, 50), ("2", 51, 50), ("3", 101, 20)] {
        Mock::given(method("GET"))
            .and(path("/api/catalogs"))
            .and(query_param("currentPage", page))
            .and(query_param("pageSize", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog_page(from, count)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let repository = CatalogRepository::new(client);
    let catalogs = repository.find_all().await.unwrap();

    assert_eq!(catalogs.len(), 120);
    assert_eq!(catalogs.get_index(0).map(|(code, _)| code.as_str()), Some("catalog_1"));
    assert_eq!(catalogs.get_index(119).map(|(code, _)| code.as_str()), Some("catalog_120"));
    let cached = repository
        .find_by_identity(&Catalog::new("catalog_64", ""))
        .await
        .expect("find_all should fill the cache");
    assert_eq!(cached.uri.as_deref(), Some("/api/catalogs/64"));
}

#[tokio::test]
async fn find_by_without_caching_leaves_cache_empty() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/catalogs"))
        .and(query_param("code", "catalog_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_page(1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let repository = CatalogRepository::new(client);
    let found = repository
        .find_by(&[("code", "catalog_1".to_string())], false)
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert!(
        repository
            .find_by_identity(&Catalog::new("catalog_1", ""))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn find_by_uri_fetches_once() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/catalogs/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/catalogs/3",
            "code": "com",
            "name": "Commerce"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repository = CatalogRepository::new(client);
    let first = repository.find_by_uri("/api/catalogs/3").await.unwrap();
    let second = repository.find_by_uri("/api/catalogs/3").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.code, "com");
}

#[tokio::test]
async fn find_by_uri_reports_missing_entity() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/metadata/9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let repository = MetadataRepository::new(client);
    let err = repository.find_by_uri("/api/metadata/9").await.unwrap_err();

    assert!(matches!(err, GallyError::NotFound(_)));
}

#[tokio::test]
async fn create_then_update_reuses_locator() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/catalogs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "@id": "/api/catalogs/5",
            "code": "com",
            "name": "Commerce"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/catalogs/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/catalogs/5",
            "code": "com",
            "name": "Commerce EU"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repository = CatalogRepository::new(client);
    let mut catalog = Catalog::new("com", "Commerce");
    repository.create_or_update(&mut catalog).await.unwrap();
    assert_eq!(catalog.uri.as_deref(), Some("/api/catalogs/5"));

    let mut renamed = Catalog::new("com", "Commerce EU");
    repository.create_or_update(&mut renamed).await.unwrap();
    assert_eq!(renamed.uri.as_deref(), Some("/api/catalogs/5"));
}

#[tokio::test]
async fn delete_requires_cached_identity() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let repository = CatalogRepository::new(client);
    let err = repository
        .delete(&Catalog::new("unknown", "Unknown"))
        .await
        .unwrap_err();

    assert!(matches!(err, GallyError::NotFound(identity) if identity == "unknown"));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn delete_evicts_both_cache_keys() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/catalogs/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/catalogs/3",
            "code": "com",
            "name": "Commerce"
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/catalogs/3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let repository = CatalogRepository::new(client);
    let catalog = repository.find_by_uri("/api/catalogs/3").await.unwrap();
    repository.delete(&catalog).await.unwrap();

    assert!(repository.find_by_identity(&catalog).await.is_none());
    repository.find_by_uri("/api/catalogs/3").await.unwrap();
}

#[tokio::test]
async fn localized_catalog_hydration_resolves_catalog() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/localized_catalogs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hydra:member": [
                {
                    "@id": "/api/localized_catalogs/1",
                    "code": "com_fr",
                    "name": "French",
                    "locale": "fr_FR",
                    "currency": "EUR",
                    "catalog": "/api/catalogs/1"
                },
                {
                    "@id": "/api/localized_catalogs/2",
                    "code": "com_en",
                    "name": "English",
                    "locale": "en_US",
                    "currency": "USD",
                    "catalog": { "@id": "/api/catalogs/1", "code": "com" }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/catalogs/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/catalogs/1",
            "code": "com",
            "name": "Commerce"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalogs = Arc::new(CatalogRepository::new(client.clone()));
    let repository = LocalizedCatalogRepository::new(client, catalogs.clone());
    let localized = repository.find_all().await.unwrap();

    assert_eq!(localized["com_fr"].catalog.code, "com");
    assert_eq!(localized["com_en"].catalog.uri.as_deref(), Some("/api/catalogs/1"));
    assert!(catalogs.find_by_identity(&Catalog::new("com", "")).await.is_some());
}

#[tokio::test]
async fn unresolved_reference_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let catalogs = Arc::new(CatalogRepository::new(client.clone()));
    let repository = LocalizedCatalogRepository::new(client, catalogs);
    let mut localized = LocalizedCatalog::new(
        Catalog::new("com", "Commerce"),
        "com_fr",
        "French",
        "fr_FR",
        "EUR",
    );
    let err = repository.create_or_update(&mut localized).await.unwrap_err();

    assert!(matches!(err, GallyError::StructuralPrecondition(_)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn bulk_sends_staged_entities_in_one_request() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/source_fields/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let repository = source_field_repository(&client);
    for position in 0..10 {
        let field = SourceField::new(
            product_metadata(),
            format!("field_{position}"),
            SourceFieldType::Text,
            format!("Field {position}"),
        );
        repository.add_entity_to_bulk(&field).await.unwrap();
    }
    assert_eq!(repository.pending_bulk().await, 10);

    let flushed = repository.run_bulk().await.unwrap();
    assert_eq!(flushed, 10);
    assert_eq!(repository.pending_bulk().await, 0);

    let requests = server.received_requests().await.unwrap();
    let bulk = requests
        .iter()
        .find(|request| request.url.path() == "/api/source_fields/bulk")
        .expect("bulk request should be sent");
    let body: Value = serde_json::from_slice(&bulk.body).unwrap();
    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|field| field["code"].as_str())
        .collect();
    let expected: Vec<String> = (0..10).map(|position| format!("field_{position}")).collect();
    assert_eq!(codes, expected);
    assert_eq!(body[0]["metadata"], "/metadata/1");
}

#[tokio::test]
async fn bulk_response_fills_cache() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/source_fields/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hydra:member": [{
                "@id": "/api/source_fields/12",
                "metadata": "/api/metadata/1",
                "code": "color",
                "type": "select",
                "defaultLabel": "Color"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/metadata/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/metadata/1",
            "entity": "product"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repository = source_field_repository(&client);
    let field = SourceField::new(product_metadata(), "color", SourceFieldType::Select, "Color");
    repository.add_entity_to_bulk(&field).await.unwrap();
    repository.run_bulk().await.unwrap();

    let cached = repository.find_by_identity(&field).await.unwrap();
    assert_eq!(cached.uri.as_deref(), Some("/api/source_fields/12"));
}

#[tokio::test]
async fn empty_bulk_makes_no_request() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let repository = source_field_repository(&client);
    assert_eq!(repository.run_bulk().await.unwrap(), 0);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn failed_bulk_keeps_staged_entities() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/source_fields/bulk"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
        .mount(&server)
        .await;

    let repository = source_field_repository(&client);
    let field = SourceField::new(product_metadata(), "sku", SourceFieldType::Text, "Sku");
    repository.add_entity_to_bulk(&field).await.unwrap();

    assert!(repository.run_bulk().await.is_err());
    assert_eq!(repository.pending_bulk().await, 1);
}

#[tokio::test]
async fn unreadable_bulk_member_does_not_fail_the_flush() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/source_fields/bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hydra:member": [{
                "@id": "/api/source_fields/12",
                "metadata": "/api/metadata/404",
                "code": "color",
                "type": "select"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/metadata/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let repository = source_field_repository(&client);
    let field = SourceField::new(product_metadata(), "color", SourceFieldType::Select, "Color");
    repository.add_entity_to_bulk(&field).await.unwrap();

    assert_eq!(repository.run_bulk().await.unwrap(), 1);
    assert_eq!(repository.pending_bulk().await, 0);
    assert!(repository.find_by_identity(&field).await.is_none());
}

#[tokio::test]
async fn filtered_source_field_lookups_query_by_entity() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/metadata/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "/api/metadata/1",
            "entity": "product"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/source_fields"))
        .and(query_param("metadata.entity", "product"))
        .and(query_param("isFilterable", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hydra:member": [
                { "@id": "/api/source_fields/1", "metadata": "/api/metadata/1", "code": "color", "type": "select" },
                { "@id": "/api/source_fields/2", "metadata": "/api/metadata/1", "code": "price", "type": "price" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/source_fields"))
        .and(query_param("metadata.entity", "product"))
        .and(query_param("type", "select"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hydra:member": [
                { "@id": "/api/source_fields/1", "metadata": "/api/metadata/1", "code": "color", "type": "select" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let repository = source_field_repository(&client);
    let filterable = repository.find_filterable(&product_metadata()).await.unwrap();
    let select = repository.find_select(&product_metadata()).await.unwrap();

    let codes: Vec<_> = filterable.values().map(|field| field.code.as_str()).collect();
    assert_eq!(codes, ["color", "price"]);
    assert_eq!(select.len(), 1);
    assert_eq!(
        select.values().next().map(|field| field.field_type),
        Some(SourceFieldType::Select)
    );
}
