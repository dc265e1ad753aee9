//! Integration tests for the complete Persist pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Raw JSON bytes → Persist batch → MemoryStore snapshot on disk
//! - Reopened snapshot → reconcile → no writes
//! - Configuration files, custom transformers and batch events
//!
//! Run with: cargo test --test integration_tests

use persist_store::{
    AttributeType, EntityDescription, FetchRequest, MemoryStore, Model, ObjectStore, StoreConfig,
};
use persist_sync::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;

// ============================================================================
// Fixtures
// ============================================================================

fn library() -> Model {
    Model::new()
        .entity(
            EntityDescription::new("Author")
                .required_attribute("slug", AttributeType::String)
                .attribute("name", AttributeType::String)
                .attribute("website", AttributeType::Transformable)
                .to_many("books", "Book"),
        )
        .entity(
            EntityDescription::new("Book")
                .required_attribute("isbn", AttributeType::String)
                .attribute("title", AttributeType::String)
                .attribute("pages", AttributeType::Integer32)
                .attribute("published", AttributeType::Date)
                .attribute("price", AttributeType::Decimal)
                .to_one("author", "Author"),
        )
}

fn price(value: &Value) -> Result<Option<Primitive>, TransformError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(Primitive::Decimal(s.clone()))),
        Value::Number(n) => Ok(Some(Primitive::Decimal(n.to_string()))),
        other => Err(TransformError::Custom(format!("{other} is not a price"))),
    }
}

fn registry() -> Registry {
    Registry::builder()
        .entity(
            EntityMapping::new("Author")
                .identified_by("slug")
                .properties(["slug", "name", "books"])
                .property(map("website", "homepage").with_transformer(UrlTransformer)),
        )
        .entity(
            EntityMapping::new("Book")
                .identified_by("isbn")
                .properties(["isbn", "title", "author"])
                .property(map("pages", "page_count").with_transformer(FormattedNumberTransformer::integers()))
                .property(
                    map("published", "published_on")
                        .with_transformer(FormattedDateTransformer::new("%Y-%m-%d")),
                )
                .property(map("price", "price").with_transformer(price)),
        )
        .build()
        .unwrap()
}

const CATALOGUE: &str = r#"[
    {
        "slug": "le-guin",
        "name": "Ursula K. Le Guin",
        "homepage": "https://www.ursulakleguin.com",
        "books": [
            {"isbn": "978-0441478125", "title": "The Left Hand of Darkness", "page_count": "304",
             "published_on": "1969-03-01", "price": "9.99"},
            {"isbn": "978-0547773742", "title": "A Wizard of Earthsea", "page_count": "183"}
        ]
    },
    {
        "slug": "lem",
        "name": "Stanisław Lem",
        "homepage": "",
        "books": ["978-0156027601"]
    }
]"#;

async fn count(persist: &Persist<MemoryStore>, entity: &'static str) -> usize {
    persist
        .context()
        .perform(|store| store.fetch(&FetchRequest::new(entity)).unwrap().len())
        .await
}

// ============================================================================
// End-to-End
// ============================================================================

#[tokio::test]
async fn test_bytes_to_snapshot_and_back() {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        snapshot_path: Some(dir.path().join("library.json")),
        ..Default::default()
    };

    let store = MemoryStore::open(library(), config.clone()).unwrap();
    let persist = Persist::new(Context::new(store), registry());
    let outcome = persist
        .reconcile_slice(CATALOGUE.as_bytes(), "Author", None)
        .await
        .unwrap();

    assert_eq!(outcome.objects.len(), 2);
    assert_eq!(outcome.save.inserted.len(), 5);
    assert_eq!(count(&persist, "Book").await, 3);
    assert!(dir.path().join("library.json").exists());

    let le_guin = outcome.objects[0];
    let (website, books) = persist
        .context()
        .perform(|store| {
            (
                store.attribute(le_guin, "website").unwrap(),
                store.to_many(le_guin, "books").unwrap(),
            )
        })
        .await;
    assert!(matches!(website, Some(Primitive::Url(_))));
    assert_eq!(books.len(), 2);

    let first_book = books[0];
    let (pages, price, published) = persist
        .context()
        .perform(|store| {
            (
                store.attribute(first_book, "pages").unwrap(),
                store.attribute(first_book, "price").unwrap(),
                store.attribute(first_book, "published").unwrap(),
            )
        })
        .await;
    assert_eq!(pages, Some(Primitive::Integer(304)));
    assert_eq!(price, Some(Primitive::Decimal("9.99".into())));
    assert!(matches!(published, Some(Primitive::Date(_))));

    // a fresh store opened from the snapshot already matches the document
    let reopened = MemoryStore::open(library(), config).unwrap();
    assert_eq!(reopened.len(), 5);
    let persist = Persist::new(Context::new(reopened), registry());
    let again = persist
        .reconcile_slice(CATALOGUE.as_bytes(), "Author", None)
        .await
        .unwrap();
    assert!(again.save.is_empty());
    assert_eq!(again.objects, outcome.objects);
}

#[tokio::test]
async fn test_dropped_author_is_pruned() {
    let persist = Persist::new(Context::new(MemoryStore::new(library()).unwrap()), registry());
    persist
        .reconcile_slice(CATALOGUE.as_bytes(), "Author", None)
        .await
        .unwrap();

    let outcome = persist
        .reconcile(json!([{"slug": "lem"}]), "Author", None)
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);
    assert_eq!(count(&persist, "Author").await, 1);
    // books are a separate entity and stay
    assert_eq!(count(&persist, "Book").await, 3);
}

#[tokio::test]
async fn test_config_file_controls_batches() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.json");
    std::fs::write(&path, r#"{"delete_orphans": false, "parse_in_background": false}"#).unwrap();
    let config = PersistConfig::from_json_file(&path).unwrap();

    let persist = Persist::new(Context::new(MemoryStore::new(library()).unwrap()), registry())
        .with_config(config);
    persist
        .reconcile(json!([{"slug": "a"}, {"slug": "b"}]), "Author", None)
        .await
        .unwrap();
    persist
        .reconcile(json!([{"slug": "c"}]), "Author", None)
        .await
        .unwrap();
    assert_eq!(count(&persist, "Author").await, 3);
}

#[tokio::test]
async fn test_events_follow_batch_stages() {
    let mut persist =
        Persist::new(Context::new(MemoryStore::new(library()).unwrap()), registry());
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    persist.on_event(move |event| {
        let stage = match event {
            PersistEvent::OrphansDeleted { .. } => "orphans",
            PersistEvent::ObjectsFilled { .. } => "filled",
            PersistEvent::Saved { .. } => "saved",
            PersistEvent::BatchFailed { .. } => "failed",
        };
        sink.lock().push(stage);
    });

    persist
        .reconcile(json!({"slug": "x"}), "Author", None)
        .await
        .unwrap();
    let failed = persist.reconcile_slice(&b"not json"[..], "Author", None).await;
    assert!(matches!(failed, Err(PersistError::InvalidJsonData(_))));

    assert_eq!(*events.lock(), vec!["orphans", "filled", "saved", "failed"]);
}

#[tokio::test]
async fn test_clones_share_one_queue() {
    let persist = Persist::new(Context::new(MemoryStore::new(library()).unwrap()), registry());
    let other = persist.clone();
    assert!(persist.context().same_store(other.context()));

    let a = persist.reconcile(json!([{"slug": "a"}]), "Author", None);
    let b = other.reconcile(json!([{"slug": "b"}]), "Author", None);
    let (a, b) = tokio::join!(a, b);
    a.unwrap();
    let b = b.unwrap();

    // the second batch saw the first one's author and pruned it
    assert_eq!(b.deleted, 1);
    assert_eq!(count(&persist, "Author").await, 1);
}
