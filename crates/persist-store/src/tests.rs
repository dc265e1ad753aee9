//! Tests for the memory store and its confined context

use super::*;
use tempfile::tempdir;

/// Helper to create a small course catalogue model
fn catalogue() -> Model {
    Model::new()
        .entity(
            EntityDescription::new("Course")
                .required_attribute("id", AttributeType::Integer64)
                .attribute("title", AttributeType::String)
                .to_many("lectures", "Lecture")
                .ordered_to_many("syllabus", "Lecture")
                .to_one("room", "Room"),
        )
        .entity(
            EntityDescription::new("Lecture")
                .required_attribute("id", AttributeType::Integer64)
                .to_one("course", "Course"),
        )
        .entity(EntityDescription::new("Seminar").subentity_of("Lecture"))
        .entity(EntityDescription::new("Room").attribute("name", AttributeType::String))
}

fn store() -> MemoryStore {
    MemoryStore::new(catalogue()).unwrap()
}

fn lecture(store: &mut MemoryStore, id: i64) -> ObjectId {
    let object = store.insert("Lecture").unwrap();
    store
        .set_attribute(object, "id", Some(Primitive::Integer(id)))
        .unwrap();
    object
}

#[test]
fn test_insert_and_fetch_by_predicate() {
    let mut store = store();
    let a = lecture(&mut store, 1);
    let b = lecture(&mut store, 2);

    let found = store
        .fetch(&FetchRequest::new("Lecture").matching(Predicate::eq("id", 2)))
        .unwrap();
    assert_eq!(found, vec![b]);

    let all = store.fetch(&FetchRequest::new("Lecture")).unwrap();
    assert_eq!(all, vec![a, b], "fetch returns creation order");
}

#[test]
fn test_fetch_subentities_and_pending() {
    let mut store = store();
    let plain = lecture(&mut store, 1);
    let seminar = store.insert("Seminar").unwrap();
    store
        .set_attribute(seminar, "id", Some(Primitive::Integer(2)))
        .unwrap();

    let with_sub = store.fetch(&FetchRequest::new("Lecture")).unwrap();
    assert_eq!(with_sub, vec![plain, seminar]);

    let own_only = store
        .fetch(&FetchRequest::new("Lecture").excluding_subentities())
        .unwrap();
    assert_eq!(own_only, vec![plain]);

    let committed = store
        .fetch(&FetchRequest::new("Lecture").excluding_pending())
        .unwrap();
    assert!(committed.is_empty(), "nothing saved yet");

    store.save().unwrap();
    let committed = store
        .fetch(&FetchRequest::new("Lecture").excluding_pending())
        .unwrap();
    assert_eq!(committed.len(), 2);
}

#[test]
fn test_unknown_entity_and_property() {
    let mut store = store();
    assert!(matches!(
        store.insert("Nope"),
        Err(StoreError::UnknownEntity(_))
    ));
    let object = lecture(&mut store, 1);
    assert!(matches!(
        store.attribute(object, "colour"),
        Err(StoreError::UnknownProperty { .. })
    ));
    assert!(matches!(
        store.set_attribute(object, "id", Some("one".into())),
        Err(StoreError::TypeMismatch { .. })
    ));
}

#[test]
fn test_relationship_shapes_are_checked() {
    let mut store = store();
    let course = store.insert("Course").unwrap();
    let l = lecture(&mut store, 1);

    assert!(matches!(
        store.to_one(course, "lectures"),
        Err(StoreError::NotToOne { .. })
    ));
    assert!(matches!(
        store.set_to_many(course, "room", vec![l]),
        Err(StoreError::NotToMany { .. })
    ));
    assert!(matches!(
        store.set_to_one(course, "room", Some(l)),
        Err(StoreError::TypeMismatch { .. })
    ));
}

#[test]
fn test_delete_nullifies_references() {
    let mut store = store();
    let course = store.insert("Course").unwrap();
    let a = lecture(&mut store, 1);
    let b = lecture(&mut store, 2);
    store.set_to_many(course, "lectures", vec![a, b]).unwrap();
    store.set_to_one(a, "course", Some(course)).unwrap();

    store.delete(a).unwrap();

    assert_eq!(store.to_many(course, "lectures").unwrap(), vec![b]);
    assert!(matches!(
        store.entity_of(a),
        Err(StoreError::ObjectNotFound(_))
    ));
}

#[test]
fn test_repoint_moves_edges_and_dedups() {
    let mut store = store();
    let course = store.insert("Course").unwrap();
    let old = lecture(&mut store, 1);
    let other = lecture(&mut store, 2);
    let new = store.insert("Seminar").unwrap();
    store
        .set_to_many(course, "syllabus", vec![other, old, new])
        .unwrap();
    store.set_to_one(old, "course", Some(course)).unwrap();

    let touched = store.repoint(old, new).unwrap();
    assert_eq!(touched, 1);
    assert_eq!(
        store.to_many(course, "syllabus").unwrap(),
        vec![other, new],
        "order kept, duplicate dropped"
    );
}

#[test]
fn test_save_tracks_changes_and_history() {
    let mut store = store();
    let a = lecture(&mut store, 1);
    let first = store.save().unwrap();
    assert_eq!(first.inserted, vec![a]);
    assert!(!store.has_changes());

    let empty = store.save().unwrap();
    assert!(empty.is_empty());
    assert_eq!(store.history().len(), 1, "empty saves are not recorded");

    store
        .set_attribute(a, "id", Some(Primitive::Integer(5)))
        .unwrap();
    let second = store.save().unwrap();
    assert_eq!(second.updated, vec![a]);
    assert_eq!(store.history().len(), 2);
}

#[test]
fn test_save_validates_required_attributes() {
    let mut store = store();
    store.insert("Lecture").unwrap();
    let err = store.save().unwrap_err();
    assert!(matches!(err, StoreError::Validation { ref attribute, .. } if attribute == "id"));
    assert!(store.has_changes(), "failed save keeps pending changes");

    store.rollback();
    assert!(store.is_empty());
    assert!(!store.has_changes());
}

#[test]
fn test_snapshot_roundtrip() {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        snapshot_path: Some(dir.path().join("store.json")),
        ..Default::default()
    };

    let mut store = MemoryStore::open(catalogue(), config.clone()).unwrap();
    let course = store.insert("Course").unwrap();
    store
        .set_attribute(course, "id", Some(Primitive::Integer(10)))
        .unwrap();
    store
        .set_attribute(course, "title", Some("Algebra".into()))
        .unwrap();
    store.save().unwrap();

    let reopened = MemoryStore::open(catalogue(), config).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(
        reopened.attribute(course, "title").unwrap(),
        Some(Primitive::from("Algebra"))
    );

    let mut reopened = reopened;
    let next = reopened.insert("Room").unwrap();
    assert!(next > course, "ids keep increasing across reopen");
}

#[tokio::test]
async fn test_context_serializes_access() {
    let context = Context::new(store());
    let other = context.clone();
    assert!(context.same_store(&other));

    let (a, b) = tokio::join!(
        context.perform(|store| store.insert("Room").unwrap()),
        other.perform(|store| store.insert("Room").unwrap()),
    );
    assert_ne!(a, b);
    let count = context.perform(|store| store.len()).await;
    assert_eq!(count, 2);
}
