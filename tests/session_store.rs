mod common;

use bev_chat::history::{ SessionFilter, SessionStore, DEFAULT_TITLE };
use bev_chat::models::chat::{ Message, SessionUpdate };
use bev_chat::storage::{ KeyValueStore, SESSIONS_KEY };

fn update(id: &str, texts: &[&str]) -> SessionUpdate {
    SessionUpdate {
        id: id.to_string(),
        messages: texts
            .iter()
            .map(|t| Message::user(t, None))
            .collect(),
        model_id: "model-chatgpt4".to_string(),
    }
}

#[test]
fn sessions_survive_a_restart() {
    let (storage, _tmp) = common::create_temp_storage();
    {
        let mut store = SessionStore::load(storage.clone());
        store.upsert(update("1", &["How do I boil an egg?"]));
        store.upsert(update("2", &["Plan a trip"]));
        store.toggle_pin("1");
        store.rename("2", "Holiday");
    }

    let store = SessionStore::load(storage);
    assert_eq!(store.len(), 2);
    assert!(store.get("1").unwrap().is_pinned);
    let renamed = store.get("2").unwrap();
    assert_eq!(renamed.title, "Holiday");
    assert!(renamed.user_defined_title);
}

#[test]
fn renamed_title_is_never_overwritten() {
    let mut store = SessionStore::new(std::sync::Arc::new(bev_chat::storage::MemoryStorage::new()));
    store.upsert(update("s", &["Hello"]));
    assert!(store.rename("s", "My Chat"));
    store.upsert(update("s", &["Hello", "Something else entirely"]));
    assert_eq!(store.get("s").unwrap().title, "My Chat");
}

#[test]
fn blank_first_message_gets_default_title() {
    let mut store = SessionStore::new(std::sync::Arc::new(bev_chat::storage::MemoryStorage::new()));
    store.upsert(update("s", &["   "]));
    assert_eq!(store.get("s").unwrap().title, DEFAULT_TITLE);
}

#[test]
fn corrupted_document_loads_as_empty() {
    let (storage, _tmp) = common::create_temp_storage();
    storage.set(SESSIONS_KEY, "{ not json").unwrap();
    let store = SessionStore::load(storage);
    assert!(store.is_empty());
}

#[test]
fn write_failures_keep_memory_state() {
    let mut store = SessionStore::load(std::sync::Arc::new(common::FullStorage));
    assert!(store.upsert(update("1", &["still here"])));
    assert_eq!(store.get("1").unwrap().title, "still here");
    assert!(store.toggle_pin("1"));
}

#[test]
fn listing_puts_pinned_first_and_searches_bodies() {
    let mut store = SessionStore::new(std::sync::Arc::new(bev_chat::storage::MemoryStorage::new()));
    store.upsert(update("a", &["Soup recipes", "I like pasta carbonara"]));
    store.upsert(update("b", &["Weather today"]));
    store.upsert(update("c", &["Pasta shapes"]));
    store.toggle_pin("b");

    let all: Vec<&str> = store
        .list(SessionFilter::All, None)
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], "b");

    let mut found: Vec<&str> = store
        .list(SessionFilter::All, Some("PASTA"))
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    found.sort();
    assert_eq!(found, vec!["a", "c"]);

    let pinned = store.list(SessionFilter::Pinned, None);
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].id, "b");
}

#[test]
fn export_and_restore_through_a_file() {
    let (storage, _tmp) = common::create_temp_storage();
    let backup_dir = tempfile::tempdir().unwrap();
    let mut store = SessionStore::load(storage.clone());
    store.upsert(update("1", &["keep"]));

    let path = store.export_to_dir(backup_dir.path()).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("bev_chat_backup_") && name.ends_with(".json"));

    store.clear();
    assert!(store.is_empty());

    let document = std::fs::read_to_string(&path).unwrap();
    assert_eq!(store.restore(&document).unwrap(), 1);
    assert_eq!(SessionStore::load(storage).get("1").unwrap().title, "keep");
}

#[test]
fn open_by_fuzzy_title() {
    let mut store = SessionStore::new(std::sync::Arc::new(bev_chat::storage::MemoryStorage::new()));
    store.upsert(update("1", &["Rust borrow checker"]));
    store.upsert(update("2", &["Gardening tips"]));

    assert_eq!(store.find_by_title("rust borrow checkr").unwrap().id, "1");
    assert_eq!(store.find_by_title("2").unwrap().id, "2");
    assert!(store.find_by_title("quantum chromodynamics").is_none());
}
