// Integration tests for first-run setup: defaults are copied into config/,
// the configured session store is created on disk, and a stored session
// outlives the connection that wrote it.

use std::fs;
use std::path::{Path, PathBuf};

use finmodel_core::config::{ensure_client_config, load_config_from, ConfigError};
use finmodel_core::store::{SessionStore, SqliteSessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A scratch project directory seeded with the shipped defaults.
fn seeded_project() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("defaults")).unwrap();
    fs::copy(
        project_root().join("defaults/client.toml"),
        tmp.path().join("defaults/client.toml"),
    )
    .unwrap();
    tmp
}

#[test]
fn first_run_copies_defaults_and_loads_them() {
    let project = seeded_project();

    let seeded = ensure_client_config(project.path()).unwrap();
    assert_eq!(seeded, Some(project.path().join("config/client.toml")));

    let config = load_config_from(project.path()).unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8000/api");
    assert_eq!(config.pagination.page_size, 10);

    // A second run keeps the user's copy.
    assert_eq!(ensure_client_config(project.path()).unwrap(), None);
}

#[test]
fn edited_copy_wins_over_defaults() {
    let project = seeded_project();
    ensure_client_config(project.path()).unwrap();

    let store_path = project.path().join("data/session.db");
    let edited = format!(
        "[api]\nbase_url = \"https://finance.example.com/api/\"\ntimeout_secs = 15\n\n\
         [session]\nstore_path = {:?}\nauto_refresh = false\n",
        store_path.display().to_string()
    );
    fs::write(project.path().join("config/client.toml"), edited).unwrap();
    ensure_client_config(project.path()).unwrap();

    let config = load_config_from(project.path()).unwrap();
    assert_eq!(config.api.base_url, "https://finance.example.com/api/");
    assert_eq!(config.timeout(), Some(std::time::Duration::from_secs(15)));
    assert!(!config.session.auto_refresh);
    assert_eq!(config.session.store_path, store_path);
    assert_eq!(config.pagination.page_size, 10);
}

#[test]
fn invalid_edit_is_reported_with_field() {
    let project = seeded_project();
    ensure_client_config(project.path()).unwrap();
    fs::write(
        project.path().join("config/client.toml"),
        "[api]\nbase_url = \"localhost:8000\"\n",
    )
    .unwrap();

    match load_config_from(project.path()) {
        Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "api.base_url"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn configured_store_persists_session_across_reopen() {
    let project = seeded_project();
    let db = project.path().join("nested/dir/session.db");

    {
        let store = SqliteSessionStore::open(&db).unwrap();
        store
            .set_many(&[(ACCESS_TOKEN_KEY, "acc-1"), (REFRESH_TOKEN_KEY, "ref-1")])
            .unwrap();
    }

    let store = SqliteSessionStore::open(&db).unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("acc-1"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("ref-1"));

    store.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]).unwrap();
    let store = SqliteSessionStore::open(&db).unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
}
