use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// String key-value store backing the host's category registry. Writes are
/// independent; there is no transaction across keys.
pub trait PreferenceStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn clear(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqlitePreferenceStore {
    db_path: PathBuf,
}

impl SqlitePreferenceStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO preferences (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM preferences WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryPreferenceStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| InfraError::Preference(format!("preference lock poisoned: {error}")))
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn get_string(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    fn temp_db() -> PathBuf {
        let sequence = NEXT_DB.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "autotag-pref-tests-{}-{}",
            std::process::id(),
            sequence
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("prefs.sqlite");
        initialize_database(&path).expect("initialize database");
        path
    }

    #[test]
    fn sqlite_store_set_get_and_clear() {
        let path = temp_db();
        let store = SqlitePreferenceStore::new(&path);

        assert_eq!(store.get_string("calendar.categories.names").expect("get"), None);
        store
            .set_string("calendar.categories.names", "Ferien,Linth")
            .expect("set");
        store
            .set_string("calendar.categories.names", "Ferien")
            .expect("overwrite");
        assert_eq!(
            store.get_string("calendar.categories.names").expect("get"),
            Some("Ferien".to_string())
        );

        store.clear("calendar.categories.names").expect("clear");
        store.clear("calendar.categories.names").expect("clear absent key");
        assert_eq!(store.get_string("calendar.categories.names").expect("get"), None);

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn in_memory_store_clear_is_idempotent() {
        let store = InMemoryPreferenceStore::default();
        store.set_string("key", "value").expect("set");
        store.clear("key").expect("clear");
        store.clear("key").expect("clear again");
        assert_eq!(store.get_string("key").expect("get"), None);
    }
}
