use crate::domain::models::ScanResult;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Holds the single most recent scan outcome.
pub trait ScanResultRepository: Send + Sync {
    fn load(&self) -> Result<Option<ScanResult>, InfraError>;
    fn save(&self, result: &ScanResult) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteScanResultRepository {
    db_path: PathBuf,
}

impl SqliteScanResultRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl ScanResultRepository for SqliteScanResultRepository {
    fn load(&self) -> Result<Option<ScanResult>, InfraError> {
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row("SELECT payload FROM scan_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let result = serde_json::from_str::<ScanResult>(&payload).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid scan_state.payload: {error}"))
        })?;
        Ok(Some(result))
    }

    fn save(&self, result: &ScanResult) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let payload = serde_json::to_string(result)?;
        connection.execute(
            "INSERT INTO scan_state (id, payload, last_run)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload,
               last_run = excluded.last_run",
            params![payload, result.last_run.map(|value| value.to_rfc3339())],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScanResultRepository {
    state: Mutex<Option<ScanResult>>,
}

impl ScanResultRepository for InMemoryScanResultRepository {
    fn load(&self) -> Result<Option<ScanResult>, InfraError> {
        let state = self
            .state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("scan state lock poisoned: {error}")))?;
        Ok(state.clone())
    }

    fn save(&self, result: &ScanResult) -> Result<(), InfraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("scan state lock poisoned: {error}")))?;
        *state = Some(result.clone());
        Ok(())
    }
}
