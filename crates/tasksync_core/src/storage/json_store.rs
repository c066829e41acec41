use crate::dispatch::PendingWrite;
use crate::error::AppError;
use crate::store::StoreKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 1;
const STORE_FILE_NAME: &str = "store.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    schema_version: u32,
    #[serde(default)]
    entities: BTreeMap<StoreKey, Value>,
    #[serde(default)]
    outbox: Vec<PendingWrite>,
}

/// Entity documents plus the writes still waiting for a terminal outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub entities: BTreeMap<StoreKey, Value>,
    pub outbox: Vec<PendingWrite>,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var("TASKSYNC_STORE_PATH")
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("tasksync").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("tasksync")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_state(path: &Path) -> Result<StoreState, AppError> {
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let content = std::fs::read_to_string(path).map_err(|err| AppError::io(err.to_string()))?;
    let stored: StoredState =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut request_ids: Vec<u64> = stored.outbox.iter().map(|write| write.request_id).collect();
    request_ids.sort_unstable();
    if request_ids.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(AppError::invalid_data("duplicate request_id in outbox"));
    }

    Ok(StoreState {
        entities: stored.entities,
        outbox: stored.outbox,
    })
}

pub fn save_state(path: &Path, state: &StoreState) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| AppError::io(err.to_string()))?;
    }

    let stored = StoredState {
        schema_version: SCHEMA_VERSION,
        entities: state.entities.clone(),
        outbox: state.outbox.clone(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    std::fs::write(path, content).map_err(|err| AppError::io(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions).map_err(|err| AppError::io(err.to_string()))?;
    }

    tracing::debug!(
        path = %path.display(),
        entities = state.entities.len(),
        outbox = state.outbox.len(),
        "store saved"
    );
    Ok(())
}
