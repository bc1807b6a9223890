//! Shared process state: configuration, the database handle, and the
//! identifier index, built once at startup and passed into components.

use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::db::TalentDb;
use crate::error::PipelineError;
use crate::index::IdentifierIndex;

pub struct AppState {
    pub config: Config,
    pub db: Arc<Mutex<TalentDb>>,
    pub index: Arc<IdentifierIndex>,
}

impl AppState {
    /// Open the database, run migrations, and warm-load the identifier
    /// index.
    pub fn init(config: Config) -> Result<Arc<Self>, PipelineError> {
        let db = TalentDb::open(&config.db_path)?;

        let index = Arc::new(IdentifierIndex::new());
        index.warm_load(&db)?;

        Ok(Arc::new(Self {
            config,
            db: Arc::new(Mutex::new(db)),
            index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_opens_db_and_loads_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: dir.path().join("state-test.db"),
            github_token: None,
            phantombuster_api_key: None,
            phantombuster_agent_id: None,
        };

        let state = AppState::init(config).unwrap();
        let db = state.db.lock().unwrap();
        assert!(db.entity_counts().unwrap().iter().all(|(_, n)| *n == 0));
    }
}
