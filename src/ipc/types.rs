use crate::auth::Session;
use crate::config::{Backend, Config};
use crate::error::{AppError, Result};
use crate::model::Role;
use crate::presenter::Dashboard;
use crate::repository::GroupRepository;
use crate::store::local::LocalStore;
use crate::store::rest::RestStore;
use crate::store::Store;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    /// Directory of the open local store; `None` for the remote backend.
    pub store_dir: Option<PathBuf>,
    pub repo: Option<GroupRepository>,
    pub session: Option<Session>,
    pub dashboard: Option<Dashboard>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store_dir: None,
            repo: None,
            session: None,
            dashboard: None,
        }
    }

    /// Open whatever backend the configuration names.
    pub fn open_configured_store(&mut self) -> Result<()> {
        match self.config.backend {
            Backend::Local => {
                let dir = self.config.data_dir.clone();
                self.open_local(&dir)
            }
            Backend::Firebase => {
                let (Some(url), Some(key)) = (&self.config.database_url, &self.config.api_key)
                else {
                    return Err(AppError::Validation(
                        "firebase backend needs databaseUrl and apiKey".into(),
                    ));
                };
                let store = RestStore::new(url, key)?;
                self.install(Arc::new(store), None);
                Ok(())
            }
        }
    }

    pub fn open_local(&mut self, dir: &Path) -> Result<()> {
        let store = LocalStore::open(dir)?;
        self.install(Arc::new(store), Some(dir.to_path_buf()));
        Ok(())
    }

    /// Drop the store and everything derived from it.
    pub fn close_store(&mut self) {
        if let Some(repo) = self.repo.take() {
            repo.store().sign_out();
        }
        self.store_dir = None;
        self.session = None;
        self.dashboard = None;
    }

    fn install(&mut self, store: Arc<dyn Store>, dir: Option<PathBuf>) {
        self.close_store();
        tracing::info!("using {} store", store.backend_name());
        self.repo = Some(GroupRepository::new(store, self.config.retry));
        self.store_dir = dir;
    }

    pub fn repo(&self) -> Option<GroupRepository> {
        self.repo.clone()
    }

    pub fn session(&self, role: Option<Role>) -> Result<&Session> {
        let s = self.session.as_ref().ok_or(AppError::NoSession)?;
        match role {
            Some(r) if s.role != r => Err(AppError::Forbidden(format!(
                "this action requires a {} account",
                r
            ))),
            _ => Ok(s),
        }
    }
}
