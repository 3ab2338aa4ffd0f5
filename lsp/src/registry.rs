//! Client registry — caches one client per (project, language).
//!
//! Owned by the caller and passed where needed, so tests can inject their
//! own instead of reaching for a process global. `shutdown_all` is the
//! single teardown entry point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::client::LspClient;
use crate::types::{ClientError, Language};

#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<(PathBuf, Language), LspClient>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached client for the pair, starting one if needed.
    ///
    /// Failed starts are not cached: the next call retries from scratch.
    /// A cached client whose process has died is dropped and respawned.
    pub async fn get(
        &mut self,
        project_dir: &Path,
        language: Language,
    ) -> Result<&mut LspClient, ClientError> {
        let key = (project_dir.to_path_buf(), language);

        let died = self.clients.get_mut(&key).is_some_and(|c| !c.is_alive());
        if died {
            tracing::warn!(
                language = language.name(),
                project = %project_dir.display(),
                "cached language server died, restarting"
            );
            self.clients.remove(&key);
        }

        if !self.clients.contains_key(&key) {
            let client = LspClient::start(project_dir, language).await?;
            self.clients.insert(key.clone(), client);
        }

        Ok(self
            .clients
            .get_mut(&key)
            .expect("client inserted or cached above"))
    }

    /// Number of live cache entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Stop every cached client. Called once at process exit.
    pub async fn shutdown_all(&mut self) {
        for ((project, language), client) in self.clients.drain() {
            tracing::debug!(
                language = language.name(),
                project = %project.display(),
                "stopping language server"
            );
            client.shutdown().await;
        }
    }
}
