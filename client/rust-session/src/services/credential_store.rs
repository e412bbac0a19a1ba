use parking_lot::RwLock;
use std::path::{Path, PathBuf};

use crate::models::credential::Credential;

/// Identifies one signed-in session. Every `set` starts a new epoch; token
/// refreshes stay within it. Epochs only grow.
pub type SessionEpoch = u64;

/// Where the credential survives between runs. Implementations are
/// best-effort: the store logs their failures and carries on in memory.
pub trait CredentialPersistence: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> anyhow::Result<()>;
    fn remove(&self) -> anyhow::Result<()>;
}

/// Keeps nothing across runs.
#[derive(Debug, Default)]
pub struct MemoryPersistence;

impl CredentialPersistence for MemoryPersistence {
    fn load(&self) -> anyhow::Result<Option<Credential>> {
        Ok(None)
    }

    fn save(&self, _credential: &Credential) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One JSON document on disk, replaced atomically via write-then-rename.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CredentialPersistence for FilePersistence {
    fn load(&self) -> anyhow::Result<Option<Credential>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, serde_json::to_vec(credential)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn remove(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

struct StoreState {
    current: Option<(Credential, SessionEpoch)>,
    next_epoch: SessionEpoch,
    /// Every epoch at or below this has been cleared.
    revoked_through: SessionEpoch,
}

/// Holds the single live credential for this client.
///
/// Only the auth gateway and the API client (on auth expiry) write to it;
/// every other component reads. Locks are never held across an await.
pub struct CredentialStore {
    state: RwLock<StoreState>,
    persistence: Box<dyn CredentialPersistence>,
}

impl CredentialStore {
    /// Restores a persisted credential if there is one. An unreadable file
    /// is discarded rather than trusted.
    pub fn new(persistence: Box<dyn CredentialPersistence>) -> Self {
        let restored = match persistence.load() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted credential: {}", e);
                if let Err(e) = persistence.remove() {
                    tracing::warn!("Failed to remove persisted credential: {}", e);
                }
                None
            }
        };

        if let Some(credential) = &restored {
            tracing::info!("Restored session for {}", credential.user.uid);
        }

        Self {
            state: RwLock::new(StoreState {
                current: restored.map(|c| (c, 1)),
                next_epoch: 2,
                revoked_through: 0,
            }),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryPersistence))
    }

    /// Replaces whatever is stored and starts a new session epoch.
    pub fn set(&self, credential: Credential) -> SessionEpoch {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if let Some((_, old)) = &state.current {
            state.revoked_through = state.revoked_through.max(*old);
        }
        let epoch = state.next_epoch;
        state.next_epoch += 1;
        self.persist(&credential);
        state.current = Some((credential, epoch));
        epoch
    }

    pub fn get(&self) -> Option<Credential> {
        self.state.read().current.as_ref().map(|(c, _)| c.clone())
    }

    pub fn snapshot(&self) -> Option<(Credential, SessionEpoch)> {
        self.state.read().current.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().current.is_some()
    }

    /// Swaps in a refreshed token for the session `epoch`. Does nothing if
    /// that session has ended meanwhile, so a late refresh cannot revive it.
    pub fn replace_token(&self, epoch: SessionEpoch, refreshed: Credential) -> bool {
        let mut state = self.state.write();
        if state.current.as_ref().map(|(_, live)| *live) != Some(epoch) {
            return false;
        }
        self.persist(&refreshed);
        state.current = Some((refreshed, epoch));
        true
    }

    /// Clears the session `epoch` if it is still the live one. Returns
    /// whether this call did the clearing.
    pub fn invalidate(&self, epoch: SessionEpoch) -> bool {
        let mut state = self.state.write();
        state.revoked_through = state.revoked_through.max(epoch);
        if state.current.as_ref().map(|(_, live)| *live) != Some(epoch) {
            return false;
        }
        state.current = None;
        self.unpersist();
        true
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        if let Some((_, epoch)) = state.current.take() {
            state.revoked_through = state.revoked_through.max(epoch);
        }
        self.unpersist();
    }

    pub fn is_revoked(&self, epoch: SessionEpoch) -> bool {
        epoch <= self.state.read().revoked_through
    }

    fn persist(&self, credential: &Credential) {
        if let Err(e) = self.persistence.save(credential) {
            tracing::warn!("Failed to persist credential: {}", e);
        }
    }

    fn unpersist(&self) {
        if let Err(e) = self.persistence.remove() {
            tracing::warn!("Failed to remove persisted credential: {}", e);
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CredentialStore")
            .field("authenticated", &state.current.is_some())
            .field("revoked_through", &state.revoked_through)
            .finish()
    }
}
