//! Account metadata store.
//!
//! Owns a single JSON document (`accounts.json`) recording the set of known
//! accounts and which one is active, plus the app-owned logo directory.
//! The on-disk file is the source of truth; a process-wide cache serves
//! reads and is replaced only after a successful write. Mutating operations
//! always re-read the file first so a tray-menu change and a window change
//! can't overwrite each other's unseen update.
//!
//! Layout (resolved from OS-provided directories only, never hardcoded
//! folder names, so localized Windows/macOS installs work):
//!   <config-dir>/aws-profile-manager/accounts.json
//!   <config-dir>/aws-profile-manager/logos/<sanitized-profile>.<ext>

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::util::{atomic_write_str, sanitize_for_filesystem};

const APP_DIR_NAME: &str = "aws-profile-manager";
const DATA_FILE_NAME: &str = "accounts.json";
const LOGOS_DIR_NAME: &str = "logos";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    AccessKey,
    Sso,
}

/// The app's own record about a profile — display metadata and auth shape.
/// Distinct from the AWS CLI's on-disk sections, which the AWS file store
/// owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique key; immutable after creation. Edit flows look records up by
    /// this name, they never change it.
    pub profile_name: String,
    /// Missing in documents written before SSO support; defaulted to
    /// access-key on first load (see `AccountStore::load`).
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_start_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_session_name: Option<String>,
}

/// The whole metadata document.
///
/// `active_profile` should reference an existing account's `profile_name`;
/// the invariant is violated transiently and repaired on delete by nulling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub active_profile: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// CRUD over the metadata document plus logo-file lifecycle.
pub struct AccountStore {
    data_path: PathBuf,
    logos_dir: PathBuf,
    cache: Mutex<Option<AppData>>,
}

impl AccountStore {
    /// Store rooted at the platform config directory
    /// (macOS Application Support, Windows Roaming AppData, Linux ~/.config).
    pub fn new() -> Result<Self, ProfileError> {
        let base = dirs::config_dir()
            .ok_or_else(|| {
                ProfileError::Configuration("Could not find config directory".to_string())
            })?
            .join(APP_DIR_NAME);
        Ok(Self::at(&base))
    }

    /// Store rooted at an explicit directory. Used by tests.
    pub fn at(dir: &Path) -> Self {
        AccountStore {
            data_path: dir.join(DATA_FILE_NAME),
            logos_dir: dir.join(LOGOS_DIR_NAME),
            cache: Mutex::new(None),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn logos_dir(&self) -> &Path {
        &self.logos_dir
    }

    /// Read-through cached load.
    ///
    /// A missing file materializes (and persists) the default empty
    /// document rather than failing. A document written before SSO support
    /// — any account record lacking `authType` — is migrated to
    /// `access-key` and re-saved, once, on the first load after upgrade.
    pub fn load(&self) -> Result<AppData, ProfileError> {
        let mut guard = self.lock_cache()?;
        if let Some(data) = guard.as_ref() {
            return Ok(data.clone());
        }

        let raw = match fs::read_to_string(&self.data_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let data = AppData::default();
                self.persist(&data)?;
                *guard = Some(data.clone());
                return Ok(data);
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ProfileError::Json(e.to_string()))?;
        let needs_migration = value
            .get("accounts")
            .and_then(|a| a.as_array())
            .is_some_and(|accounts| accounts.iter().any(|a| a.get("authType").is_none()));

        let data: AppData =
            serde_json::from_value(value).map_err(|e| ProfileError::Json(e.to_string()))?;

        if needs_migration {
            log::info!("Migrating accounts.json: defaulting authType to access-key");
            self.persist(&data)?;
        }

        *guard = Some(data.clone());
        Ok(data)
    }

    /// Write-through save: disk first, then cache. On failure the cache is
    /// left unchanged and the error propagates.
    pub fn save(&self, data: AppData) -> Result<(), ProfileError> {
        self.persist(&data)?;
        *self.lock_cache()? = Some(data);
        Ok(())
    }

    /// Drop the cached document so the next read hits the disk.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }

    /// Append a new account. Fails if the profile name is already taken;
    /// nothing is written in that case.
    pub fn add(&self, account: Account) -> Result<(), ProfileError> {
        let mut data = self.read_disk()?;
        if data
            .accounts
            .iter()
            .any(|a| a.profile_name == account.profile_name)
        {
            return Err(ProfileError::DuplicateProfile(account.profile_name));
        }
        data.accounts.push(account);
        self.save(data)
    }

    /// Apply a partial update to an existing account. The mutator only
    /// touches the fields it sets; everything else is preserved.
    pub fn update(
        &self,
        profile_name: &str,
        mutate: impl FnOnce(&mut Account),
    ) -> Result<Account, ProfileError> {
        let mut data = self.read_disk()?;
        let account = data
            .accounts
            .iter_mut()
            .find(|a| a.profile_name == profile_name)
            .ok_or_else(|| ProfileError::ProfileNotFound(profile_name.to_string()))?;
        mutate(account);
        let updated = account.clone();
        self.save(data)?;
        Ok(updated)
    }

    /// Remove an account record. Clears `active_profile` when it pointed at
    /// the removed account. Removing an unknown name is a no-op.
    pub fn remove(&self, profile_name: &str) -> Result<(), ProfileError> {
        let mut data = self.read_disk()?;
        data.accounts.retain(|a| a.profile_name != profile_name);
        if data.active_profile.as_deref() == Some(profile_name) {
            data.active_profile = None;
        }
        self.save(data)
    }

    pub fn set_active(&self, profile_name: Option<String>) -> Result<(), ProfileError> {
        let mut data = self.read_disk()?;
        data.active_profile = profile_name;
        self.save(data)
    }

    pub fn active(&self) -> Result<Option<String>, ProfileError> {
        Ok(self.load()?.active_profile)
    }

    pub fn list(&self) -> Result<Vec<Account>, ProfileError> {
        Ok(self.load()?.accounts)
    }

    pub fn find(&self, profile_name: &str) -> Result<Option<Account>, ProfileError> {
        Ok(self
            .load()?
            .accounts
            .into_iter()
            .find(|a| a.profile_name == profile_name))
    }

    // -----------------------------------------------------------------------
    // Logo lifecycle
    // -----------------------------------------------------------------------

    /// Copy a logo image into app-owned storage so it survives e.g. the
    /// Downloads folder being cleared. Returns the stored path. Idempotent
    /// when the source already lives inside the logo directory.
    pub fn store_logo(&self, source: &Path, profile_name: &str) -> Result<PathBuf, ProfileError> {
        if source.starts_with(&self.logos_dir) {
            return Ok(source.to_path_buf());
        }
        fs::create_dir_all(&self.logos_dir)?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let dest = self
            .logos_dir
            .join(format!("{}.{}", sanitize_for_filesystem(profile_name), ext));
        fs::copy(source, &dest)?;
        Ok(dest)
    }

    /// Delete any stored logo file(s) for a profile. A missing logo
    /// directory means there is nothing to remove.
    pub fn remove_stored_logo(&self, profile_name: &str) -> Result<(), ProfileError> {
        let prefix = format!("{}.", sanitize_for_filesystem(profile_name));
        let entries = match fs::read_dir(&self.logos_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let is_match = name
                .to_str()
                .is_some_and(|n| n.starts_with(&prefix))
                && entry.path().is_file();
            if is_match {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Read the document straight from disk, bypassing the cache. Every
    /// mutation starts here so interleaved writers (tray vs. window) see
    /// each other's updates.
    fn read_disk(&self) -> Result<AppData, ProfileError> {
        match fs::read_to_string(&self.data_path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| ProfileError::Json(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(AppData::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, data: &AppData) -> Result<(), ProfileError> {
        if let Some(parent) = self.data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| ProfileError::Json(e.to_string()))?;
        atomic_write_str(&self.data_path, &content)?;
        Ok(())
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, Option<AppData>>, ProfileError> {
        self.cache
            .lock()
            .map_err(|_| ProfileError::Configuration("Accounts cache lock poisoned".to_string()))
    }
}
