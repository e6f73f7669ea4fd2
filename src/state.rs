//! Application state shared across the command surface.

use std::path::Path;

use crate::accounts::AccountStore;
use crate::aws_files::AwsFiles;
use crate::error::ProfileError;
use crate::events::EventBus;

/// The two stores plus the change-notification bus. The UI shell creates
/// one of these at startup and hands it to every command.
pub struct AppState {
    pub aws: AwsFiles,
    pub accounts: AccountStore,
    pub events: EventBus,
}

impl AppState {
    /// State over the real user directories (`~/.aws`, platform config dir).
    pub fn new() -> Result<Self, ProfileError> {
        Ok(AppState {
            aws: AwsFiles::new()?,
            accounts: AccountStore::new()?,
            events: EventBus::new(),
        })
    }

    /// State over explicit directories. Used by tests.
    pub fn at(aws_dir: &Path, data_dir: &Path) -> Self {
        AppState {
            aws: AwsFiles::at(aws_dir),
            accounts: AccountStore::at(data_dir),
            events: EventBus::new(),
        }
    }
}
