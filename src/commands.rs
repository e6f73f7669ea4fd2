//! Command surface / synchronization orchestrator.
//!
//! The UI shell (window or tray menu) calls these functions; each one
//! validates its input before any write, applies the AWS-file side first,
//! then the metadata side, and publishes a change event on success. A
//! mid-sequence I/O failure can leave the two stores diverged — there is
//! no compensating rollback; the error propagates and the user retries.
//! External AWS CLI calls (identity verification, SSO login) are soft:
//! their failure never undoes a store operation that already succeeded.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AuthType};
use crate::aws_files::{SsoConfigView, SsoProfileParams};
use crate::error::{CommandError, ProfileError};
use crate::events::AppEvent;
use crate::state::AppState;
use crate::verify::{self, CallerIdentity};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_OUTPUT: &str = "json";
const MIN_ACCESS_KEY_LEN: usize = 16;
const MIN_SECRET_KEY_LEN: usize = 40;

fn profile_name_re() -> &'static Regex {
    static PROFILE_NAME_RE: OnceLock<Regex> = OnceLock::new();
    PROFILE_NAME_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+$").expect("profile name regex must compile")
    })
}

// ---------------------------------------------------------------------------
// Validation — rejected before any write happens
// ---------------------------------------------------------------------------

fn validate_profile_name(profile_name: &str) -> Result<(), ProfileError> {
    if profile_name.is_empty() || !profile_name_re().is_match(profile_name) {
        return Err(ProfileError::Validation(
            "Profile name must contain only letters, numbers, hyphens, and underscores"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_access_key(access_key_id: &str) -> Result<(), ProfileError> {
    if access_key_id.len() < MIN_ACCESS_KEY_LEN {
        return Err(ProfileError::Validation("Invalid access key ID".to_string()));
    }
    Ok(())
}

fn validate_secret_key(secret_access_key: &str) -> Result<(), ProfileError> {
    if secret_access_key.len() < MIN_SECRET_KEY_LEN {
        return Err(ProfileError::Validation(
            "Invalid secret access key (must be at least 40 characters)".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Payload for add/edit. One shape covers both auth types; the fields that
/// apply depend on `auth_type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub profile_name: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    pub sso_start_url: Option<String>,
    pub sso_account_id: Option<String>,
    pub sso_role_name: Option<String>,
    pub sso_region: Option<String>,
    pub sso_session_name: Option<String>,
    pub region: Option<String>,
    pub output: Option<String>,
    pub logo_path: Option<String>,
    pub display_name: Option<String>,
}

impl AccountRequest {
    fn region(&self) -> String {
        non_empty(self.region.as_deref()).unwrap_or(DEFAULT_REGION).to_string()
    }

    fn output(&self) -> String {
        non_empty(self.output.as_deref()).unwrap_or(DEFAULT_OUTPUT).to_string()
    }

    fn session_name(&self) -> String {
        non_empty(self.sso_session_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-session", self.profile_name))
    }

    fn sso_params(&self) -> Result<SsoProfileParams, ProfileError> {
        let (Some(start_url), Some(account_id), Some(role_name)) = (
            non_empty(self.sso_start_url.as_deref()),
            non_empty(self.sso_account_id.as_deref()),
            non_empty(self.sso_role_name.as_deref()),
        ) else {
            return Err(ProfileError::Validation(
                "SSO Start URL, Account ID, and Role Name are required".to_string(),
            ));
        };
        let region = self.region();
        Ok(SsoProfileParams {
            profile_name: self.profile_name.clone(),
            sso_session_name: self.session_name(),
            sso_account_id: account_id.to_string(),
            sso_role_name: role_name.to_string(),
            sso_start_url: start_url.to_string(),
            sso_region: non_empty(self.sso_region.as_deref())
                .unwrap_or(&region)
                .to_string(),
            region,
            output: self.output(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Access-key projection for the edit form. The secret never leaves the
/// credentials file through the command surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyView {
    pub access_key_id: String,
}

/// Outcome of a profile switch. The switch itself succeeded; `verified`
/// reports whether the follow-up identity check also worked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<CallerIdentity>,
}

/// Where the stores live on disk, for display in the settings UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPaths {
    pub app_data_file: String,
    pub logos_dir: String,
    pub aws_credentials: String,
    pub aws_config: String,
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

pub async fn list_accounts(state: &AppState) -> Result<Vec<Account>, CommandError> {
    Ok(state.accounts.list()?)
}

pub async fn get_active_profile(state: &AppState) -> Result<Option<String>, CommandError> {
    Ok(state.accounts.active()?)
}

/// Profiles known to the AWS files themselves, including ones this app
/// never created.
pub async fn list_aws_profiles(state: &AppState) -> Result<Vec<String>, CommandError> {
    Ok(state.aws.list_profiles()?)
}

pub async fn get_access_key(
    state: &AppState,
    profile_name: &str,
) -> Result<Option<AccessKeyView>, CommandError> {
    Ok(state.aws.access_key_pair(profile_name)?.map(|pair| AccessKeyView {
        access_key_id: pair.access_key_id,
    }))
}

pub async fn get_sso_config(
    state: &AppState,
    profile_name: &str,
) -> Result<Option<SsoConfigView>, CommandError> {
    Ok(state.aws.sso_config(profile_name)?)
}

pub fn data_paths(state: &AppState) -> DataPaths {
    DataPaths {
        app_data_file: state.accounts.data_path().display().to_string(),
        logos_dir: state.accounts.logos_dir().display().to_string(),
        aws_credentials: state.aws.credentials_path().display().to_string(),
        aws_config: state.aws.config_path().display().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Mutating commands
// ---------------------------------------------------------------------------

pub async fn add_account(state: &AppState, req: AccountRequest) -> Result<(), CommandError> {
    validate_profile_name(&req.profile_name)?;

    // Reject duplicates before the AWS files are touched, so a failed add
    // never overwrites an existing profile's sections.
    if state.accounts.find(&req.profile_name)?.is_some() {
        return Err(ProfileError::DuplicateProfile(req.profile_name).into());
    }

    match req.auth_type {
        AuthType::Sso => {
            let params = req.sso_params()?;
            state.aws.upsert_sso_profile(&params)?;
        }
        AuthType::AccessKey => {
            validate_access_key(&req.access_key_id)?;
            validate_secret_key(&req.secret_access_key)?;
            state.aws.upsert_access_key_profile(
                &req.profile_name,
                &req.access_key_id,
                &req.secret_access_key,
            )?;
            state
                .aws
                .upsert_access_key_config(&req.profile_name, &req.region(), &req.output())?;
        }
    }

    let logo_path = store_logo_best_effort(state, &req);
    state.accounts.add(build_account(&req, logo_path))?;

    log::info!("Added account \"{}\"", req.profile_name);
    state.events.publish(AppEvent::AccountsChanged);
    Ok(())
}

pub async fn edit_account(state: &AppState, req: AccountRequest) -> Result<(), CommandError> {
    validate_profile_name(&req.profile_name)?;

    // The record must exist before anything is written; otherwise a typo'd
    // edit would create orphaned AWS sections.
    if state.accounts.find(&req.profile_name)?.is_none() {
        return Err(ProfileError::ProfileNotFound(req.profile_name).into());
    }

    match req.auth_type {
        AuthType::Sso => {
            let params = req.sso_params()?;
            state.aws.upsert_sso_profile(&params)?;
        }
        AuthType::AccessKey => {
            if !req.access_key_id.is_empty() {
                validate_access_key(&req.access_key_id)?;
                // Blank secret means "keep what's stored" so the user isn't
                // forced to re-enter it on every edit.
                let secret = if req.secret_access_key.trim().is_empty() {
                    state
                        .aws
                        .access_key_pair(&req.profile_name)?
                        .map(|pair| pair.secret_access_key)
                        .unwrap_or_default()
                } else {
                    req.secret_access_key.clone()
                };
                if !secret.is_empty() {
                    validate_secret_key(&secret)?;
                    state.aws.upsert_access_key_profile(
                        &req.profile_name,
                        &req.access_key_id,
                        &secret,
                    )?;
                }
            }
            state
                .aws
                .upsert_access_key_config(&req.profile_name, &req.region(), &req.output())?;
        }
    }

    // No logo in the request is an explicit removal, not "keep".
    let logo_path = match non_empty(req.logo_path.as_deref()) {
        Some(_) => store_logo_best_effort(state, &req),
        None => {
            state.accounts.remove_stored_logo(&req.profile_name)?;
            None
        }
    };

    state.accounts.update(&req.profile_name, |account| {
        account.auth_type = req.auth_type;
        account.display_name = req.display_name.clone();
        account.logo_path = logo_path;
        account.region = req.region.clone();
        account.output = req.output.clone();
        match req.auth_type {
            AuthType::Sso => {
                account.sso_start_url = req.sso_start_url.clone();
                account.sso_account_id = req.sso_account_id.clone();
                account.sso_role_name = req.sso_role_name.clone();
                account.sso_region = req.sso_region.clone();
                account.sso_session_name = Some(req.session_name());
            }
            AuthType::AccessKey => {
                // Switching back to static keys clears every SSO field.
                account.sso_start_url = None;
                account.sso_account_id = None;
                account.sso_role_name = None;
                account.sso_region = None;
                account.sso_session_name = None;
            }
        }
    })?;

    log::info!("Updated account \"{}\"", req.profile_name);
    state.events.publish(AppEvent::AccountsChanged);
    Ok(())
}

pub async fn delete_account(state: &AppState, profile_name: &str) -> Result<(), CommandError> {
    let was_active = state.accounts.active()?.as_deref() == Some(profile_name);

    state.aws.delete_profile(profile_name)?;
    state.accounts.remove(profile_name)?;
    state.accounts.remove_stored_logo(profile_name)?;

    log::info!("Deleted account \"{}\"", profile_name);
    state.events.publish(AppEvent::AccountsChanged);
    if was_active {
        state
            .events
            .publish(AppEvent::ActiveProfileChanged { profile: None });
    }
    Ok(())
}

/// Switch the AWS CLI's `default` profile, persist the choice, then try a
/// best-effort identity check. A failed check still returns success with
/// `verified: false` — the switch itself already happened.
pub async fn set_active_account(
    state: &AppState,
    profile_name: &str,
) -> Result<SetActiveResult, CommandError> {
    state.aws.promote_to_default(profile_name)?;
    state.accounts.set_active(Some(profile_name.to_string()))?;

    state.events.publish(AppEvent::ActiveProfileChanged {
        profile: Some(profile_name.to_string()),
    });

    match verify::caller_identity(None).await {
        Ok(identity) => Ok(SetActiveResult {
            verified: true,
            identity: Some(identity),
        }),
        Err(e) => {
            log::debug!("Post-switch identity check unavailable: {}", e);
            Ok(SetActiveResult {
                verified: false,
                identity: None,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// External-tool commands
// ---------------------------------------------------------------------------

pub async fn verify_account(profile_name: &str) -> Result<CallerIdentity, CommandError> {
    verify::caller_identity(Some(profile_name))
        .await
        .map_err(CommandError::external)
}

pub async fn sso_login(profile_name: &str) -> Result<(), CommandError> {
    verify::sso_login(profile_name)
        .await
        .map_err(CommandError::external)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A logo that can't be copied is dropped, not fatal — the account is
/// created either way and the field stays unset.
fn store_logo_best_effort(state: &AppState, req: &AccountRequest) -> Option<String> {
    let source = non_empty(req.logo_path.as_deref())?;
    match state.accounts.store_logo(Path::new(source), &req.profile_name) {
        Ok(path) => Some(path.display().to_string()),
        Err(e) => {
            log::warn!("Could not store logo for \"{}\": {}", req.profile_name, e);
            None
        }
    }
}

fn build_account(req: &AccountRequest, logo_path: Option<String>) -> Account {
    let sso = req.auth_type == AuthType::Sso;
    Account {
        profile_name: req.profile_name.clone(),
        auth_type: req.auth_type,
        display_name: req.display_name.clone(),
        logo_path,
        region: req.region.clone(),
        output: req.output.clone(),
        sso_start_url: if sso { req.sso_start_url.clone() } else { None },
        sso_account_id: if sso { req.sso_account_id.clone() } else { None },
        sso_role_name: if sso { req.sso_role_name.clone() } else { None },
        sso_region: if sso { req.sso_region.clone() } else { None },
        sso_session_name: sso.then(|| req.session_name()),
    }
}
