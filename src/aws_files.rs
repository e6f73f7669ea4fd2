//! AWS profile store.
//!
//! Translates account-shaped requests into INI section edits across the AWS
//! CLI's `~/.aws/credentials` and `~/.aws/config` files. Two section shapes
//! exist: access-key profiles (`[name]` in credentials plus
//! `[profile name]` in config) and SSO profiles (`[profile name]` in config
//! pointing at a shared `[sso-session s]` block, no credentials entry).
//! The `[default]` section always reflects exactly one promoted profile's
//! data, never a mixture of the two shapes.
//!
//! All writes go through the atomic writer; a crash mid-operation leaves at
//! worst one file updated and the other on its previous version, never a
//! torn file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ini::{Ini, Properties};
use serde::Serialize;

use crate::accounts::AuthType;
use crate::error::ProfileError;
use crate::util::atomic_write_str;

const CREDENTIALS_FILE: &str = "credentials";
const CONFIG_FILE: &str = "config";
const DEFAULT_SECTION: &str = "default";
const SSO_SESSION_KEY: &str = "sso_session";

/// Registration scope written into every `sso-session` block; the AWS CLI
/// expects this exact value for device-authorization logins.
const SSO_REGISTRATION_SCOPES: &str = "sso:account:access";

/// Everything needed to write an SSO profile and its session block.
#[derive(Debug, Clone)]
pub struct SsoProfileParams {
    pub profile_name: String,
    pub sso_session_name: String,
    pub sso_account_id: String,
    pub sso_role_name: String,
    pub sso_start_url: String,
    pub sso_region: String,
    pub region: String,
    pub output: String,
}

/// Static key pair read back from the credentials file. Only the edit flow
/// consumes the secret (to re-upsert it when the user leaves the field
/// blank); the command surface never returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Read-only SSO projection for the edit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoConfigView {
    pub sso_session_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_start_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Config-file section name for a profile. The AWS CLI prefixes every
/// config section with `profile ` except the literal `default`.
fn config_section_name(profile_name: &str) -> String {
    if profile_name == DEFAULT_SECTION {
        DEFAULT_SECTION.to_string()
    } else {
        format!("profile {}", profile_name)
    }
}

fn sso_session_section_name(session_name: &str) -> String {
    format!("sso-session {}", session_name)
}

/// Resolve a profile's section in the config file.
///
/// Priority order: the prefixed form (`profile <name>`) wins, the bare form
/// (`<name>`) is accepted as a fallback for hand-written configs, and the
/// literal `default` section is never prefixed.
fn find_config_section<'a>(config: &'a Ini, profile_name: &str) -> Option<&'a Properties> {
    config
        .section(Some(config_section_name(profile_name)))
        .or_else(|| config.section(Some(profile_name)))
}

/// Replace a section wholesale. Upserts never merge into stale keys.
fn replace_section(ini: &mut Ini, name: &str, props: Properties) {
    ini.delete(Some(name));
    ini.entry(Some(name.to_string())).or_insert(props);
}

/// Owns the two AWS CLI files and every section edit made to them.
pub struct AwsFiles {
    dir: PathBuf,
    credentials_path: PathBuf,
    config_path: PathBuf,
}

impl AwsFiles {
    /// Store over the standard `~/.aws` directory.
    pub fn new() -> Result<Self, ProfileError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ProfileError::Configuration("Could not find home directory".to_string())
        })?;
        Ok(Self::at(&home.join(".aws")))
    }

    /// Store over an explicit directory. Used by tests.
    pub fn at(dir: &Path) -> Self {
        AwsFiles {
            dir: dir.to_path_buf(),
            credentials_path: dir.join(CREDENTIALS_FILE),
            config_path: dir.join(CONFIG_FILE),
        }
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    // -----------------------------------------------------------------------
    // Upserts
    // -----------------------------------------------------------------------

    /// Write/overwrite `[name]` in the credentials file.
    pub fn upsert_access_key_profile(
        &self,
        profile_name: &str,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<(), ProfileError> {
        let mut creds = self.read_ini(&self.credentials_path)?;
        let mut props = Properties::new();
        props.insert("aws_access_key_id", access_key_id);
        props.insert("aws_secret_access_key", secret_access_key);
        replace_section(&mut creds, profile_name, props);
        self.write_ini(&self.credentials_path, &creds)
    }

    /// Write/overwrite the config section for an access-key profile.
    pub fn upsert_access_key_config(
        &self,
        profile_name: &str,
        region: &str,
        output: &str,
    ) -> Result<(), ProfileError> {
        let mut config = self.read_ini(&self.config_path)?;
        let mut props = Properties::new();
        props.insert("region", region);
        props.insert("output", output);
        replace_section(&mut config, &config_section_name(profile_name), props);
        self.write_ini(&self.config_path, &config)
    }

    /// Write/overwrite the config profile section for an SSO profile and
    /// upsert the `sso-session` block it points at. The credentials file is
    /// never touched for SSO profiles.
    pub fn upsert_sso_profile(&self, params: &SsoProfileParams) -> Result<(), ProfileError> {
        let mut config = self.read_ini(&self.config_path)?;

        let mut profile = Properties::new();
        profile.insert(SSO_SESSION_KEY, &params.sso_session_name);
        profile.insert("sso_account_id", &params.sso_account_id);
        profile.insert("sso_role_name", &params.sso_role_name);
        profile.insert("region", &params.region);
        profile.insert("output", &params.output);
        replace_section(
            &mut config,
            &config_section_name(&params.profile_name),
            profile,
        );

        let mut session = Properties::new();
        session.insert("sso_start_url", &params.sso_start_url);
        session.insert("sso_region", &params.sso_region);
        session.insert("sso_registration_scopes", SSO_REGISTRATION_SCOPES);
        replace_section(
            &mut config,
            &sso_session_section_name(&params.sso_session_name),
            session,
        );

        self.write_ini(&self.config_path, &config)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Auth shape of a profile, judged by its config section.
    ///
    /// `None` means the profile has no config section at all — callers that
    /// care about "known access-key profile" vs "unknown profile" can tell
    /// the two apart instead of assuming access-key.
    pub fn auth_type(&self, profile_name: &str) -> Result<Option<AuthType>, ProfileError> {
        let config = self.read_ini(&self.config_path)?;
        Ok(find_config_section(&config, profile_name).map(|props| {
            if props.contains_key(SSO_SESSION_KEY) {
                AuthType::Sso
            } else {
                AuthType::AccessKey
            }
        }))
    }

    /// Key pair stored for a profile, if any. Absent for SSO-only profiles.
    pub fn access_key_pair(
        &self,
        profile_name: &str,
    ) -> Result<Option<AccessKeyPair>, ProfileError> {
        let creds = self.read_ini(&self.credentials_path)?;
        Ok(creds.section(Some(profile_name)).map(|props| AccessKeyPair {
            access_key_id: props.get("aws_access_key_id").unwrap_or("").to_string(),
            secret_access_key: props.get("aws_secret_access_key").unwrap_or("").to_string(),
        }))
    }

    /// SSO projection of a profile, or `None` when the profile is missing
    /// or not SSO-shaped.
    pub fn sso_config(&self, profile_name: &str) -> Result<Option<SsoConfigView>, ProfileError> {
        let config = self.read_ini(&self.config_path)?;
        let Some(props) = find_config_section(&config, profile_name) else {
            return Ok(None);
        };
        let Some(session_name) = props.get(SSO_SESSION_KEY) else {
            return Ok(None);
        };
        let session = config.section(Some(sso_session_section_name(session_name)));
        let get = |p: &Properties, key: &str| p.get(key).map(str::to_string);
        Ok(Some(SsoConfigView {
            sso_session_name: session_name.to_string(),
            sso_start_url: session.and_then(|s| get(s, "sso_start_url")),
            sso_region: session.and_then(|s| get(s, "sso_region")),
            sso_account_id: get(props, "sso_account_id"),
            sso_role_name: get(props, "sso_role_name"),
            region: get(props, "region"),
            output: get(props, "output"),
        }))
    }

    /// All profile names the AWS files know about: credentials sections
    /// (minus `default`) plus SSO-shaped config profiles, deduplicated,
    /// in file order.
    pub fn list_profiles(&self) -> Result<Vec<String>, ProfileError> {
        let creds = self.read_ini(&self.credentials_path)?;
        let mut names: Vec<String> = Vec::new();
        for (section, _) in creds.iter() {
            if let Some(name) = section {
                if name != DEFAULT_SECTION {
                    names.push(name.to_string());
                }
            }
        }

        let config = self.read_ini(&self.config_path)?;
        for (section, props) in config.iter() {
            let Some(name) = section.and_then(|s| s.strip_prefix("profile ")) else {
                continue;
            };
            if props.contains_key(SSO_SESSION_KEY) && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Point the CLI's `default` profile at `profile_name`.
    ///
    /// SSO profile: its config section is copied verbatim into
    /// `[default]`, and any `[default]` entry in the credentials file is
    /// removed — the CLI resolves static keys before SSO, so a stale key
    /// pair would silently win otherwise.
    ///
    /// Access-key profile: `[name]` must exist in the credentials file
    /// (not-found error otherwise) and is copied into `[default]`; the
    /// config section follows if present.
    ///
    /// This is the one operation that touches both files. The writes are
    /// sequential; a failure between them leaves the earlier file updated
    /// and the error propagates so the caller can retry.
    pub fn promote_to_default(&self, profile_name: &str) -> Result<(), ProfileError> {
        let mut config = self.read_ini(&self.config_path)?;
        let resolved = find_config_section(&config, profile_name).cloned();

        match resolved {
            Some(props) if props.contains_key(SSO_SESSION_KEY) => {
                replace_section(&mut config, DEFAULT_SECTION, props);
                self.write_ini(&self.config_path, &config)?;

                let mut creds = self.read_ini(&self.credentials_path)?;
                if creds.delete(Some(DEFAULT_SECTION)).is_some() {
                    log::debug!("Removed stale [default] credentials for SSO switch");
                }
                self.write_ini(&self.credentials_path, &creds)?;
            }
            other => {
                let mut creds = self.read_ini(&self.credentials_path)?;
                let Some(key_props) = creds.section(Some(profile_name)).cloned() else {
                    return Err(ProfileError::ProfileNotFound(profile_name.to_string()));
                };
                replace_section(&mut creds, DEFAULT_SECTION, key_props);
                self.write_ini(&self.credentials_path, &creds)?;

                if let Some(props) = other {
                    replace_section(&mut config, DEFAULT_SECTION, props);
                    self.write_ini(&self.config_path, &config)?;
                }
            }
        }

        log::info!("Default profile now points at \"{}\"", profile_name);
        Ok(())
    }

    /// Remove a profile from both files.
    ///
    /// The `sso-session` block a deleted SSO profile pointed at is shared;
    /// it is removed only when no surviving config section still references
    /// the same session name.
    pub fn delete_profile(&self, profile_name: &str) -> Result<(), ProfileError> {
        let mut config = self.read_ini(&self.config_path)?;
        let session = find_config_section(&config, profile_name)
            .and_then(|props| props.get(SSO_SESSION_KEY))
            .map(str::to_string);

        config.delete(Some(config_section_name(profile_name)));
        config.delete(Some(profile_name));

        if let Some(session) = session {
            let still_referenced = config
                .iter()
                .any(|(_, props)| props.get(SSO_SESSION_KEY) == Some(session.as_str()));
            if !still_referenced {
                config.delete(Some(sso_session_section_name(&session)));
                log::debug!("Removed unreferenced sso-session \"{}\"", session);
            }
        }
        self.write_ini(&self.config_path, &config)?;

        let mut creds = self.read_ini(&self.credentials_path)?;
        creds.delete(Some(profile_name));
        self.write_ini(&self.credentials_path, &creds)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// A missing file parses as empty — both AWS files are optional until
    /// the first profile is written.
    fn read_ini(&self, path: &Path) -> Result<Ini, ProfileError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ini::load_from_str(&raw)
                .map_err(|e| ProfileError::Ini(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Ini::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_ini(&self, path: &Path, ini: &Ini) -> Result<(), ProfileError> {
        self.ensure_dir()?;
        let mut buf = Vec::new();
        ini.write_to(&mut buf)
            .map_err(|e| ProfileError::Ini(e.to_string()))?;
        atomic_write_str(path, &String::from_utf8_lossy(&buf))?;
        Ok(())
    }

    fn ensure_dir(&self) -> Result<(), ProfileError> {
        fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ID: &str = "AKIA1234567890123456";
    const SECRET: &str = "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

    fn sso_params(profile: &str, session: &str) -> SsoProfileParams {
        SsoProfileParams {
            profile_name: profile.to_string(),
            sso_session_name: session.to_string(),
            sso_account_id: "123456789012".to_string(),
            sso_role_name: "AdministratorAccess".to_string(),
            sso_start_url: "https://example.awsapps.com/start".to_string(),
            sso_region: "us-east-1".to_string(),
            region: "us-east-1".to_string(),
            output: "json".to_string(),
        }
    }

    fn read(path: &Path) -> Ini {
        Ini::load_from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_access_key_upsert_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());

        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();

        let pair = aws.access_key_pair("dev").unwrap().unwrap();
        assert_eq!(pair.access_key_id, KEY_ID);
        assert_eq!(pair.secret_access_key, SECRET);
    }

    #[test]
    fn test_config_section_name_never_prefixes_default() {
        assert_eq!(config_section_name("default"), "default");
        assert_eq!(config_section_name("dev"), "profile dev");
    }

    #[test]
    fn test_find_config_section_prefers_prefixed_form() {
        let mut config = Ini::new();
        let mut bare = Properties::new();
        bare.insert("region", "eu-west-1");
        replace_section(&mut config, "dev", bare);
        let mut prefixed = Properties::new();
        prefixed.insert("region", "us-east-1");
        replace_section(&mut config, "profile dev", prefixed);

        let props = find_config_section(&config, "dev").unwrap();
        assert_eq!(props.get("region"), Some("us-east-1"));
    }

    #[test]
    fn test_find_config_section_bare_fallback() {
        let mut config = Ini::new();
        let mut bare = Properties::new();
        bare.insert("region", "eu-west-1");
        replace_section(&mut config, "dev", bare);

        let props = find_config_section(&config, "dev").unwrap();
        assert_eq!(props.get("region"), Some("eu-west-1"));
    }

    #[test]
    fn test_auth_type_distinguishes_unknown_profiles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());

        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        assert_eq!(aws.auth_type("dev").unwrap(), Some(AuthType::AccessKey));
        assert_eq!(aws.auth_type("prod").unwrap(), Some(AuthType::Sso));
        assert_eq!(aws.auth_type("ghost").unwrap(), None);
    }

    #[test]
    fn test_promote_access_key_profile_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();
        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();

        aws.promote_to_default("dev").unwrap();

        let creds = read(aws.credentials_path());
        let default_creds = creds.section(Some("default")).unwrap();
        assert_eq!(default_creds.get("aws_access_key_id"), Some(KEY_ID));

        let config = read(aws.config_path());
        let default_config = config.section(Some("default")).unwrap();
        assert_eq!(default_config.get("region"), Some("us-east-1"));
    }

    #[test]
    fn test_promote_unknown_profile_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());

        let err = aws.promote_to_default("ghost").unwrap_err();
        assert!(matches!(err, ProfileError::ProfileNotFound(_)));
    }

    #[test]
    fn test_promote_sso_profile_removes_default_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());

        // A previously promoted access-key profile left static keys behind.
        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();
        aws.promote_to_default("dev").unwrap();
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        aws.promote_to_default("prod").unwrap();

        let creds = read(aws.credentials_path());
        assert!(creds.section(Some("default")).is_none());
        // Non-default sections survive.
        assert!(creds.section(Some("dev")).is_some());

        let config = read(aws.config_path());
        let default_config = config.section(Some("default")).unwrap();
        assert_eq!(default_config.get("sso_session"), Some("prod-session"));
        assert_eq!(default_config.get("sso_account_id"), Some("123456789012"));
    }

    #[test]
    fn test_promote_back_to_access_key_replaces_sso_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();
        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        aws.promote_to_default("prod").unwrap();
        aws.promote_to_default("dev").unwrap();

        let config = read(aws.config_path());
        let default_config = config.section(Some("default")).unwrap();
        // Wholesale replacement: no SSO keys linger in [default].
        assert!(default_config.get("sso_session").is_none());
        assert_eq!(default_config.get("region"), Some("us-east-1"));

        let creds = read(aws.credentials_path());
        assert_eq!(
            creds.section(Some("default")).unwrap().get("aws_access_key_id"),
            Some(KEY_ID)
        );
    }

    #[test]
    fn test_list_profiles_unions_and_dedupes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();
        aws.upsert_access_key_profile("default", KEY_ID, SECRET).unwrap();
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();
        // A profile present in both files counts once.
        aws.upsert_access_key_profile("prod", KEY_ID, SECRET).unwrap();

        let profiles = aws.list_profiles().unwrap();
        assert_eq!(profiles, vec!["dev", "prod"]);
    }

    #[test]
    fn test_delete_profile_removes_both_files_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_access_key_profile("dev", KEY_ID, SECRET).unwrap();
        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();

        aws.delete_profile("dev").unwrap();

        let creds = read(aws.credentials_path());
        assert!(creds.section(Some("dev")).is_none());
        let config = read(aws.config_path());
        assert!(config.section(Some("profile dev")).is_none());
    }

    #[test]
    fn test_delete_sso_profile_removes_sections_and_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        let config = read(aws.config_path());
        assert!(config.section(Some("profile prod")).is_some());
        assert_eq!(
            config
                .section(Some("sso-session prod-session"))
                .unwrap()
                .get("sso_start_url"),
            Some("https://example.awsapps.com/start")
        );

        aws.delete_profile("prod").unwrap();

        let config = read(aws.config_path());
        assert!(config.section(Some("profile prod")).is_none());
        assert!(config.section(Some("sso-session prod-session")).is_none());
    }

    #[test]
    fn test_shared_sso_session_survives_until_last_reference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_sso_profile(&sso_params("prod", "org-session")).unwrap();
        aws.upsert_sso_profile(&sso_params("staging", "org-session")).unwrap();

        aws.delete_profile("prod").unwrap();
        let config = read(aws.config_path());
        assert!(config.section(Some("sso-session org-session")).is_some());

        aws.delete_profile("staging").unwrap();
        let config = read(aws.config_path());
        assert!(config.section(Some("sso-session org-session")).is_none());
    }

    #[test]
    fn test_sso_config_projection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        let view = aws.sso_config("prod").unwrap().unwrap();
        assert_eq!(view.sso_session_name, "prod-session");
        assert_eq!(
            view.sso_start_url.as_deref(),
            Some("https://example.awsapps.com/start")
        );
        assert_eq!(view.sso_account_id.as_deref(), Some("123456789012"));
        assert_eq!(view.sso_role_name.as_deref(), Some("AdministratorAccess"));

        // Access-key profiles have no SSO projection.
        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();
        assert!(aws.sso_config("dev").unwrap().is_none());
    }

    #[test]
    fn test_sso_upsert_never_touches_credentials_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());

        aws.upsert_sso_profile(&sso_params("prod", "prod-session")).unwrap();

        assert!(!aws.credentials_path().exists());
    }

    #[test]
    fn test_upsert_replaces_section_wholesale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aws = AwsFiles::at(dir.path());
        aws.upsert_sso_profile(&sso_params("dev", "dev-session")).unwrap();

        // Re-writing the same profile as access-key config drops SSO keys.
        aws.upsert_access_key_config("dev", "us-east-1", "json").unwrap();

        let config = read(aws.config_path());
        let props = config.section(Some("profile dev")).unwrap();
        assert!(props.get("sso_session").is_none());
        assert_eq!(props.get("region"), Some("us-east-1"));
    }
}
