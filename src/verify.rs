//! External AWS CLI collaborator.
//!
//! Identity verification (`aws sts get-caller-identity`) and SSO login
//! (`aws sso login`) shell out to the user's AWS CLI. GUI apps inherit a
//! minimal PATH, so common install locations are appended before spawning.
//! Every failure here is soft: the calling command reports it as
//! `verified: false` (or an external-tool error) and never rolls back the
//! store operation that already succeeded.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Browser-based SSO logins wait for the user; cap them at two minutes.
const SSO_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Parsed `sts get-caller-identity` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    #[serde(alias = "Account")]
    pub account: String,
    #[serde(default, alias = "UserId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(alias = "Arn")]
    pub arn: String,
}

/// PATH with the platform's usual AWS CLI install locations appended.
fn augmented_path() -> String {
    let base = std::env::var("PATH").unwrap_or_default();
    let sep = if cfg!(windows) { ';' } else { ':' };

    let extra = if cfg!(target_os = "macos") {
        "/usr/local/bin:/opt/homebrew/bin".to_string()
    } else if cfg!(windows) {
        let mut dirs = Vec::new();
        if let Ok(pf) = std::env::var("ProgramFiles") {
            dirs.push(format!("{}\\Amazon\\AWSCLIV2", pf));
        }
        if let Ok(pf86) = std::env::var("ProgramFiles(x86)") {
            dirs.push(format!("{}\\Amazon\\AWSCLIV2", pf86));
        }
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            dirs.push(format!("{}\\Programs\\Amazon\\AWSCLIV2", local));
        }
        dirs.join(";")
    } else {
        "/usr/local/bin".to_string()
    };

    if extra.is_empty() {
        base
    } else {
        format!("{}{}{}", base, sep, extra)
    }
}

fn parse_caller_identity(stdout: &str) -> Result<CallerIdentity, String> {
    serde_json::from_str(stdout)
        .map_err(|e| format!("Could not parse sts get-caller-identity output: {}", e))
}

/// Ask the AWS CLI who the given profile resolves to. `None` (or the
/// literal `default`) queries the default profile.
pub async fn caller_identity(profile: Option<&str>) -> Result<CallerIdentity, String> {
    let mut cmd = Command::new("aws");
    cmd.args(["sts", "get-caller-identity", "--output", "json"]);
    if let Some(profile) = profile.filter(|p| *p != "default") {
        cmd.args(["--profile", profile]);
    }
    cmd.env("PATH", augmented_path());

    let output = cmd
        .output()
        .await
        .map_err(|e| format!("Failed to run aws CLI: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "aws sts get-caller-identity failed: {}",
            stderr.trim()
        ));
    }

    parse_caller_identity(&String::from_utf8_lossy(&output.stdout))
}

/// Run the browser-based SSO login flow for a profile.
pub async fn sso_login(profile: &str) -> Result<(), String> {
    let mut cmd = Command::new("aws");
    cmd.args(["sso", "login", "--profile", profile]);
    cmd.env("PATH", augmented_path());

    let result = tokio::time::timeout(SSO_LOGIN_TIMEOUT, cmd.output()).await;
    match result {
        Err(_) => Err(format!(
            "SSO login timed out after {} seconds",
            SSO_LOGIN_TIMEOUT.as_secs()
        )),
        Ok(Err(e)) => Err(format!("Failed to run aws CLI: {}", e)),
        Ok(Ok(output)) if !output.status.success() => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!("SSO login failed: {}", stderr.trim()))
        }
        Ok(Ok(_)) => {
            log::info!("SSO login completed for profile \"{}\"", profile);
            Ok(())
        }
    }
}
