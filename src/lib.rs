//! Profile-store synchronization engine for an AWS CLI profile manager.
//!
//! Keeps three stores in step: the AWS shared credentials/config files
//! under `~/.aws`, a cached JSON document of account metadata, and the
//! UI shell subscribed through the event bus. The [`commands`] module is
//! the entry point; everything below it is plumbing.

pub mod accounts;
pub mod aws_files;
pub mod commands;
pub mod error;
pub mod events;
pub mod state;
pub mod util;
pub mod verify;

pub use state::AppState;
