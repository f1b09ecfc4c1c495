//! Labhost Common - shared types for the host lifecycle manager
//!
//! Error taxonomy, protection levels, command results, job status records,
//! configuration and logging bootstrap.

pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod protection;
pub mod status;

pub use command::{sh_quote, CmdResult, RunOptions, DEFAULT_COMMAND_TIMEOUT};
pub use config::{HostSettings, LabhostConfig, LogSettings, MachineConfig, MachineKind, SshSettings};
pub use error::{HostError, HostResult};
pub use protection::{ProtectionLevel, ProtectionParseError};
pub use status::{StatusEntry, StatusLog, StatusRecorder};
