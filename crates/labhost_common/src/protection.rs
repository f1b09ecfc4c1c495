//! Host protection levels
//!
//! A protection level is an externally supplied ceiling on how invasive
//! automated repair may get. Variants are declared in order of increasing
//! permitted invasiveness, so `PartialOrd` compares them that way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtectionLevel {
    /// Only verify, never touch the machine
    DoNotRepair,
    /// Clear temporary space and wait out reboots
    #[serde(alias = "filesystem-only")]
    RepairFilesystemOnly,
    /// Filesystem repairs plus a full OS reinstall
    #[serde(alias = "software-only")]
    RepairSoftwareOnly,
    /// Everything, including hardware repair requests
    NoProtection,
}

impl Default for ProtectionLevel {
    fn default() -> Self {
        ProtectionLevel::NoProtection
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown host protection level: {0}")]
pub struct ProtectionParseError(pub String);

impl ProtectionLevel {
    pub const ALL: [ProtectionLevel; 4] = [
        ProtectionLevel::DoNotRepair,
        ProtectionLevel::RepairFilesystemOnly,
        ProtectionLevel::RepairSoftwareOnly,
        ProtectionLevel::NoProtection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::DoNotRepair => "do-not-repair",
            ProtectionLevel::RepairFilesystemOnly => "repair-filesystem-only",
            ProtectionLevel::RepairSoftwareOnly => "repair-software-only",
            ProtectionLevel::NoProtection => "no-protection",
        }
    }

    /// Name shown to operators
    pub fn human_name(&self) -> &'static str {
        match self {
            ProtectionLevel::DoNotRepair => "Do not repair",
            ProtectionLevel::RepairFilesystemOnly => "Repair filesystem only",
            ProtectionLevel::RepairSoftwareOnly => "Repair software only",
            ProtectionLevel::NoProtection => "No protection",
        }
    }
}

impl fmt::Display for ProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProtectionLevel {
    type Err = ProtectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(|c: char| c == '_' || c == ' ', "-");
        match normalized.as_str() {
            "do-not-repair" => Ok(ProtectionLevel::DoNotRepair),
            "repair-filesystem-only" | "filesystem-only" => {
                Ok(ProtectionLevel::RepairFilesystemOnly)
            }
            "repair-software-only" | "software-only" => Ok(ProtectionLevel::RepairSoftwareOnly),
            "no-protection" => Ok(ProtectionLevel::NoProtection),
            _ => Err(ProtectionParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_invasiveness() {
        assert!(ProtectionLevel::DoNotRepair < ProtectionLevel::RepairFilesystemOnly);
        assert!(ProtectionLevel::RepairFilesystemOnly < ProtectionLevel::RepairSoftwareOnly);
        assert!(ProtectionLevel::RepairSoftwareOnly < ProtectionLevel::NoProtection);
    }

    #[test]
    fn test_parse_accepts_all_spellings() {
        assert_eq!(
            "Repair filesystem only".parse::<ProtectionLevel>().unwrap(),
            ProtectionLevel::RepairFilesystemOnly
        );
        assert_eq!(
            "repair_software_only".parse::<ProtectionLevel>().unwrap(),
            ProtectionLevel::RepairSoftwareOnly
        );
        assert_eq!(
            "NO-PROTECTION".parse::<ProtectionLevel>().unwrap(),
            ProtectionLevel::NoProtection
        );
        for level in ProtectionLevel::ALL {
            assert_eq!(level.as_str().parse::<ProtectionLevel>().unwrap(), level);
            assert_eq!(level.human_name().parse::<ProtectionLevel>().unwrap(), level);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "repair-everything".parse::<ProtectionLevel>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown host protection level: repair-everything");
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ProtectionLevel::RepairSoftwareOnly).unwrap();
        assert_eq!(json, "\"repair-software-only\"");
        let level: ProtectionLevel = serde_json::from_str("\"filesystem-only\"").unwrap();
        assert_eq!(level, ProtectionLevel::RepairFilesystemOnly);
    }
}
