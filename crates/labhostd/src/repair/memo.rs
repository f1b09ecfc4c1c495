//! Record of repair procedures already attempted in a session

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// A remedial action the repair ladder can take, with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "procedure", rename_all = "snake_case")]
pub enum RepairProcedure {
    WaitForReboot,
    RepairFullDisk { mountpoint: String },
    MachineInstall,
    RequestHardwareRepair,
}

impl RepairProcedure {
    pub fn name(&self) -> &'static str {
        match self {
            RepairProcedure::WaitForReboot => "wait_for_reboot",
            RepairProcedure::RepairFullDisk { .. } => "repair_full_disk",
            RepairProcedure::MachineInstall => "machine_install",
            RepairProcedure::RequestHardwareRepair => "request_hardware_repair",
        }
    }
}

impl fmt::Display for RepairProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairProcedure::RepairFullDisk { mountpoint } => {
                write!(f, "{}({})", self.name(), mountpoint)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Procedures attempted so far, in attempt order
#[derive(Debug, Default)]
pub struct RepairMemo {
    seen: HashSet<RepairProcedure>,
    order: Vec<RepairProcedure>,
}

impl RepairMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, procedure: &RepairProcedure) -> bool {
        self.seen.contains(procedure)
    }

    /// Returns false if the procedure was already recorded
    pub fn record(&mut self, procedure: RepairProcedure) -> bool {
        if !self.seen.insert(procedure.clone()) {
            return false;
        }
        self.order.push(procedure);
        true
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn attempted(&self) -> &[RepairProcedure] {
        &self.order
    }
}
