//! # Hardware Generation Dispatch
//!
//! Register-level behavior differs across S2MPU revisions in three places:
//! per-device bring-up, control-register programming, and the slice of the
//! register file the host may touch. [`RegOps`] names the code path; v1 and
//! v2 intentionally share one so mixed v1/v2 platforms keep their old
//! behavior. The generation is chosen once from the init descriptor and is
//! process-wide: all S2MPUs on a platform are the same generation.

use dmaguard_hal::MmioRegion;

use crate::device::S2mpuData;
use crate::error::Result;
use crate::regs::{S2MPU_VERSION_1, S2MPU_VERSION_2, S2MPU_VERSION_9};
use crate::{v1_v2, v9};

/// Version-dispatched register operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOps {
    /// Shared v1/v2 code path.
    V1V2,
    /// v9 code path.
    V9,
}

impl RegOps {
    /// Select the code path for a descriptor-supplied version, or `None`
    /// when the driver does not support the generation.
    pub fn for_version(version: u32) -> Option<Self> {
        match version {
            S2MPU_VERSION_1 | S2MPU_VERSION_2 => Some(RegOps::V1V2),
            S2MPU_VERSION_9 => Some(RegOps::V9),
            _ => None,
        }
    }

    /// Per-device bring-up: cache the hardware version and program the
    /// context-slot assignment where the generation requires it.
    pub fn init(self, mmio: MmioRegion, data: &mut S2mpuData) -> Result<()> {
        match self {
            RegOps::V1V2 => v1_v2::init(mmio, data),
            RegOps::V9 => v9::init(mmio, data),
        }
    }

    /// Program control registers and enable the device, enable last.
    pub fn set_control_regs(self, mmio: MmioRegion, data: &S2mpuData) {
        match self {
            RegOps::V1V2 => v1_v2::set_control_regs(mmio, data),
            RegOps::V9 => v9::set_control_regs(mmio),
        }
    }

    /// Access mask for a host access to a generation-specific register.
    pub fn host_mmio_reg_access_mask(self, off: usize, is_write: bool) -> u32 {
        match self {
            RegOps::V1V2 => v1_v2::host_mmio_reg_access_mask(off, is_write),
            RegOps::V9 => v9::host_mmio_reg_access_mask(off, is_write),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
