//! # SysMMU-Sync Register Surface
//!
//! A SysMMU-Sync is a tiny companion device exposing a drain barrier for
//! DMA transactions already in flight behind its parent S2MPU: writing the
//! SYNC command starts a drain, and the completion register reports when
//! every transaction issued before the command has retired.
//!
//! | Offset | Register  | Description          |
//! |--------|-----------|----------------------|
//! | 0x0000 | SYNC_CMD  | Drain command        |
//! | 0x0004 | SYNC_COMP | Drain completion     |

use dmaguard_hal::MmioRegion;

/// Size of the SysMMU-Sync non-secure register window.
pub const SYSMMU_SYNC_S2_MMIO_SIZE: usize = 0x1000;

/// Drain command register.
pub const REG_NS_SYNC_CMD: usize = 0x0000;

/// Drain completion register.
pub const REG_NS_SYNC_COMP: usize = 0x0004;

/// Start a drain.
pub const SYNC_CMD_SYNC: u32 = 1 << 0;

/// The drain started by the last command has completed.
pub const SYNC_COMP_COMPLETE: u32 = 1 << 0;

/// Issue a drain command without waiting for completion.
#[inline]
pub(crate) fn sync_cmd_start(sync: MmioRegion) {
    sync.write32(REG_NS_SYNC_CMD, SYNC_CMD_SYNC);
}

/// Whether the last drain has completed.
#[inline]
pub(crate) fn sync_is_complete(sync: MmioRegion) -> bool {
    sync.read32(REG_NS_SYNC_COMP) & SYNC_COMP_COMPLETE != 0
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_start_writes_command() {
        let mut buf = [0u32; SYSMMU_SYNC_S2_MMIO_SIZE / 4];
        let mmio = unsafe { MmioRegion::new(buf.as_mut_ptr() as *mut u8, SYSMMU_SYNC_S2_MMIO_SIZE) };

        assert!(!sync_is_complete(mmio));
        sync_cmd_start(mmio);
        assert_eq!(mmio.read32(REG_NS_SYNC_CMD), SYNC_CMD_SYNC);

        mmio.write32(REG_NS_SYNC_COMP, SYNC_COMP_COMPLETE);
        assert!(sync_is_complete(mmio));
    }
}
