//! # v1/v2 Register Operations
//!
//! First- and second-generation S2MPUs share one code path. The differences
//! that matter to the driver:
//!
//! - v2 gates L1-entry writes on context-slot assignment: a write to an
//!   `L1ENTRY_*` register is ignored unless a context slot is allocated to
//!   the corresponding VID, so `CONTEXT_CFG_VALID_VID` must be programmed
//!   first on every bring-up.
//! - v1 responds to faulting transactions with SLVERR, v2 with DECERR.

use dmaguard_hal::MmioRegion;

use crate::device::S2mpuData;
use crate::error::{Error, Result};
use crate::regs::*;

/// Per-device bring-up for v1/v2 hardware.
pub(crate) fn init(mmio: MmioRegion, data: &mut S2mpuData) -> Result<()> {
    if data.version == 0 {
        data.version = mmio.read32(REG_NS_VERSION);
        log::debug!("s2mpu: device reports version {:#010x}", data.version);
    }

    match data.version & VERSION_CHECK_MASK {
        S2MPU_VERSION_1 => Ok(()),
        S2MPU_VERSION_2 => context_init(mmio, data),
        _ => Err(Error::InvalidArgument),
    }
}

/// Assign context slots to VIDs and program `CONTEXT_CFG_VALID_VID`.
///
/// Must run before any `L1ENTRY_*` access; shared with the v9 bring-up.
pub(crate) fn context_init(mmio: MmioRegion, data: &mut S2mpuData) -> Result<()> {
    // Assume all VIDs may be generated by the connected masters.
    let ctx_cfg = context_cfg_valid_vid(mmio, data, ALL_VIDS_BITMAP)?;
    mmio.write32(REG_NS_CONTEXT_CFG_VALID_VID, ctx_cfg);
    Ok(())
}

/// Compute the context-slot assignment word for `vid_bmap`.
///
/// VIDs are taken in ascending bit order and handed contexts from slot 0
/// upward until the hardware slot count is exhausted. The result is cached;
/// recomputation always yields the same word.
fn context_cfg_valid_vid(mmio: MmioRegion, data: &mut S2mpuData, vid_bmap: u32) -> Result<u32> {
    if data.context_cfg_valid_vid != 0 {
        return Ok(data.context_cfg_valid_vid);
    }

    let num_ctx = (mmio.read32(REG_NS_NUM_CONTEXT) & NUM_CONTEXT_MASK) as usize;
    let mut ctx_vid = [0u32; NR_CTX_IDS];
    let mut ctx = 0;
    let mut bmap = vid_bmap;
    while bmap != 0 && ctx < num_ctx {
        let vid = bmap.trailing_zeros();
        bmap &= !(1 << vid);
        ctx_vid[ctx] = vid;
        ctx += 1;
    }

    let mut word = 0;
    for slot in 0..NR_CTX_IDS {
        word |= context_cfg_vid(slot, ctx_vid[slot]);
        if slot < ctx {
            word |= context_cfg_valid(slot);
        }
    }

    if word == 0 {
        return Err(Error::InvalidArgument);
    }
    data.context_cfg_valid_vid = word;
    Ok(word)
}

/// Program the control registers and enable the device.
///
/// The reset values are still load-bearing: the device must come out of
/// reset blocking all traffic, otherwise the host could issue DMA in the
/// window between powering the device on and this function running. The
/// enable write goes last.
pub(crate) fn set_control_regs(mmio: MmioRegion, data: &S2mpuData) {
    let mut ctrl0 = CTRL0_ENABLE | CTRL0_INTERRUPT_ENABLE;

    ctrl0 |= if data.version & VERSION_CHECK_MASK == S2MPU_VERSION_2 {
        CTRL0_FAULT_RESP_TYPE_DECERR
    } else {
        CTRL0_FAULT_RESP_TYPE_SLVERR
    };

    mmio.write32(REG_NS_INTERRUPT_ENABLE_PER_VID_SET, ALL_VIDS_BITMAP);
    mmio.write32(REG_NS_CFG, 0);
    mmio.write32(REG_NS_CTRL1, 0);
    mmio.write32(REG_NS_CTRL0, ctrl0);
}

/// Host access mask for v1/v2-specific registers.
pub(crate) fn host_mmio_reg_access_mask(off: usize, is_write: bool) -> u32 {
    let no_access = 0;
    let read_write = u32::MAX;
    let read_only = if is_write { no_access } else { read_write };
    let write_only = if is_write { read_write } else { no_access };

    match off {
        // Allow reading control registers for debugging.
        REG_NS_CTRL0 => read_only & CTRL0_MASK,
        REG_NS_CTRL1 => read_only & CTRL1_MASK,
        // Allow reading MPTC entries for debugging. That involves:
        //   - writing a (set, way) selector to READ_MPTC
        //   - reading READ_MPTC_*
        REG_NS_READ_MPTC => write_only & READ_MPTC_MASK,
        REG_NS_READ_MPTC_TAG_PPN => read_only & READ_MPTC_TAG_PPN_MASK,
        REG_NS_READ_MPTC_TAG_OTHERS => read_only & READ_MPTC_TAG_OTHERS_MASK,
        REG_NS_READ_MPTC_DATA => read_only,
        _ => no_access,
    }
}

// =============================================================================
// Tests
// =============================================================================
