//! # v9 Register Operations
//!
//! Ninth-generation hardware moves most control state into per-VID
//! write-1-to-set registers and widens the debug surface with PTLB/STLB and
//! page-table-walk MMU read-back. Bring-up shares the v2 context-slot
//! assignment: L1-entry writes are still gated on `CONTEXT_CFG_VALID_VID`.

use dmaguard_hal::MmioRegion;

use crate::device::S2mpuData;
use crate::error::Result;
use crate::regs::*;
use crate::v1_v2;

/// Per-device bring-up for v9 hardware.
pub(crate) fn init(mmio: MmioRegion, data: &mut S2mpuData) -> Result<()> {
    if data.version == 0 {
        data.version = mmio.read32(REG_NS_VERSION);
        log::debug!("s2mpu: device reports version {:#010x}", data.version);
    }

    v1_v2::context_init(mmio, data)
}

/// Program the control registers and enable protection for every VID.
///
/// As on v1/v2 the reset state must already block all traffic; protection
/// enable goes after the fault-response and interrupt configuration.
pub(crate) fn set_control_regs(mmio: MmioRegion) {
    // Return DECERR to the device on permission fault.
    mmio.write32(REG_NS_V9_CTRL_ERR_RESP_T_PER_VID_SET, ALL_VIDS_BITMAP);
    mmio.write32(REG_NS_INTERRUPT_ENABLE_PER_VID_SET, ALL_VIDS_BITMAP);
    mmio.write32(REG_NS_CTRL0, 0);
    mmio.write32(REG_NS_V9_CTRL_PROT_EN_PER_VID_SET, ALL_VIDS_BITMAP);
    mmio.write32(REG_NS_V9_CFG_MPTW_ATTRIBUTE, 0);
}

/// Host access mask for v9-specific registers.
pub(crate) fn host_mmio_reg_access_mask(off: usize, is_write: bool) -> u32 {
    let no_access = 0;
    let read_write = u32::MAX;
    let read_only = if is_write { no_access } else { read_write };
    let write_only = if is_write { read_write } else { no_access };

    match off {
        // Allow reading control registers for debugging.
        REG_NS_CTRL0 => return read_only & V9_CTRL0_MASK,
        REG_NS_V9_CTRL_ERR_RESP_T_PER_VID_SET => return read_only & ALL_VIDS_BITMAP,
        REG_NS_V9_CTRL_PROT_EN_PER_VID_SET => return read_only & ALL_VIDS_BITMAP,
        // STLB read-back: write a selector, read the tag/data registers.
        REG_NS_V9_READ_STLB => {
            return write_only & (V9_READ_STLB_MASK_TYPEA | V9_READ_STLB_MASK_TYPEB)
        }
        REG_NS_V9_READ_STLB_TPN => return read_only & V9_READ_STLB_TPN_MASK,
        REG_NS_V9_READ_STLB_TAG_PPN => return read_only & V9_READ_STLB_TAG_PPN_MASK,
        REG_NS_V9_READ_STLB_TAG_OTHERS => return read_only & V9_READ_STLB_TAG_OTHERS_MASK,
        REG_NS_V9_READ_STLB_DATA => return read_only,
        // MPTC read-back.
        REG_NS_V9_MPTC_INFO => return read_only & V9_READ_MPTC_INFO_MASK,
        REG_NS_V9_READ_MPTC => return write_only & V9_READ_MPTC_MASK,
        REG_NS_V9_READ_MPTC_TAG_PPN => return read_only & V9_READ_MPTC_TAG_PPN_MASK,
        REG_NS_V9_READ_MPTC_TAG_OTHERS => return read_only & V9_READ_MPTC_TAG_OTHERS_MASK,
        REG_NS_V9_READ_MPTC_DATA => return read_only,
        // Page-table-walk MMU and PTLB read-back.
        REG_NS_V9_PMMU_INFO => return read_only & V9_READ_PMMU_INFO_MASK,
        REG_NS_V9_READ_PTLB => return write_only & V9_READ_PTLB_MASK,
        REG_NS_V9_READ_PTLB_TAG => return read_only & V9_READ_PTLB_TAG_MASK,
        REG_NS_V9_READ_PTLB_DATA_S1_EN_PPN_AP => {
            return read_only & V9_READ_PTLB_DATA_S1_ENABLE_PPN_AP_MASK
        }
        REG_NS_V9_READ_PTLB_DATA_S1_DIS_AP_LIST => return read_only,
        REG_NS_V9_PMMU_INDICATOR => return read_only & V9_READ_PMMU_INDICATOR_MASK,
        REG_NS_V9_SWALKER_INFO => return read_only & V9_SWALKER_INFO_MASK,
        _ => {}
    }

    if (reg_ns_v9_pmmu_ptlb_info(0)..reg_ns_v9_pmmu_ptlb_info(V9_MAX_PTLB_NUM)).contains(&off) {
        return read_only & V9_READ_PMMU_PTLB_INFO_MASK;
    }
    if (reg_ns_v9_stlb_info(0)..reg_ns_v9_stlb_info(V9_MAX_STLB_NUM)).contains(&off) {
        return read_only & V9_READ_STLB_INFO_MASK;
    }

    no_access
}

// =============================================================================
// Tests
// =============================================================================
