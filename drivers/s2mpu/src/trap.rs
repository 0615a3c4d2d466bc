//! # Host MMIO Trap Handling
//!
//! The host kernel has no mapping of S2MPU windows; every access it makes
//! traps to the hypervisor. Most registers must stay out of the host's
//! reach, but a small surface is deliberately exposed so EL1 can field
//! fault interrupts and debug the device: interrupt clear/status, fault
//! details, cache read-back, and read-only views of the control state.
//!
//! The policy is a per-register mask. A zero mask rejects the access (the
//! framework then escalates); a non-zero mask is ANDed into the forwarded
//! value in both directions, so the host can neither set hidden bits nor
//! observe them.

use dmaguard_hal::esr::{CpuContext, DataAbort};
use dmaguard_hal::MmioRegion;

use crate::reg_ops::RegOps;
use crate::regs::{
    reg_ns_fault_info, reg_ns_fault_pa_high, reg_ns_fault_pa_low, reg_ns_l1entry_attr,
    reg_ns_l1entry_l2table_addr, ALL_VIDS_BITMAP, CFG_MASK, INFO_NUM_SET_MASK, NR_VIDS,
    REG_NS_CFG, REG_NS_FAULT_STATUS, REG_NS_FAULT_VID_MASK, REG_NS_INFO, REG_NS_INTERRUPT_CLEAR,
};

/// Access mask for a host access at `off`, all generations.
///
/// Checks the generation-independent registers first, then defers to the
/// version-specific table.
pub(crate) fn host_mmio_reg_access_mask(reg_ops: Option<RegOps>, off: usize, is_write: bool) -> u32 {
    let no_access = 0;
    let read_write = u32::MAX;
    let read_only = if is_write { no_access } else { read_write };
    let write_only = if is_write { read_write } else { no_access };

    match off {
        REG_NS_CFG => return read_only & CFG_MASK,
        // Allow the EL1 IRQ handler to clear interrupts.
        REG_NS_INTERRUPT_CLEAR => return write_only & ALL_VIDS_BITMAP,
        // Allow reading the number of sets used by the MPTC.
        REG_NS_INFO => return read_only & INFO_NUM_SET_MASK,
        // Allow the EL1 IRQ handler to read the pending-interrupt bitmap.
        REG_NS_FAULT_STATUS => return read_only & ALL_VIDS_BITMAP,
        _ => {}
    }

    // Allow reading L1-entry registers for debugging.
    if (reg_ns_l1entry_l2table_addr(0, 0)..reg_ns_l1entry_attr(NR_VIDS, 0)).contains(&off) {
        return read_only;
    }

    // Allow the EL1 IRQ handler to read fault information for any VID.
    let masked_off = off & !REG_NS_FAULT_VID_MASK;
    if masked_off == reg_ns_fault_pa_low(0)
        || masked_off == reg_ns_fault_pa_high(0)
        || masked_off == reg_ns_fault_info(0)
    {
        return read_only;
    }

    match reg_ops {
        Some(ops) => ops.host_mmio_reg_access_mask(off, is_write),
        None => no_access,
    }
}

/// Handle a host data abort on an S2MPU window.
///
/// Returns `true` when the access was emulated, `false` when the framework
/// should escalate. Only naturally aligned 32-bit accesses are forwarded;
/// rejection never depends on device state.
pub(crate) fn host_dabt_handler(
    mmio: MmioRegion,
    reg_ops: Option<RegOps>,
    ctx: &mut CpuContext,
    esr: u64,
    off: usize,
) -> bool {
    let abort = DataAbort::decode(esr);

    if abort.access_len != core::mem::size_of::<u32>() || off & 3 != 0 {
        return false;
    }

    let mask = host_mmio_reg_access_mask(reg_ops, off, abort.is_write);
    if mask == 0 {
        return false;
    }

    if abort.is_write {
        mmio.write32(off, ctx.reg(abort.reg) as u32 & mask);
    } else {
        ctx.set_reg(abort.reg, u64::from(mmio.read32(off) & mask));
    }
    true
}

// =============================================================================
// Tests
// =============================================================================
