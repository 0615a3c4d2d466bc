//! # Invalidation Engine
//!
//! MPT updates only take effect once the device's translation caches are
//! invalidated and in-flight transactions have drained. Draining goes
//! through the SysMMU-Sync children: the barrier kicks SYNC on every child
//! in parallel, then checks completion per child, falling back to a serial
//! re-issue loop for any child that missed.
//!
//! The slow path re-issues the SYNC command with an exponentially growing
//! poll budget and, after the retry budget is exhausted, gives up without
//! reporting an error: a malicious or wedged sync device must not be able
//! to stall the hypervisor. Whatever transactions remain undrained are left
//! to the device's own fault response.

use dmaguard_hal::MmioRegion;

use crate::regs::{
    INVALIDATION_INVALIDATE, RANGE_INVALIDATION_PPN_SHIFT, REG_NS_ALL_INVALIDATION,
    REG_NS_RANGE_INVALIDATION, REG_NS_RANGE_INVALIDATION_END_PPN,
    REG_NS_RANGE_INVALIDATION_START_PPN, REG_NS_STATUS, S2MPU_VERSION_2, S2MPU_VERSION_9,
    STATUS_BUSY, STATUS_ON_INVALIDATING, VERSION_CHECK_MASK,
};
use crate::sysmmu_sync::{sync_cmd_start, sync_is_complete, REG_NS_SYNC_COMP, SYNC_COMP_COMPLETE};

/// Number of SYNC re-issues before the slow path gives up.
pub const SYNC_MAX_RETRIES: usize = 5;

/// Poll budget of the first slow-path attempt.
pub const SYNC_TIMEOUT: usize = 5;

/// Poll-budget growth factor per slow-path attempt.
pub const SYNC_TIMEOUT_MULTIPLIER: usize = 3;

/// Poll budget of slow-path attempt `attempt` (zero-based).
#[inline]
const fn sync_retry_budget(attempt: usize) -> usize {
    SYNC_TIMEOUT * SYNC_TIMEOUT_MULTIPLIER.pow(attempt as u32)
}

/// Kick SYNC on every child without waiting (parallel fan-out).
fn barrier_init(children: &[MmioRegion]) {
    for &sync in children {
        sync_cmd_start(sync);
    }
}

/// Serial drain of one child that missed the parallel SYNC.
///
/// Re-issues the command with an exponentially growing poll budget, then
/// gives up silently so a stuck unit cannot deadlock the caller.
fn barrier_slow(sync: MmioRegion) {
    for attempt in 0..SYNC_MAX_RETRIES {
        sync_cmd_start(sync);
        if sync.wait_until_mask_set(REG_NS_SYNC_COMP, SYNC_COMP_COMPLETE, sync_retry_budget(attempt))
        {
            return;
        }
    }
    log::warn!("s2mpu: sync drain did not complete, continuing");
}

/// Wait for the invalidation started on `mmio` to finish on every child.
pub(crate) fn barrier_complete(mmio: MmioRegion, children: &[MmioRegion], version: u32) {
    for &sync in children {
        if !sync_is_complete(sync) {
            barrier_slow(sync);
        }
    }

    // Must not access SFRs while the device is busy invalidating.
    if matches!(version & VERSION_CHECK_MASK, S2MPU_VERSION_2 | S2MPU_VERSION_9) {
        mmio.wait_while_mask_set(REG_NS_STATUS, STATUS_BUSY | STATUS_ON_INVALIDATING);
    }
}

/// Invalidate the whole MPTC and run the full drain barrier.
pub(crate) fn all_invalidation(mmio: MmioRegion, children: &[MmioRegion], version: u32) {
    mmio.write32(REG_NS_ALL_INVALIDATION, INVALIDATION_INVALIDATE);
    barrier_init(children);
    barrier_complete(mmio, children, version);
}

/// Start a range invalidation for the inclusive byte range
/// `[first_byte, last_byte]` and kick the barrier without waiting.
///
/// Completion happens in [`barrier_complete`], called from the idmap
/// complete phase.
pub(crate) fn range_invalidation_init(
    mmio: MmioRegion,
    children: &[MmioRegion],
    first_byte: u64,
    last_byte: u64,
) {
    let start_ppn = (first_byte >> RANGE_INVALIDATION_PPN_SHIFT) as u32;
    let end_ppn = (last_byte >> RANGE_INVALIDATION_PPN_SHIFT) as u32;

    mmio.write32(REG_NS_RANGE_INVALIDATION_START_PPN, start_ppn);
    mmio.write32(REG_NS_RANGE_INVALIDATION_END_PPN, end_ppn);
    mmio.write32(REG_NS_RANGE_INVALIDATION, INVALIDATION_INVALIDATE);
    barrier_init(children);
}

// =============================================================================
// Tests
// =============================================================================
