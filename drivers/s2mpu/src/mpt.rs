//! # Memory Protection Tables
//!
//! The MPT is the two-level permission structure the S2MPU walks for every
//! DMA transaction: an L1 entry per 1 GiB region, each either carrying a
//! uniform permission (`gran_1g`) or pointing at a Small MPT ("SMPT") page
//! that encodes sub-GiB permissions.
//!
//! The driver keeps a single in-memory [`Mpt`] describing the host's view of
//! DMA-accessible memory and replays it into every device. How the table is
//! laid out in hardware differs per revision, so the actual encoding is
//! delegated to an [`MptOps`] implementation selected once at driver init.

use core::ptr;

use bitflags::bitflags;
use dmaguard_hal::MmioRegion;
use static_assertions::const_assert;

use crate::regs::NR_GIGABYTES;

bitflags! {
    /// DMA permission bits for one protection granule.
    ///
    /// The empty set is the default-deny state: the device blocks every
    /// transaction touching the granule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Prot: u8 {
        /// Device may read.
        const R = 1 << 0;
        /// Device may write.
        const W = 1 << 1;
    }
}

impl Prot {
    /// Block all accesses.
    pub const NONE: Self = Self::empty();

    /// Allow reads and writes.
    pub const RW: Self = Self::R.union(Self::W);

    /// Project the DMA-relevant bits out of a host stage-2 protection value.
    #[inline]
    pub fn from_stage2(prot: Stage2Prot) -> Self {
        let mut out = Self::empty();
        if prot.contains(Stage2Prot::R) {
            out |= Self::R;
        }
        if prot.contains(Stage2Prot::W) {
            out |= Self::W;
        }
        out
    }
}

bitflags! {
    /// Host stage-2 page-table protection value as supplied by the
    /// hypervisor core. Only the read and write bits are meaningful to the
    /// S2MPU; execute and memory-type attributes are ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Stage2Prot: u64 {
        /// Readable.
        const R = 1 << 0;
        /// Writable.
        const W = 1 << 1;
        /// Executable.
        const X = 1 << 2;
        /// Device memory attributes.
        const DEVICE = 1 << 3;
    }
}

/// Fine-grained MPT entry covering one 1 GiB region.
#[derive(Debug, Clone, Copy)]
pub struct Fmpt {
    /// Hypervisor-owned SMPT page(s) encoding sub-GiB permissions. Null
    /// until the region has been claimed by driver init.
    pub smpt: *mut u32,
    /// When set, the whole region carries `prot` uniformly and the SMPT is
    /// not consulted by hardware.
    pub gran_1g: bool,
    /// Uniform permission, meaningful when `gran_1g` is set.
    pub prot: Prot,
}

impl Fmpt {
    /// Entry of an unclaimed region.
    pub const fn unclaimed() -> Self {
        Self { smpt: ptr::null_mut(), gran_1g: false, prot: Prot::NONE }
    }
}

/// In-memory Memory Protection Table covering `[0, PA_MAX)`.
#[derive(Debug, Clone)]
pub struct Mpt {
    /// Hardware revision the table is encoded for.
    pub version: u32,
    /// One entry per GiB.
    pub fmpt: [Fmpt; NR_GIGABYTES],
}

impl Mpt {
    /// A table with no claimed regions.
    pub const fn empty() -> Self {
        Self { version: 0, fmpt: [Fmpt::unclaimed(); NR_GIGABYTES] }
    }

    /// Reset the table to its unclaimed state.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }
}

// SMPT pages are owned by the hypervisor for the driver's lifetime; the
// raw pointers never alias host-controlled mappings after donation.
unsafe impl Send for Mpt {}
unsafe impl Sync for Mpt {}

// =============================================================================
// Host Descriptor
// =============================================================================

/// Wire form of one [`Fmpt`] in the host-supplied init payload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FmptDesc {
    /// Host-kernel virtual address of the SMPT buffer.
    pub smpt: u64,
    /// Non-zero when the region is uniform at 1 GiB granularity.
    pub gran_1g: u32,
    /// Uniform permission bits (same encoding as [`Prot`]).
    pub prot: u32,
}

/// Wire form of the MPT descriptor passed to driver init.
///
/// The host controls this memory while init runs, so the driver copies the
/// whole descriptor exactly once before validating any field.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MptDesc {
    /// Hardware revision the host claims for the platform.
    pub version: u32,
    /// Reserved, must be zero.
    pub reserved: u32,
    /// One entry per GiB.
    pub fmpt: [FmptDesc; NR_GIGABYTES],
}

const_assert!(core::mem::size_of::<MptDesc>() == 8 + NR_GIGABYTES * 16);

// =============================================================================
// Encoder Interface
// =============================================================================

/// Parameters selecting a table encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MptCfg {
    /// Hardware revision from the init descriptor.
    pub version: u32,
}

/// Version-specific MPT encoder.
///
/// Implementations lay out L1 entries and SMPT words in the device window
/// and in memory. They must order hardware writes so that every
/// intermediate state of a range update is at least as restrictive as one
/// of the two endpoint states.
pub trait MptOps: Sync {
    /// Size in bytes of one region's SMPT buffer. SMPT buffers must be
    /// aligned to this size.
    fn smpt_size(&self) -> usize;

    /// Program the device with a uniform permission for the whole PA space.
    fn init_with_prot(&self, mmio: MmioRegion, prot: Prot);

    /// Program the device from an in-memory table.
    fn init_with_mpt(&self, mmio: MmioRegion, mpt: &Mpt);

    /// Update the in-memory table for the inclusive byte range
    /// `[first_byte, last_byte]`.
    fn prepare_range(&self, mpt: &mut Mpt, first_byte: u64, last_byte: u64, prot: Prot);

    /// Replay the table into the device for GiB regions
    /// `first_gb..=last_gb`.
    fn apply_range(&self, mmio: MmioRegion, mpt: &Mpt, first_gb: usize, last_gb: usize);
}

/// Resolver mapping an [`MptCfg`] to the encoder for that hardware
/// revision; supplied by the platform when the driver is installed.
pub type MptOpsLookup = fn(MptCfg) -> Option<&'static dyn MptOps>;

// =============================================================================
// Tests
// =============================================================================
