//! Shared fixtures for driver tests: fake register windows, a recording
//! memory-services mock with failure injection, and a recording MPT
//! encoder that maintains real table state so range updates can be checked
//! end to end.

use dmaguard_hal::addr::{PAGE_SHIFT, SZ_1G};
use dmaguard_hal::MmioRegion;
use spin::Mutex;

use crate::error::{Error, Result};
use crate::mem::HypMem;
use crate::mpt::{Mpt, MptOps, Prot};
use crate::regs::*;
use crate::sysmmu_sync::SYSMMU_SYNC_S2_MMIO_SIZE;

/// SMPT bytes per GiB: one 2-bit field per 4 KiB granule.
pub const TEST_SMPT_SIZE: usize = 0x1_0000;

/// Granules per SMPT word.
const GRANULES_PER_WORD: usize = 16;

// =============================================================================
// Fake Device Windows
// =============================================================================

/// Backing store plus `MmioRegion` view of a fake S2MPU window.
pub struct FakeS2mpu {
    _buf: Vec<u32>,
    pub mmio: MmioRegion,
}

impl FakeS2mpu {
    /// A window whose VERSION and NUM_CONTEXT registers are pre-seeded.
    pub fn with_version(version: u32) -> Self {
        let mut buf = vec![0u32; S2MPU_MMIO_SIZE / 4];
        let mmio = unsafe { MmioRegion::new(buf.as_mut_ptr() as *mut u8, S2MPU_MMIO_SIZE) };
        mmio.write32(REG_NS_VERSION, version);
        mmio.write32(REG_NS_NUM_CONTEXT, NR_CTX_IDS as u32);
        Self { _buf: buf, mmio }
    }
}

/// Backing store plus `MmioRegion` view of a fake SysMMU-Sync window.
pub struct FakeSync {
    _buf: Vec<u32>,
    pub mmio: MmioRegion,
}

impl FakeSync {
    /// A sync window that reports completion immediately.
    pub fn completing() -> Self {
        let sync = Self::stuck();
        sync.mmio
            .write32(crate::sysmmu_sync::REG_NS_SYNC_COMP, crate::sysmmu_sync::SYNC_COMP_COMPLETE);
        sync
    }

    /// A sync window that never reports completion.
    pub fn stuck() -> Self {
        let mut buf = vec![0u32; SYSMMU_SYNC_S2_MMIO_SIZE / 4];
        let mmio = unsafe { MmioRegion::new(buf.as_mut_ptr() as *mut u8, SYSMMU_SYNC_S2_MMIO_SIZE) };
        Self { _buf: buf, mmio }
    }
}

// =============================================================================
// SMPT Buffers
// =============================================================================

/// A host-side SMPT buffer with the alignment init demands.
#[repr(C, align(65536))]
pub struct SmptBuf(pub [u32; TEST_SMPT_SIZE / 4]);

impl SmptBuf {
    pub fn new() -> Box<Self> {
        Box::new(SmptBuf([0; TEST_SMPT_SIZE / 4]))
    }

    /// Host-kernel virtual address of the buffer, as the descriptor wants.
    /// Takes `&mut` because the driver will write through the pointer.
    pub fn host_va(&mut self) -> u64 {
        self.0.as_mut_ptr() as u64
    }
}

// =============================================================================
// Memory-Services Mock
// =============================================================================

/// Identity-mapped [`HypMem`] that records donations and can fail the
/// N-th host-to-hyp transfer.
pub struct MockEnv {
    donations: Mutex<Vec<(u64, usize)>>,
    donate_calls: Mutex<usize>,
    fail_call: Mutex<Option<usize>>,
}

impl MockEnv {
    pub const fn new() -> Self {
        Self {
            donations: Mutex::new(Vec::new()),
            donate_calls: Mutex::new(0),
            fail_call: Mutex::new(None),
        }
    }

    /// Make the zero-based `n`-th `donate_host_to_hyp` call fail.
    pub fn fail_donation(&self, n: usize) {
        *self.fail_call.lock() = Some(n);
    }

    /// Number of page ranges currently donated to the hypervisor.
    pub fn donated(&self) -> usize {
        self.donations.lock().len()
    }
}

impl HypMem for MockEnv {
    fn kern_hyp_va(&self, host_va: u64) -> *mut u32 {
        host_va as *mut u32
    }

    fn hyp_pa(&self, va: *const u32) -> u64 {
        va as u64
    }

    fn donate_host_to_hyp(&self, pfn: u64, nr_pages: usize) -> Result<()> {
        let call = {
            let mut calls = self.donate_calls.lock();
            let call = *calls;
            *calls += 1;
            call
        };
        if *self.fail_call.lock() == Some(call) {
            return Err(Error::DonationFailed);
        }
        self.donations.lock().push((pfn, nr_pages));
        Ok(())
    }

    fn donate_hyp_to_host(&self, pfn: u64, nr_pages: usize) -> Result<()> {
        let mut donations = self.donations.lock();
        match donations.iter().position(|&entry| entry == (pfn, nr_pages)) {
            Some(index) => {
                donations.remove(index);
                Ok(())
            }
            None => Err(Error::DonationFailed),
        }
    }
}

// =============================================================================
// Recording Encoder
// =============================================================================

/// One recorded encoder invocation. `ctx_cfg` snapshots the device's
/// CONTEXT_CFG_VALID_VID register at the moment the encoder ran, so tests
/// can check context assignment happened before any table encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderCall {
    InitWithProt { prot: Prot, ctx_cfg: u32 },
    InitWithMpt { ctx_cfg: u32 },
    PrepareRange { first: u64, last: u64, prot: Prot },
    ApplyRange { first_gb: usize, last_gb: usize, ctx_cfg: u32 },
}

/// Recording [`MptOps`] with a working in-memory table encoding: uniform
/// regions carry `gran_1g`, partial updates split the region into 2-bit
/// SMPT fields.
pub struct MockEncoder {
    pub calls: Mutex<Vec<EncoderCall>>,
}

impl MockEncoder {
    pub const fn new() -> Self {
        Self { calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<EncoderCall> {
        self.calls.lock().clone()
    }

    /// Effective permission of the granule containing `pa`.
    pub fn granule_prot(mpt: &Mpt, pa: u64) -> Prot {
        let fmpt = &mpt.fmpt[(pa / SZ_1G) as usize];
        if fmpt.gran_1g {
            return fmpt.prot;
        }
        let granule = ((pa % SZ_1G) / SMPT_GRAN) as usize;
        let word = unsafe { *fmpt.smpt.add(granule / GRANULES_PER_WORD) };
        let shift = (granule % GRANULES_PER_WORD) * 2;
        Prot::from_bits_truncate(((word >> shift) & 0x3) as u8)
    }

    fn set_granule_range(fmpt_smpt: *mut u32, first: usize, last: usize, prot: Prot) {
        for granule in first..=last {
            let word_index = granule / GRANULES_PER_WORD;
            let shift = (granule % GRANULES_PER_WORD) * 2;
            unsafe {
                let word = fmpt_smpt.add(word_index);
                let mut value = *word;
                value &= !(0x3 << shift);
                value |= u32::from(prot.bits()) << shift;
                *word = value;
            }
        }
    }

    /// L1 attribute encoding used by the fake hardware layout.
    fn l1attr(gran_1g: bool, prot: Prot) -> u32 {
        (u32::from(gran_1g) << 4) | u32::from(prot.bits())
    }

    fn write_l1(mmio: MmioRegion, gb: usize, smpt_pfn: u32, attr: u32) {
        for vid in 0..NR_VIDS {
            mmio.write32(reg_ns_l1entry_l2table_addr(vid, gb), smpt_pfn);
            mmio.write32(reg_ns_l1entry_attr(vid, gb), attr);
        }
    }
}

impl MptOps for MockEncoder {
    fn smpt_size(&self) -> usize {
        TEST_SMPT_SIZE
    }

    fn init_with_prot(&self, mmio: MmioRegion, prot: Prot) {
        let ctx_cfg = mmio.read32(REG_NS_CONTEXT_CFG_VALID_VID);
        self.calls.lock().push(EncoderCall::InitWithProt { prot, ctx_cfg });
        for gb in 0..NR_GIGABYTES {
            Self::write_l1(mmio, gb, 0, Self::l1attr(true, prot));
        }
    }

    fn init_with_mpt(&self, mmio: MmioRegion, mpt: &Mpt) {
        let ctx_cfg = mmio.read32(REG_NS_CONTEXT_CFG_VALID_VID);
        self.calls.lock().push(EncoderCall::InitWithMpt { ctx_cfg });
        for gb in 0..NR_GIGABYTES {
            let fmpt = &mpt.fmpt[gb];
            let pfn = (fmpt.smpt as u64 >> PAGE_SHIFT) as u32;
            Self::write_l1(mmio, gb, pfn, Self::l1attr(fmpt.gran_1g, fmpt.prot));
        }
    }

    fn prepare_range(&self, mpt: &mut Mpt, first_byte: u64, last_byte: u64, prot: Prot) {
        self.calls
            .lock()
            .push(EncoderCall::PrepareRange { first: first_byte, last: last_byte, prot });

        for gb in (first_byte / SZ_1G) as usize..=(last_byte / SZ_1G) as usize {
            let gb_first = gb as u64 * SZ_1G;
            let gb_last = gb_first + SZ_1G - 1;
            let fmpt = &mut mpt.fmpt[gb];

            if first_byte <= gb_first && last_byte >= gb_last {
                fmpt.gran_1g = true;
                fmpt.prot = prot;
                continue;
            }

            if fmpt.gran_1g {
                let granules = (SZ_1G / SMPT_GRAN) as usize;
                Self::set_granule_range(fmpt.smpt, 0, granules - 1, fmpt.prot);
                fmpt.gran_1g = false;
            }
            let first = (first_byte.max(gb_first) % SZ_1G / SMPT_GRAN) as usize;
            let last = (last_byte.min(gb_last) % SZ_1G / SMPT_GRAN) as usize;
            Self::set_granule_range(fmpt.smpt, first, last, prot);
        }
    }

    fn apply_range(&self, mmio: MmioRegion, mpt: &Mpt, first_gb: usize, last_gb: usize) {
        let ctx_cfg = mmio.read32(REG_NS_CONTEXT_CFG_VALID_VID);
        self.calls.lock().push(EncoderCall::ApplyRange { first_gb, last_gb, ctx_cfg });
        for gb in first_gb..=last_gb {
            let fmpt = &mpt.fmpt[gb];
            let pfn = (fmpt.smpt as u64 >> PAGE_SHIFT) as u32;
            Self::write_l1(mmio, gb, pfn, Self::l1attr(fmpt.gran_1g, fmpt.prot));
        }
    }
}
