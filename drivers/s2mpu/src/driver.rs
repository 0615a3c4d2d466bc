//! # Driver Lifecycle
//!
//! [`S2mpuDriver`] owns everything that is process-wide: the host MPT, the
//! generation dispatch, the encoder, and the device arena. It is created
//! uninitialized and armed exactly once by [`S2mpuDriver::init`]; there is
//! no teardown.
//!
//! Devices come out of reset blocking all DMA, and every path that leaves
//! hypervisor control (suspend) or enters it (resume) re-establishes a
//! fully specified configuration before traffic is allowed through. The
//! host is thereby forced to call resume before issuing DMA, and cannot
//! gain access by lying about power state.

use core::mem;

use dmaguard_hal::addr::{is_aligned, PAGE_SHIFT, PAGE_SIZE};
use dmaguard_hal::esr::CpuContext;
use dmaguard_hal::MmioRegion;
use spin::{Mutex, Once};

use crate::device::{DeviceArena, DeviceId};
use crate::error::{Error, Result};
use crate::idmap::{gb_index, to_valid_range};
use crate::invalidate;
use crate::mem::HypMem;
use crate::mpt::{Fmpt, Mpt, MptCfg, MptDesc, MptOps, MptOpsLookup, Prot, Stage2Prot};
use crate::reg_ops::RegOps;
use crate::regs::NR_GIGABYTES;
use crate::trap;

/// The S2MPU driver singleton.
pub struct S2mpuDriver {
    env: &'static dyn HypMem,
    mpt_ops_lookup: MptOpsLookup,
    reg_ops: Option<RegOps>,
    mpt_ops: Option<&'static dyn MptOps>,
    host_mpt: Mpt,
    devices: DeviceArena,
}

impl S2mpuDriver {
    /// Create an uninitialized driver bound to the platform's memory
    /// services and encoder catalog.
    pub const fn new(env: &'static dyn HypMem, mpt_ops_lookup: MptOpsLookup) -> Self {
        Self {
            env,
            mpt_ops_lookup,
            reg_ops: None,
            mpt_ops: None,
            host_mpt: Mpt::empty(),
            devices: DeviceArena::new(),
        }
    }

    /// Whether [`init`](Self::init) has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.reg_ops.is_some() && self.mpt_ops.is_some()
    }

    /// The selected hardware generation, once initialized.
    pub fn generation(&self) -> Option<RegOps> {
        self.reg_ops
    }

    /// The host MPT as currently prepared.
    pub fn host_mpt(&self) -> &Mpt {
        &self.host_mpt
    }

    /// Register an S2MPU window.
    pub fn register_s2mpu(&mut self, mmio: MmioRegion) -> Result<DeviceId> {
        self.devices.register_s2mpu(mmio)
    }

    /// Register a SysMMU-Sync window as a child of `parent`.
    pub fn register_sysmmu_sync(&mut self, mmio: MmioRegion, parent: DeviceId) -> Result<DeviceId> {
        self.devices.register_sysmmu_sync(mmio, parent)
    }

    /// One-shot driver initialization from a host-supplied MPT descriptor.
    ///
    /// Selects the hardware generation and encoder, then claims every SMPT
    /// buffer by donating its pages to the hypervisor. A failure at any
    /// region returns all pages claimed so far and leaves the host MPT
    /// zeroed.
    ///
    /// # Safety
    ///
    /// `data` must be readable for `size` bytes. It is host-controlled
    /// memory: the contents may change concurrently, which is why it is
    /// copied exactly once before any validation.
    pub unsafe fn init(&mut self, data: *const u8, size: usize) -> Result<()> {
        if size != mem::size_of::<MptDesc>() {
            return Err(Error::InvalidArgument);
        }
        let desc = unsafe { (data as *const MptDesc).read_unaligned() };

        let reg_ops = RegOps::for_version(desc.version).ok_or(Error::NoDevice)?;
        let mpt_ops =
            (self.mpt_ops_lookup)(MptCfg { version: desc.version }).ok_or(Error::InvalidArgument)?;

        let smpt_size = mpt_ops.smpt_size();
        let smpt_nr_pages = smpt_size / PAGE_SIZE as usize;

        // Take ownership of all SMPT buffers; this also maps them in.
        let mut result = Ok(());
        for gb in 0..NR_GIGABYTES {
            let smpt = self.env.kern_hyp_va(desc.fmpt[gb].smpt);
            let pa = self.env.hyp_pa(smpt);

            if !is_aligned(pa, smpt_size as u64) {
                result = Err(Error::InvalidArgument);
                break;
            }
            if let Err(err) = self.env.donate_host_to_hyp(pa >> PAGE_SHIFT, smpt_nr_pages) {
                result = Err(err);
                break;
            }

            self.host_mpt.fmpt[gb] = Fmpt { smpt, gran_1g: true, prot: Prot::RW };
        }

        if let Err(err) = result {
            self.rollback_donations(smpt_nr_pages);
            self.host_mpt.clear();
            return Err(err);
        }

        self.host_mpt.version = desc.version;
        self.reg_ops = Some(reg_ops);
        self.mpt_ops = Some(mpt_ops);
        log::info!("s2mpu: driver initialized, version {:#010x}", desc.version);
        Ok(())
    }

    /// Return every claimed SMPT region to the host.
    fn rollback_donations(&mut self, smpt_nr_pages: usize) {
        for gb in 0..NR_GIGABYTES {
            let smpt = self.host_mpt.fmpt[gb].smpt;
            if smpt.is_null() {
                break;
            }
            let pfn = self.env.hyp_pa(smpt) >> PAGE_SHIFT;
            if self.env.donate_hyp_to_host(pfn, smpt_nr_pages).is_err() {
                log::warn!("s2mpu: failed to return SMPT pages for region {gb}");
            }
        }
    }

    /// Bring a device under hypervisor control with the host MPT.
    ///
    /// The reset state blocks all traffic, so the host must call this
    /// before the device will pass any DMA.
    pub fn resume(&mut self, dev: DeviceId) -> Result<()> {
        self.initialize_with_mpt(dev)
    }

    /// Put a device back into the block-all state before the host powers
    /// it down. Writes to a powered-down window would raise SErrors, so
    /// the driver stops touching the device afterwards; if the host lied
    /// about the power-down, the device still blocks everything.
    pub fn suspend(&mut self, dev: DeviceId) -> Result<()> {
        self.initialize_with_prot(dev, Prot::NONE)
    }

    fn active_ops(&self) -> Result<(RegOps, &'static dyn MptOps)> {
        match (self.reg_ops, self.mpt_ops) {
            (Some(reg_ops), Some(mpt_ops)) => Ok((reg_ops, mpt_ops)),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Full device bring-up from the host MPT.
    fn initialize_with_mpt(&mut self, dev: DeviceId) -> Result<()> {
        let (reg_ops, mpt_ops) = self.active_ops()?;
        let mmio = self.devices.get(dev)?.mmio();
        let children = self.devices.child_windows(dev)?;

        let data = self.devices.s2mpu_data_mut(dev)?;
        reg_ops.init(mmio, data)?;
        let version = data.version;

        mpt_ops.init_with_mpt(mmio, &self.host_mpt);
        invalidate::all_invalidation(mmio, &children, version);

        reg_ops.set_control_regs(mmio, self.devices.s2mpu_data(dev)?);
        Ok(())
    }

    /// Full device bring-up with one uniform permission across the whole
    /// address space.
    fn initialize_with_prot(&mut self, dev: DeviceId, prot: Prot) -> Result<()> {
        let (reg_ops, mpt_ops) = self.active_ops()?;
        let mmio = self.devices.get(dev)?.mmio();
        let children = self.devices.child_windows(dev)?;

        let data = self.devices.s2mpu_data_mut(dev)?;
        reg_ops.init(mmio, data)?;
        let version = data.version;

        mpt_ops.init_with_prot(mmio, prot);
        invalidate::all_invalidation(mmio, &children, version);

        reg_ops.set_control_regs(mmio, self.devices.s2mpu_data(dev)?);
        Ok(())
    }

    /// Phase 1 of an identity-map update: fold the new permission into the
    /// in-memory host MPT. Touches no hardware; replaying the same range
    /// and permission is a no-op.
    pub fn host_stage2_idmap_prepare(&mut self, start: u64, end: u64, prot: Stage2Prot) {
        let Some((start, end)) = to_valid_range(start, end) else {
            return;
        };
        let Some(mpt_ops) = self.mpt_ops else {
            return;
        };
        mpt_ops.prepare_range(&mut self.host_mpt, start, end - 1, Prot::from_stage2(prot));
    }

    /// Phase 2: push the prepared table to one device and kick the range
    /// invalidation without waiting for it.
    pub fn host_stage2_idmap_apply(&mut self, dev: DeviceId, start: u64, end: u64) -> Result<()> {
        let Some((start, end)) = to_valid_range(start, end) else {
            return Ok(());
        };
        let mmio = self.devices.get(dev)?.mmio();
        let children = self.devices.child_windows(dev)?;
        self.devices.s2mpu_data(dev)?;
        let Some(mpt_ops) = self.mpt_ops else {
            return Ok(());
        };

        mpt_ops.apply_range(mmio, &self.host_mpt, gb_index(start), gb_index(end - 1));
        invalidate::range_invalidation_init(mmio, &children, start, end - 1);
        Ok(())
    }

    /// Phase 3: wait for the invalidation kicked by apply to drain. After
    /// this returns, new transactions observe the updated table.
    pub fn host_stage2_idmap_complete(&mut self, dev: DeviceId) -> Result<()> {
        let mmio = self.devices.get(dev)?.mmio();
        let children = self.devices.child_windows(dev)?;
        let version = self.devices.s2mpu_data(dev)?.version;

        invalidate::barrier_complete(mmio, &children, version);
        Ok(())
    }

    /// Handle a host data abort at byte offset `off` of the device window.
    pub fn host_dabt_handler(
        &mut self,
        dev: DeviceId,
        ctx: &mut CpuContext,
        esr: u64,
        off: usize,
    ) -> bool {
        let Ok(device) = self.devices.get(dev) else {
            return false;
        };
        if !device.is_s2mpu() {
            return false;
        }
        trap::host_dabt_handler(device.mmio(), self.reg_ops, ctx, esr, off)
    }
}

impl core::fmt::Debug for S2mpuDriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("S2mpuDriver")
            .field("initialized", &self.is_initialized())
            .field("generation", &self.reg_ops)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Process-wide Instance
// =============================================================================

static DRIVER: Once<Mutex<S2mpuDriver>> = Once::new();

/// Install the process-wide driver instance. Later calls return the
/// already-installed instance.
pub fn install(env: &'static dyn HypMem, mpt_ops_lookup: MptOpsLookup) -> &'static Mutex<S2mpuDriver> {
    DRIVER.call_once(|| Mutex::new(S2mpuDriver::new(env, mpt_ops_lookup)))
}

/// The installed driver instance, if any.
pub fn driver() -> Option<&'static Mutex<S2mpuDriver>> {
    DRIVER.get()
}

// =============================================================================
// Tests
// =============================================================================
