//! # Device Arena
//!
//! S2MPUs and their SysMMU-Sync companions form a shallow tree: each sync
//! device drains in-flight transactions for exactly one parent S2MPU. The
//! tree is stored in an arena with stable indices; children hold a parent
//! index and parents hold a list of child indices, so there are no owning
//! cycles.
//!
//! Registration performs all structural validation up front: window sizes
//! must match the device kind, only sync devices may be children, and a
//! sync device must hang off an S2MPU.

use arrayvec::ArrayVec;
use dmaguard_hal::MmioRegion;

use crate::error::{Error, Result};
use crate::regs::S2MPU_MMIO_SIZE;
use crate::sysmmu_sync::SYSMMU_SYNC_S2_MMIO_SIZE;

/// Maximum number of devices the arena can hold.
pub const MAX_DEVICES: usize = 32;

/// Maximum number of sync children per S2MPU.
pub const MAX_CHILDREN: usize = 8;

/// Stable handle to a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(usize);

/// Per-S2MPU driver state, populated lazily on first bring-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct S2mpuData {
    /// Cached VERSION register value; zero until first read.
    pub version: u32,
    /// Cached context-slot assignment word; zero until computed.
    pub context_cfg_valid_vid: u32,
}

/// What a registered device is, plus its kind-specific state.
#[derive(Debug, Clone, Copy)]
pub enum DeviceKind {
    /// A Stage-2 Memory Protection Unit.
    S2mpu(S2mpuData),
    /// A SysMMU-Sync drain-barrier device.
    SysmmuSync,
}

/// One registered device.
#[derive(Debug)]
pub struct Device {
    mmio: MmioRegion,
    kind: DeviceKind,
    parent: Option<DeviceId>,
    children: ArrayVec<DeviceId, MAX_CHILDREN>,
}

impl Device {
    /// The device's register window.
    #[inline]
    pub fn mmio(&self) -> MmioRegion {
        self.mmio
    }

    /// Whether this device is an S2MPU.
    #[inline]
    pub fn is_s2mpu(&self) -> bool {
        matches!(self.kind, DeviceKind::S2mpu(_))
    }

    /// The parent device, if any.
    #[inline]
    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }
}

/// Fixed-capacity storage for the device tree.
#[derive(Debug, Default)]
pub struct DeviceArena {
    devices: ArrayVec<Device, MAX_DEVICES>,
}

impl DeviceArena {
    /// An empty arena.
    pub const fn new() -> Self {
        Self { devices: ArrayVec::new_const() }
    }

    /// Register an S2MPU. The window must span exactly the S2MPU register
    /// block.
    pub fn register_s2mpu(&mut self, mmio: MmioRegion) -> Result<DeviceId> {
        if mmio.len() != S2MPU_MMIO_SIZE {
            return Err(Error::InvalidArgument);
        }
        self.push(Device {
            mmio,
            kind: DeviceKind::S2mpu(S2mpuData::default()),
            parent: None,
            children: ArrayVec::new(),
        })
    }

    /// Register a SysMMU-Sync as a child of `parent`. The window must span
    /// exactly the sync register block and the parent must be an S2MPU.
    pub fn register_sysmmu_sync(&mut self, mmio: MmioRegion, parent: DeviceId) -> Result<DeviceId> {
        if mmio.len() != SYSMMU_SYNC_S2_MMIO_SIZE {
            return Err(Error::InvalidArgument);
        }
        if !self.get(parent)?.is_s2mpu() {
            return Err(Error::InvalidArgument);
        }
        let id = self.push(Device {
            mmio,
            kind: DeviceKind::SysmmuSync,
            parent: Some(parent),
            children: ArrayVec::new(),
        })?;
        self.devices[parent.0]
            .children
            .try_push(id)
            .map_err(|_| Error::InvalidArgument)?;
        Ok(id)
    }

    fn push(&mut self, device: Device) -> Result<DeviceId> {
        let id = DeviceId(self.devices.len());
        self.devices.try_push(device).map_err(|_| Error::InvalidArgument)?;
        Ok(id)
    }

    /// Look up a device.
    pub fn get(&self, id: DeviceId) -> Result<&Device> {
        self.devices.get(id.0).ok_or(Error::InvalidArgument)
    }

    /// S2MPU state of `id`, failing for sync devices.
    pub fn s2mpu_data(&self, id: DeviceId) -> Result<&S2mpuData> {
        match &self.get(id)?.kind {
            DeviceKind::S2mpu(data) => Ok(data),
            DeviceKind::SysmmuSync => Err(Error::InvalidArgument),
        }
    }

    /// Mutable S2MPU state of `id`, failing for sync devices.
    pub fn s2mpu_data_mut(&mut self, id: DeviceId) -> Result<&mut S2mpuData> {
        match &mut self.devices.get_mut(id.0).ok_or(Error::InvalidArgument)?.kind {
            DeviceKind::S2mpu(data) => Ok(data),
            DeviceKind::SysmmuSync => Err(Error::InvalidArgument),
        }
    }

    /// Register windows of the sync children of `id`, in registration
    /// order.
    pub fn child_windows(&self, id: DeviceId) -> Result<ArrayVec<MmioRegion, MAX_CHILDREN>> {
        let device = self.get(id)?;
        Ok(device.children.iter().map(|child| self.devices[child.0].mmio).collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
