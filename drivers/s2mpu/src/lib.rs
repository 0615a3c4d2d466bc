//! # dmaguard S2MPU Driver
//!
//! Hypervisor-resident driver for the Stage-2 Memory Protection Unit: the
//! hardware block sitting between DMA masters and memory that checks every
//! transaction against per-VID read/write permissions on physical
//! addresses. The driver owns the device register windows and translates
//! the host's stage-2 identity mapping into hardware Memory Protection
//! Tables, so a compromised host kernel cannot reach hypervisor-protected
//! memory through DMA.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        IOMMU framework                           │
//! │   init / resume / suspend / idmap prepare-apply-complete / dabt  │
//! └───────────────┬──────────────────────────────────────────────────┘
//!                 │
//! ┌───────────────▼──────────────┐   ┌──────────────────────────────┐
//! │         S2mpuDriver          │──▶│  MptOps (per-version table   │
//! │  host MPT · generation ops   │   │  encoder, external)          │
//! │  device arena · trap masks   │   └──────────────────────────────┘
//! └───────┬──────────────┬───────┘
//!         │              │
//! ┌───────▼──────┐  ┌────▼─────────┐
//! │    S2MPU     │  │ SysMMU-Sync  │   one parent, N children:
//! │  (MMIO SFRs) │  │ (SYNC_CMD/   │   drain barrier for in-flight
//! │              │  │  SYNC_COMP)  │   DMA during invalidation
//! └──────────────┘  └──────────────┘
//! ```
//!
//! ## Safety model
//!
//! The device resets into a block-all state, and the driver preserves
//! default-deny across every transition: a device is either unconfigured
//! (blocking) or carries a table no more permissive than the host's
//! stage-2. Range updates go through a three-phase protocol (prepare the
//! in-memory table, apply per device, complete the invalidation barrier)
//! so concurrent DMA only ever observes one of the two endpoint
//! permissions.
//!
//! The driver runs in a non-preemptible, single-threaded hypervisor
//! context; the enclosing framework serializes calls. Nothing here blocks
//! except the invalidation barrier's bounded polls and the trusted
//! hardware busy-wait.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod device;
pub mod driver;
pub mod error;
pub mod mem;
pub mod mpt;
pub mod reg_ops;
pub mod regs;
pub mod sysmmu_sync;

mod idmap;
mod invalidate;
mod trap;
mod v1_v2;
mod v9;

#[cfg(test)]
pub(crate) mod test_support;

pub use device::{DeviceArena, DeviceId};
pub use driver::{driver, install, S2mpuDriver};
pub use error::{Error, Result};
pub use mem::HypMem;
pub use mpt::{Fmpt, Mpt, MptCfg, MptDesc, MptOps, MptOpsLookup, Prot, Stage2Prot};
pub use reg_ops::RegOps;
