//! # dmaguard Hardware Abstraction Layer
//!
//! Hardware primitives shared by the dmaguard driver stack:
//!
//! - [`mmio`] — volatile 32-bit access to device-mapped register windows,
//!   plus bounded and unbounded polling helpers.
//! - [`esr`] — AArch64 exception-syndrome decoding for trapped data aborts,
//!   and the guest register-file view handlers operate on.
//! - [`addr`] — physical-address alignment helpers and size constants.
//!
//! Everything here is `no_std`; the standard library is only linked for
//! host-side unit tests.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod addr;
pub mod esr;
pub mod mmio;

pub use mmio::MmioRegion;
