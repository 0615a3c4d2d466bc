//! Error types for S2MPU driver operations.

use core::fmt;

/// Result type alias for driver operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error conditions reported to the IOMMU framework.
///
/// Invalidation timeouts are deliberately absent: the SYNC slow path gives
/// up silently so a wedged synchronization device cannot stall the
/// hypervisor, and the trap handler reports handled/unhandled rather than
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed argument: bad descriptor size, misaligned SMPT buffer,
    /// unsupported hardware version during device bring-up, or an invalid
    /// device relationship.
    InvalidArgument,

    /// The descriptor names a hardware generation this driver does not
    /// support.
    NoDevice,

    /// The memory-donation facility refused an ownership transfer.
    DonationFailed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::NoDevice => write!(f, "unsupported device version"),
            Error::DonationFailed => write!(f, "page donation failed"),
        }
    }
}
