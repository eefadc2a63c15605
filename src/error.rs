//! Error taxonomy for the optimization engine.

use thiserror::Error;

/// Errors that can be raised while preparing or running an optimization.
///
/// Only [`Error::InvalidPart`], [`Error::InvalidStock`] and [`Error::InvalidConfig`] are ever
/// returned from [`crate::Optimizer::optimize`] as an `Err`. [`Error::PartTooLong`],
/// [`Error::ExhaustedFiniteStock`] and [`Error::Cancelled`] exist so internal plumbing can carry
/// a uniform error type before downgrading the condition into a [`crate::UnplacedPart`] entry or
/// a warning string on the result - the core contract is that every part is placed or accounted
/// for, never that the run aborts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A part failed validation before the run began.
    #[error("invalid part {part_id}: {reason}")]
    InvalidPart {
        /// id of the offending part.
        part_id: u32,
        /// Human readable reason.
        reason: String,
    },

    /// A stock type failed validation before the run began.
    #[error("invalid stock {stock_id}: {reason}")]
    InvalidStock {
        /// id of the offending stock type.
        stock_id: u32,
        /// Human readable reason.
        reason: String,
    },

    /// The configuration itself is invalid (negative tolerance or losses).
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Human readable reason.
        reason: String,
    },

    /// A part instance is longer than any stock's usable length, and no unlimited-supply stock
    /// can accommodate it either. Downgraded into `unplaced_parts[].reason` rather than aborting.
    #[error("part {part_id} instance {instance_id} (length {length}) exceeds every stock's usable length")]
    PartTooLong {
        /// id of the offending part.
        part_id: u32,
        /// Instance index within the part.
        instance_id: u32,
        /// The part instance's length in millimeters.
        length: f64,
    },

    /// All finite-supply stock is full and no unlimited-supply stock fits; triggers the
    /// virtual-stock fallback with a warning rather than aborting.
    #[error("finite stock exhausted, falling back to virtual stock")]
    ExhaustedFiniteStock,

    /// The caller cancelled the run. A partial result is returned with `success = false`.
    #[error("optimization cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
