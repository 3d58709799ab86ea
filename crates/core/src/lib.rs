//! Shared types, fixed-point math, and error definitions.
//!
//! Foundation crate -- no async or I/O dependencies.

pub mod consts;
pub mod decimal;
pub mod error;
pub mod math;
pub mod types;

pub use decimal::Decimal;
pub use error::{FarmError, FarmResult};
pub use types::{derive_address, unique_pubkey, Clock, Pubkey, TimeUnit, TxSignature, PROGRAM_ID};
