//! Error handling for asset loading operations
//!
//! This module re-exports the crate-wide error type. Archive, filesystem and
//! decoder failures are all `ForgeError` variants; script execution faults
//! use [`ExecutionError`](crate::script::ExecutionError) and never escape a
//! thread's run loop.

pub use crate::common::ForgeError;
pub use crate::common::Result;
pub use crate::script::ExecutionError;
