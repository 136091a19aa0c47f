//! Core abstractions shared by every router type
//!
//! Error taxonomy, the [`Router`] capability set and the registry resolving
//! configured router names to instances.

pub mod error;
pub mod registry;
pub mod traits;

pub use error::{ErrorContext, Op, RouterError, RouterResult, StoreError, StoreResult};
pub use registry::RouterRegistry;
pub use traits::*;
