//! `planb` router type.
//!
//! Same route records as `hipache`, plus per-hostname TLS material under
//! `tls:<hostname>`.

use std::sync::Arc;

use super::HipacheRouter;
use crate::core::traits::{Router, RouterScope};

pub const ROUTER_TYPE: &str = "planb";

pub fn create_planb_router(scope: RouterScope) -> Arc<dyn Router> {
    Arc::new(HipacheRouter::new(ROUTER_TYPE, scope, true))
}
