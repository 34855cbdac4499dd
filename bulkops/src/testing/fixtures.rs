//! Ready-made registries and runners.

use std::sync::Arc;

use super::FakeContactCenter;
use crate::bulk::BulkRunner;
use crate::services::ServiceRegistry;
use crate::zoomcc;

/// A registry holding every Contact Center service.
#[must_use]
pub fn zoomcc_registry() -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    zoomcc::register_services(&mut registry);
    registry
}

/// A runner whose requests land on `fake`.
#[must_use]
pub fn zoomcc_runner(fake: &Arc<FakeContactCenter>) -> BulkRunner {
    BulkRunner::new(Arc::new(zoomcc_registry()), fake.session())
}
