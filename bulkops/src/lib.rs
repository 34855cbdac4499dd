//! # Bulkops
//!
//! Bulk provisioning for contact-center platforms over their REST APIs.
//!
//! Each input row (CREATE, UPDATE or DELETE of one entity) is turned into a
//! sequence of remote calls. Every applied call is recorded with its
//! inverse, so a failure part way through a row rolls the platform back to
//! where the row started. The crate provides:
//!
//! - **Retrying transport**: bearer-token sessions that honour `Retry-After`
//!   on rate limiting within a bounded attempt budget
//! - **Resource endpoints**: paginated list, get, create, update and delete
//! - **Lookups**: business key to entity resolution with one listing per kind
//! - **Tasks and services**: reversible steps and the row-level operations
//!   built from them
//! - **Bulk runner**: sequential execution of row batches with per-row reports
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkops::prelude::*;
//!
//! let session = Arc::new(Session::new(SessionConfig::from_env()?)?);
//! let mut registry = ServiceRegistry::new();
//! zoomcc::register_services(&mut registry);
//!
//! let runner = BulkRunner::new(Arc::new(registry), session);
//! let rows = vec![BulkRow::new(Action::Create, json!({"queue_name": "Sales", "channel_type": "voice"}))];
//! let report = runner.run("zoomcc", "queues", rows).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bulk;
pub mod cancellation;
pub mod endpoints;
pub mod entity;
pub mod errors;
pub mod lookup;
pub mod observability;
pub mod services;
pub mod tasks;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod zoomcc;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bulk::{BulkReport, BulkRow, BulkRunner, RowOutcome, RowStatus};
    pub use crate::cancellation::CancellationToken;
    pub use crate::endpoints::Endpoint;
    pub use crate::entity::Entity;
    pub use crate::errors::{
        BulkOpError, ConfigError, LookupError, OperationFailed, ServerFault, TransportError,
    };
    pub use crate::lookup::{LookupResolver, LookupSpec};
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::services::{Action, Service, ServiceContext, ServiceRegistry};
    pub use crate::tasks::{RollbackFailure, Task, TaskState};
    pub use crate::transport::{RetryPolicy, Session, SessionConfig};
    pub use crate::zoomcc;
}
