//! Tributary manager.
//!
//! Turns slow extraction-platform and catalog work into ticketed operations
//! over a message broker:
//!
//! - [`coordinator`]: submit, poll and finish tickets
//! - [`service`]: the ingestion operations, including the connector saga
//! - [`worker`]: broker handlers for each operation and the dead-letter topic
//! - [`runtime`]: wires store, service and router together from a
//!   [`config::ManagerConfig`]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod instrument;
pub mod runtime;
pub mod service;
pub mod worker;

pub use config::{ManagerArgs, ManagerConfig};
pub use coordinator::{Coordinator, CoordinatorError};
pub use error::{Result, ServiceError};
pub use instrument::{ExtractorMetrics, InstrumentedExtractor};
pub use runtime::{Capabilities, ManagerRuntime};
pub use service::IngestionService;
pub use worker::{register_handlers, DeadLetterHandler, OperationHandler};
