//! Tributary protocol: the shapes that cross crate and broker boundaries.
//!
//! - [`types`]: the extraction-platform view of sources, tables and connectors
//! - [`status`]: per-operation ticket status records
//! - [`topics`]: broker topics and operation kinds
//! - [`payloads`]: request bodies published on the request topics

pub mod defaults;
pub mod naming;
pub mod payloads;
pub mod status;
pub mod topics;
pub mod types;

pub use payloads::{CreateConnectorRequest, CreateSourceRequest, DiscoverTablesRequest, SyncNotification};
pub use status::{
    status_of, CreateConnectorStatus, CreateSourceStatus, GetSourceTablesStatus, OperationStatus,
    StatusRecord, UpdateSourceStatus,
};
pub use topics::OperationKind;
pub use types::{
    BasicSchedule, Connector, CronSchedule, Job, ResourceRequirements, Schedule, ScheduleType,
    Source, SourceDefinition, SourceDefinitionConfiguration, SyncMode, Table, TimeUnit, Workspace,
};

pub use tributary_ids::{ConnectorId, SourceDefinitionId, SourceId, TicketId, WorkspaceId};
