//! The extraction platform as seen by Tributary.
//!
//! The platform does the actual data movement; Tributary only drives it
//! through [`ExtractionPlatform`]. Adapters (HTTP clients, fakes) live
//! outside this crate.

pub mod error;
pub mod filters;
pub mod platform;
pub mod schema;

pub use error::{ExtractorError, Result};
pub use filters::Filters;
pub use platform::ExtractionPlatform;
pub use schema::clean_discovery_schema;
