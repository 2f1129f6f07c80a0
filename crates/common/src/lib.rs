//! Message contract shared by the sandbox and its callers.
//!
//! Everything here is plain serializable data: what goes into an isolation
//! unit ([`Job`]) and what comes out of it ([`OutputRecord`]). Nothing in this
//! crate depends on the script engine.

pub mod error;
pub mod job;
pub mod location;
pub mod record;
pub mod value;

pub use error::{SandboxError, SandboxResult};
pub use job::{Job, Language};
pub use location::{ContextLine, LocationInfo};
pub use record::{FaultOrigin, OutputRecord, RecordContent, RecordType, TableRow, timestamp_now};
pub use value::{StructuredValue, ValueKind};
