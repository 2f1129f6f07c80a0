//! Sandboxed JavaScript execution using Boa.
//!
//! Submitted code runs in an isolated engine context on its own thread.
//! Everything it prints through `console` comes back as structured
//! [`OutputRecord`]s, and an uncaught failure ends the run with a single
//! error record pointing at the offending source line.

pub mod channel;
pub mod config;
pub mod console;
pub mod engine;
pub mod formatter;
pub mod location;
pub mod sink;

pub use channel::{IsolationUnit, RecordStream, Sandbox};
pub use config::SandboxConfig;
pub use console::ConsoleState;
pub use engine::{ExecutionHost, ExecutionState};
pub use formatter::{format_value, ValueFormatter};
pub use location::{Failure, FailurePhase, LocationResolver};
pub use sink::{ChannelSink, RecordSink, VecSink};

pub use common::{Job, Language, OutputRecord, RecordType, SandboxError, SandboxResult, StructuredValue};
