//! The tool-server protocol between Ogma and its external agents.
//!
//! An agent task never touches the live database. The runner serializes a
//! point-in-time [`Snapshot`] of the relevant graph slice into a private
//! workdir, and this crate's `ogma-toolserver` binary serves a closed set
//! of read-only query tools over it, plus exactly one write tool,
//! `submit_result`, which produces the task's artifact.
//!
//! The wire format is a small closed request/response enum (initialize,
//! list-tools, call-tool) framed with `Content-Length` headers over stdio.

pub mod error;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod transport;

pub use error::{ProtocolError, Result};
pub use protocol::{PROTOCOL_VERSION, SUBMIT_TOOL, ToolInfo, ToolRequest, ToolResponse};
pub use server::ToolServer;
pub use snapshot::{ARTIFACT_FILE, SNAPSHOT_FILE, Snapshot};
