//! Server side of the git push protocol.
//!
//! The crate covers the whole receive-pack exchange: pkt-line framing,
//! the ref advertisement, command list and capability parsing, pack
//! stream decoding, ref update validation, and the status report sent
//! back to the client. [`Session`] ties the pieces together; the
//! lower-level types are exported for callers that drive phases
//! themselves.

pub mod advertise;
pub mod apply;
pub mod caps;
pub mod commands;
pub mod error;
pub mod pack;
pub mod pktline;
pub mod report;
pub mod session;

pub use advertise::advertise_refs;
pub use apply::{Applier, ApplyOptions};
pub use caps::{CapabilitySet, AGENT};
pub use commands::{CommandList, RefUpdateCommand};
pub use error::GitError;
pub use pack::{PackBuilder, PackEntryKind, PackHeader, PackReader, PackRecord};
pub use pktline::{PacketLine, PacketReader, PacketWriter, MAX_PACKET_LEN};
pub use report::{RefOutcome, RefStatus, RejectReason, StatusReport};
pub use session::{Phase, Session, SessionOptions};

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, GitError>;
