//! Push capability negotiation.
//!
//! The server advertises its capability list after a NUL on the first
//! advertised ref; the client echoes its selection after a NUL on the
//! first update command. A capability is active only when both sides
//! named it.

/// Agent string advertised to clients.
pub const AGENT: &str = concat!("berth/", env!("CARGO_PKG_VERSION"));

/// The capabilities either side of a push can name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Client wants a status report after the push.
    pub report_status: bool,
    /// Ref deletions are allowed.
    pub delete_refs: bool,
    /// All-or-nothing application of the command list.
    pub atomic: bool,
    /// Offset deltas may appear in the pack.
    pub ofs_delta: bool,
    /// Peer software identification.
    pub agent: Option<String>,
}

impl CapabilitySet {
    /// The full set this server advertises.
    pub fn advertised() -> Self {
        Self {
            report_status: true,
            delete_refs: true,
            atomic: true,
            ofs_delta: true,
            agent: Some(AGENT.to_string()),
        }
    }

    /// Parses a space-separated capability list. Unknown entries are
    /// ignored.
    pub fn parse(s: &str) -> Self {
        let mut caps = Self::default();
        for word in s.split_ascii_whitespace() {
            match word {
                "report-status" => caps.report_status = true,
                "delete-refs" => caps.delete_refs = true,
                "atomic" => caps.atomic = true,
                "ofs-delta" => caps.ofs_delta = true,
                _ => {
                    if let Some(agent) = word.strip_prefix("agent=") {
                        caps.agent = Some(agent.to_string());
                    } else {
                        tracing::debug!(capability = word, "ignoring unknown capability");
                    }
                }
            }
        }
        caps
    }

    /// Wire form, in the order git lists them.
    pub fn to_wire(&self) -> String {
        let mut words = Vec::new();
        if self.report_status {
            words.push("report-status".to_string());
        }
        if self.delete_refs {
            words.push("delete-refs".to_string());
        }
        if self.atomic {
            words.push("atomic".to_string());
        }
        if self.ofs_delta {
            words.push("ofs-delta".to_string());
        }
        if let Some(agent) = &self.agent {
            words.push(format!("agent={agent}"));
        }
        words.join(" ")
    }
}
