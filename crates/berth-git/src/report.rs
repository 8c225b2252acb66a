//! Push status report encoding and decoding.
//!
//! The report opens with `unpack ok` or `unpack <reason>`, carries one
//! `ok <ref>` or `ng <ref> <reason>` line per command in command
//! order, and ends with a flush packet.

use crate::pktline::{PacketLine, PacketReader, PacketWriter};
use crate::{GitError, Result};
use std::fmt;
use std::io::{Read, Write};

/// Why a ref update was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The ref moved since the client fetched it.
    Stale,
    /// The proposed target object is absent or disconnected.
    UnknownObject,
    /// Deletion of a ref that does not exist.
    NoSuchRef,
    /// The update would discard commits.
    NonFastForward,
    /// Deletion refused by server policy.
    DeletionProhibited,
    /// Another command in an atomic push failed.
    AtomicAborted,
}

impl RejectReason {
    /// The reason string sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::UnknownObject => "unknown object",
            Self::NoSuchRef => "no such ref",
            Self::NonFastForward => "non-fast-forward",
            Self::DeletionProhibited => "deletion prohibited",
            Self::AtomicAborted => "atomic transaction failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one ref. Decoded reasons stay free-form text so any
/// server's report can be read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefOutcome {
    /// The update was applied.
    Ok,
    /// The update was rejected with a reason.
    Rejected(String),
}

/// Status line for one ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefStatus {
    /// Full ref name.
    pub name: String,
    /// Applied or rejected.
    pub outcome: RefOutcome,
}

impl RefStatus {
    /// An applied update.
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: RefOutcome::Ok,
        }
    }

    /// A rejected update.
    pub fn rejected(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            outcome: RefOutcome::Rejected(reason.to_string()),
        }
    }

    /// True if the update was applied.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, RefOutcome::Ok)
    }
}

/// A complete push status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Why the pack failed to unpack, if it did.
    pub unpack_error: Option<String>,
    /// Per-ref outcomes in command order.
    pub refs: Vec<RefStatus>,
}

impl StatusReport {
    /// A report with a successful unpack and no statuses yet.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A report for a push whose pack could not be ingested.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            unpack_error: Some(reason.into()),
            refs: Vec::new(),
        }
    }

    /// Appends a ref status.
    pub fn push(&mut self, status: RefStatus) {
        self.refs.push(status);
    }

    /// True when the pack unpacked and every ref was applied.
    pub fn all_ok(&self) -> bool {
        self.unpack_error.is_none() && self.refs.iter().all(RefStatus::is_ok)
    }

    /// Encodes the report as pkt-lines followed by a flush.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt = PacketWriter::new(writer);
        match &self.unpack_error {
            None => pkt.write_line("unpack ok")?,
            Some(reason) => pkt.write_line(&format!("unpack {reason}"))?,
        }
        for status in &self.refs {
            match &status.outcome {
                RefOutcome::Ok => pkt.write_line(&format!("ok {}", status.name))?,
                RefOutcome::Rejected(reason) => {
                    pkt.write_line(&format!("ng {} {}", status.name, reason))?
                }
            }
        }
        pkt.flush_pkt()?;
        pkt.flush()?;
        Ok(())
    }

    /// Decodes a report written by [`StatusReport::write_to`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut pkt = PacketReader::new(reader);

        let first = match pkt.read()? {
            Some(PacketLine::Data(data)) => data,
            other => {
                return Err(GitError::ProtocolViolation(format!(
                    "expected unpack status, got {other:?}"
                )))
            }
        };
        let first = line_text(&first)?;
        let unpack_error = match first.strip_prefix("unpack ") {
            Some("ok") => None,
            Some(reason) => Some(reason.to_string()),
            None => {
                return Err(GitError::ProtocolViolation(format!(
                    "report does not open with unpack status: {first:?}"
                )))
            }
        };

        let mut refs = Vec::new();
        loop {
            match pkt.read()? {
                Some(PacketLine::Flush) | None => break,
                Some(PacketLine::Data(data)) => {
                    let line = line_text(&data)?;
                    if let Some(name) = line.strip_prefix("ok ") {
                        refs.push(RefStatus::ok(name));
                    } else if let Some(rest) = line.strip_prefix("ng ") {
                        let (name, reason) = rest
                            .split_once(' ')
                            .unwrap_or((rest, "unspecified"));
                        refs.push(RefStatus::rejected(name, reason));
                    } else {
                        return Err(GitError::ProtocolViolation(format!(
                            "unrecognized status line: {line:?}"
                        )));
                    }
                }
                Some(other) => {
                    return Err(GitError::ProtocolViolation(format!(
                        "unexpected {other:?} in status report"
                    )))
                }
            }
        }

        Ok(Self { unpack_error, refs })
    }
}

fn line_text(data: &[u8]) -> Result<&str> {
    std::str::from_utf8(data)
        .map(|s| s.trim_end_matches('\n'))
        .map_err(|_| GitError::ProtocolViolation("status line is not utf-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(report: &StatusReport) -> StatusReport {
        let mut buf = Vec::new();
        report.write_to(&mut buf).unwrap();
        StatusReport::read_from(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn encodes_expected_wire_form() {
        let mut report = StatusReport::ok();
        report.push(RefStatus::ok("refs/heads/main"));
        report.push(RefStatus::rejected("refs/heads/dev", RejectReason::Stale));

        let mut buf = Vec::new();
        report.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("unpack ok\n"));
        assert!(text.contains("ok refs/heads/main\n"));
        assert!(text.contains("ng refs/heads/dev stale\n"));
        assert!(text.ends_with("0000"));
    }

    #[test]
    fn roundtrip_preserves_entries_and_order() {
        let mut report = StatusReport::ok();
        report.push(RefStatus::ok("refs/heads/main"));
        report.push(RefStatus::rejected(
            "refs/heads/dev",
            RejectReason::NonFastForward,
        ));
        report.push(RefStatus::rejected(
            "refs/tags/v1",
            RejectReason::UnknownObject,
        ));
        report.push(RefStatus::ok("refs/heads/other"));

        assert_eq!(roundtrip(&report), report);
    }

    #[test]
    fn empty_report_roundtrips() {
        let report = StatusReport::ok();
        let decoded = roundtrip(&report);
        assert!(decoded.refs.is_empty());
        assert!(decoded.all_ok());
    }

    #[test]
    fn failed_unpack_roundtrips() {
        let report = StatusReport::failed("truncated object: entry declared 100 bytes");
        let decoded = roundtrip(&report);
        assert_eq!(
            decoded.unpack_error.as_deref(),
            Some("truncated object: entry declared 100 bytes")
        );
        assert!(!decoded.all_ok());
    }

    #[test]
    fn all_ok_requires_every_ref_ok() {
        let mut report = StatusReport::ok();
        report.push(RefStatus::ok("refs/heads/main"));
        assert!(report.all_ok());

        report.push(RefStatus::rejected("refs/heads/dev", RejectReason::Stale));
        assert!(!report.all_ok());
    }

    #[test]
    fn reject_reason_wire_strings() {
        assert_eq!(RejectReason::Stale.as_str(), "stale");
        assert_eq!(RejectReason::UnknownObject.as_str(), "unknown object");
        assert_eq!(RejectReason::NoSuchRef.as_str(), "no such ref");
        assert_eq!(RejectReason::NonFastForward.as_str(), "non-fast-forward");
        assert_eq!(RejectReason::AtomicAborted.as_str(), "atomic transaction failed");
    }

    #[test]
    fn multi_word_reasons_survive_roundtrip() {
        let mut report = StatusReport::ok();
        report.push(RefStatus::rejected(
            "refs/heads/main",
            RejectReason::AtomicAborted,
        ));

        let decoded = roundtrip(&report);
        assert_eq!(
            decoded.refs[0].outcome,
            RefOutcome::Rejected("atomic transaction failed".to_string())
        );
    }

    #[test]
    fn garbage_first_line_rejected() {
        let mut buf = Vec::new();
        let mut pkt = PacketWriter::new(&mut buf);
        pkt.write_line("not a report").unwrap();
        pkt.flush_pkt().unwrap();
        drop(pkt);

        assert!(matches!(
            StatusReport::read_from(&mut Cursor::new(buf)),
            Err(GitError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn unrecognized_status_line_rejected() {
        let mut buf = Vec::new();
        let mut pkt = PacketWriter::new(&mut buf);
        pkt.write_line("unpack ok").unwrap();
        pkt.write_line("?? refs/heads/main").unwrap();
        pkt.flush_pkt().unwrap();
        drop(pkt);

        assert!(StatusReport::read_from(&mut Cursor::new(buf)).is_err());
    }
}
