//! Push session state machine.
//!
//! A receive-pack exchange moves through fixed phases: advertise the
//! refs, read the command list, read and ingest the pack, validate and
//! apply the commands, write the status report. Each phase method
//! checks the session is in the right phase so callers cannot replay
//! or skip steps.

use crate::apply::{Applier, ApplyOptions};
use crate::caps::CapabilitySet;
use crate::commands::{CommandList, RefUpdateCommand};
use crate::pack::PackReader;
use crate::pktline::PacketReader;
use crate::report::{RefStatus, StatusReport};
use crate::{advertise::advertise_refs, GitError, Result};
use berth_storage::{GitObject, Repository};
use std::io::{Read, Write};

/// Server-side policy for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Emit the smart-HTTP service preamble before the advertisement.
    pub service_header: bool,
    /// Honor ref deletion commands.
    pub allow_deletes: bool,
    /// Allow updates that discard commits.
    pub allow_non_fast_forward: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            service_header: true,
            allow_deletes: true,
            allow_non_fast_forward: true,
        }
    }
}

/// Where a session is in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing sent yet.
    Advertise,
    /// Advertisement written, waiting for the command list.
    AwaitCommands,
    /// Commands read, waiting for the pack stream.
    ReceivePack,
    /// Pack ingested, commands not yet applied.
    Validate,
    /// Commands applied, report not yet written.
    Report,
    /// Exchange finished or aborted.
    Closed,
}

/// One receive-pack exchange against one repository.
#[derive(Debug)]
pub struct Session<'a> {
    repo: &'a Repository,
    options: SessionOptions,
    phase: Phase,
    commands: Vec<RefUpdateCommand>,
    capabilities: CapabilitySet,
    statuses: Vec<RefStatus>,
}

impl<'a> Session<'a> {
    pub fn new(repo: &'a Repository, options: SessionOptions) -> Self {
        Self {
            repo,
            options,
            phase: Phase::Advertise,
            commands: Vec::new(),
            capabilities: CapabilitySet::default(),
            statuses: Vec::new(),
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Capabilities the client selected, once the command list has
    /// been read.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn expect(&self, phase: Phase) -> Result<()> {
        if self.phase != phase {
            return Err(GitError::ProtocolViolation(format!(
                "expected phase {phase:?}, session is in {:?}",
                self.phase
            )));
        }
        Ok(())
    }

    /// Writes the ref advertisement.
    pub fn advertise<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.expect(Phase::Advertise)?;
        advertise_refs(writer, self.repo, self.options.service_header)?;
        self.phase = Phase::AwaitCommands;
        Ok(())
    }

    /// Reads the command list. A push with no commands skips straight
    /// to the report phase; there is no pack to read.
    pub fn read_commands<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.expect(Phase::AwaitCommands)?;
        let mut pkt = PacketReader::new(reader);
        let list = match CommandList::read_from(&mut pkt) {
            Ok(list) => list,
            Err(err) => {
                self.phase = Phase::Closed;
                return Err(err);
            }
        };

        self.capabilities = list.capabilities;
        self.commands = list.commands;
        self.phase = if self.commands.is_empty() {
            Phase::Report
        } else {
            Phase::ReceivePack
        };
        tracing::debug!(
            repo = %self.repo.name,
            commands = self.commands.len(),
            agent = self.capabilities.agent.as_deref().unwrap_or("unknown"),
            "read command list"
        );
        Ok(())
    }

    /// Reads the pack stream and stores its objects.
    ///
    /// An empty stream is fine when every command is a deletion; git
    /// sends no pack for a delete-only push. Delta entries are decoded
    /// and checksummed but not resolved against their base.
    pub fn receive_pack<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.expect(Phase::ReceivePack)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(|err| {
            self.phase = Phase::Closed;
            GitError::Io(err)
        })?;

        if data.is_empty() {
            if self.commands.iter().all(RefUpdateCommand::is_delete) {
                self.phase = Phase::Validate;
                return Ok(());
            }
            self.phase = Phase::Closed;
            return Err(GitError::ProtocolViolation(
                "push with ref updates carried no pack".to_string(),
            ));
        }

        match self.ingest(&data) {
            Ok(()) => {
                self.phase = Phase::Validate;
                Ok(())
            }
            Err(err) => {
                self.phase = Phase::Closed;
                Err(err)
            }
        }
    }

    fn ingest(&self, data: &[u8]) -> Result<()> {
        let mut pack = PackReader::new(data)?;
        let mut written = 0usize;
        let mut deltas = 0usize;

        while let Some(record) = pack.next_record()? {
            match record.kind.object_kind() {
                Some(kind) => {
                    self.repo.objects.write(GitObject::new(kind, record.data));
                    written += 1;
                }
                None => deltas += 1,
            }
        }
        pack.finish()?;

        tracing::debug!(
            repo = %self.repo.name,
            objects = written,
            deltas,
            "ingested pack"
        );
        Ok(())
    }

    /// Validates the commands against the repository and applies the
    /// ones that pass.
    pub fn validate(&mut self) -> Result<()> {
        self.expect(Phase::Validate)?;
        let options = ApplyOptions {
            atomic: self.capabilities.atomic,
            allow_deletes: self.options.allow_deletes,
            allow_non_fast_forward: self.options.allow_non_fast_forward,
        };
        self.statuses = Applier::new(self.repo, options).apply(&self.commands)?;
        self.phase = Phase::Report;
        Ok(())
    }

    /// Writes the status report and closes the session.
    pub fn write_report<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        self.expect(Phase::Report)?;
        let mut report = StatusReport::ok();
        for status in self.statuses.drain(..) {
            report.push(status);
        }
        report.write_to(writer)?;
        self.phase = Phase::Closed;
        Ok(())
    }

    /// Runs the whole exchange over one reader and writer.
    ///
    /// Failures after the advertisement are reported to the client as
    /// an `unpack` error before the error is returned, so a client
    /// waiting on report-status is not left hanging.
    pub fn serve<R: Read, W: Write>(&mut self, reader: &mut R, writer: &mut W) -> Result<()> {
        self.advertise(writer)?;
        self.read_commands(reader)?;

        if self.phase == Phase::ReceivePack {
            let outcome = self.receive_pack(reader).and_then(|()| self.validate());
            if let Err(err) = outcome {
                StatusReport::failed(err.to_string()).write_to(writer)?;
                return Err(err);
            }
        }

        self.write_report(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn phases_must_run_in_order() {
        let repo = Repository::new("demo", "alice");
        let mut session = Session::new(&repo, SessionOptions::default());

        let mut out = Vec::new();
        assert!(matches!(
            session.write_report(&mut out),
            Err(GitError::ProtocolViolation(_))
        ));
        assert!(matches!(
            session.validate(),
            Err(GitError::ProtocolViolation(_))
        ));

        session.advertise(&mut out).unwrap();
        assert_eq!(session.phase(), Phase::AwaitCommands);
        assert!(matches!(
            session.advertise(&mut out),
            Err(GitError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn empty_command_list_skips_pack_phase() {
        let repo = Repository::new("demo", "alice");
        let mut session = Session::new(&repo, SessionOptions::default());

        let mut out = Vec::new();
        session.advertise(&mut out).unwrap();
        session.read_commands(&mut Cursor::new(b"0000".to_vec())).unwrap();
        assert_eq!(session.phase(), Phase::Report);

        session.write_report(&mut out).unwrap();
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[test]
    fn malformed_commands_close_the_session() {
        let repo = Repository::new("demo", "alice");
        let mut session = Session::new(&repo, SessionOptions::default());

        let mut out = Vec::new();
        session.advertise(&mut out).unwrap();
        let err = session
            .read_commands(&mut Cursor::new(b"0005x".to_vec()))
            .unwrap_err();
        assert!(matches!(err, GitError::InvalidPktLine(_)));
        assert_eq!(session.phase(), Phase::Closed);
    }
}
