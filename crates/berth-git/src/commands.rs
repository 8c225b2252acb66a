//! Ref update command parsing.
//!
//! A push opens with pkt-line framed command lines, one per ref:
//! `<old-oid> <new-oid> <ref-name>`, terminated by a flush packet.
//! The first line may carry the client's capability selection after a
//! NUL. An all-zero old id requests creation, an all-zero new id
//! requests deletion.

use crate::caps::CapabilitySet;
use crate::pktline::{PacketLine, PacketReader};
use crate::{GitError, Result};
use berth_storage::ObjectId;
use std::io::Read;

/// A single requested ref transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateCommand {
    /// Value the client believes the ref currently has (zero for
    /// creation).
    pub old_id: ObjectId,
    /// Requested new value (zero for deletion).
    pub new_id: ObjectId,
    /// Full ref name.
    pub name: String,
}

impl RefUpdateCommand {
    /// True if this command creates a ref.
    pub fn is_create(&self) -> bool {
        self.old_id.is_zero()
    }

    /// True if this command deletes a ref.
    pub fn is_delete(&self) -> bool {
        self.new_id.is_zero()
    }
}

/// The decoded command section of a push request.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    /// Commands in the order the client sent them.
    pub commands: Vec<RefUpdateCommand>,
    /// Capabilities the client selected on the first line.
    pub capabilities: CapabilitySet,
}

impl CommandList {
    /// Reads command lines until the flush terminator.
    ///
    /// A stream that ends before any command was sent is a valid no-op
    /// request and decodes to an empty list; a stream that ends after
    /// at least one command but before the flush is malformed.
    pub fn read_from<R: Read>(reader: &mut PacketReader<R>) -> Result<Self> {
        let mut commands = Vec::new();
        let mut capabilities = CapabilitySet::default();

        loop {
            match reader.read()? {
                None => {
                    if commands.is_empty() {
                        break;
                    }
                    return Err(GitError::InvalidPktLine(
                        "command list not terminated by flush".to_string(),
                    ));
                }
                Some(PacketLine::Flush) => break,
                Some(PacketLine::Data(data)) => {
                    let first = commands.is_empty();
                    let (command, caps) = parse_command_line(&data, first)?;
                    if let Some(caps) = caps {
                        capabilities = caps;
                    }
                    commands.push(command);
                }
                Some(other) => {
                    return Err(GitError::ProtocolViolation(format!(
                        "unexpected {other:?} in command list"
                    )))
                }
            }
        }

        Ok(Self {
            commands,
            capabilities,
        })
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if the client requested no ref changes.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn parse_command_line(
    line: &[u8],
    first: bool,
) -> Result<(RefUpdateCommand, Option<CapabilitySet>)> {
    let text = std::str::from_utf8(line)
        .map_err(|_| GitError::InvalidPktLine("command line is not utf-8".to_string()))?;
    let text = text.trim_end_matches('\n');

    let (text, caps) = match (first, text.split_once('\0')) {
        (true, Some((command, caps))) => (command, Some(CapabilitySet::parse(caps))),
        (false, Some(_)) => {
            return Err(GitError::InvalidPktLine(
                "capability list on a non-first command".to_string(),
            ))
        }
        (_, None) => (text, None),
    };

    let mut fields = text.splitn(3, ' ');
    let old = fields.next().unwrap_or("");
    let new = fields.next().ok_or_else(|| {
        GitError::InvalidPktLine(format!("command {text:?} is missing fields"))
    })?;
    let name = fields.next().ok_or_else(|| {
        GitError::InvalidPktLine(format!("command {text:?} is missing a ref name"))
    })?;

    let old_id = parse_oid(old)?;
    let new_id = parse_oid(new)?;

    if name.is_empty() {
        return Err(GitError::InvalidPktLine("empty ref name".to_string()));
    }
    if old_id.is_zero() && new_id.is_zero() {
        return Err(GitError::InvalidPktLine(format!(
            "command for {name} has zero ids on both sides"
        )));
    }

    Ok((
        RefUpdateCommand {
            old_id,
            new_id,
            name: name.to_string(),
        },
        caps,
    ))
}

fn parse_oid(hex: &str) -> Result<ObjectId> {
    ObjectId::from_hex(hex)
        .map_err(|e| GitError::InvalidPktLine(format!("bad object id in command: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PacketWriter;
    use std::io::Cursor;

    const OLD: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";
    const NEW: &str = "340e325d93e30ce60b8e2bd53f2f5897a297f597";
    const ZERO: &str = "0000000000000000000000000000000000000000";

    fn decode(wire: &[u8]) -> Result<CommandList> {
        let mut reader = PacketReader::new(Cursor::new(wire.to_vec()));
        CommandList::read_from(&mut reader)
    }

    fn wire(lines: &[&str], terminate: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = PacketWriter::new(&mut buf);
        for line in lines {
            writer.write_line(line).unwrap();
        }
        if terminate {
            writer.flush_pkt().unwrap();
        }
        drop(writer);
        buf
    }

    #[test]
    fn parses_create_update_delete() {
        let input = wire(
            &[
                &format!("{ZERO} {NEW} refs/heads/main"),
                &format!("{OLD} {NEW} refs/heads/dev"),
                &format!("{OLD} {ZERO} refs/heads/gone"),
            ],
            true,
        );

        let list = decode(&input).unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.commands[0].is_create());
        assert!(!list.commands[0].is_delete());
        assert!(!list.commands[1].is_create());
        assert!(list.commands[2].is_delete());
        assert_eq!(list.commands[1].name, "refs/heads/dev");
    }

    #[test]
    fn order_is_preserved() {
        let input = wire(
            &[
                &format!("{ZERO} {NEW} refs/heads/b"),
                &format!("{ZERO} {NEW} refs/heads/a"),
                &format!("{ZERO} {NEW} refs/heads/c"),
            ],
            true,
        );

        let names: Vec<_> = decode(&input)
            .unwrap()
            .commands
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["refs/heads/b", "refs/heads/a", "refs/heads/c"]);
    }

    #[test]
    fn empty_input_is_valid_noop() {
        let list = decode(b"").unwrap();
        assert!(list.is_empty());
        assert_eq!(list.capabilities, CapabilitySet::default());
    }

    #[test]
    fn bare_flush_is_valid_noop() {
        let list = decode(b"0000").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn missing_flush_after_commands_rejected() {
        let input = wire(&[&format!("{ZERO} {NEW} refs/heads/main")], false);
        assert!(matches!(
            decode(&input),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn capabilities_read_from_first_line() {
        let input = wire(
            &[
                &format!("{ZERO} {NEW} refs/heads/main\0report-status atomic agent=git/2.45.0"),
                &format!("{OLD} {NEW} refs/heads/dev"),
            ],
            true,
        );

        let list = decode(&input).unwrap();
        assert!(list.capabilities.report_status);
        assert!(list.capabilities.atomic);
        assert!(!list.capabilities.delete_refs);
        assert_eq!(list.capabilities.agent.as_deref(), Some("git/2.45.0"));
        assert_eq!(list.commands[0].name, "refs/heads/main");
    }

    #[test]
    fn capabilities_on_later_line_rejected() {
        let input = wire(
            &[
                &format!("{ZERO} {NEW} refs/heads/main"),
                &format!("{OLD} {NEW} refs/heads/dev\0atomic"),
            ],
            true,
        );

        assert!(matches!(
            decode(&input),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn short_oid_rejected() {
        let input = wire(&[&format!("abc {NEW} refs/heads/main")], true);
        assert!(matches!(
            decode(&input),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn non_hex_oid_rejected() {
        let bad = "z".repeat(40);
        let input = wire(&[&format!("{bad} {NEW} refs/heads/main")], true);
        assert!(decode(&input).is_err());
    }

    #[test]
    fn missing_ref_name_rejected() {
        let input = wire(&[&format!("{ZERO} {NEW}")], true);
        assert!(matches!(
            decode(&input),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn zero_to_zero_command_rejected() {
        let input = wire(&[&format!("{ZERO} {ZERO} refs/heads/main")], true);
        assert!(decode(&input).is_err());
    }

    #[test]
    fn delimiter_in_command_section_rejected() {
        let mut input = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut input);
            writer
                .write_line(&format!("{ZERO} {NEW} refs/heads/main"))
                .unwrap();
            writer.write(&PacketLine::Delim).unwrap();
        }
        assert!(matches!(
            decode(&input),
            Err(GitError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn ref_name_with_spaces_is_kept_whole() {
        // splitn(3) keeps everything after the second space.
        let input = wire(&[&format!("{ZERO} {NEW} refs/heads/odd name")], true);
        let list = decode(&input).unwrap();
        assert_eq!(list.commands[0].name, "refs/heads/odd name");
    }
}
