//! Ref advertisement for git-receive-pack.
//!
//! The advertisement lists every ref the repository holds, one per
//! pkt-line, with the server's capability list after a NUL on the
//! first line. An empty repository advertises the zero id against the
//! placeholder name `capabilities^{}` so the capability list still has
//! a line to ride on.

use crate::caps::CapabilitySet;
use crate::pktline::PacketWriter;
use crate::Result;
use berth_storage::{ObjectId, Repository};
use std::io::Write;

/// Writes the full ref advertisement, terminated by a flush packet.
///
/// When `service_header` is set the smart-HTTP preamble
/// (`# service=git-receive-pack` plus a flush) precedes the refs.
pub fn advertise_refs<W: Write>(
    writer: &mut W,
    repo: &Repository,
    service_header: bool,
) -> Result<()> {
    let mut pkt = PacketWriter::new(writer);

    if service_header {
        pkt.write_line("# service=git-receive-pack")?;
        pkt.flush_pkt()?;
    }

    let caps = CapabilitySet::advertised().to_wire();
    let mut refs: Vec<(String, ObjectId)> = repo.refs.current_refs().into_iter().collect();
    refs.sort_by(|a, b| a.0.cmp(&b.0));

    match refs.split_first() {
        None => {
            pkt.write_line(&format!("{} capabilities^{{}}\0{caps}", ObjectId::ZERO))?;
        }
        Some(((name, id), rest)) => {
            pkt.write_line(&format!("{id} {name}\0{caps}"))?;
            for (name, id) in rest {
                pkt.write_line(&format!("{id} {name}"))?;
            }
        }
    }

    pkt.flush_pkt()?;
    pkt.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::{PacketLine, PacketReader};
    use berth_storage::GitObject;
    use std::io::Cursor;

    fn advertised_lines(repo: &Repository, service_header: bool) -> Vec<String> {
        let mut buf = Vec::new();
        advertise_refs(&mut buf, repo, service_header).unwrap();

        let mut reader = PacketReader::new(Cursor::new(buf));
        let mut lines = Vec::new();
        loop {
            match reader.read().unwrap() {
                None => break,
                Some(PacketLine::Flush) => lines.push("FLUSH".to_string()),
                Some(PacketLine::Data(data)) => {
                    lines.push(String::from_utf8(data).unwrap().trim_end().to_string())
                }
                Some(other) => panic!("unexpected {other:?}"),
            }
        }
        lines
    }

    #[test]
    fn empty_repo_advertises_zero_id_placeholder() {
        let repo = Repository::new("demo", "alice");
        let lines = advertised_lines(&repo, false);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(
            "0000000000000000000000000000000000000000 capabilities^{}\0report-status"
        ));
        assert_eq!(lines[1], "FLUSH");
    }

    #[test]
    fn populated_repo_lists_refs_sorted_with_caps_on_first() {
        let repo = Repository::new("demo", "alice");
        let id = repo.objects.write_blob(b"data".to_vec());
        repo.refs.set("refs/heads/main", id);
        repo.refs.set("refs/heads/dev", id);

        let lines = advertised_lines(&repo, false);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(&format!("{id} refs/heads/dev\0")));
        assert!(lines[0].contains("report-status"));
        assert!(lines[0].contains("delete-refs"));
        assert!(lines[0].contains("atomic"));
        assert_eq!(lines[1], format!("{id} refs/heads/main"));
        assert_eq!(lines[2], "FLUSH");
    }

    #[test]
    fn symbolic_head_is_not_advertised_directly() {
        let repo = Repository::new("demo", "alice");
        let commit = repo.objects.write(GitObject::blob(b"x".to_vec()));
        repo.refs.set("refs/heads/main", commit);
        repo.refs.set_symbolic("HEAD", "refs/heads/main");

        let lines = advertised_lines(&repo, false);
        assert!(lines.iter().all(|l| !l.contains("HEAD")));
    }

    #[test]
    fn service_header_precedes_refs() {
        let repo = Repository::new("demo", "alice");
        let lines = advertised_lines(&repo, true);

        assert_eq!(lines[0], "# service=git-receive-pack");
        assert_eq!(lines[1], "FLUSH");
        assert!(lines[2].contains("capabilities^{}"));
    }
}
