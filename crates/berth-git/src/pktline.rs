//! pkt-line framing.
//!
//! Every protocol message is framed with a 4-hex-digit length prefix
//! that counts itself. Lengths 0 through 2 are reserved control
//! packets: flush (`0000`), delimiter (`0001`) and response-end
//! (`0002`); length 3 is invalid.

use crate::{GitError, Result};
use std::io::{ErrorKind, Read, Write};

/// Largest packet on the wire, length prefix included.
pub const MAX_PACKET_LEN: usize = 65520;

/// A single pkt-line frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketLine {
    /// Data frame with payload.
    Data(Vec<u8>),
    /// Flush packet (0000), ends a section.
    Flush,
    /// Delimiter packet (0001).
    Delim,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PacketLine {
    /// Creates a data frame from text.
    pub fn text(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Returns the payload, or None for control packets.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the payload as text with any trailing newline removed.
    pub fn as_text(&self) -> Option<&str> {
        self.payload()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }

    /// True if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }
}

/// Reads pkt-line frames from a byte stream.
///
/// Reads never assume a frame arrives in one chunk; the length prefix
/// and payload are each pulled with exact-read semantics.
pub struct PacketReader<R> {
    reader: R,
}

impl<R: Read> PacketReader<R> {
    /// Creates a new packet reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next frame. Returns `None` on a clean end of stream
    /// (end of input between frames).
    pub fn read(&mut self) -> Result<Option<PacketLine>> {
        let mut prefix = [0u8; 4];
        match self.reader.read_exact(&mut prefix) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = decode_length(&prefix)?;
        match len {
            0 => Ok(Some(PacketLine::Flush)),
            1 => Ok(Some(PacketLine::Delim)),
            2 => Ok(Some(PacketLine::ResponseEnd)),
            3 => Err(GitError::InvalidPktLine(
                "reserved length 0003".to_string(),
            )),
            _ => {
                if len > MAX_PACKET_LEN {
                    return Err(GitError::InvalidPktLine(format!(
                        "length {len} exceeds maximum {MAX_PACKET_LEN}"
                    )));
                }
                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data).map_err(|e| {
                    if e.kind() == ErrorKind::UnexpectedEof {
                        GitError::InvalidPktLine(format!(
                            "frame declared {len} bytes but stream ended early"
                        ))
                    } else {
                        e.into()
                    }
                })?;
                Ok(Some(PacketLine::Data(data)))
            }
        }
    }

    /// Reads data frames until a flush packet or end of stream.
    pub fn read_until_flush(&mut self) -> Result<Vec<PacketLine>> {
        let mut frames = Vec::new();
        loop {
            match self.read()? {
                Some(PacketLine::Flush) | None => break,
                Some(frame) => frames.push(frame),
            }
        }
        Ok(frames)
    }

    /// Returns a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn decode_length(prefix: &[u8; 4]) -> Result<usize> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| GitError::InvalidPktLine("non-ascii length prefix".to_string()))?;
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(GitError::InvalidPktLine(format!(
            "non-hex length prefix {text:?}"
        )));
    }
    let len = usize::from_str_radix(text, 16)
        .map_err(|_| GitError::InvalidPktLine("unreadable length prefix".to_string()))?;
    Ok(len)
}

/// Writes pkt-line frames to a byte stream.
pub struct PacketWriter<W> {
    writer: W,
}

impl<W: Write> PacketWriter<W> {
    /// Creates a new packet writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a frame.
    pub fn write(&mut self, frame: &PacketLine) -> Result<()> {
        match frame {
            PacketLine::Data(data) => {
                let len = data.len() + 4;
                if len > MAX_PACKET_LEN {
                    return Err(GitError::InvalidPktLine(format!(
                        "payload of {} bytes exceeds frame limit",
                        data.len()
                    )));
                }
                self.writer.write_all(format!("{len:04x}").as_bytes())?;
                self.writer.write_all(data)?;
            }
            PacketLine::Flush => self.writer.write_all(b"0000")?,
            PacketLine::Delim => self.writer.write_all(b"0001")?,
            PacketLine::ResponseEnd => self.writer.write_all(b"0002")?,
        }
        Ok(())
    }

    /// Writes a text line, appending a newline if missing.
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write(&PacketLine::Data(data))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PacketLine::Flush)
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the writer and returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(bytes: &[u8]) -> Result<Vec<PacketLine>> {
        let mut reader = PacketReader::new(Cursor::new(bytes.to_vec()));
        let mut out = Vec::new();
        while let Some(frame) = reader.read()? {
            out.push(frame);
        }
        Ok(out)
    }

    #[test]
    fn encodes_known_frames() {
        let mut buf = Vec::new();
        let mut writer = PacketWriter::new(&mut buf);
        writer.write(&PacketLine::text("hello\n")).unwrap();
        writer.flush_pkt().unwrap();
        assert_eq!(buf, b"000ahello\n0000");
    }

    #[test]
    fn control_packets_encode_as_reserved_lengths() {
        for (frame, wire) in [
            (PacketLine::Flush, &b"0000"[..]),
            (PacketLine::Delim, &b"0001"[..]),
            (PacketLine::ResponseEnd, &b"0002"[..]),
        ] {
            let mut buf = Vec::new();
            PacketWriter::new(&mut buf).write(&frame).unwrap();
            assert_eq!(buf, wire);
        }
    }

    #[test]
    fn roundtrip_preserves_frames() {
        let frames = vec![
            PacketLine::text("first\n"),
            PacketLine::Data(vec![0x00, 0xff, 0x7f]),
            PacketLine::Delim,
            PacketLine::text("second\n"),
            PacketLine::Flush,
        ];

        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            for frame in &frames {
                writer.write(frame).unwrap();
            }
        }

        assert_eq!(read_all(&buf).unwrap(), frames);
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn reserved_length_three_rejected() {
        assert!(matches!(
            read_all(b"0003"),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn non_hex_prefix_rejected() {
        assert!(matches!(
            read_all(b"00zz"),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn short_payload_rejected() {
        // Declares 10 bytes but carries only 3 of payload.
        assert!(matches!(
            read_all(b"000aabc"),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn oversized_frame_rejected_on_write() {
        let mut buf = Vec::new();
        let mut writer = PacketWriter::new(&mut buf);
        let frame = PacketLine::Data(vec![b'x'; MAX_PACKET_LEN - 3]);
        assert!(matches!(
            writer.write(&frame),
            Err(GitError::InvalidPktLine(_))
        ));
    }

    #[test]
    fn largest_legal_frame_roundtrips() {
        let frame = PacketLine::Data(vec![b'x'; MAX_PACKET_LEN - 4]);
        let mut buf = Vec::new();
        PacketWriter::new(&mut buf).write(&frame).unwrap();
        assert_eq!(read_all(&buf).unwrap(), vec![frame]);
    }

    #[test]
    fn empty_data_frame_roundtrips() {
        let frame = PacketLine::Data(Vec::new());
        let mut buf = Vec::new();
        PacketWriter::new(&mut buf).write(&frame).unwrap();
        assert_eq!(&buf, b"0004");
        assert_eq!(read_all(&buf).unwrap(), vec![frame]);
    }

    #[test]
    fn read_until_flush_stops_at_flush() {
        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            writer.write_line("one").unwrap();
            writer.write_line("two").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("after").unwrap();
        }

        let mut reader = PacketReader::new(Cursor::new(buf));
        let frames = reader.read_until_flush().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_text(), Some("one"));
    }

    #[test]
    fn write_line_appends_single_newline() {
        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            writer.write_line("plain").unwrap();
            writer.write_line("kept\n").unwrap();
        }
        let frames = read_all(&buf).unwrap();
        assert_eq!(frames[0].payload(), Some(&b"plain\n"[..]));
        assert_eq!(frames[1].payload(), Some(&b"kept\n"[..]));
    }

    #[test]
    fn as_text_trims_newline_and_rejects_binary() {
        assert_eq!(PacketLine::text("line\n").as_text(), Some("line"));
        assert_eq!(PacketLine::text("bare").as_text(), Some("bare"));
        assert!(PacketLine::Data(vec![0xff, 0xfe]).as_text().is_none());
        assert!(PacketLine::Flush.as_text().is_none());
    }

    #[test]
    fn partial_reads_reassemble_frames() {
        // A reader that hands out one byte at a time.
        struct OneByte<R>(R);
        impl<R: Read> Read for OneByte<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if buf.is_empty() {
                    return Ok(0);
                }
                self.0.read(&mut buf[..1])
            }
        }

        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            writer.write_line("chunked").unwrap();
            writer.flush_pkt().unwrap();
        }

        let mut reader = PacketReader::new(OneByte(Cursor::new(buf)));
        assert_eq!(
            reader.read().unwrap().unwrap().as_text(),
            Some("chunked")
        );
        assert!(reader.read().unwrap().unwrap().is_flush());
    }

    #[test]
    fn inner_mut_exposes_stream_position() {
        let mut buf = Vec::new();
        {
            let mut writer = PacketWriter::new(&mut buf);
            writer.write_line("head").unwrap();
            writer.flush_pkt().unwrap();
        }
        buf.extend_from_slice(b"TRAILING");

        let mut reader = PacketReader::new(Cursor::new(buf));
        reader.read_until_flush().unwrap();

        let mut rest = Vec::new();
        reader.inner_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"TRAILING");
    }
}
