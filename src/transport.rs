//! The framed duplex byte channel carrying envelopes between an OS-backed
//! child and the runtime broker that owns it.
//!
//! A frame is a 4-byte little-endian length prefix followed by a
//! `bincode`-encoded payload. Thread-backed processes never touch this
//! module; they hand envelopes directly through an in-process channel.

use std::io::{self, Read, Write};

use log::warn;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::TransportError;
use crate::identity::Identity;
use crate::term::Envelope;

/// A frame sent from a child to the broker: the destination identity (the
/// child doesn't know whether it's thread-backed, root-resident, or another
/// OS-backed child) plus the envelope itself.
pub type ChildToBrokerFrame = (Identity, Envelope);

/// A frame sent from the broker to a child: just the envelope, since a
/// child has exactly one parent pipe and needs no destination tag.
pub type BrokerToChildFrame = Envelope;

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), TransportError> {
    let bytes = bincode::serialize(value)?;
    let len = u32::try_from(bytes.len()).map_err(|_| {
        TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, "frame too large"))
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame. Returns `Ok(None)` on a clean EOF before any bytes of
/// the next frame's length prefix arrive — the caller treats this as the
/// child having exited.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>, TransportError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    let value = bincode::deserialize(&buf)?;
    Ok(Some(value))
}

/// Spawns the reader thread that drains an OS-backed child's stdout and
/// forwards decoded `(destination, envelope)` frames to `on_frame`. Calls
/// `on_eof` exactly once, whether the pipe closed cleanly or a transport
/// error occurred, so the caller can drive the same `process-exited`
/// fan-out either way.
pub fn spawn_child_reader<R, F, G>(mut stdout: R, mut on_frame: F, mut on_eof: G)
where
    R: Read + Send + 'static,
    F: FnMut(Identity, Envelope) + Send + 'static,
    G: FnMut() + Send + 'static,
{
    std::thread::spawn(move || loop {
        match read_frame::<_, ChildToBrokerFrame>(&mut stdout) {
            Ok(Some((destination, envelope))) => on_frame(destination, envelope),
            Ok(None) => {
                on_eof();
                break;
            }
            Err(err) => {
                warn!("transport read error, treating as child exit: {err}");
                on_eof();
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    #[test]
    fn frame_round_trips() {
        let mut buf = Vec::new();
        let frame: ChildToBrokerFrame = (Identity::next(), vec![Term::atom("ping")]);
        write_frame(&mut buf, &frame).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let decoded: ChildToBrokerFrame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.1, frame.1);
    }

    #[test]
    fn empty_stream_reads_as_eof() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        let decoded: Option<ChildToBrokerFrame> = read_frame(&mut cursor).unwrap();
        assert!(decoded.is_none());
    }
}
