//! Call log: every accepted call, in sequence order, as prost frames.
//!
//! On disk each frame is `[u32 LE payload length][ProtoCallEnvelope]`.
//! A frame is either fully present and synced or not present at all:
//! a failed append cuts the file back to where it started, and a log
//! that ends inside a frame (length prefix included) is refused on open.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::{debug, warn};

use crate::proto_types::ProtoCallEnvelope;

const PREFIX_LEN: usize = 4;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append-only call log backed by a single file.
pub struct EventStore {
    path: PathBuf,
    last_sequence: u64,
    /// Byte length of the log up to the last complete frame.
    committed_len: u64,
    #[cfg(test)]
    pub(crate) fail_sync: bool,
}

impl EventStore {
    /// Open or create the log at `path`. The whole file is scanned, so a
    /// torn or undecodable frame fails here rather than on a later append.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (last_sequence, committed_len) = if path.exists() {
            let records = scan(path)?;
            let len = std::fs::metadata(path)?.len();
            (records.last().map_or(0, |r| r.sequence), len)
        } else {
            (0, 0)
        };

        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
            committed_len,
            #[cfg(test)]
            fail_sync: false,
        })
    }

    /// Append one record. It must carry the next sequence number.
    ///
    /// Returns only after the frame is on disk. On any failure the file is
    /// truncated back to its previous length and the sequence is not
    /// advanced, so the same record can be retried.
    pub fn append_event(&mut self, record: &ProtoCallEnvelope) -> io::Result<()> {
        let expected = self.last_sequence.checked_add(1);
        if expected != Some(record.sequence) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "call log at sequence {} cannot take sequence {}",
                    self.last_sequence, record.sequence
                ),
            ));
        }

        let frame = encode_frame(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if let Err(err) = file.write_all(&frame).and_then(|()| self.sync(&file)) {
            self.roll_back(&file);
            return Err(err);
        }

        self.committed_len += frame.len() as u64;
        self.last_sequence = record.sequence;
        debug!(sequence = record.sequence, bytes = frame.len(), "call appended");
        Ok(())
    }

    /// Load every record in the log, in sequence order.
    pub fn load_all_events(&self) -> io::Result<Vec<ProtoCallEnvelope>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        scan(&self.path)
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    fn sync(&self, file: &File) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_sync {
            return Err(io::Error::new(io::ErrorKind::Other, "sync refused"));
        }
        file.sync_all()
    }

    /// Cut a partially written frame off the end of the log.
    fn roll_back(&self, file: &File) {
        let restored = file
            .set_len(self.committed_len)
            .and_then(|()| file.sync_all());
        if let Err(err) = restored {
            warn!(
                path = %self.path.display(),
                len = self.committed_len,
                error = %err,
                "could not truncate failed append; the log will refuse to reopen"
            );
        }
    }
}

fn encode_frame(record: &ProtoCallEnvelope) -> io::Result<Vec<u8>> {
    let payload = record.encode_to_vec();
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|l| *l as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("call record too large: {} bytes", payload.len()),
            )
        })?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read as much of `buf` as the file still holds. Returns the byte count.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn corrupt(records: usize, what: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("call log corrupt after {} records: {}", records, what),
    )
}

fn scan(path: &Path) -> io::Result<Vec<ProtoCallEnvelope>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records: Vec<ProtoCallEnvelope> = Vec::new();
    let mut prefix = [0u8; PREFIX_LEN];

    loop {
        match read_up_to(&mut reader, &mut prefix)? {
            0 => break,
            PREFIX_LEN => {}
            n => {
                return Err(corrupt(
                    records.len(),
                    format!("torn length prefix ({} of {} bytes)", n, PREFIX_LEN),
                ))
            }
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(corrupt(records.len(), format!("frame length {}", len)));
        }

        let mut payload = vec![0u8; len];
        let got = read_up_to(&mut reader, &mut payload)?;
        if got < len {
            return Err(corrupt(
                records.len(),
                format!("truncated frame ({} of {} bytes)", got, len),
            ));
        }

        let record = ProtoCallEnvelope::decode(payload.as_slice())
            .map_err(|e| corrupt(records.len(), format!("undecodable frame: {}", e)))?;

        let expected = records.last().map_or(1, |r| r.sequence.saturating_add(1));
        if record.sequence != expected {
            return Err(corrupt(
                records.len(),
                format!("sequence {} where {} was expected", record.sequence, expected),
            ));
        }
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(sequence: u64) -> ProtoCallEnvelope {
        ProtoCallEnvelope {
            sequence,
            caller: vec![0u8; 32],
            selector: "init_cycle".to_string(),
            calldata: vec![vec![0u8; 32], vec![0u8; 32]],
            schema_version: 1,
        }
    }

    fn log_with(dir: &Path, n: u64) -> (PathBuf, EventStore) {
        let path = dir.join("events.log");
        let mut store = EventStore::open(&path).unwrap();
        for seq in 1..=n {
            store.append_event(&record(seq)).unwrap();
        }
        (path, store)
    }

    #[test]
    fn test_partial_length_prefix_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = log_with(dir.path(), 2);
        drop(store);

        for torn in [&[0x50u8][..], &[0x50, 0x00][..], &[0x50, 0x00, 0x00][..]] {
            let mut bytes = fs::read(&path).unwrap();
            let clean_len = bytes.len();
            bytes.extend_from_slice(torn);
            fs::write(&path, &bytes).unwrap();

            let err = EventStore::open(&path).err().expect("torn prefix accepted");
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
            assert!(err.to_string().contains("torn length prefix"));

            bytes.truncate(clean_len);
            fs::write(&path, &bytes).unwrap();
        }
        assert_eq!(EventStore::open(&path).unwrap().last_sequence(), 2);
    }

    #[test]
    fn test_failed_sync_truncates_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (path, mut store) = log_with(dir.path(), 1);
        let len_before = fs::metadata(&path).unwrap().len();

        store.fail_sync = true;
        assert!(store.append_event(&record(2)).is_err());
        assert_eq!(store.last_sequence(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);

        store.fail_sync = false;
        store.append_event(&record(2)).unwrap();
        let sequences: Vec<u64> = EventStore::open(&path)
            .unwrap()
            .load_all_events()
            .unwrap()
            .iter()
            .map(|r| r.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_repeated_sequence_on_disk_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = log_with(dir.path(), 1);
        drop(store);
        let frame = encode_frame(&record(1)).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&frame);
        fs::write(&path, &bytes).unwrap();

        let err = EventStore::open(&path).err().expect("duplicate frame accepted");
        assert!(err.to_string().contains("sequence 1 where 2 was expected"));
    }
}
