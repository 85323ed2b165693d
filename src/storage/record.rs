//! Commit record format
//!
//! One record is appended per committed write-transaction:
//!
//! ```text
//! +------------------+
//! | Record Length    | (u32 LE, includes every field below)
//! +------------------+
//! | Header Checksum  | (u32 LE, CRC32 of the length field)
//! +------------------+
//! | Sequence         | (u64 LE, strictly increasing)
//! +------------------+
//! | Op Count         | (u32 LE)
//! +------------------+
//! | Ops              | (see below)
//! +------------------+
//! | Checksum         | (u32 LE)
//! +------------------+
//! ```
//!
//! Each op is `tag (u8) | bucket (u32-prefixed UTF-8) | key (u32-prefixed)`
//! followed by a u32-prefixed value for puts. The trailing checksum covers
//! all bytes before it.
//!
//! The header checksum lets a reader trust a length field before the rest of
//! the record is available. Only a record with a verified header whose
//! declared end lies past the end of the data counts as truncated; a damaged
//! length field is corruption.

use std::io::{self, Cursor, Read};

use super::checksum::{compute_checksum, verify_checksum};

/// Length field plus its checksum.
pub const HEADER_SIZE: usize = 4 + 4;

/// Smallest possible record: header + sequence + op count + checksum.
pub const MIN_RECORD_SIZE: usize = HEADER_SIZE + 8 + 4 + 4;

const TAG_CREATE_BUCKET: u8 = 0;
const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// A single mutation inside a commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a bucket if it does not exist
    CreateBucket { bucket: String },
    /// Insert or overwrite a key
    Put {
        bucket: String,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// Remove a key (absent keys are a no-op on replay)
    Delete { bucket: String, key: Vec<u8> },
}

impl Op {
    fn tag(&self) -> u8 {
        match self {
            Op::CreateBucket { .. } => TAG_CREATE_BUCKET,
            Op::Put { .. } => TAG_PUT,
            Op::Delete { .. } => TAG_DELETE,
        }
    }

    fn bucket(&self) -> &str {
        match self {
            Op::CreateBucket { bucket } | Op::Put { bucket, .. } | Op::Delete { bucket, .. } => {
                bucket
            }
        }
    }
}

/// All mutations of one committed write-transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit sequence number
    pub sequence: u64,
    /// Mutations in the order they were issued
    pub ops: Vec<Op>,
}

/// Narrows a length to the on-disk u32, refusing anything that does not fit.
fn encoded_len(len: usize, what: &str) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} too large to encode: {} bytes", what, len),
        )
    })
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8], what: &str) -> io::Result<()> {
    buf.extend_from_slice(&encoded_len(bytes.len(), what)?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    String::from_utf8(read_bytes(reader)?)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e)))
}

impl CommitRecord {
    /// Create a record for the given sequence and ops
    pub fn new(sequence: u64, ops: Vec<Op>) -> Self {
        Self { sequence, ops }
    }

    fn serialize_body(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&encoded_len(self.ops.len(), "op count")?.to_le_bytes());

        for op in &self.ops {
            buf.push(op.tag());
            put_bytes(&mut buf, op.bucket().as_bytes(), "bucket name")?;
            match op {
                Op::CreateBucket { .. } => put_bytes(&mut buf, &[], "key")?,
                Op::Put { key, value, .. } => {
                    put_bytes(&mut buf, key, "key")?;
                    put_bytes(&mut buf, value, "value")?;
                }
                Op::Delete { key, .. } => put_bytes(&mut buf, key, "key")?,
            }
        }

        Ok(buf)
    }

    /// Serialize the complete record: header, body, checksum.
    ///
    /// Fails with `InvalidInput` when any length does not fit in a u32.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let body = self.serialize_body()?;
        let record_length = encoded_len(
            HEADER_SIZE
                .checked_add(body.len())
                .and_then(|n| n.checked_add(4))
                .unwrap_or(usize::MAX),
            "record",
        )?;

        let mut record = Vec::with_capacity(record_length as usize);
        let length_bytes = record_length.to_le_bytes();
        record.extend_from_slice(&length_bytes);
        record.extend_from_slice(&compute_checksum(&length_bytes).to_le_bytes());
        record.extend_from_slice(&body);

        let checksum = compute_checksum(&record);
        record.extend_from_slice(&checksum.to_le_bytes());
        Ok(record)
    }

    /// Deserialize a record from the front of `data`, verifying its checksum.
    ///
    /// Returns the record and the number of bytes consumed. A header cut
    /// short, or a verified header declaring an end past `data`, yields
    /// `UnexpectedEof`; anything else that is wrong yields `InvalidData`.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Record header truncated",
            ));
        }

        let length_bytes = [data[0], data[1], data[2], data[3]];
        let header_checksum = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if !verify_checksum(&length_bytes, header_checksum) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Header checksum mismatch",
            ));
        }

        let record_length = u32::from_le_bytes(length_bytes) as usize;

        if record_length < MIN_RECORD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid record length: {}", record_length),
            ));
        }

        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Record truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let stored_checksum = u32::from_le_bytes([
            data[checksum_offset],
            data[checksum_offset + 1],
            data[checksum_offset + 2],
            data[checksum_offset + 3],
        ]);
        if !verify_checksum(&data[..checksum_offset], stored_checksum) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Checksum mismatch: computed {:08x}, stored {:08x}",
                    compute_checksum(&data[..checksum_offset]),
                    stored_checksum
                ),
            ));
        }

        let mut cursor = Cursor::new(&data[HEADER_SIZE..checksum_offset]);
        let invalid = |e: io::Error| io::Error::new(io::ErrorKind::InvalidData, e.to_string());

        let mut seq_buf = [0u8; 8];
        cursor.read_exact(&mut seq_buf).map_err(invalid)?;
        let sequence = u64::from_le_bytes(seq_buf);

        let mut count_buf = [0u8; 4];
        cursor.read_exact(&mut count_buf).map_err(invalid)?;
        let op_count = u32::from_le_bytes(count_buf) as usize;

        let mut ops = Vec::with_capacity(op_count.min(1024));
        for _ in 0..op_count {
            let mut tag = [0u8; 1];
            cursor.read_exact(&mut tag).map_err(invalid)?;
            let bucket = read_string(&mut cursor).map_err(invalid)?;
            let key = read_bytes(&mut cursor).map_err(invalid)?;

            let op = match tag[0] {
                TAG_CREATE_BUCKET => Op::CreateBucket { bucket },
                TAG_PUT => {
                    let value = read_bytes(&mut cursor).map_err(invalid)?;
                    Op::Put { bucket, key, value }
                }
                TAG_DELETE => Op::Delete { bucket, key },
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown op tag: {}", other),
                    ))
                }
            };
            ops.push(op);
        }

        if cursor.position() as usize != checksum_offset - HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Trailing bytes after last op",
            ));
        }

        Ok((Self { sequence, ops }, record_length))
    }
}
