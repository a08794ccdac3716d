//! Container codec
//!
//! A container carries exactly two named entries, `meta` and `data`, each an
//! independent gzip stream. Layout:
//!
//! ```text
//! magic "SGC1"
//! repeated: name_len:u16 BE | name | body_len:u32 BE | crc32(body):u32 BE | body
//! ```
//!
//! Unknown entries are skipped on unpack. Unpack yields both entries or fails;
//! there are no partial results.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

/// Leading bytes of every container
pub const MAGIC: &[u8; 4] = b"SGC1";

/// Entry holding the metadata record
pub const META_ENTRY: &str = "meta";

/// Entry holding the dataset
pub const DATA_ENTRY: &str = "data";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Container encode/decode errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("container does not start with the SGC1 magic")]
    BadMagic,

    #[error("container truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("container entry name is not valid UTF-8")]
    BadEntryName,

    #[error("container holds the '{0}' entry more than once")]
    DuplicateEntry(&'static str),

    #[error("container is missing the '{0}' entry")]
    MissingEntry(&'static str),

    #[error("entry '{name}' checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("entry '{name}' is not a valid gzip stream: {source}")]
    Decode { name: &'static str, source: io::Error },

    #[error("raw entry '{0}' is not gzip-compressed")]
    NotCompressed(&'static str),

    #[error("entry '{0}' exceeds the 4 GiB entry limit")]
    EntryTooLarge(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for codec operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Pack plain `meta` and `data` into a container, compressing both
pub fn pack(meta: &[u8], data: &[u8]) -> Result<Bytes> {
    pack_with(meta, data, false, false)
}

/// Pack `meta` and `data`, storing raw (already gzip-compressed) entries verbatim
pub fn pack_with(meta: &[u8], data: &[u8], meta_is_raw: bool, data_is_raw: bool) -> Result<Bytes> {
    let meta_body = entry_body(META_ENTRY, meta, meta_is_raw)?;
    let data_body = entry_body(DATA_ENTRY, data, data_is_raw)?;

    let mut out = Vec::with_capacity(MAGIC.len() + meta_body.len() + data_body.len() + 24);
    out.write_all(MAGIC)?;
    write_entry(&mut out, META_ENTRY, &meta_body)?;
    write_entry(&mut out, DATA_ENTRY, &data_body)?;
    Ok(Bytes::from(out))
}

/// Unpack a container into `(meta, data)`
///
/// A raw entry is returned still compressed, exactly as stored.
pub fn unpack<R: Read>(mut reader: R, meta_is_raw: bool, data_is_raw: bool) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    let (meta_body, data_body) = split_entries(&buf)?;
    let meta = open_entry(META_ENTRY, meta_body, meta_is_raw)?;
    let data = open_entry(DATA_ENTRY, data_body, data_is_raw)?;
    Ok((meta, data))
}

/// True when `bytes` starts with the gzip magic
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Gzip-compress `bytes`
pub fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Decompress a gzip stream of one or more members
///
/// Every input byte must belong to a valid member; trailing bytes are an
/// error.
pub fn gunzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut decoder = MultiGzDecoder::new(bytes);
    decoder.read_to_end(&mut out)?;
    let rest = decoder.get_ref().len();
    if rest > 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} trailing bytes after the last gzip member", rest),
        ));
    }
    Ok(out)
}

fn entry_body(name: &'static str, bytes: &[u8], is_raw: bool) -> Result<Vec<u8>> {
    if is_raw {
        if !is_gzip(bytes) {
            return Err(Error::NotCompressed(name));
        }
        return Ok(bytes.to_vec());
    }
    Ok(gzip(bytes)?)
}

fn write_entry(out: &mut Vec<u8>, name: &'static str, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len()).map_err(|_| Error::EntryTooLarge(name))?;
    // Entry names are crate constants, always short
    out.write_u16::<BigEndian>(name.len() as u16)?;
    out.write_all(name.as_bytes())?;
    out.write_u32::<BigEndian>(len)?;
    out.write_u32::<BigEndian>(crc32fast::hash(body))?;
    out.write_all(body)?;
    Ok(())
}

fn truncated(what: &'static str) -> impl FnOnce(io::Error) -> Error {
    move |_| Error::Truncated { what }
}

fn take<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize, what: &'static str) -> Result<&'a [u8]> {
    let buf: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or(Error::Truncated { what })?;
    cursor.set_position(end as u64);
    Ok(&buf[start..end])
}

fn split_entries(buf: &[u8]) -> Result<(&[u8], &[u8])> {
    let mut cursor = Cursor::new(buf);

    let magic = take(&mut cursor, MAGIC.len(), "magic")?;
    if magic != MAGIC {
        return Err(Error::BadMagic);
    }

    let mut meta = None;
    let mut data = None;

    while (cursor.position() as usize) < buf.len() {
        let name_len = cursor
            .read_u16::<BigEndian>()
            .map_err(truncated("entry name length"))?;
        let name = take(&mut cursor, name_len.into(), "entry name")?;
        let name = std::str::from_utf8(name).map_err(|_| Error::BadEntryName)?;

        let body_len = cursor
            .read_u32::<BigEndian>()
            .map_err(truncated("entry length"))?;
        let expected = cursor
            .read_u32::<BigEndian>()
            .map_err(truncated("entry checksum"))?;
        let body = take(&mut cursor, body_len as usize, "entry body")?;

        let slot = match name {
            META_ENTRY => &mut meta,
            DATA_ENTRY => &mut data,
            _ => continue,
        };

        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(Error::ChecksumMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        if slot.replace(body).is_some() {
            return Err(Error::DuplicateEntry(if name == META_ENTRY {
                META_ENTRY
            } else {
                DATA_ENTRY
            }));
        }
    }

    let meta = meta.ok_or(Error::MissingEntry(META_ENTRY))?;
    let data = data.ok_or(Error::MissingEntry(DATA_ENTRY))?;
    Ok((meta, data))
}

fn open_entry(name: &'static str, body: &[u8], is_raw: bool) -> Result<Vec<u8>> {
    if is_raw {
        return Ok(body.to_vec());
    }
    gunzip(body).map_err(|source| Error::Decode { name, source })
}
