//! On-disk cache binary format (spec.md §3, §6): header `"CTC\0"` + 4 flag
//! bytes, then back-to-back word-aligned entries of
//! `{size:u32, duration:i32, mtime:i32|i64, strings...}`.
//!
//! Open question resolved (see DESIGN.md): the byte order of multi-byte
//! header/record fields is native-endian, with the BE flag bit recording
//! whatever the writer's host order was, so a reader on a different-endian
//! host can detect the mismatch. This implementation does not attempt
//! cross-endian reads; a foreign-endian cache is treated as corrupt, a
//! conservative choice since endianness is explicitly left open by the
//! format. Writers always emit 64-bit mtimes; readers accept either width
//! via the flag bit.

use super::track_info::{Comment, TrackInfo};
use byteorder::{ByteOrder, NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};

pub const MAGIC: &[u8; 4] = b"CTC\0";
const FLAG_64_BIT_MTIME: u8 = 0x01;
const FLAG_BIG_ENDIAN: u8 = 0x02;
const HEADER_LEN: usize = 8;
const ALIGN: usize = 8;
const ENTRY_HEADER_LEN_32: usize = 4 + 4 + 4; // size, duration, 32-bit mtime
const ENTRY_HEADER_LEN_64: usize = 4 + 4 + 8; // size, duration, 64-bit mtime

#[derive(Debug, Clone, Copy)]
pub struct CacheFlags {
    pub wide_mtime: bool,
    pub big_endian: bool,
}

impl CacheFlags {
    pub fn native() -> Self {
        CacheFlags {
            wide_mtime: true,
            big_endian: cfg!(target_endian = "big"),
        }
    }

    fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.wide_mtime {
            b |= FLAG_64_BIT_MTIME;
        }
        if self.big_endian {
            b |= FLAG_BIG_ENDIAN;
        }
        b
    }

    fn from_byte(b: u8) -> Self {
        CacheFlags {
            wide_mtime: b & FLAG_64_BIT_MTIME != 0,
            big_endian: b & FLAG_BIG_ENDIAN != 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheFormatError {
    #[error("bad magic header")]
    BadMagic,
    #[error("cache written on a different-endian host, treated as corrupt")]
    ForeignEndian,
    #[error("truncated or invalid entry at offset {0}")]
    TruncatedEntry(usize),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid string table")]
    InvalidStrings,
}

fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}

/// Parses the full contents of a cache file into a list of `TrackInfo`.
/// Returns `Err` (and the caller drops/rebuilds the whole cache) on any
/// validation failure: an all-or-nothing "corrupt" outcome rather than a
/// partially populated table.
pub fn parse(buf: &[u8]) -> Result<Vec<TrackInfo>, CacheFormatError> {
    if buf.len() < HEADER_LEN || &buf[0..4] != MAGIC {
        return Err(CacheFormatError::BadMagic);
    }
    let flags = CacheFlags::from_byte(buf[7]);
    if flags.big_endian != cfg!(target_endian = "big") {
        return Err(CacheFormatError::ForeignEndian);
    }

    let entry_header_len = if flags.wide_mtime {
        ENTRY_HEADER_LEN_64
    } else {
        ENTRY_HEADER_LEN_32
    };

    let mut entries = Vec::new();
    let mut offset = HEADER_LEN;

    while offset < buf.len() {
        let avail = buf.len() - offset;
        if avail < entry_header_len {
            return Err(CacheFormatError::TruncatedEntry(offset));
        }
        let mut cursor = Cursor::new(&buf[offset..]);
        let size = read_u32(&mut cursor, flags)? as usize;
        let duration = read_i32(&mut cursor, flags)?;
        let mtime = if flags.wide_mtime {
            read_i64(&mut cursor, flags)?
        } else {
            read_i32(&mut cursor, flags)? as i64
        };

        if size < entry_header_len || size > avail {
            return Err(CacheFormatError::TruncatedEntry(offset));
        }

        let strings = &buf[offset + entry_header_len..offset + size];
        if strings.is_empty() || *strings.last().unwrap() != 0 {
            return Err(CacheFormatError::InvalidStrings);
        }
        let nul_count = strings.iter().filter(|&&b| b == 0).count();
        if nul_count % 2 == 0 {
            // filename + comments must be an odd number of NUL-terminated
            // strings: 1 (filename) + 2*N (key, value pairs).
            return Err(CacheFormatError::InvalidStrings);
        }

        let mut parts = strings.split(|&b| b == 0);
        let filename = parts
            .next()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or(CacheFormatError::InvalidStrings)?;

        let mut comments = Vec::new();
        let mut rest: Vec<&[u8]> = parts.collect();
        // `split` on a trailing-NUL buffer yields one trailing empty slice;
        // drop it before pairing up comments.
        if rest.last().map_or(false, |s| s.is_empty()) {
            rest.pop();
        }
        let mut iter = rest.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            comments.push(Comment {
                key: String::from_utf8_lossy(k).into_owned(),
                value: String::from_utf8_lossy(v).into_owned(),
            });
        }

        entries.push(TrackInfo {
            path: filename,
            duration,
            mtime,
            comments,
        });

        offset += align_up(size);
    }

    Ok(entries)
}

/// Serializes `entries` (already sorted by path by the caller) into the
/// on-disk layout, always writing wide (64-bit) mtimes per the redesign
/// note.
pub fn serialize(entries: &[TrackInfo]) -> Vec<u8> {
    let flags = CacheFlags::native();
    let mut out = Vec::with_capacity(HEADER_LEN + entries.len() * 64);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[0, 0, 0, flags.to_byte()]);

    let mut offset = HEADER_LEN;
    for ti in entries {
        let mut strings = Vec::new();
        strings.extend_from_slice(ti.path.as_bytes());
        strings.push(0);
        for c in &ti.comments {
            strings.extend_from_slice(c.key.as_bytes());
            strings.push(0);
            strings.extend_from_slice(c.value.as_bytes());
            strings.push(0);
        }

        let size = ENTRY_HEADER_LEN_64 + strings.len();
        let pad = align_up(offset) - offset;
        out.resize(out.len() + pad, 0);

        let mut header = Vec::with_capacity(ENTRY_HEADER_LEN_64);
        header.write_u32::<NativeEndian>(size as u32).unwrap();
        header.write_i32::<NativeEndian>(ti.duration).unwrap();
        header.write_i64::<NativeEndian>(ti.mtime).unwrap();

        out.extend_from_slice(&header);
        out.extend_from_slice(&strings);

        offset += pad + size;
    }

    out
}

fn read_u32(cursor: &mut Cursor<&[u8]>, flags: CacheFlags) -> Result<u32, CacheFormatError> {
    let mut b = [0u8; 4];
    io::Read::read_exact(cursor, &mut b)?;
    Ok(if flags.big_endian {
        u32::from_be_bytes(b)
    } else {
        u32::from_le_bytes(b)
    })
}

fn read_i32(cursor: &mut Cursor<&[u8]>, flags: CacheFlags) -> Result<i32, CacheFormatError> {
    Ok(read_u32(cursor, flags)? as i32)
}

fn read_i64(cursor: &mut Cursor<&[u8]>, flags: CacheFlags) -> Result<i64, CacheFormatError> {
    let mut b = [0u8; 8];
    io::Read::read_exact(cursor, &mut b)?;
    Ok(if flags.big_endian {
        i64::from_be_bytes(b)
    } else {
        i64::from_le_bytes(b)
    })
}

/// Writes `buf` to `tmp_path` then renames it over `final_path`, the
/// atomic-save dance from spec.md §4.5/§6.
pub fn atomic_write(
    final_path: &std::path::Path,
    tmp_path: &std::path::Path,
    buf: &[u8],
) -> io::Result<()> {
    {
        let mut f = std::fs::File::create(tmp_path)?;
        f.write_all(buf)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp_path, final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TrackInfo> {
        vec![
            TrackInfo {
                path: "/a.mp3".into(),
                duration: 123,
                mtime: 1_700_000_000,
                comments: vec![
                    Comment { key: "artist".into(), value: "A".into() },
                    Comment { key: "title".into(), value: "Song A".into() },
                ],
            },
            TrackInfo {
                path: "/b.flac".into(),
                duration: -1,
                mtime: 0,
                comments: vec![],
            },
        ]
    }

    #[test]
    fn round_trips_entries_and_comment_order() {
        let entries = sample();
        let buf = serialize(&entries);
        let parsed = parse(&buf).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 16];
        assert!(matches!(parse(&buf), Err(CacheFormatError::BadMagic)));
    }

    #[test]
    fn entries_are_word_aligned() {
        let entries = sample();
        let buf = serialize(&entries);
        // Second entry must start at a multiple-of-8 offset from the file start.
        let first_size = {
            let mut cur = Cursor::new(&buf[HEADER_LEN..]);
            read_u32(&mut cur, CacheFlags::native()).unwrap() as usize
        };
        let second_offset = align_up(HEADER_LEN + first_size);
        assert_eq!(second_offset % ALIGN, 0);
        assert!(second_offset < buf.len());
    }
}
