//! Formatters which can read and write object files.
//!
//! The [`ObjFileFormat`] trait describes an implementation of reading/writing object files.
//! This module provides two implementations of the trait:
//! - [`BinaryFormat`]: A binary representation of object file data
//! - [`TextFormat`]: A text representation of object file data

use crate::ast::mach::fmt_word_fields;

use super::{ObjectFile, SymbolTable};

/// A trait defining object file formats.
pub trait ObjFileFormat {
    /// Representation of the serialized format.
    ///
    /// For binary formats, `[u8]` should be used.
    /// For text-based formats,`str` should be used.
    type Stream: ToOwned + ?Sized;
    /// Serializes into the stream format.
    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned;
    /// Deserializes from the stream format, returning `None`
    /// if an error occurred during deserialization.
    fn deserialize(i: &Self::Stream) -> Option<ObjectFile>;
}

// BINARY!
/// A binary format of object file data.
pub struct BinaryFormat;

const BFMT_MAGIC: &[u8] = b"lmc\x21\x10";
const BFMT_VER: &[u8] = b"\x00\x01";
impl ObjFileFormat for BinaryFormat {
    type Stream = [u8];

    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned {
        // Object file specification:
        //
        // The header consists of the magic number (b"lmc\x21\x10")
        // and the version (2 bytes).
        //
        // Data is divided into discrete chunks, which start with one of:
        // - 0x00: the assembled words
        // - 0x01: label symbol table entry
        // - 0x02: line table
        //
        // Block 0x00 consists of:
        // - the identifier byte 0x00 (1 byte)
        // - the number of words (2 bytes)
        // - the array of words (2n bytes)
        //
        // Block 0x01 consists of:
        // - the identifier byte 0x01 (1 byte)
        // - address of the label (2 bytes)
        // - the length of the label's name (8 bytes)
        // - the label (n bytes)
        //
        // Block 0x02 consists of:
        // - the identifier byte 0x02 (1 byte)
        // - the number of entries (8 bytes)
        // - the source line of each word (8n bytes)
        //
        // All integers are little-endian.

        let mut bytes = BFMT_MAGIC.to_vec();
        bytes.extend_from_slice(BFMT_VER);

        bytes.push(0x00);
        bytes.extend(u16::to_le_bytes(o.len() as u16));
        for &word in o.words() {
            bytes.extend(u16::to_le_bytes(word));
        }

        for (label, addr) in o.symbol_table().label_iter() {
            bytes.push(0x01);
            bytes.extend(u16::to_le_bytes(addr));
            bytes.extend(u64::to_le_bytes(label.len() as u64));
            bytes.extend_from_slice(label.as_bytes());
        }

        if !o.lines().is_empty() {
            bytes.push(0x02);
            bytes.extend(u64::to_le_bytes(o.lines().len() as u64));
            for &line in o.lines() {
                bytes.extend(u64::to_le_bytes(line as u64));
            }
        }

        bytes
    }

    fn deserialize(mut vec: &Self::Stream) -> Option<ObjectFile> {
        let mut words = None;
        let mut labels = vec![];
        let mut lines = vec![];

        vec = vec.strip_prefix(BFMT_MAGIC)?
            .strip_prefix(BFMT_VER)?;

        while let Some((ident_byte, rest)) = vec.split_first() {
            vec = rest;
            match ident_byte {
                0x00 => {
                    // only one word block is allowed
                    if words.is_some() { return None; }

                    let len = u16::from_le_bytes(take::<2>(&mut vec)?);
                    let data = take_slice(&mut vec, 2 * usize::from(len))?;
                    words = Some(map_chunks::<_, 2>(data, u16::from_le_bytes)?);
                },
                0x01 => {
                    let addr    = u16::from_le_bytes(take::<2>(&mut vec)?);
                    let str_len = usize::try_from(u64::from_le_bytes(take::<8>(&mut vec)?)).ok()?;
                    let string  = String::from_utf8(take_slice(&mut vec, str_len)?.to_vec()).ok()?;

                    labels.push((string, addr));
                },
                0x02 => {
                    let len  = usize::try_from(u64::from_le_bytes(take::<8>(&mut vec)?)).ok()?;
                    let data = take_slice(&mut vec, len.checked_mul(8)?)?;
                    lines = map_chunks::<_, 8>(data, |b| u64::from_le_bytes(b) as usize)?;
                },
                _ => return None
            }
        }

        ObjectFile::from_parts(words?, SymbolTable::from_labels(labels), lines)
    }
}

fn take<const N: usize>(data: &mut &[u8]) -> Option<[u8; N]> {
    take_slice(data, N)
        .and_then(|slice| <[_; N]>::try_from(slice).ok())
}
fn take_slice<'a>(data: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if n > data.len() { return None; }

    let (left, right) = data.split_at(n);
    *data = right;
    Some(left)
}
fn map_chunks<T, const N: usize>(data: &[u8], f: impl FnMut([u8; N]) -> T) -> Option<Vec<T>> {
    if data.len() % N != 0 { return None; }

    data.chunks_exact(N)
        .map(|c| <[_; N]>::try_from(c).ok())
        .collect::<Option<Vec<_>>>()
        .map(|chunks| chunks.into_iter().map(f).collect())
}

// TEXT!
/// A text-based format of object file data.
///
/// ```text
/// LMC OBJ FILE
///
/// .TEXT
/// 010100_00 00000101
/// 100110_00 00000000
/// 000000_00 00000000
///
/// .SYMBOL
/// start = 0
/// ```
///
/// Line info is not kept by this format.
pub struct TextFormat;

const TFMT_MAGIC: &str = "LMC OBJ FILE";

impl ObjFileFormat for TextFormat {
    type Stream = str;

    fn serialize(o: &ObjectFile) -> <Self::Stream as ToOwned>::Owned {
        let mut buf = String::new();
        buf.push_str(TFMT_MAGIC);
        buf.push_str("\n\n.TEXT\n");
        for &word in o.words() {
            buf.push_str(&fmt_word_fields(word));
            buf.push('\n');
        }

        buf.push_str("\n.SYMBOL\n");
        for (label, addr) in o.symbol_table().label_iter() {
            buf.push_str(&format!("{label} = {addr}\n"));
        }

        buf
    }

    fn deserialize(string: &Self::Stream) -> Option<ObjectFile> {
        let mut words = None;
        let mut labels = vec![];

        // Read all of the non-empty lines:
        let mut lines = string.trim().lines()
            .map(|l| l.split_once("//").map_or(l, |(left, _)| left).trim()) // remove comments
            .filter(|l| !l.is_empty());
        if lines.next() != Some(TFMT_MAGIC) { return None };

        let mut line_groups: Vec<Vec<&str>> = vec![];
        for line in lines {
            if line.starts_with('.') {
                line_groups.push(vec![line]);
            } else {
                line_groups.last_mut()?.push(line);
            }
        }

        for group in line_groups {
            let [header, rest @ ..] = &*group else { return None };
            match *header {
                ".TEXT" => {
                    if words.is_some() { return None; }
                    words = Some(rest.iter().map(|l| parse_word_fields(l)).collect::<Option<Vec<_>>>()?);
                },
                ".SYMBOL" => for line in rest {
                    let (label, addr) = line.split_once('=')?;
                    labels.push((label.trim().to_string(), addr.trim().parse::<u16>().ok()?));
                },
                _ => return None
            }
        }

        ObjectFile::from_parts(words?, SymbolTable::from_labels(labels), vec![])
    }
}

/// Parses a word in `oooooo_mm aaaaaaaa` form.
fn parse_word_fields(s: &str) -> Option<u16> {
    let (op, rest) = s.split_once('_')?;
    let (mode, addr) = rest.split_once(' ')?;

    let field = |digits: &str, len: usize| match digits.len() == len && digits.bytes().all(|b| b == b'0' || b == b'1') {
        true  => u16::from_str_radix(digits, 2).ok(),
        false => None,
    };
    Some(field(op, 6)? << 10 | field(mode, 2)? << 8 | field(addr, 8)?)
}
