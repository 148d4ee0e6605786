//! Binary wire format: `TYPE_BYTE NAME_FIELD VALUE_FIELD`, recursively,
//! with names and string values percent-encoded to pure ASCII.
//!
//! See spec.md §4.1 for the format and §9 for the three points this
//! implementation fixes among several reasonable choices:
//! - safe (unescaped) bytes are `[A-Za-z0-9]` plus `-._~` (RFC 3986
//!   unreserved characters); everything else, including the space and
//!   quote bytes the format itself uses as delimiters, is escaped. This
//!   keeps percent-encoded tokens free of any byte the single-pass
//!   decoder below treats as structural.
//! - an absent name is written as the literal `""` token (no content)
//!   followed by the mandatory space; the decoder accepts a zero-length
//!   quoted name as "no name" on read.
//! - pointer nodes are skipped entirely during encode (no bytes emitted
//!   for them, including inside a struct/list), matching the reference
//!   behavior spec.md calls out.

use crate::error::DecodeError;
use crate::tree::{Ddf, NodeId, Tag};

const TYPE_EMPTY: u8 = b'e';
const TYPE_STRING: u8 = b's';
const TYPE_INT: u8 = b'i';
const TYPE_FLOAT: u8 = b'f';
const TYPE_STRUCT_OPEN: u8 = b'{';
const TYPE_STRUCT_CLOSE: u8 = b'}';
const TYPE_LIST_OPEN: u8 = b'[';
const TYPE_LIST_CLOSE: u8 = b']';
const TYPE_STRING_UNSAFE: u8 = b'u';

const QUOTE: u8 = b'"';
const SPACE: u8 = b' ';

#[inline]
fn is_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes arbitrary bytes into a pure-ASCII token. Any byte
/// outside `[A-Za-z0-9._~-]` becomes an upper-case `%HH` triplet; bytes
/// are never reinterpreted as code points, so a multi-byte UTF-8
/// character becomes one triplet per raw byte.
pub fn encode_bytes(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input {
        if is_safe_byte(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Inverse of [`encode_bytes`]. Rejects malformed `%` escapes.
pub fn decode_bytes(input: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(DecodeError::InvalidPercentEncoding(i));
            }
            let hi = hex_val(bytes[i + 1]).ok_or(DecodeError::InvalidPercentEncoding(i))?;
            let lo = hex_val(bytes[i + 2]).ok_or(DecodeError::InvalidPercentEncoding(i))?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serializes the subtree rooted at `id`. Pointer nodes anywhere in the
/// tree (including as the root) produce no bytes.
pub fn encode(tree: &Ddf, id: NodeId) -> Vec<u8> {
    let mut out = Vec::new();
    encode_node(tree, id, &mut out);
    out
}

fn encode_node(tree: &Ddf, id: NodeId, out: &mut Vec<u8>) {
    if tree.is_pointer(id) {
        return;
    }

    let type_byte = match tree.tag(id) {
        Tag::Empty | Tag::Null => TYPE_EMPTY,
        Tag::String => TYPE_STRING,
        Tag::StringUnsafe => TYPE_STRING_UNSAFE,
        Tag::Int => TYPE_INT,
        Tag::Float => TYPE_FLOAT,
        Tag::Struct => TYPE_STRUCT_OPEN,
        Tag::List => TYPE_LIST_OPEN,
        Tag::Pointer => unreachable!("pointers return above"),
    };
    out.push(type_byte);

    out.push(QUOTE);
    if let Some(name) = tree.name(id) {
        out.extend_from_slice(encode_bytes(name.as_bytes()).as_bytes());
    }
    out.push(QUOTE);
    out.push(SPACE);

    match tree.tag(id) {
        Tag::Empty | Tag::Null => {}
        Tag::String => {
            let s = tree.as_str(id).unwrap_or_default();
            out.push(QUOTE);
            out.extend_from_slice(encode_bytes(s.as_bytes()).as_bytes());
            out.push(QUOTE);
        }
        Tag::StringUnsafe => {
            let b = tree.as_unsafe_bytes(id).unwrap_or_default();
            out.push(QUOTE);
            out.extend_from_slice(encode_bytes(b).as_bytes());
            out.push(QUOTE);
        }
        Tag::Int => {
            let n = tree.as_int(id).unwrap_or(0);
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Tag::Float => {
            let f = tree.as_float(id).unwrap_or(0.0);
            out.extend_from_slice(format_float(f).as_bytes());
        }
        Tag::Struct => {
            if let Some(entries) = tree.struct_entries(id) {
                for (_, child) in entries {
                    encode_node(tree, child, out);
                }
            }
            out.push(TYPE_STRUCT_CLOSE);
        }
        Tag::List => {
            if let Some(items) = tree.list_entries(id) {
                for &child in items {
                    encode_node(tree, child, out);
                }
            }
            out.push(TYPE_LIST_CLOSE);
        }
        Tag::Pointer => unreachable!(),
    }
}

/// Shortest round-trippable decimal rendering of `f`, the way spec.md's
/// "shortest unambiguous decimal" reads. Rust's `Display` for `f64`
/// already produces the shortest round-trippable form; we only special
/// case non-finite values, which have no literal form on the wire.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format!("{}", f)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parses a single top-level node from `input`, failing if any trailing
/// bytes remain. Inserts the parsed subtree into `tree` and returns the
/// root's `NodeId`.
pub fn decode(tree: &mut Ddf, input: &[u8]) -> Result<NodeId, DecodeError> {
    let mut pos = 0usize;
    let root = parse_node(tree, input, &mut pos)?;
    if pos != input.len() {
        return Err(DecodeError::TrailingBytes(pos));
    }
    Ok(root)
}

fn parse_node(tree: &mut Ddf, input: &[u8], pos: &mut usize) -> Result<NodeId, DecodeError> {
    let type_byte = next_byte(input, pos)?;

    let name = parse_name_field(input, pos)?;

    let id = match type_byte {
        TYPE_EMPTY => tree.empty(),
        TYPE_STRING => {
            let raw = parse_quoted(input, pos)?;
            let s = String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(*pos))?;
            tree.string(s)
        }
        TYPE_STRING_UNSAFE => {
            let raw = parse_quoted(input, pos)?;
            tree.unsafe_string(raw)
        }
        TYPE_INT => {
            let n = parse_integer(input, pos)?;
            tree.integer(n)
        }
        TYPE_FLOAT => {
            let f = parse_float(input, pos)?;
            tree.floating(f)
        }
        TYPE_STRUCT_OPEN => {
            let id = tree.structure();
            loop {
                if peek_byte(input, *pos) == Some(TYPE_STRUCT_CLOSE) {
                    *pos += 1;
                    break;
                }
                if *pos >= input.len() {
                    return Err(DecodeError::UnterminatedContainer('}', *pos));
                }
                let child = parse_node(tree, input, pos)?;
                let _ = tree.add(id, child);
            }
            id
        }
        TYPE_LIST_OPEN => {
            let id = tree.list();
            loop {
                if peek_byte(input, *pos) == Some(TYPE_LIST_CLOSE) {
                    *pos += 1;
                    break;
                }
                if *pos >= input.len() {
                    return Err(DecodeError::UnterminatedContainer(']', *pos));
                }
                let child = parse_node(tree, input, pos)?;
                let _ = tree.add(id, child);
            }
            id
        }
        other => return Err(DecodeError::UnknownTypeByte(other, *pos - 1)),
    };

    if let Some(name) = name {
        tree.set_name(id, name);
    }

    Ok(id)
}

fn parse_name_field(input: &[u8], pos: &mut usize) -> Result<Option<String>, DecodeError> {
    let raw = parse_quoted(input, pos)?;
    let space = next_byte(input, pos)?;
    if space != SPACE {
        return Err(DecodeError::ExpectedSpace(*pos - 1));
    }
    if raw.is_empty() {
        Ok(None)
    } else {
        let s = String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8(*pos))?;
        Ok(Some(s))
    }
}

/// Parses a `"...percent-encoded..."` token, consuming the closing quote.
/// Does not consume any separator after the quote.
fn parse_quoted(input: &[u8], pos: &mut usize) -> Result<Vec<u8>, DecodeError> {
    let open = next_byte(input, pos)?;
    if open != QUOTE {
        return Err(DecodeError::ExpectedQuote(*pos - 1));
    }
    let start = *pos;
    while peek_byte(input, *pos) != Some(QUOTE) {
        if *pos >= input.len() {
            return Err(DecodeError::UnexpectedEof(*pos));
        }
        *pos += 1;
    }
    let token = std::str::from_utf8(&input[start..*pos]).map_err(|_| DecodeError::InvalidUtf8(start))?;
    let decoded = decode_bytes(token)?;
    *pos += 1; // closing quote
    Ok(decoded)
}

fn parse_integer(input: &[u8], pos: &mut usize) -> Result<i32, DecodeError> {
    let start = *pos;
    if peek_byte(input, *pos) == Some(b'-') {
        *pos += 1;
    }
    let digits_start = *pos;
    while matches!(peek_byte(input, *pos), Some(b'0'..=b'9')) {
        *pos += 1;
    }
    if *pos == digits_start {
        return Err(DecodeError::InvalidInteger(start));
    }
    std::str::from_utf8(&input[start..*pos])
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or(DecodeError::InvalidInteger(start))
}

/// Recognizes the three non-finite tokens `format_float` can emit. Checked
/// before the numeric grammar below since none of `NaN`/`Infinity` start
/// with a digit or a `-` followed by a digit.
fn try_parse_nonfinite_float(input: &[u8], pos: &mut usize) -> Option<f64> {
    const TOKENS: &[(&[u8], f64)] = &[
        (b"-Infinity", f64::NEG_INFINITY),
        (b"Infinity", f64::INFINITY),
        (b"NaN", f64::NAN),
    ];
    for (token, value) in TOKENS {
        if input[*pos..].starts_with(token) {
            *pos += token.len();
            return Some(*value);
        }
    }
    None
}

/// Parses a float literal. A trailing `e`/`E` is treated as a scientific
/// exponent only when immediately followed by an optional sign and at
/// least one digit; otherwise it is left unconsumed for the next
/// sibling's type byte, which resolves the only ambiguity the wire
/// format has (a float like `1` directly followed by an empty node `e""
/// `). The non-finite tokens `NaN`/`Infinity`/`-Infinity` emitted by
/// `format_float` are recognized up front so that every value `floating()`
/// accepts round-trips (spec.md §8.6).
fn parse_float(input: &[u8], pos: &mut usize) -> Result<f64, DecodeError> {
    if let Some(value) = try_parse_nonfinite_float(input, pos) {
        return Ok(value);
    }

    let start = *pos;
    if peek_byte(input, *pos) == Some(b'-') {
        *pos += 1;
    }
    while matches!(peek_byte(input, *pos), Some(b'0'..=b'9')) {
        *pos += 1;
    }
    if peek_byte(input, *pos) == Some(b'.') {
        let dot = *pos;
        *pos += 1;
        let frac_start = *pos;
        while matches!(peek_byte(input, *pos), Some(b'0'..=b'9')) {
            *pos += 1;
        }
        if *pos == frac_start {
            // no digits after the dot: the dot wasn't part of this number
            *pos = dot;
        }
    }
    if matches!(peek_byte(input, *pos), Some(b'e') | Some(b'E')) {
        let exp_mark = *pos;
        let mut probe = *pos + 1;
        if matches!(peek_byte(input, probe), Some(b'+') | Some(b'-')) {
            probe += 1;
        }
        let exp_digits_start = probe;
        while matches!(peek_byte(input, probe), Some(b'0'..=b'9')) {
            probe += 1;
        }
        if probe > exp_digits_start {
            *pos = probe;
        } else {
            *pos = exp_mark; // not a real exponent; leave for next sibling
        }
    }
    if *pos == start || (*pos == start + 1 && input[start] == b'-') {
        return Err(DecodeError::InvalidFloat(start));
    }
    std::str::from_utf8(&input[start..*pos])
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(DecodeError::InvalidFloat(start))
}

fn next_byte(input: &[u8], pos: &mut usize) -> Result<u8, DecodeError> {
    let b = peek_byte(input, *pos).ok_or(DecodeError::UnexpectedEof(*pos))?;
    *pos += 1;
    Ok(b)
}

fn peek_byte(input: &[u8], pos: usize) -> Option<u8> {
    input.get(pos).copied()
}
