//! Node Save Format
//!
//! Each node is written as one brace-wrapped, comma-separated record:
//!
//! ```text
//! <index>{<a>,<b>,<bmod>,<conditional>,<node_mod>,<address>,<execution_count>,
//!   <in_count>,<in>...,<out_count>,<out>...,<external:0|1>,
//!   0 => <mutation_index>
//!   1 => <num_calls>,(<num_args>,(<arg_pos>,<base64 arg>,)*)*
//! }
//! ```
//!
//! Argument bytes are base64 encoded so that `,` and `}` inside a payload
//! cannot shift the field boundaries. The node list ends with `}N,D`, which
//! the reader sees in place of an index.
//!
//! Decoding is a single forward pass over a `BufRead`. Every field must be
//! terminated by its delimiter; running out of input mid-record is reported
//! as a malformed field rather than producing a shortened node.

use crate::domain::coords::VCoord;
use crate::domain::disassembly::{CacheError, DisassemblyCache};
use crate::domain::node::{ArgList, ExternalCall, InternalBlock, NodeData, NodeKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use thiserror::Error;

/// Token that takes the place of an index once every node has been written.
pub const END_MARKER: &str = "}N,D";

const COMMA: u8 = b',';
const OPEN: u8 = b'{';
const CLOSE: u8 = b'}';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed {field}: {token:?}")]
    MalformedField { field: &'static str, token: String },
    #[error("no instruction at {address:#x} mutation {mutation_index}")]
    DanglingReference { address: u64, mutation_index: u32 },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    fn malformed(field: &'static str, token: impl Into<String>) -> Self {
        CodecError::MalformedField {
            field,
            token: token.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────

/// Append one node record to `out`.
pub fn encode_node<W: Write>(out: &mut W, node: &NodeData) -> io::Result<()> {
    let v = &node.vcoord;
    write!(out, "{}{{", node.index())?;
    write!(
        out,
        "{},{},{},{},{},",
        v.a, v.b, v.bmod, node.conditional, node.node_mod
    )?;
    write!(out, "{},{},", node.address, node.execution_count)?;
    write_adjacency(out, &node.incoming)?;
    write_adjacency(out, &node.outgoing)?;

    match &node.kind {
        NodeKind::Internal(block) => write!(out, "0,{}", block.mutation_index())?,
        NodeKind::External(call) => {
            write!(out, "1,{},", call.funcargs.len())?;
            for args in &call.funcargs {
                write!(out, "{},", args.len())?;
                for (pos, value) in args {
                    write!(out, "{},{},", pos, STANDARD.encode(value))?;
                }
            }
        }
    }
    out.write_all(&[CLOSE])
}

fn write_adjacency<W: Write>(out: &mut W, set: &BTreeSet<u32>) -> io::Result<()> {
    write!(out, "{},", set.len())?;
    for idx in set {
        write!(out, "{},", idx)?;
    }
    Ok(())
}

pub fn write_end_marker<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(END_MARKER.as_bytes())
}

/// Record text for a single node.
pub fn encode_to_string(node: &NodeData) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = encode_node(&mut buf, node);
    String::from_utf8_lossy(&buf).into_owned()
}

// ─────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────

/// Forward-only tokenizer over the saved stream.
pub struct FieldReader<R> {
    inner: R,
    buf: Vec<u8>,
    offset: u64,
}

impl<R: BufRead> FieldReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            offset: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read up to and including `delim`. Returns the text before it and
    /// whether the delimiter was actually found (false at end of input).
    pub fn token(&mut self, delim: u8) -> io::Result<(String, bool)> {
        self.buf.clear();
        let n = self.inner.read_until(delim, &mut self.buf)?;
        self.offset += n as u64;
        let closed = self.buf.last() == Some(&delim);
        if closed {
            self.buf.pop();
        }
        Ok((String::from_utf8_lossy(&self.buf).into_owned(), closed))
    }

    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.inner.fill_buf()?.first() {
            Some(&b) => b,
            None => return Ok(None),
        };
        self.inner.consume(1);
        self.offset += 1;
        Ok(Some(byte))
    }

    /// A delimited field, kept as text.
    pub fn field_str(&mut self, delim: u8, field: &'static str) -> Result<String, CodecError> {
        let (token, closed) = self.token(delim)?;
        if !closed {
            return Err(CodecError::malformed(field, token));
        }
        Ok(token)
    }

    /// A delimited field parsed as a number.
    pub fn field<T: FromStr>(&mut self, delim: u8, field: &'static str) -> Result<T, CodecError> {
        let token = self.field_str(delim, field)?;
        parse_token(token, field)
    }
}

fn parse_token<T: FromStr>(token: String, field: &'static str) -> Result<T, CodecError> {
    match token.parse::<T>() {
        Ok(value) => Ok(value),
        Err(_) => Err(CodecError::malformed(field, token)),
    }
}

/// Decode the next record, or `Ok(None)` when the end marker is reached.
///
/// On error the stream is left somewhere inside the broken record; there is
/// no resynchronisation point, so the caller should abandon the load.
pub fn decode_node<R: BufRead>(
    reader: &mut FieldReader<R>,
    cache: &dyn DisassemblyCache,
) -> Result<Option<NodeData>, CodecError> {
    let (token, closed) = reader.token(OPEN)?;
    if token == END_MARKER {
        return Ok(None);
    }
    if !closed {
        return Err(CodecError::malformed("index", token));
    }
    let index: u32 = parse_token(token, "index")?;

    let a = reader.field(COMMA, "a")?;
    let b = reader.field(COMMA, "b")?;
    let bmod = reader.field(COMMA, "bmod")?;
    let vcoord = VCoord::new(a, b, bmod);
    let conditional: i32 = reader.field(COMMA, "conditional")?;
    let node_mod: i32 = reader.field(COMMA, "node mod")?;
    let address: u64 = reader.field(COMMA, "address")?;
    let execution_count: u64 = reader.field(COMMA, "execution count")?;

    let incoming = read_adjacency(reader, "incoming count", "incoming neighbour")?;
    let outgoing = read_adjacency(reader, "outgoing count", "outgoing neighbour")?;

    let flag = reader.field_str(COMMA, "external flag")?;
    let mut node = match flag.as_str() {
        "0" => {
            let mutation_index: u32 = reader.field(CLOSE, "mutation index")?;
            let block = InternalBlock::bind(cache, address, mutation_index)?.ok_or(
                CodecError::DanglingReference {
                    address,
                    mutation_index,
                },
            )?;
            NodeData::internal(index, vcoord, block)
        }
        "1" => {
            let funcargs = read_calls(reader)?;
            match reader.next_byte()? {
                Some(CLOSE) => {}
                other => {
                    let found = other.map(|b| (b as char).to_string()).unwrap_or_default();
                    return Err(CodecError::malformed("record terminator", found));
                }
            }
            let mut node = NodeData::external(index, vcoord, address);
            node.kind = NodeKind::External(ExternalCall { funcargs });
            node.recount_calls();
            node
        }
        _ => return Err(CodecError::malformed("external flag", flag)),
    };

    node.conditional = conditional;
    node.node_mod = node_mod;
    node.execution_count = execution_count;
    node.incoming = incoming;
    node.outgoing = outgoing;
    Ok(Some(node))
}

fn read_adjacency<R: BufRead>(
    reader: &mut FieldReader<R>,
    count_field: &'static str,
    item_field: &'static str,
) -> Result<BTreeSet<u32>, CodecError> {
    let count: u32 = reader.field(COMMA, count_field)?;
    let mut set = BTreeSet::new();
    for _ in 0..count {
        set.insert(reader.field(COMMA, item_field)?);
    }
    Ok(set)
}

fn read_calls<R: BufRead>(reader: &mut FieldReader<R>) -> Result<Vec<ArgList>, CodecError> {
    let num_calls: u32 = reader.field(COMMA, "call count")?;
    let mut calls = Vec::new();
    for _ in 0..num_calls {
        let num_args: u32 = reader.field(COMMA, "argument count")?;
        let mut args = ArgList::new();
        for _ in 0..num_args {
            let pos: i32 = reader.field(COMMA, "argument position")?;
            let payload = reader.field_str(COMMA, "argument value")?;
            let value = STANDARD
                .decode(payload.as_bytes())
                .map_err(|_| CodecError::malformed("argument value", payload))?;
            args.push((pos, value));
        }
        calls.push(args);
    }
    Ok(calls)
}
