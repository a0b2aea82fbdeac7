//! Document framing and the append-only builder.
//!
//! A document is the 4-byte `TRON` magic, an append-only region of nodes
//! and value records, and an 8-byte trailer naming the current and
//! previous root offsets:
//!
//! ```text
//! 'T' 'R' 'O' 'N'  payload...  root_off(u32 LE)  prev_root_off(u32 LE)
//! ```
//!
//! Updates never rewrite payload bytes; a new document shares every
//! unchanged subtree with its predecessor by offset, and the trailer's
//! previous root lets consumers walk history without a second document.

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{KeyType, NodeKind, NODE_HEADER_LEN};
use crate::scratch::Scratch;
use crate::value::{self, Value};

/// Magic bytes at the start of every document.
pub const HEADER_MAGIC: [u8; 4] = *b"TRON";

/// Size of the trailer in bytes.
pub const TRAILER_SIZE: usize = 8;

const MIN_DOCUMENT_LEN: usize = HEADER_MAGIC.len() + TRAILER_SIZE;

/// The two root offsets recorded at the end of a document.
///
/// A `prev_root_offset` of 0 means no previous root: offset 0 lies inside
/// the magic and can never address a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub root_offset: u32,
    pub prev_root_offset: u32,
}

/// Parse the magic and the last 8 bytes of a document.
pub fn parse_trailer(doc: &[u8]) -> Result<Trailer> {
    if doc.len() < MIN_DOCUMENT_LEN || doc[..4] != HEADER_MAGIC {
        return Err(Error::BadMagic);
    }
    let start = doc.len() - TRAILER_SIZE;
    Ok(Trailer {
        root_offset: u32::from_le_bytes(doc[start..start + 4].try_into().unwrap()),
        prev_root_offset: u32::from_le_bytes(doc[start + 4..].try_into().unwrap()),
    })
}

/// Append a trailer to `dst`.
pub fn append_trailer(dst: &mut Vec<u8>, trailer: Trailer) {
    dst.extend_from_slice(&trailer.root_offset.to_le_bytes());
    dst.extend_from_slice(&trailer.prev_root_offset.to_le_bytes());
}

/// Top-level document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    /// Root offset addresses a non-container value record.
    Scalar,
    /// Root offset addresses a map or array node.
    Tree,
}

/// Classify a document by what its root offset addresses.
pub fn detect_doc_type(doc: &[u8]) -> Result<DocType> {
    match root_value(doc)? {
        Value::Arr(_) | Value::Map(_) => Ok(DocType::Tree),
        _ => Ok(DocType::Scalar),
    }
}

/// Decode the value the trailer's root offset addresses.
pub fn root_value(doc: &[u8]) -> Result<Value<'_>> {
    let trailer = parse_trailer(doc)?;
    value::decode_value_at(doc, trailer.root_offset)
}

/// Decode a scalar document into its value.
pub fn decode_scalar_document(doc: &[u8]) -> Result<Value<'_>> {
    let v = root_value(doc)?;
    if v.is_container() {
        return Err(Error::KeyTypeMismatch {
            expected: "scalar value",
            found: v.kind().name(),
        });
    }
    Ok(v)
}

/// Encode a scalar value as a complete document.
///
/// Container values cannot stand alone — their offsets reference nodes in
/// some other buffer — so they are rejected with [`Error::MissingOffset`].
pub fn encode_scalar_document(v: &Value<'_>) -> Result<Vec<u8>> {
    if v.is_container() {
        return Err(Error::MissingOffset);
    }
    let mut out = Vec::with_capacity(MIN_DOCUMENT_LEN + value::encoded_value_len(v));
    out.extend_from_slice(&HEADER_MAGIC);
    value::encode_value_into(v, &mut out);
    append_trailer(
        &mut out,
        Trailer {
            root_offset: HEADER_MAGIC.len() as u32,
            prev_root_offset: 0,
        },
    );
    Ok(out)
}

/// Append-only document assembly buffer.
///
/// The buffer starts with the header magic; nodes are appended bottom-up
/// and the caller finalizes with a trailer naming the root. Emitted bytes
/// are never rewritten, so every offset returned stays valid for the life
/// of the buffer.
#[derive(Debug)]
pub struct Builder {
    buf: Vec<u8>,
    scratch: Scratch,
}

impl Builder {
    /// Create an empty builder holding only the header magic.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create an empty builder with a capacity hint.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity.max(HEADER_MAGIC.len()));
        buf.extend_from_slice(&HEADER_MAGIC);
        Builder {
            buf,
            scratch: Scratch::new(),
        }
    }

    /// Create an empty builder reusing a scratch recovered from another
    /// builder via [`Builder::into_scratch`].
    #[must_use]
    pub fn with_scratch(scratch: Scratch) -> Self {
        let mut b = Self::new();
        b.scratch = scratch;
        b
    }

    /// Recover the scratch for reuse by a later builder.
    #[must_use]
    pub fn into_scratch(self) -> Scratch {
        self.scratch
    }

    pub(crate) fn scratch_take(&mut self) -> Vec<u8> {
        self.scratch.take_buf()
    }

    pub(crate) fn scratch_put(&mut self, buf: Vec<u8>) {
        self.scratch.put_buf(buf);
    }

    /// Seed a builder with the payload of an existing document (without its
    /// trailer), so appended nodes can reference unchanged subtrees by
    /// their original offsets. Returns the document's trailer alongside.
    pub fn from_document(doc: &[u8]) -> Result<(Self, Trailer)> {
        let trailer = parse_trailer(doc)?;
        debug!(
            len = doc.len(),
            root = trailer.root_offset,
            "seeding builder from document"
        );
        let buf = doc[..doc.len() - TRAILER_SIZE].to_vec();
        Ok((
            Builder {
                buf,
                scratch: Scratch::new(),
            },
            trailer,
        ))
    }

    /// Append a fully encoded node and return its absolute offset.
    pub fn append_node(&mut self, node: &[u8]) -> u32 {
        let off = self.buf.len() as u32;
        self.buf.extend_from_slice(node);
        off
    }

    /// Append a node from its parts, padding to 4-byte alignment with
    /// zeros, and return its absolute offset.
    pub(crate) fn append_shaped_node(
        &mut self,
        kind: NodeKind,
        key_type: KeyType,
        entry_count: u32,
        body: &[u8],
    ) -> u32 {
        let node_len = (NODE_HEADER_LEN + body.len() + 3) & !3;
        let mut flags = node_len as u32;
        if kind == NodeKind::Leaf {
            flags |= 0x1;
        }
        if key_type == KeyType::Map {
            flags |= 0x2;
        }
        let off = self.buf.len() as u32;
        self.buf.extend_from_slice(&flags.to_le_bytes());
        self.buf.extend_from_slice(&entry_count.to_le_bytes());
        self.buf.extend_from_slice(body);
        let pad = node_len - NODE_HEADER_LEN - body.len();
        self.buf.extend_from_slice(&[0u8; 3][..pad]);
        off
    }

    /// The current buffer: magic plus everything appended so far.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Current buffer length; the next append lands at this offset.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.len() <= HEADER_MAGIC.len()
    }

    /// Truncate back to just the header magic, keeping capacity.
    pub fn reset(&mut self) {
        self.buf.truncate(HEADER_MAGIC.len());
    }

    /// Return a new document: the buffer plus a trailer.
    #[must_use]
    pub fn bytes_with_trailer(&self, root_offset: u32, prev_root_offset: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buf.len() + TRAILER_SIZE);
        out.extend_from_slice(&self.buf);
        append_trailer(
            &mut out,
            Trailer {
                root_offset,
                prev_root_offset,
            },
        );
        out
    }

    /// Append the trailer into the builder's own buffer and return it; the
    /// single-allocation finalize path. The builder must not be used for
    /// further appends afterwards.
    pub fn bytes_with_trailer_in_place(&mut self, root_offset: u32, prev_root_offset: u32) -> &[u8] {
        append_trailer(
            &mut self.buf,
            Trailer {
                root_offset,
                prev_root_offset,
            },
        );
        &self.buf
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
