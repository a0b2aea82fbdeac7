//! TRON: a binary, JSON-compatible document format with persistent
//! copy-on-write structural editing.
//!
//! A document is an append-only byte buffer: `TRON` magic, nodes, and an
//! 8-byte trailer naming the current and previous root offsets. Maps are
//! persistent HAMTs, arrays are persistent vector tries; every update
//! re-emits only the touched root-to-leaf path and shares all other nodes
//! with the previous root by offset, so old roots keep reading their
//! pre-update data.
//!
//! ```
//! use tron::{empty_map_root, map_get, map_set_node, parse_trailer, Builder, Value};
//!
//! let mut b = Builder::new();
//! let root = empty_map_root(&mut b)?;
//! let (root, _) = map_set_node(&mut b, root, b"greeting", &Value::Text(b"hello"))?;
//! let doc = b.bytes_with_trailer(root, 0);
//!
//! let trailer = parse_trailer(&doc)?;
//! assert_eq!(
//!     map_get(&doc, trailer.root_offset, b"greeting")?,
//!     Some(Value::Text(b"hello")),
//! );
//! # Ok::<(), tron::Error>(())
//! ```

pub mod arr;
pub mod clone;
pub mod document;
pub mod error;
pub mod map;
pub mod merge;
pub mod node;
pub mod scratch;
pub mod tag;
pub mod value;
pub mod xxh32;

pub use arr::{
    arr_append_document, arr_collect_values, arr_get, arr_iter_values, arr_set_document,
    arr_set_node, arr_slice_document, array_root_length, empty_array_root, ArrayBuilder,
};
pub use clone::{clone_array_node, clone_map_node, clone_value_from_doc};
pub use document::{
    decode_scalar_document, detect_doc_type, encode_scalar_document, parse_trailer, root_value,
    Builder, DocType, Trailer, HEADER_MAGIC, TRAILER_SIZE,
};
pub use error::{Error, Result};
pub use map::{
    empty_map_root, map_del_node, map_get, map_get_hashed, map_has, map_is_empty,
    map_iter_entries, map_iter_values, map_set_node, map_set_node_hashed, MapBuilder,
};
pub use merge::merge_map_documents;
pub use node::{node_slice_at, KeyType, NodeHeader, NodeKind};
pub use scratch::Scratch;
pub use tag::ValueKind;
pub use value::{decode_value, decode_value_at, encode_value, encode_value_into, Value};
pub use xxh32::xxh32;
