//! Cross-document subtree cloning.
//!
//! Cloning walks a subtree in a source document and appends equivalent
//! nodes into a builder, rewriting every container offset. Scalars pass
//! through untouched: their payloads stay borrowed from the source buffer.

use smallvec::SmallVec;

use crate::document::Builder;
use crate::error::{Error, Result};
use crate::map::MAX_DEPTH;
use crate::node::{self, KeyType, NodeKind};
use crate::value::{self, Value};

/// Clone `v` from `src` into `b`, returning a value valid in the builder's
/// buffer. Container values come back with rewritten offsets; everything
/// else is returned unchanged.
pub fn clone_value_from_doc<'a>(src: &'a [u8], v: Value<'a>, b: &mut Builder) -> Result<Value<'a>> {
    match v {
        Value::Arr(off) => Ok(Value::Arr(clone_array_node(src, off, b)?)),
        Value::Map(off) => Ok(Value::Map(clone_map_node(src, off, b)?)),
        other => Ok(other),
    }
}

/// Clone the map subtree at `off` in `src` into `b`.
pub fn clone_map_node(src: &[u8], off: u32, b: &mut Builder) -> Result<u32> {
    clone_map_at(src, off, b, 0)
}

fn clone_map_at(src: &[u8], off: u32, b: &mut Builder, depth: usize) -> Result<u32> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let (header, node) = node::node_slice_at(src, off)?;
    header.expect_key_type(KeyType::Map)?;

    if header.kind == NodeKind::Leaf {
        let parsed = node::parse_map_leaf(&header, node)?;
        let mut entries: SmallVec<[(&[u8], Vec<u8>); 8]> = SmallVec::new();
        for (key, val) in parsed {
            let cloned = clone_value_from_doc(src, val, b)?;
            entries.push((key, value::encode_value(&cloned)));
        }
        return node::append_map_leaf(b, &mut entries);
    }

    let branch = node::parse_map_branch(&header, node)?;
    let mut children: SmallVec<[u32; 16]> = SmallVec::new();
    for child in &branch.children {
        children.push(clone_map_at(src, *child, b, depth + 1)?);
    }
    node::append_map_branch(b, branch.bitmap, &children)
}

/// Clone the array subtree at `off` in `src` into `b`.
pub fn clone_array_node(src: &[u8], off: u32, b: &mut Builder) -> Result<u32> {
    clone_array_at(src, off, b, 0)
}

fn clone_array_at(src: &[u8], off: u32, b: &mut Builder, depth: usize) -> Result<u32> {
    if depth > 8 {
        return Err(Error::BadNodeShape("array deeper than index width"));
    }
    let (header, node) = node::node_slice_at(src, off)?;
    header.expect_key_type(KeyType::Array)?;

    if header.kind == NodeKind::Leaf {
        let leaf = node::parse_array_leaf(&header, node)?;
        let mut recs: SmallVec<[Vec<u8>; 16]> = SmallVec::new();
        for val in &leaf.values {
            let cloned = clone_value_from_doc(src, *val, b)?;
            recs.push(value::encode_value(&cloned));
        }
        return node::append_array_leaf(b, leaf.bitmap, leaf.length, &recs);
    }

    let branch = node::parse_array_branch(&header, node)?;
    let mut children: SmallVec<[u32; 16]> = SmallVec::new();
    for child in &branch.children {
        children.push(clone_array_at(src, *child, b, depth + 1)?);
    }
    node::append_array_branch(b, branch.shift, branch.bitmap, branch.length, &children)
}
