//! Persistent vector-trie array engine.
//!
//! Arrays are dense integer-indexed sequences stored as a 16-way trie.
//! Each level consumes 4 bits of the index at its `shift`; leaves hold
//! inline value records at `index & 0xF`. The root node carries the true
//! logical length; every other node carries length 0. Shifts decrease by 4
//! along any root-to-leaf path and leaves sit at shift 0.

use smallvec::SmallVec;
use tracing::debug;

use crate::document::{self, Builder};
use crate::error::{Error, Result};
use crate::node::{self, KeyType, NodeKind};
use crate::value::{self, Value};

#[inline]
fn slot_of(index: u32, shift: u8) -> u8 {
    ((index >> shift) & 0xF) as u8
}

/// Smallest root shift such that `(length - 1) >> shift <= 0xF`.
fn root_shift_for(length: u32) -> u8 {
    if length == 0 {
        return 0;
    }
    let mut shift = 0u8;
    while ((length - 1) >> shift) > 0xF {
        shift += 4;
    }
    shift
}

/// The logical length stored on the array root node.
pub fn array_root_length(doc: &[u8], root_off: u32) -> Result<u32> {
    let (header, node) = node::node_slice_at(doc, root_off)?;
    header.expect_key_type(KeyType::Array)?;
    match header.kind {
        NodeKind::Leaf => Ok(node::parse_array_leaf(&header, node)?.length),
        NodeKind::Branch => Ok(node::parse_array_branch(&header, node)?.length),
    }
}

/// Look up the element at `index`.
///
/// Indices at or beyond the root length fail with `IndexOutOfRange`;
/// in-range indices absent from the trie yield `None`.
pub fn arr_get<'a>(doc: &'a [u8], root_off: u32, index: u32) -> Result<Option<Value<'a>>> {
    let length = array_root_length(doc, root_off)?;
    if index >= length {
        return Err(Error::IndexOutOfRange { index, length });
    }
    get_at(doc, root_off, index, None)
}

/// `expect` is the shift this node must carry; `None` for the root.
fn get_at<'a>(
    doc: &'a [u8],
    off: u32,
    index: u32,
    expect: Option<u8>,
) -> Result<Option<Value<'a>>> {
    let (header, node) = node::node_slice_at(doc, off)?;
    header.expect_key_type(KeyType::Array)?;

    if header.kind == NodeKind::Leaf {
        let leaf = node::parse_array_leaf(&header, node)?;
        match expect {
            Some(0) | None => {}
            Some(_) => return Err(Error::BadNodeShape("array leaf above the bottom level")),
        }
        if expect.is_some() && leaf.length != 0 {
            return Err(Error::BadNodeShape("array non-root node carries a length"));
        }
        let slot = slot_of(index, 0);
        if !node::has_slot(leaf.bitmap, slot) {
            return Ok(None);
        }
        return Ok(Some(leaf.values[node::slot_rank(leaf.bitmap, slot)]));
    }

    let branch = node::parse_array_branch(&header, node)?;
    if let Some(exp) = expect {
        if branch.shift != exp {
            return Err(Error::BadNodeShape("array shift chain broken"));
        }
        if branch.length != 0 {
            return Err(Error::BadNodeShape("array non-root node carries a length"));
        }
    }
    if branch.shift == 0 {
        return Err(Error::BadNodeShape("array branch shift must be positive"));
    }
    let slot = slot_of(index, branch.shift);
    if !node::has_slot(branch.bitmap, slot) {
        return Ok(None);
    }
    let child = branch.children[node::slot_rank(branch.bitmap, slot)];
    get_at(doc, child, index, Some(branch.shift - 4))
}

/// Persistent set, growing the root when `index` outgrows its span.
///
/// `length` is the root length of the result. Setting `index == length - 1`
/// with `length` one past the old length is the append step; an index past
/// the old length, or outside `length`, is a protocol error. Writing the
/// value already present with an unchanged length returns the original
/// root offset without emitting anything.
pub fn arr_set_node(
    b: &mut Builder,
    root_off: u32,
    index: u32,
    val: &Value<'_>,
    length: u32,
) -> Result<u32> {
    let old_length = array_root_length(b.buffer(), root_off)?;
    if index > old_length {
        return Err(Error::IndexOutOfRange {
            index,
            length: old_length,
        });
    }
    if index >= length {
        return Err(Error::IndexOutOfRange { index, length });
    }
    let root = ensure_root_capacity(b, root_off, index, length)?;
    let (new_root, _) = set_at(b, root, index, val, true, length, 0)?;
    Ok(new_root)
}

/// Grow the tree by wrapping the root as a non-root child until `index`
/// fits under the root shift.
fn ensure_root_capacity(b: &mut Builder, root_off: u32, index: u32, length: u32) -> Result<u32> {
    let mut shift = {
        let (header, node) = node::node_slice_at(b.buffer(), root_off)?;
        header.expect_key_type(KeyType::Array)?;
        match header.kind {
            NodeKind::Leaf => 0,
            NodeKind::Branch => node::parse_array_branch(&header, node)?.shift,
        }
    };
    let mut off = root_off;
    while (index >> shift) > 0xF {
        let child = demote_root(b, off)?;
        shift += 4;
        off = node::append_array_branch(b, shift, 0b1, length, &[child])?;
    }
    Ok(off)
}

/// Re-emit a root node as a non-root child (length 0).
fn demote_root(b: &mut Builder, off: u32) -> Result<u32> {
    enum Demoted {
        Leaf(u16, SmallVec<[Vec<u8>; 16]>),
        Branch(u8, u16, SmallVec<[u32; 16]>),
    }
    let demoted = {
        let (header, node) = node::node_slice_at(b.buffer(), off)?;
        header.expect_key_type(KeyType::Array)?;
        match header.kind {
            NodeKind::Leaf => {
                let leaf = node::parse_array_leaf(&header, node)?;
                if leaf.length == 0 {
                    return Ok(off); // already shaped like a child
                }
                let recs = leaf.values.iter().map(value::encode_value).collect();
                Demoted::Leaf(leaf.bitmap, recs)
            }
            NodeKind::Branch => {
                let branch = node::parse_array_branch(&header, node)?;
                if branch.length == 0 {
                    return Ok(off);
                }
                Demoted::Branch(branch.shift, branch.bitmap, branch.children)
            }
        }
    };
    match demoted {
        Demoted::Leaf(bitmap, recs) => node::append_array_leaf(b, bitmap, 0, &recs),
        Demoted::Branch(shift, bitmap, children) => {
            node::append_array_branch(b, shift, bitmap, 0, &children)
        }
    }
}

fn set_at(
    b: &mut Builder,
    off: u32,
    index: u32,
    val: &Value<'_>,
    is_root: bool,
    root_length: u32,
    depth: u8,
) -> Result<(u32, bool)> {
    if depth > 8 {
        return Err(Error::BadNodeShape("array deeper than index width"));
    }
    let kind = {
        let (header, _) = node::node_slice_at(b.buffer(), off)?;
        header.expect_key_type(KeyType::Array)?;
        header.kind
    };

    if kind == NodeKind::Leaf {
        let slot = slot_of(index, 0);
        let (mut bitmap, has, rank, mut recs) = {
            let (header, node) = node::node_slice_at(b.buffer(), off)?;
            let leaf = node::parse_array_leaf(&header, node)?;
            if !is_root && leaf.length != 0 {
                return Err(Error::BadNodeShape("array non-root node carries a length"));
            }
            let has = node::has_slot(leaf.bitmap, slot);
            let rank = node::slot_rank(leaf.bitmap, slot);
            if has && leaf.values[rank] == *val && (!is_root || leaf.length == root_length) {
                return Ok((off, false));
            }
            let recs: SmallVec<[Vec<u8>; 16]> =
                leaf.values.iter().map(value::encode_value).collect();
            (leaf.bitmap, has, rank, recs)
        };
        if has {
            recs[rank] = value::encode_value(val);
        } else {
            recs.insert(rank, value::encode_value(val));
            bitmap |= 1 << slot;
        }
        let length = if is_root { root_length } else { 0 };
        let new_off = node::append_array_leaf(b, bitmap, length, &recs)?;
        return Ok((new_off, true));
    }

    let (shift, mut bitmap, node_length, mut children) = {
        let (header, node) = node::node_slice_at(b.buffer(), off)?;
        let branch = node::parse_array_branch(&header, node)?;
        if !is_root && branch.length != 0 {
            return Err(Error::BadNodeShape("array non-root node carries a length"));
        }
        (branch.shift, branch.bitmap, branch.length, branch.children)
    };
    if shift == 0 {
        return Err(Error::BadNodeShape("array branch shift must be positive"));
    }
    let slot = slot_of(index, shift);
    let rank = node::slot_rank(bitmap, slot);

    if node::has_slot(bitmap, slot) {
        let (new_child, changed) =
            set_at(b, children[rank], index, val, false, 0, depth + 1)?;
        if !changed && (!is_root || node_length == root_length) {
            return Ok((off, false));
        }
        children[rank] = new_child;
    } else {
        let rec = value::encode_value(val);
        let child = build_path(b, index, shift - 4, &rec)?;
        children.insert(rank, child);
        bitmap |= 1 << slot;
    }
    let length = if is_root { root_length } else { 0 };
    let new_off = node::append_array_branch(b, shift, bitmap, length, &children)?;
    Ok((new_off, true))
}

/// Materialize a fresh single-element chain from the leaf upward.
fn build_path(b: &mut Builder, index: u32, shift: u8, rec: &[u8]) -> Result<u32> {
    if shift == 0 {
        let slot = slot_of(index, 0);
        return node::append_array_leaf(b, 1 << slot, 0, &[rec]);
    }
    let child = build_path(b, index, shift - 4, rec)?;
    let slot = slot_of(index, shift);
    node::append_array_branch(b, shift, 1 << slot, 0, &[child])
}

/// Fill `out` with the subtree's values; `base` is the subtree's first
/// logical index. Slots that would land past `out` are ignored.
pub fn arr_collect_values<'a>(
    doc: &'a [u8],
    off: u32,
    base: u32,
    out: &mut [Value<'a>],
) -> Result<()> {
    collect_at(doc, off, base, out, 0)
}

fn collect_at<'a>(
    doc: &'a [u8],
    off: u32,
    base: u32,
    out: &mut [Value<'a>],
    depth: u8,
) -> Result<()> {
    if depth > 8 {
        return Err(Error::BadNodeShape("array deeper than index width"));
    }
    let (header, node) = node::node_slice_at(doc, off)?;
    header.expect_key_type(KeyType::Array)?;
    if header.kind == NodeKind::Leaf {
        let leaf = node::parse_array_leaf(&header, node)?;
        let mut rank = 0;
        for slot in 0..16u8 {
            if node::has_slot(leaf.bitmap, slot) {
                let i = (base + u32::from(slot)) as usize;
                if i < out.len() {
                    out[i] = leaf.values[rank];
                }
                rank += 1;
            }
        }
        return Ok(());
    }
    let branch = node::parse_array_branch(&header, node)?;
    let mut rank = 0;
    for slot in 0..16u8 {
        if node::has_slot(branch.bitmap, slot) {
            let child_base = base + (u32::from(slot) << branch.shift);
            collect_at(doc, branch.children[rank], child_base, out, depth + 1)?;
            rank += 1;
        }
    }
    Ok(())
}

/// Index-ascending depth-first traversal over present elements. Callback
/// errors propagate verbatim and stop the walk.
pub fn arr_iter_values<'a, F>(doc: &'a [u8], off: u32, mut f: F) -> Result<()>
where
    F: FnMut(u32, Value<'a>) -> Result<()>,
{
    iter_at(doc, off, 0, 0, &mut f)
}

fn iter_at<'a, F>(doc: &'a [u8], off: u32, base: u32, depth: u8, f: &mut F) -> Result<()>
where
    F: FnMut(u32, Value<'a>) -> Result<()>,
{
    if depth > 8 {
        return Err(Error::BadNodeShape("array deeper than index width"));
    }
    let (header, node) = node::node_slice_at(doc, off)?;
    header.expect_key_type(KeyType::Array)?;
    if header.kind == NodeKind::Leaf {
        let leaf = node::parse_array_leaf(&header, node)?;
        let mut rank = 0;
        for slot in 0..16u8 {
            if node::has_slot(leaf.bitmap, slot) {
                f(base + u32::from(slot), leaf.values[rank])?;
                rank += 1;
            }
        }
        return Ok(());
    }
    let branch = node::parse_array_branch(&header, node)?;
    let mut rank = 0;
    for slot in 0..16u8 {
        if node::has_slot(branch.bitmap, slot) {
            let child_base = base + (u32::from(slot) << branch.shift);
            iter_at(doc, branch.children[rank], child_base, depth + 1, f)?;
            rank += 1;
        }
    }
    Ok(())
}

fn array_document_base(doc: &[u8]) -> Result<(u32, u32, Builder)> {
    let trailer = document::parse_trailer(doc)?;
    let root = value::decode_value_at(doc, trailer.root_offset)?;
    let root_off = match root {
        Value::Arr(off) => off,
        other => {
            return Err(Error::KeyTypeMismatch {
                expected: "array",
                found: other.kind().name(),
            })
        }
    };
    let length = array_root_length(doc, root_off)?;
    let (builder, _) = Builder::from_document(doc)?;
    Ok((root_off, length, builder))
}

/// Replace the value at `index` in a top-level array document.
pub fn arr_set_document(doc: &[u8], index: u32, val: &Value<'_>) -> Result<Vec<u8>> {
    let (root_off, length, mut b) = array_document_base(doc)?;
    if index >= length {
        return Err(Error::IndexOutOfRange { index, length });
    }
    let new_root = arr_set_node(&mut b, root_off, index, val, length)?;
    Ok(b.bytes_with_trailer(new_root, root_off))
}

/// Append values at the end of a top-level array document.
pub fn arr_append_document(doc: &[u8], values: &[Value<'_>]) -> Result<Vec<u8>> {
    if values.is_empty() {
        return Ok(doc.to_vec());
    }
    let (root_off, mut length, mut b) = array_document_base(doc)?;
    let mut root = root_off;
    for val in values {
        root = arr_set_node(&mut b, root, length, val, length + 1)?;
        length += 1;
    }
    Ok(b.bytes_with_trailer(root, root_off))
}

/// Build a new array document holding `values[start..end]`.
pub fn arr_slice_document(doc: &[u8], start: u32, end: u32) -> Result<Vec<u8>> {
    let (root_off, length, mut b) = array_document_base(doc)?;
    if start > end || end > length {
        return Err(Error::IndexOutOfRange {
            index: start.max(end),
            length,
        });
    }
    debug!(start, end, length, "slicing array document");
    let mut values = vec![Value::Nil; length as usize];
    arr_collect_values(doc, root_off, 0, &mut values)?;
    let new_root = build_array_from_values(&mut b, &values[start as usize..end as usize])?;
    Ok(b.bytes_with_trailer(new_root, root_off))
}

/// Build a dense array tree from `values` and return its root offset.
pub(crate) fn build_array_from_values(b: &mut Builder, values: &[Value<'_>]) -> Result<u32> {
    let recs: Vec<Vec<u8>> = values.iter().map(value::encode_value).collect();
    build_dense(b, &recs, 0, root_shift_for(recs.len() as u32), Some(recs.len() as u32))
}

/// Encode records covering logical indices `first..first + recs.len()`.
fn build_dense(
    b: &mut Builder,
    recs: &[Vec<u8>],
    first: u32,
    shift: u8,
    root_length: Option<u32>,
) -> Result<u32> {
    let length = root_length.unwrap_or(0);
    if shift == 0 {
        let mut bitmap = 0u16;
        for i in 0..recs.len() {
            bitmap |= 1 << slot_of(first + i as u32, 0);
        }
        return node::append_array_leaf(b, bitmap, length, recs);
    }
    let mut bitmap = 0u16;
    let mut children: SmallVec<[u32; 16]> = SmallVec::new();
    let mut start = 0usize;
    while start < recs.len() {
        let slot = slot_of(first + start as u32, shift);
        let mut end = start + 1;
        while end < recs.len() && slot_of(first + end as u32, shift) == slot {
            end += 1;
        }
        let child = build_dense(b, &recs[start..end], first + start as u32, shift - 4, None)?;
        bitmap |= 1 << slot;
        children.push(child);
        start = end;
    }
    node::append_array_branch(b, shift, bitmap, length, &children)
}

/// Bulk array assembly from a dense value sequence.
#[derive(Debug, Default)]
pub struct ArrayBuilder {
    recs: Vec<Vec<u8>>,
}

impl ArrayBuilder {
    #[must_use]
    pub fn new() -> Self {
        ArrayBuilder::default()
    }

    /// Stage a value at the end of the array.
    pub fn append(&mut self, val: &Value<'_>) {
        self.recs.push(value::encode_value(val));
    }

    /// Replace the value at an existing index.
    pub fn set(&mut self, index: usize, val: &Value<'_>) -> Result<()> {
        let length = self.recs.len() as u32;
        let slot = self
            .recs
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange {
                index: index as u32,
                length,
            })?;
        slot.clear();
        value::encode_value_into(val, slot);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recs.is_empty()
    }

    /// Encode the staged values into `b` and return the root offset.
    pub fn build(&mut self, b: &mut Builder) -> Result<u32> {
        let length = self.recs.len() as u32;
        build_dense(b, &self.recs, 0, root_shift_for(length), Some(length))
    }
}

/// Append an empty array root (an empty leaf, length 0).
pub fn empty_array_root(b: &mut Builder) -> Result<u32> {
    node::append_array_leaf::<&[u8]>(b, 0, 0, &[])
}
