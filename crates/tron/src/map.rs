//! Persistent HAMT map engine.
//!
//! Maps are hash array mapped tries keyed by byte strings. Each level
//! consumes 4 bits of `xxh32(key, 0)`, rightward (depth 0 uses bits 0..3);
//! branches store children in ascending-slot order behind a 16-bit bitmap.
//! Depth is capped at 7: keys whose hashes collide through 28 bits share a
//! deep leaf kept sorted by key, and lookups fall back to scanning it.
//!
//! Every update is persistent: touched nodes are re-emitted at new offsets
//! and unchanged subtrees are shared with the previous root by offset. An
//! update that changes nothing returns the original offset without writing.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::document::Builder;
use crate::error::{Error, Result};
use crate::node::{self, KeyType, NodeKind};
use crate::value::{self, Value};
use crate::xxh32::xxh32;

/// Deepest level: levels 0..=6 consume 28 hash bits, level 7 is leaves.
pub(crate) const MAX_DEPTH: usize = 7;

#[inline]
fn hash_key(key: &[u8]) -> u32 {
    xxh32(key, 0)
}

#[inline]
fn slot_at(hash: u32, depth: usize) -> u8 {
    ((hash >> (depth * 4)) & 0xF) as u8
}

/// Owned (key, encoded record, hash) triple used while rebuilding nodes.
#[derive(Debug, Clone)]
struct MapEntry {
    key: Vec<u8>,
    rec: Vec<u8>,
    hash: u32,
}

impl MapEntry {
    fn new(key: &[u8], val: &Value<'_>, hash: u32) -> Self {
        MapEntry {
            key: key.to_vec(),
            rec: value::encode_value(val),
            hash,
        }
    }
}

/// Look up `key` under the map node at `root_off`.
pub fn map_get<'a>(doc: &'a [u8], root_off: u32, key: &[u8]) -> Result<Option<Value<'a>>> {
    map_get_hashed(doc, root_off, key, hash_key(key))
}

/// Look up `key` with a precomputed hash.
pub fn map_get_hashed<'a>(
    doc: &'a [u8],
    root_off: u32,
    key: &[u8],
    hash: u32,
) -> Result<Option<Value<'a>>> {
    get_at_depth(doc, root_off, key, hash, 0)
}

/// Descend from a subtree node whose slots start at `depth`.
pub(crate) fn get_at_depth<'a>(
    doc: &'a [u8],
    subtree_off: u32,
    key: &[u8],
    hash: u32,
    start_depth: usize,
) -> Result<Option<Value<'a>>> {
    let mut off = subtree_off;
    let mut depth = start_depth;
    loop {
        if depth > MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        let (header, node) = node::node_slice_at(doc, off)?;
        header.expect_key_type(KeyType::Map)?;
        if header.kind == NodeKind::Leaf {
            return leaf_get(&header, node, key);
        }
        let branch = node::parse_map_branch(&header, node)?;
        let slot = slot_at(hash, depth);
        if !node::has_slot(branch.bitmap, slot) {
            return Ok(None);
        }
        off = branch.children[node::slot_rank(branch.bitmap, slot)];
        depth += 1;
    }
}

fn leaf_get<'a>(
    header: &node::NodeHeader,
    node: &'a [u8],
    key: &[u8],
) -> Result<Option<Value<'a>>> {
    for (k, v) in node::parse_map_leaf(header, node)? {
        match k.cmp(key) {
            Ordering::Equal => return Ok(Some(v)),
            Ordering::Greater => return Ok(None), // sorted: passed the key
            Ordering::Less => {}
        }
    }
    Ok(None)
}

/// Whether `key` exists under the map node at `root_off`.
pub fn map_has(doc: &[u8], root_off: u32, key: &[u8]) -> Result<bool> {
    Ok(map_get(doc, root_off, key)?.is_some())
}

/// Whether the map node at `off` holds no entries.
pub fn map_is_empty(doc: &[u8], off: u32) -> Result<bool> {
    let (header, node) = node::node_slice_at(doc, off)?;
    header.expect_key_type(KeyType::Map)?;
    if header.kind != NodeKind::Leaf {
        return Ok(false);
    }
    Ok(node::parse_map_leaf(&header, node)?.is_empty())
}

/// Append an empty map root (an empty leaf) and return its offset.
pub fn empty_map_root(b: &mut Builder) -> Result<u32> {
    node::append_map_leaf::<&[u8], &[u8]>(b, &mut [])
}

/// Persistent insert or update. Returns the new root offset and whether
/// anything changed; writing an already-present (key, value) pair returns
/// the original offset untouched.
pub fn map_set_node(
    b: &mut Builder,
    root_off: u32,
    key: &[u8],
    val: &Value<'_>,
) -> Result<(u32, bool)> {
    map_set_node_hashed(b, root_off, key, hash_key(key), val)
}

/// Persistent insert or update with a precomputed hash.
pub fn map_set_node_hashed(
    b: &mut Builder,
    root_off: u32,
    key: &[u8],
    hash: u32,
    val: &Value<'_>,
) -> Result<(u32, bool)> {
    set_at_depth(b, root_off, key, hash, val, 0)
}

pub(crate) fn set_at_depth(
    b: &mut Builder,
    off: u32,
    key: &[u8],
    hash: u32,
    val: &Value<'_>,
    depth: usize,
) -> Result<(u32, bool)> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let kind = {
        let (header, _) = node::node_slice_at(b.buffer(), off)?;
        header.expect_key_type(KeyType::Map)?;
        header.kind
    };
    match kind {
        NodeKind::Leaf => set_in_leaf(b, off, key, hash, val, depth),
        NodeKind::Branch => set_in_branch(b, off, key, hash, val, depth),
    }
}

fn set_in_leaf(
    b: &mut Builder,
    off: u32,
    key: &[u8],
    hash: u32,
    val: &Value<'_>,
    depth: usize,
) -> Result<(u32, bool)> {
    let mut entries: Vec<MapEntry>;
    let mut found = false;
    {
        let doc = b.buffer();
        let (header, node) = node::node_slice_at(doc, off)?;
        let parsed = node::parse_map_leaf(&header, node)?;
        entries = Vec::with_capacity(parsed.len() + 1);
        for (k, v) in &parsed {
            if *k == key {
                if v == val {
                    return Ok((off, false));
                }
                entries.push(MapEntry::new(key, val, hash));
                found = true;
            } else {
                entries.push(MapEntry::new(k, v, hash_key(k)));
            }
        }
    }
    if !found {
        entries.push(MapEntry::new(key, val, hash));
    }
    let new_off = build_map_nodes(b, &mut entries, depth)?;
    Ok((new_off, true))
}

fn set_in_branch(
    b: &mut Builder,
    off: u32,
    key: &[u8],
    hash: u32,
    val: &Value<'_>,
    depth: usize,
) -> Result<(u32, bool)> {
    let (bitmap, mut children) = {
        let (header, node) = node::node_slice_at(b.buffer(), off)?;
        let branch = node::parse_map_branch(&header, node)?;
        (branch.bitmap, branch.children)
    };
    let slot = slot_at(hash, depth);
    let rank = node::slot_rank(bitmap, slot);

    if node::has_slot(bitmap, slot) {
        let (new_child, changed) = set_at_depth(b, children[rank], key, hash, val, depth + 1)?;
        if !changed {
            return Ok((off, false));
        }
        children[rank] = new_child;
        let new_off = node::append_map_branch(b, bitmap, &children)?;
        return Ok((new_off, true));
    }

    let mut single = [MapEntry::new(key, val, hash)];
    let child = build_map_nodes(b, &mut single, depth + 1)?;
    children.insert(rank, child);
    let new_off = node::append_map_branch(b, bitmap | (1 << slot), &children)?;
    Ok((new_off, true))
}

/// Persistent delete. Returns the new root offset and whether anything
/// changed; deleting a missing key returns the original offset.
pub fn map_del_node(b: &mut Builder, root_off: u32, key: &[u8]) -> Result<(u32, bool)> {
    del_at_depth(b, root_off, key, hash_key(key), 0)
}

fn del_at_depth(
    b: &mut Builder,
    off: u32,
    key: &[u8],
    hash: u32,
    depth: usize,
) -> Result<(u32, bool)> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let kind = {
        let (header, _) = node::node_slice_at(b.buffer(), off)?;
        header.expect_key_type(KeyType::Map)?;
        header.kind
    };

    if kind == NodeKind::Leaf {
        let mut entries: Vec<MapEntry>;
        {
            let doc = b.buffer();
            let (header, node) = node::node_slice_at(doc, off)?;
            let parsed = node::parse_map_leaf(&header, node)?;
            if !parsed.iter().any(|(k, _)| *k == key) {
                return Ok((off, false));
            }
            entries = parsed
                .iter()
                .filter(|(k, _)| *k != key)
                .map(|(k, v)| MapEntry::new(k, v, hash_key(k)))
                .collect();
        }
        let new_off = build_map_nodes(b, &mut entries, depth)?;
        return Ok((new_off, true));
    }

    let (bitmap, mut children) = {
        let (header, node) = node::node_slice_at(b.buffer(), off)?;
        let branch = node::parse_map_branch(&header, node)?;
        (branch.bitmap, branch.children)
    };
    let slot = slot_at(hash, depth);
    if !node::has_slot(bitmap, slot) {
        return Ok((off, false));
    }
    let rank = node::slot_rank(bitmap, slot);
    let (new_child, changed) = del_at_depth(b, children[rank], key, hash, depth + 1)?;
    if !changed {
        return Ok((off, false));
    }

    if map_is_empty(b.buffer(), new_child)? {
        children.remove(rank);
        if children.is_empty() {
            let new_off = empty_map_root(b)?;
            return Ok((new_off, true));
        }
        let new_off = node::append_map_branch(b, bitmap & !(1 << slot), &children)?;
        return Ok((new_off, true));
    }

    children[rank] = new_child;
    let new_off = node::append_map_branch(b, bitmap, &children)?;
    Ok((new_off, true))
}

/// Build a map tree from owned entries, splitting by hash slot while depth
/// permits; entries colliding through all levels land in one sorted leaf.
fn build_map_nodes(b: &mut Builder, entries: &mut [MapEntry], depth: usize) -> Result<u32> {
    if entries.len() <= 1 || depth >= MAX_DEPTH {
        let mut leaf: SmallVec<[(&[u8], &[u8]); 8]> = entries
            .iter()
            .map(|e| (e.key.as_slice(), e.rec.as_slice()))
            .collect();
        return node::append_map_leaf(b, &mut leaf);
    }

    entries.sort_by_key(|e| slot_at(e.hash, depth));
    let mut bitmap: u16 = 0;
    let mut children: SmallVec<[u32; 16]> = SmallVec::new();
    let mut start = 0;
    while start < entries.len() {
        let slot = slot_at(entries[start].hash, depth);
        let mut end = start + 1;
        while end < entries.len() && slot_at(entries[end].hash, depth) == slot {
            end += 1;
        }
        let child = build_map_nodes(b, &mut entries[start..end], depth + 1)?;
        bitmap |= 1 << slot;
        children.push(child);
        start = end;
    }
    node::append_map_branch(b, bitmap, &children)
}

/// Depth-first entry traversal: slot-ascending across branches, key-sorted
/// within leaves. Callback errors propagate verbatim and stop the walk.
pub fn map_iter_entries<'a, F>(doc: &'a [u8], off: u32, mut f: F) -> Result<()>
where
    F: FnMut(&'a [u8], Value<'a>) -> Result<()>,
{
    iter_entries_at(doc, off, 0, &mut f)
}

fn iter_entries_at<'a, F>(doc: &'a [u8], off: u32, depth: usize, f: &mut F) -> Result<()>
where
    F: FnMut(&'a [u8], Value<'a>) -> Result<()>,
{
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let (header, node) = node::node_slice_at(doc, off)?;
    header.expect_key_type(KeyType::Map)?;
    if header.kind == NodeKind::Leaf {
        for (k, v) in node::parse_map_leaf(&header, node)? {
            f(k, v)?;
        }
        return Ok(());
    }
    let branch = node::parse_map_branch(&header, node)?;
    for child in branch.children {
        iter_entries_at(doc, child, depth + 1, f)?;
    }
    Ok(())
}

/// Depth-first value traversal; same order as [`map_iter_entries`].
pub fn map_iter_values<'a, F>(doc: &'a [u8], off: u32, mut f: F) -> Result<()>
where
    F: FnMut(Value<'a>) -> Result<()>,
{
    iter_entries_at(doc, off, 0, &mut |_, v| f(v))
}

/// Bulk map assembly from key/value pairs.
///
/// Produces the same node shapes as incremental insertion; setting a key
/// twice keeps the last value.
#[derive(Debug, Default)]
pub struct MapBuilder {
    entries: Vec<MapEntry>,
}

impl MapBuilder {
    #[must_use]
    pub fn new() -> Self {
        MapBuilder::default()
    }

    /// Stage a key/value pair, replacing any earlier value for the key.
    pub fn set(&mut self, key: &[u8], val: &Value<'_>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) {
            entry.rec.clear();
            value::encode_value_into(val, &mut entry.rec);
            return;
        }
        self.entries.push(MapEntry::new(key, val, hash_key(key)));
    }

    /// Stage a pair with a string key.
    pub fn set_str(&mut self, key: &str, val: &Value<'_>) {
        self.set(key.as_bytes(), val);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the staged entries into `b` and return the root offset.
    pub fn build(&mut self, b: &mut Builder) -> Result<u32> {
        build_map_nodes(b, &mut self.entries, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These three keys share the low 28 bits of xxh32(key, 0), so they
    // collide at every branch level and are forced into one deep leaf.
    const COLLIDING: [&[u8]; 3] = [b"idz7", b"o3e8", b"rvw1"];

    #[test]
    fn colliding_fixture_still_collides() {
        let h0 = hash_key(COLLIDING[0]) & 0x0FFF_FFFF;
        for key in &COLLIDING[1..] {
            assert_eq!(hash_key(key) & 0x0FFF_FFFF, h0);
        }
    }

    #[test]
    fn empty_map() {
        let mut b = Builder::new();
        let root = empty_map_root(&mut b).unwrap();
        assert!(map_is_empty(b.buffer(), root).unwrap());
        assert!(!map_has(b.buffer(), root, b"x").unwrap());
        assert_eq!(map_get(b.buffer(), root, b"x").unwrap(), None);
        let mut count = 0;
        map_iter_entries(b.buffer(), root, |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn two_key_insert_and_idempotent_set() {
        let mut b = Builder::new();
        let root0 = empty_map_root(&mut b).unwrap();
        let (root1, changed) = map_set_node(&mut b, root0, b"a", &Value::I64(1)).unwrap();
        assert!(changed);
        let (root2, changed) = map_set_node(&mut b, root1, b"b", &Value::I64(2)).unwrap();
        assert!(changed);

        assert_eq!(map_get(b.buffer(), root2, b"a").unwrap(), Some(Value::I64(1)));
        assert_eq!(map_get(b.buffer(), root2, b"b").unwrap(), Some(Value::I64(2)));
        assert_eq!(map_get(b.buffer(), root2, b"c").unwrap(), None);

        // Writing the same value again is a no-op returning the same root.
        let (root3, changed) = map_set_node(&mut b, root2, b"a", &Value::I64(1)).unwrap();
        assert!(!changed);
        assert_eq!(root3, root2);
    }

    #[test]
    fn replace_changes_value_only() {
        let mut b = Builder::new();
        let root0 = empty_map_root(&mut b).unwrap();
        let (root1, _) = map_set_node(&mut b, root0, b"k", &Value::I64(1)).unwrap();
        let (root2, changed) = map_set_node(&mut b, root1, b"k", &Value::Text(b"v")).unwrap();
        assert!(changed);
        assert_eq!(
            map_get(b.buffer(), root2, b"k").unwrap(),
            Some(Value::Text(b"v"))
        );
        // The old root still sees the old value.
        assert_eq!(map_get(b.buffer(), root1, b"k").unwrap(), Some(Value::I64(1)));
    }

    #[test]
    fn delete_collapses_to_empty_leaf() {
        let mut b = Builder::new();
        let root0 = empty_map_root(&mut b).unwrap();
        let (root1, _) = map_set_node(&mut b, root0, b"a", &Value::I64(1)).unwrap();
        let (root2, changed) = map_del_node(&mut b, root1, b"a").unwrap();
        assert!(changed);
        assert!(map_is_empty(b.buffer(), root2).unwrap());

        // Deleting a missing key leaves the root untouched.
        let (root3, changed) = map_del_node(&mut b, root2, b"a").unwrap();
        assert!(!changed);
        assert_eq!(root3, root2);
    }

    #[test]
    fn many_keys_round_trip() {
        let mut b = Builder::new();
        let mut root = empty_map_root(&mut b).unwrap();
        let keys: Vec<String> = (0..200).map(|i| format!("key-{i}")).collect();
        for (i, key) in keys.iter().enumerate() {
            let (next, changed) =
                map_set_node(&mut b, root, key.as_bytes(), &Value::I64(i as i64)).unwrap();
            assert!(changed);
            root = next;
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(
                map_get(b.buffer(), root, key.as_bytes()).unwrap(),
                Some(Value::I64(i as i64)),
                "key {key}"
            );
        }
        assert!(!map_has(b.buffer(), root, b"key-200").unwrap());
    }

    #[test]
    fn iteration_visits_every_key_once() {
        let mut b = Builder::new();
        let mut root = empty_map_root(&mut b).unwrap();
        for i in 0..50 {
            let key = format!("k{i}");
            let (next, _) = map_set_node(&mut b, root, key.as_bytes(), &Value::I64(i)).unwrap();
            root = next;
        }
        let mut seen = std::collections::BTreeMap::new();
        map_iter_entries(b.buffer(), root, |k, v| {
            let prev = seen.insert(k.to_vec(), v.as_i64().unwrap());
            assert!(prev.is_none(), "key visited twice");
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 50);
        for i in 0..50i64 {
            assert_eq!(seen[format!("k{i}").as_bytes()], i);
        }
    }

    #[test]
    fn iterator_error_short_circuits() {
        let mut b = Builder::new();
        let mut root = empty_map_root(&mut b).unwrap();
        for i in 0..10 {
            let key = format!("k{i}");
            let (next, _) = map_set_node(&mut b, root, key.as_bytes(), &Value::I64(i)).unwrap();
            root = next;
        }
        let mut visited = 0;
        let err = map_iter_values(b.buffer(), root, |_| {
            visited += 1;
            if visited == 3 {
                Err(Error::DuplicateMapKey)
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert_eq!(err, Error::DuplicateMapKey);
        assert_eq!(visited, 3);
    }

    #[test]
    fn colliding_keys_share_a_deep_leaf() {
        let mut b = Builder::new();
        let mut root = empty_map_root(&mut b).unwrap();
        for (i, key) in COLLIDING.iter().enumerate() {
            let (next, changed) = map_set_node(&mut b, root, key, &Value::I64(i as i64)).unwrap();
            assert!(changed);
            root = next;
        }
        for (i, key) in COLLIDING.iter().enumerate() {
            assert_eq!(
                map_get(b.buffer(), root, key).unwrap(),
                Some(Value::I64(i as i64))
            );
        }
        // Deleting one collider keeps the others reachable.
        let (root, changed) = map_del_node(&mut b, root, COLLIDING[1]).unwrap();
        assert!(changed);
        assert_eq!(map_get(b.buffer(), root, COLLIDING[1]).unwrap(), None);
        assert_eq!(
            map_get(b.buffer(), root, COLLIDING[0]).unwrap(),
            Some(Value::I64(0))
        );
        assert_eq!(
            map_get(b.buffer(), root, COLLIDING[2]).unwrap(),
            Some(Value::I64(2))
        );
    }

    #[test]
    fn bulk_builder_agrees_with_incremental() {
        let mut bulk = Builder::new();
        let mut mb = MapBuilder::new();
        for i in 0..40i64 {
            mb.set_str(&format!("k{i}"), &Value::I64(i));
        }
        // Last write wins.
        mb.set_str("k0", &Value::I64(-1));
        let bulk_root = mb.build(&mut bulk).unwrap();

        let mut inc = Builder::new();
        let mut root = empty_map_root(&mut inc).unwrap();
        for i in 0..40i64 {
            let key = format!("k{i}");
            let v = if i == 0 { Value::I64(-1) } else { Value::I64(i) };
            let (next, _) = map_set_node(&mut inc, root, key.as_bytes(), &v).unwrap();
            root = next;
        }

        let mut from_bulk = std::collections::BTreeMap::new();
        map_iter_entries(bulk.buffer(), bulk_root, |k, v| {
            from_bulk.insert(k.to_vec(), v.as_i64().unwrap());
            Ok(())
        })
        .unwrap();
        let mut from_inc = std::collections::BTreeMap::new();
        map_iter_entries(inc.buffer(), root, |k, v| {
            from_inc.insert(k.to_vec(), v.as_i64().unwrap());
            Ok(())
        })
        .unwrap();
        assert_eq!(from_bulk, from_inc);
    }

    #[test]
    fn structural_sharing_bounds_growth() {
        let mut b = Builder::new();
        let mut root = empty_map_root(&mut b).unwrap();
        for i in 0..100 {
            let key = format!("key-{i}");
            let (next, _) = map_set_node(&mut b, root, key.as_bytes(), &Value::I64(i)).unwrap();
            root = next;
        }
        let before = b.len();
        let (_, changed) = map_set_node(&mut b, root, b"key-50", &Value::I64(-1)).unwrap();
        assert!(changed);
        let grown = b.len() - before;
        // A single deep update rewrites one root-to-leaf path, not the map.
        assert!(grown < before / 4, "grew {grown} of {before}");
    }

    #[test]
    fn get_on_array_node_is_type_error() {
        let mut b = Builder::new();
        let off = crate::node::append_array_leaf::<&[u8]>(&mut b, 0, 0, &[]).unwrap();
        assert!(matches!(
            map_get(b.buffer(), off, b"k"),
            Err(Error::KeyTypeMismatch { .. })
        ));
    }
}
