//! Right-biased structural merge of map documents.
//!
//! The result reuses left-document nodes wherever possible: the builder is
//! seeded with the left payload, right-only subtrees are cloned in, and a
//! merged subtree that comes out identical to the left side short-circuits
//! to the left offset without emitting anything.

use smallvec::SmallVec;
use tracing::debug;

use crate::clone::{clone_map_node, clone_value_from_doc};
use crate::document::{self, Builder};
use crate::error::{Error, Result};
use crate::map::{self, MAX_DEPTH};
use crate::node::{self, KeyType, NodeKind};
use crate::xxh32::xxh32;

/// Merge two map tree documents, right side winning on key conflicts.
///
/// The output's previous root is the left document's root.
pub fn merge_map_documents(left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
    let left_trailer = document::parse_trailer(left)?;
    let right_trailer = document::parse_trailer(right)?;
    let (left_header, _) = node::node_slice_at(left, left_trailer.root_offset)?;
    left_header.expect_key_type(KeyType::Map)?;
    let (right_header, _) = node::node_slice_at(right, right_trailer.root_offset)?;
    right_header.expect_key_type(KeyType::Map)?;

    debug!(
        left_len = left.len(),
        right_len = right.len(),
        "merging map documents"
    );
    let (mut b, _) = Builder::from_document(left)?;
    let (root, _) = merge_nodes(
        left,
        right,
        &mut b,
        left_trailer.root_offset,
        right_trailer.root_offset,
        0,
    )?;
    Ok(b.bytes_with_trailer(root, left_trailer.root_offset))
}

fn merge_nodes(
    left: &[u8],
    right: &[u8],
    b: &mut Builder,
    left_off: u32,
    right_off: u32,
    depth: usize,
) -> Result<(u32, bool)> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded);
    }
    let (left_header, left_node) = node::node_slice_at(left, left_off)?;
    left_header.expect_key_type(KeyType::Map)?;
    let (right_header, right_node) = node::node_slice_at(right, right_off)?;
    right_header.expect_key_type(KeyType::Map)?;

    // Right leaf: apply its entries onto the left subtree, right wins.
    if right_header.kind == NodeKind::Leaf {
        let entries = node::parse_map_leaf(&right_header, right_node)?;
        let mut off = left_off;
        let mut changed = false;
        for (key, val) in entries {
            let cloned = clone_value_from_doc(right, val, b)?;
            let (new_off, did) = map::set_at_depth(b, off, key, xxh32(key, 0), &cloned, depth)?;
            changed |= did;
            off = new_off;
        }
        return Ok((off, changed));
    }

    // Left leaf under a right branch: clone the right subtree, then fold
    // in the left entries that it does not already cover.
    if left_header.kind == NodeKind::Leaf {
        let cloned_right = clone_map_node(right, right_off, b)?;
        let entries = node::parse_map_leaf(&left_header, left_node)?;
        let mut off = cloned_right;
        for (key, val) in entries {
            let hash = xxh32(key, 0);
            if map::get_at_depth(b.buffer(), off, key, hash, depth)?.is_some() {
                continue;
            }
            let (new_off, _) = map::set_at_depth(b, off, key, hash, &val, depth)?;
            off = new_off;
        }
        return Ok((off, true));
    }

    // Two branches: slot-wise union.
    let left_branch = node::parse_map_branch(&left_header, left_node)?;
    let right_branch = node::parse_map_branch(&right_header, right_node)?;
    let union = left_branch.bitmap | right_branch.bitmap;
    let mut children: SmallVec<[u32; 16]> = SmallVec::new();
    let mut changed = false;
    let mut left_rank = 0;
    let mut right_rank = 0;

    for slot in 0..16u8 {
        let in_left = node::has_slot(left_branch.bitmap, slot);
        let in_right = node::has_slot(right_branch.bitmap, slot);
        if !in_left && !in_right {
            continue;
        }
        let child = if in_left && in_right {
            let (merged, child_changed) = merge_nodes(
                left,
                right,
                b,
                left_branch.children[left_rank],
                right_branch.children[right_rank],
                depth + 1,
            )?;
            changed |= child_changed;
            merged
        } else if in_left {
            left_branch.children[left_rank]
        } else {
            changed = true;
            clone_map_node(right, right_branch.children[right_rank], b)?
        };
        children.push(child);
        if in_left {
            left_rank += 1;
        }
        if in_right {
            right_rank += 1;
        }
    }

    if !changed && union == left_branch.bitmap && children == left_branch.children {
        return Ok((left_off, false));
    }
    let off = node::append_map_branch(b, union, &children)?;
    Ok((off, true))
}
