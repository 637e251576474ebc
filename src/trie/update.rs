//! Descent and rewrite of the buffered tree.
//!
//! Every mutation walks digits from the buffered root, faulting persistent
//! nodes into the overlay along the way. Descent over a node with fragment
//! `f` and remaining key `tail` ends in one of three ways:
//!
//! - **terminal**: `tail == f`, the key addresses this node;
//! - **extend**: `tail` continues past `f` through a vacant child slot;
//! - **split**: `tail` diverges inside `f` (or exhausts strictly within it).
//!
//! Deletions re-normalize on the way back up: an emptied node is unlinked
//! from its parent, and a node left with a single child and no terminal is
//! merged into that child. The root is exempt from both.

use super::buffered::BufferedNode;
use super::node_store::NodeStore;
use crate::data::common_prefix_len;
use crate::error::TrieError;

/// SET of a non-empty value. Returns whether the key was present before.
pub(crate) fn update_node(
    store: &NodeStore,
    node: &mut BufferedNode,
    tail: &[u8],
    value: &[u8],
) -> Result<bool, TrieError> {
    let fragment = node.node_data.path_fragment.clone();
    if let Some(rest) = tail.strip_prefix(fragment.as_slice()) {
        let Some((&d, rest)) = rest.split_first() else {
            // terminal endpoint
            let existed = node.node_data.terminal.is_some();
            node.set_value(value, store.model());
            return Ok(existed);
        };
        let mut descended = None;
        if let Some(child) = node.child_mut(store, d)? {
            descended = Some(update_node(store, child, rest, value)?);
        }
        if let Some(existed) = descended {
            node.mark_children_changed();
            return Ok(existed);
        }
        // extend: hang a fresh leaf off a vacant slot
        let mut child_path = node.trie_path.clone();
        child_path.extend_from_slice(&fragment);
        child_path.push(d);
        let child = BufferedNode::new_terminal(child_path, rest.to_vec(), value, store.model());
        node.set_child(d, child);
        return Ok(false);
    }

    // split: the key leaves the fragment at the first mismatching digit,
    // or ends strictly inside it
    let at = common_prefix_len(tail, &fragment);
    node.split(at);
    if at == tail.len() {
        // the key is a proper prefix of the old fragment: the upper node
        // carries the new terminal
        node.set_value(value, store.model());
    } else {
        let d = tail[at];
        let mut child_path = node.trie_path.clone();
        child_path.extend_from_slice(&tail[..at + 1]);
        let child =
            BufferedNode::new_terminal(child_path, tail[at + 1..].to_vec(), value, store.model());
        node.set_child(d, child);
    }
    Ok(false)
}

/// DEL. Returns whether a key was removed; misses leave the state
/// untouched.
pub(crate) fn delete_node(
    store: &NodeStore,
    node: &mut BufferedNode,
    tail: &[u8],
) -> Result<bool, TrieError> {
    let fragment = node.node_data.path_fragment.clone();
    let Some(rest) = tail.strip_prefix(fragment.as_slice()) else {
        return Ok(false);
    };
    let Some((&d, rest)) = rest.split_first() else {
        if node.node_data.terminal.is_none() {
            return Ok(false);
        }
        node.clear_terminal();
        return Ok(true);
    };

    let deleted = match node.child_mut(store, d)? {
        Some(child) => delete_node(store, child, rest)?,
        None => return Ok(false),
    };
    if deleted {
        normalize_child(store, node, d)?;
    }
    Ok(deleted)
}

/// Removes the whole subtree under `tail`. Returns whether anything was
/// unlinked.
pub(crate) fn delete_prefix_node(
    store: &NodeStore,
    node: &mut BufferedNode,
    rest: &[u8],
) -> Result<bool, TrieError> {
    debug_assert!(!rest.is_empty());
    let d = rest[0];
    let rest = &rest[1..];

    let Some(child) = node.child_mut(store, d)? else {
        return Ok(false);
    };
    let fragment = child.node_data.path_fragment.clone();

    if rest.len() <= fragment.len() {
        // the prefix ends on the link digit, at the child, or inside its
        // fragment; either way the child's whole subtree matches
        if fragment.starts_with(rest) {
            node.remove_child(d);
            return Ok(true);
        }
        return Ok(false);
    }

    let Some(child_rest) = rest.strip_prefix(fragment.as_slice()) else {
        return Ok(false);
    };
    let removed = delete_prefix_node(store, child, child_rest)?;
    if removed {
        normalize_child(store, node, d)?;
    }
    Ok(removed)
}

/// Restores the child invariant after a removal below `d`: drops the child
/// when it became empty, merges it when it degenerated to a lone link.
fn normalize_child(store: &NodeStore, node: &mut BufferedNode, d: u8) -> Result<(), TrieError> {
    let mut drop_child = false;
    if let Some(child) = node.child_mut(store, d)? {
        if child.is_empty() {
            drop_child = true;
        } else {
            child.merge_if_needed(store)?;
        }
    }
    if drop_child {
        node.remove_child(d);
    }
    node.mark_children_changed();
    Ok(())
}
