//! Adjacency lists
//!
//! An [`EdgeList`] is a persistent ordered map from edge identity to
//! [`EdgeInfo`]. It is an AVL tree whose nodes are shared through `Arc`:
//! `insert` and `remove` copy only the path from the root to the touched
//! entry and return a new list, so the previous value stays valid. A node
//! record can therefore hand its adjacency to a reader without holding any
//! lock while the writer keeps mutating its own copy.

use super::types::Identity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// One incident edge as seen from a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeInfo {
    /// Identity of the relationship
    pub id: Identity,
    /// Schema of the relationship
    pub schema_id: Identity,
    /// The node at the other end (target for outgoing, source for incoming)
    pub end_id: Identity,
    pub end_schema_id: Identity,
}

impl EdgeInfo {
    pub fn new(id: Identity, schema_id: Identity, end_id: Identity, end_schema_id: Identity) -> Self {
        EdgeInfo {
            id,
            schema_id,
            end_id,
            end_schema_id,
        }
    }
}

type Link = Option<Arc<TreeNode>>;

#[derive(Debug)]
struct TreeNode {
    info: EdgeInfo,
    height: u8,
    left: Link,
    right: Link,
}

fn height(link: &Link) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

fn make(info: EdgeInfo, left: Link, right: Link) -> Arc<TreeNode> {
    let height = 1 + height(&left).max(height(&right));
    Arc::new(TreeNode {
        info,
        height,
        left,
        right,
    })
}

/// Rebuild a node from its parts, rotating when the subtrees differ by more
/// than one level.
fn balance(info: EdgeInfo, left: Link, right: Link) -> Arc<TreeNode> {
    let hl = height(&left);
    let hr = height(&right);

    if hl > hr + 1 {
        if let Some(l) = &left {
            if height(&l.left) >= height(&l.right) {
                return make(
                    l.info.clone(),
                    l.left.clone(),
                    Some(make(info, l.right.clone(), right)),
                );
            }
            if let Some(lr) = &l.right {
                return make(
                    lr.info.clone(),
                    Some(make(l.info.clone(), l.left.clone(), lr.left.clone())),
                    Some(make(info, lr.right.clone(), right)),
                );
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = &right {
            if height(&r.right) >= height(&r.left) {
                return make(
                    r.info.clone(),
                    Some(make(info, left, r.left.clone())),
                    r.right.clone(),
                );
            }
            if let Some(rl) = &r.left {
                return make(
                    rl.info.clone(),
                    Some(make(info, left, rl.left.clone())),
                    Some(make(r.info.clone(), rl.right.clone(), r.right.clone())),
                );
            }
        }
    }

    make(info, left, right)
}

/// Returns the new subtree and whether the key was new
fn insert(link: &Link, info: EdgeInfo) -> (Arc<TreeNode>, bool) {
    match link {
        None => (make(info, None, None), true),
        Some(node) => match info.id.cmp(&node.info.id) {
            Ordering::Less => {
                let (left, added) = insert(&node.left, info);
                (balance(node.info.clone(), Some(left), node.right.clone()), added)
            }
            Ordering::Greater => {
                let (right, added) = insert(&node.right, info);
                (balance(node.info.clone(), node.left.clone(), Some(right)), added)
            }
            Ordering::Equal => (make(info, node.left.clone(), node.right.clone()), false),
        },
    }
}

fn remove_min(node: &Arc<TreeNode>) -> (EdgeInfo, Link) {
    match &node.left {
        None => (node.info.clone(), node.right.clone()),
        Some(left) => {
            let (min, rest) = remove_min(left);
            (min, Some(balance(node.info.clone(), rest, node.right.clone())))
        }
    }
}

/// `None` when the key is absent, so the caller can keep sharing the old root
fn remove(link: &Link, id: &Identity) -> Option<Link> {
    let node = link.as_ref()?;
    match id.cmp(&node.info.id) {
        Ordering::Less => {
            let left = remove(&node.left, id)?;
            Some(Some(balance(node.info.clone(), left, node.right.clone())))
        }
        Ordering::Greater => {
            let right = remove(&node.right, id)?;
            Some(Some(balance(node.info.clone(), node.left.clone(), right)))
        }
        Ordering::Equal => Some(match (&node.left, &node.right) {
            (None, None) => None,
            (Some(l), None) => Some(l.clone()),
            (None, Some(r)) => Some(r.clone()),
            (Some(_), Some(r)) => {
                let (min, rest) = remove_min(r);
                Some(balance(min, node.left.clone(), rest))
            }
        }),
    }
}

/// Persistent adjacency list keyed by edge identity
#[derive(Clone, Default)]
pub struct EdgeList {
    root: Link,
    len: usize,
}

impl EdgeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// New list containing `info`, replacing any entry with the same id
    pub fn insert(&self, info: EdgeInfo) -> EdgeList {
        let (root, added) = insert(&self.root, info);
        EdgeList {
            root: Some(root),
            len: if added { self.len + 1 } else { self.len },
        }
    }

    /// New list without `id`; shares the whole tree when `id` is absent
    pub fn remove(&self, id: &Identity) -> EdgeList {
        match remove(&self.root, id) {
            Some(root) => EdgeList {
                root,
                len: self.len - 1,
            },
            None => self.clone(),
        }
    }

    pub fn get(&self, id: &Identity) -> Option<&EdgeInfo> {
        let mut current = self.root.as_ref();
        while let Some(node) = current {
            match id.cmp(&node.info.id) {
                Ordering::Less => current = node.left.as_ref(),
                Ordering::Greater => current = node.right.as_ref(),
                Ordering::Equal => return Some(&node.info),
            }
        }
        None
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.get(id).is_some()
    }

    /// Entries in identity order
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_ref());
        iter
    }

    /// Whether two lists share the same root
    pub fn ptr_eq(&self, other: &EdgeList) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    #[cfg(test)]
    fn height(&self) -> u8 {
        height(&self.root)
    }
}

impl fmt::Debug for EdgeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for EdgeList {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for EdgeList {}

impl FromIterator<EdgeInfo> for EdgeList {
    fn from_iter<I: IntoIterator<Item = EdgeInfo>>(iter: I) -> Self {
        iter.into_iter()
            .fold(EdgeList::new(), |list, info| list.insert(info))
    }
}

/// In-order iterator over an [`EdgeList`]
pub struct Iter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iter<'a> {
    fn push_left(&mut self, mut link: Option<&'a Arc<TreeNode>>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = node.left.as_ref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a EdgeInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_ref());
        Some(&node.info)
    }
}

impl<'a> IntoIterator for &'a EdgeList {
    type Item = &'a EdgeInfo;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(key: &str) -> EdgeInfo {
        EdgeInfo::new(
            Identity::new("d", key),
            Identity::new("d", "Rel"),
            Identity::new("d", format!("end-{}", key)),
            Identity::new("d", "Node"),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let list = EdgeList::new().insert(info("a")).insert(info("b"));
        assert_eq!(list.len(), 2);
        assert!(list.contains(&Identity::new("d", "a")));
        assert!(list.contains(&Identity::new("D", "B")));
        assert!(!list.contains(&Identity::new("d", "c")));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut replacement = info("a");
        replacement.end_id = Identity::new("d", "other");
        let list = EdgeList::new().insert(info("a")).insert(replacement);
        assert_eq!(list.len(), 1);
        assert_eq!(
            list.get(&Identity::new("d", "a")).unwrap().end_id,
            Identity::new("d", "other")
        );
    }

    #[test]
    fn test_previous_versions_are_untouched() {
        let v1 = EdgeList::new().insert(info("a")).insert(info("b"));
        let v2 = v1.insert(info("c"));
        let v3 = v2.remove(&Identity::new("d", "a"));

        assert_eq!(v1.len(), 2);
        assert!(!v1.contains(&Identity::new("d", "c")));
        assert_eq!(v2.len(), 3);
        assert!(v2.contains(&Identity::new("d", "a")));
        assert_eq!(v3.len(), 2);
        assert!(!v3.contains(&Identity::new("d", "a")));
    }

    #[test]
    fn test_remove_missing_shares_root() {
        let list = EdgeList::new().insert(info("a"));
        let same = list.remove(&Identity::new("d", "zzz"));
        assert!(same.ptr_eq(&list));
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn test_iteration_is_ordered() {
        let list: EdgeList = ["m", "c", "x", "a", "q"].iter().map(|k| info(k)).collect();
        let keys: Vec<&str> = list.iter().map(|e| e.id.key()).collect();
        assert_eq!(keys, vec!["a", "c", "m", "q", "x"]);
    }

    #[test]
    fn test_stays_balanced() {
        let mut list = EdgeList::new();
        for i in 0..1024 {
            list = list.insert(info(&format!("{:05}", i)));
        }
        assert_eq!(list.len(), 1024);
        // AVL height bound is ~1.44 log2(n)
        assert!(list.height() <= 15, "height {}", list.height());

        for i in (0..1024).step_by(2) {
            list = list.remove(&Identity::new("d", format!("{:05}", i)));
        }
        assert_eq!(list.len(), 512);
        assert!(list.height() <= 14);
        assert_eq!(list.iter().count(), 512);
    }

    #[test]
    fn test_equality_ignores_shape() {
        let a: EdgeList = ["a", "b", "c"].iter().map(|k| info(k)).collect();
        let b: EdgeList = ["c", "b", "a"].iter().map(|k| info(k)).collect();
        assert_eq!(a, b);
    }
}
