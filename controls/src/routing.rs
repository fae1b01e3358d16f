//! Path resolution over control trees.
//!
//! Receiver and sender trees share the same shape, so routing is written once
//! against [`TreeNode`]. Group and modal containers consume one path segment,
//! tabs consume two (page id, then control id within the page).

use crate::error::{ControlError, Result};
use av_controls_types::ControlPath;
use indexmap::IndexMap;

/// Children of a node, as seen by the router.
pub enum Children<'a, N> {
    Leaf,
    Flat(&'a IndexMap<String, N>),
    Paged(&'a IndexMap<String, IndexMap<String, N>>),
}

pub enum ChildrenMut<'a, N> {
    Leaf,
    Flat(&'a mut IndexMap<String, N>),
    Paged(&'a mut IndexMap<String, IndexMap<String, N>>),
}

/// A node of a control tree.
pub trait TreeNode: Sized {
    fn children(&self) -> Children<'_, Self>;
    fn children_mut(&mut self) -> ChildrenMut<'_, Self>;
}

/// Resolve `path` below `root`.
///
/// The empty path and paths that stop on a tabs page id fail with
/// [`ControlError::ControlNotFound`].
pub fn route<'a, N: TreeNode>(root: &'a N, path: &ControlPath) -> Result<&'a N> {
    lookup(root, path).ok_or_else(|| ControlError::ControlNotFound(path.clone()))
}

/// Mutable variant of [`route`].
pub fn route_mut<'a, N: TreeNode>(root: &'a mut N, path: &ControlPath) -> Result<&'a mut N> {
    lookup_mut(root, path).ok_or_else(|| ControlError::ControlNotFound(path.clone()))
}

fn lookup<'a, N: TreeNode>(node: &'a N, path: &[String]) -> Option<&'a N> {
    let (first, rest) = path.split_first()?;
    let (child, rest) = match node.children() {
        Children::Leaf => return None,
        Children::Flat(controls) => (controls.get(first)?, rest),
        Children::Paged(pages) => {
            let (id, rest) = rest.split_first()?;
            (pages.get(first)?.get(id)?, rest)
        }
    };
    if rest.is_empty() {
        Some(child)
    } else {
        lookup(child, rest)
    }
}

fn lookup_mut<'a, N: TreeNode>(node: &'a mut N, path: &[String]) -> Option<&'a mut N> {
    let (first, rest) = path.split_first()?;
    let (child, rest) = match node.children_mut() {
        ChildrenMut::Leaf => return None,
        ChildrenMut::Flat(controls) => (controls.get_mut(first)?, rest),
        ChildrenMut::Paged(pages) => {
            let (id, rest) = rest.split_first()?;
            (pages.get_mut(first)?.get_mut(id)?, rest)
        }
    };
    if rest.is_empty() {
        Some(child)
    } else {
        lookup_mut(child, rest)
    }
}

/// Pre-order walk: a node is visited before its children, children in
/// insertion order. `visit` receives the accumulator produced for the parent
/// and returns the one handed to this node's children.
pub fn traverse<N, A, F>(root: &N, acc: A, visit: &mut F)
where
    N: TreeNode,
    F: FnMut(&ControlPath, &N, &A) -> A,
{
    walk(root, &ControlPath::root(), &acc, visit);
}

fn walk<N, A, F>(node: &N, path: &ControlPath, acc: &A, visit: &mut F)
where
    N: TreeNode,
    F: FnMut(&ControlPath, &N, &A) -> A,
{
    let child_acc = visit(path, node, acc);
    match node.children() {
        Children::Leaf => {}
        Children::Flat(controls) => {
            for (id, child) in controls {
                walk(child, &path.child(id.as_str()), &child_acc, visit);
            }
        }
        Children::Paged(pages) => {
            for (page_id, controls) in pages {
                let page_path = path.child(page_id.as_str());
                for (id, child) in controls {
                    walk(child, &page_path.child(id.as_str()), &child_acc, visit);
                }
            }
        }
    }
}

/// Visit every node with its path, root included.
pub fn deep_foreach<N, F>(root: &N, mut visit: F)
where
    N: TreeNode,
    F: FnMut(&ControlPath, &N),
{
    traverse(root, (), &mut |path, node, _| visit(path, node));
}

/// Paths of all leaves below `root`.
pub fn leaf_paths<N: TreeNode>(root: &N) -> Vec<ControlPath> {
    let mut paths = Vec::new();
    deep_foreach(root, |path, node| {
        if matches!(node.children(), Children::Leaf) && !path.is_empty() {
            paths.push(path.clone());
        }
    });
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Node {
        Leaf(&'static str),
        Group(IndexMap<String, Node>),
        Tabs(IndexMap<String, IndexMap<String, Node>>),
    }

    impl TreeNode for Node {
        fn children(&self) -> Children<'_, Self> {
            match self {
                Node::Leaf(_) => Children::Leaf,
                Node::Group(c) => Children::Flat(c),
                Node::Tabs(p) => Children::Paged(p),
            }
        }

        fn children_mut(&mut self) -> ChildrenMut<'_, Self> {
            match self {
                Node::Leaf(_) => ChildrenMut::Leaf,
                Node::Group(c) => ChildrenMut::Flat(c),
                Node::Tabs(p) => ChildrenMut::Paged(p),
            }
        }
    }

    fn tree() -> Node {
        let mut page = IndexMap::new();
        page.insert("knob".to_string(), Node::Leaf("knob"));
        let mut pages = IndexMap::new();
        pages.insert("page1".to_string(), page);

        let mut inner = IndexMap::new();
        inner.insert("fader1".to_string(), Node::Leaf("fader1"));

        let mut root = IndexMap::new();
        root.insert("g".to_string(), Node::Group(inner));
        root.insert("tabs".to_string(), Node::Tabs(pages));
        root.insert("pad".to_string(), Node::Leaf("pad"));
        Node::Group(root)
    }

    fn name(node: &Node) -> &'static str {
        match node {
            Node::Leaf(name) => name,
            _ => "container",
        }
    }

    #[test]
    fn test_route_flat_and_nested() {
        let root = tree();
        assert_eq!(name(route(&root, &["pad"].into()).unwrap()), "pad");
        assert_eq!(name(route(&root, &["g", "fader1"].into()).unwrap()), "fader1");
        assert_eq!(name(route(&root, &["g"].into()).unwrap()), "container");
    }

    #[test]
    fn test_tabs_consume_two_segments() {
        let root = tree();
        assert_eq!(
            name(route(&root, &["tabs", "page1", "knob"].into()).unwrap()),
            "knob"
        );
        // stopping on a page id is not a control
        assert!(matches!(
            route(&root, &["tabs", "page1"].into()),
            Err(ControlError::ControlNotFound(_))
        ));
    }

    #[test]
    fn test_missing_and_empty_paths_fail() {
        let root = tree();
        assert!(route(&root, &ControlPath::root()).is_err());
        assert!(route(&root, &["g", "nope"].into()).is_err());
        assert!(route(&root, &["pad", "deeper"].into()).is_err());
    }

    #[test]
    fn test_traverse_is_pre_order_with_accumulator() {
        let root = tree();
        let mut seen = Vec::new();
        traverse(&root, 0usize, &mut |path, _node, depth: &usize| {
            seen.push((path.to_string(), *depth));
            depth + 1
        });
        assert_eq!(
            seen,
            vec![
                ("".to_string(), 0),
                ("g".to_string(), 1),
                ("g.fader1".to_string(), 2),
                ("tabs".to_string(), 1),
                ("tabs.page1.knob".to_string(), 2),
                ("pad".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_leaf_paths_round_trip_through_route() {
        let root = tree();
        for path in leaf_paths(&root) {
            assert!(route(&root, &path).is_ok(), "unroutable path {}", path);
        }
    }
}
