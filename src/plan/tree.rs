//! Folding the flat plan into a tree for display.
//!
//! Folding never reorders items: leaves come out in the (sorted) plan order,
//! and a directory node only groups a *contiguous* run of items sharing that
//! directory. A node that would have a single child is not emitted; its name
//! is glued onto the child instead, so `a/` + `b/` + `c` reads as `a/b/c`.

use std::cmp::Ordering;

use super::{Action, Item};
use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Column {
    /// Backend order.
    #[default]
    Plan,
    Path,
    Action,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortRule {
    pub column: Column,
    pub descending: bool,
}

impl SortRule {
    pub fn new(column: Column, descending: bool) -> Self {
        Self { column, descending }
    }

    fn compare(&self, a: &Item, b: &Item) -> Ordering {
        let ord = match self.column {
            Column::Plan => Ordering::Equal,
            Column::Path => a.path.cmp(&b.path),
            Column::Action => a.action.cmp(&b.action),
            Column::Left => (a.left.status, a.left.kind).cmp(&(b.left.status, b.left.kind)),
            Column::Right => (a.right.status, a.right.kind).cmp(&(b.right.status, b.right.kind)),
        };
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Path fragment. Directory nodes end in `/`.
    pub name: String,
    /// Full path of the node (without trailing slash for directories).
    pub path: String,
    pub action: Action,
    /// Index into the plan for leaves.
    pub item: Option<usize>,
    pub children: Vec<Node>,
}

impl Node {
    fn leaf(name: String, index: usize, item: &Item) -> Self {
        Self {
            name,
            path: item.path.clone(),
            action: item.action,
            item: Some(index),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.item.is_some()
    }

    /// Plan indices of every leaf below (or at) this node, in display order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<usize>) {
        match self.item {
            Some(index) => out.push(index),
            None => self.children.iter().for_each(|c| c.collect_leaves(out)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub roots: Vec<Node>,
}

impl Tree {
    /// Depth-first walk yielding `(depth, node)`.
    pub fn walk(&self) -> Vec<(usize, &Node)> {
        fn visit<'a>(node: &'a Node, depth: usize, out: &mut Vec<(usize, &'a Node)>) {
            out.push((depth, node));
            for child in &node.children {
                visit(child, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            visit(root, 0, &mut out);
        }
        out
    }

    pub fn leaf_paths(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .filter(|(_, n)| n.is_leaf())
            .map(|(_, n)| n.path.clone())
            .collect()
    }
}

struct Entry<'a> {
    index: usize,
    item: &'a Item,
    parts: Vec<&'a str>,
}

/// Fold `items` into a tree after a stable sort by `sort`.
pub fn fold(items: &[Item], sort: SortRule) -> Tree {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| sort.compare(&items[a], &items[b]));

    let entries: Vec<Entry> = order
        .into_iter()
        .map(|index| {
            let item = &items[index];
            let trimmed = item.path.trim_end_matches('/');
            let parts = if trimmed.is_empty() {
                Vec::new()
            } else {
                trimmed.split('/').collect()
            };
            Entry { index, item, parts }
        })
        .collect();

    Tree {
        roots: group(&entries, 0),
    }
}

fn group(entries: &[Entry], depth: usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut start = 0;
    while start < entries.len() {
        let key = dir_component(&entries[start], depth);
        let mut end = start + 1;
        if key.is_some() {
            while end < entries.len() && dir_component(&entries[end], depth) == key {
                end += 1;
            }
        }
        let run = &entries[start..end];
        match key {
            Some(dir) if run.len() >= 2 => nodes.push(directory(dir, run, depth)),
            _ => {
                let entry = &run[0];
                let name = entry.parts[depth.min(entry.parts.len())..].join("/");
                nodes.push(Node::leaf(name, entry.index, entry.item));
            }
        }
        start = end;
    }
    nodes
}

/// The directory component at `depth`, if the entry continues below it.
fn dir_component<'a>(entry: &Entry<'a>, depth: usize) -> Option<&'a str> {
    if entry.parts.len() > depth + 1 {
        Some(entry.parts[depth])
    } else {
        None
    }
}

fn directory(dir: &str, run: &[Entry], depth: usize) -> Node {
    let mut children = group(run, depth + 1);
    let path = run[0].parts[..=depth].join("/");
    if children.len() == 1 {
        let mut only = children.remove(0);
        only.name = format!("{}/{}", dir, only.name);
        return only;
    }
    let action = aggregate(children.iter().map(|c| c.action));
    Node {
        name: format!("{}/", dir),
        path,
        action,
        item: None,
        children,
    }
}

fn aggregate(mut actions: impl Iterator<Item = Action>) -> Action {
    let first = match actions.next() {
        Some(a) => a,
        None => return Action::Mixed,
    };
    if actions.all(|a| a == first) {
        first
    } else {
        Action::Mixed
    }
}

/// Assign `action` to the given plan indices.
pub fn apply_action(items: &mut [Item], indices: &[usize], action: Action) -> Result<()> {
    if action == Action::Mixed {
        return Err(DriverError::InvalidAction(action));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i >= items.len()) {
        return Err(DriverError::NoSuchItem(bad));
    }
    for &i in indices {
        items[i].action = action;
    }
    Ok(())
}
