//! File tree reconstruction
//!
//! The tree is an arena of positional nodes: the same file hash can sit at
//! several positions when more than one parent extracted it. Nodes reference
//! their children by [`NodeId`], so moving a subtree (for example out of the
//! `TBD` pseudo-parent) never copies it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::constants::TBD_NODE;
use crate::models::{file_hash, ResultPayload, Submission};

/// Index of a node inside a [`FileTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One position of a file in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub sha256: String,
    /// Display names, one per distinct extraction name
    pub names: Vec<String>,
    /// Cumulative score of every result merged at this position
    pub score: i64,
    pub file_type: String,
    pub truncated: bool,
    children: Vec<NodeId>,
}

impl TreeNode {
    fn new(sha256: &str, name: Option<&str>, file_type: &str) -> Self {
        Self {
            sha256: sha256.to_string(),
            names: name.map(|n| vec![n.to_string()]).unwrap_or_default(),
            score: 0,
            file_type: file_type.to_string(),
            truncated: false,
            children: Vec::new(),
        }
    }

    fn add_name(&mut self, name: &str) {
        if !self.names.iter().any(|n| n == name) {
            self.names.push(name.to_string());
        }
    }
}

/// Nested wire form of a tree node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNodeWire {
    #[serde(default)]
    pub children: BTreeMap<String, TreeNodeWire>,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub sha256: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Authoritative tree as returned by the tree endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeReport {
    #[serde(default)]
    pub tree: BTreeMap<String, TreeNodeWire>,
    #[serde(default)]
    pub filtered: bool,
    #[serde(default)]
    pub partial: bool,
}

const UNKNOWN_TYPE: &str = "unknown";

/// Hierarchical view of a submission's files and their extractions
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
    /// Children parked until their parent surfaces
    pending: Vec<NodeId>,
    positions: HashMap<String, Vec<NodeId>>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.pending.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Nodes parked under the `TBD` pseudo-parent
    pub fn pending(&self) -> &[NodeId] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Every position currently holding `sha256`
    pub fn positions(&self, sha256: &str) -> &[NodeId] {
        self.positions.get(sha256).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root-level node for `sha256`, if any
    pub fn root(&self, sha256: &str) -> Option<NodeId> {
        self.find_in(&self.roots, sha256)
    }

    /// Child of `parent` holding `sha256`, if any
    pub fn child(&self, parent: NodeId, sha256: &str) -> Option<NodeId> {
        self.find_in(&self.nodes[parent.0].children, sha256)
    }

    /// Parked node for `sha256`, if any
    pub fn pending_node(&self, sha256: &str) -> Option<NodeId> {
        self.find_in(&self.pending, sha256)
    }

    fn find_in(&self, ids: &[NodeId], sha256: &str) -> Option<NodeId> {
        ids.iter().copied().find(|id| self.nodes[id.0].sha256 == sha256)
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.positions.entry(node.sha256.clone()).or_default().push(id);
        self.nodes.push(node);
        id
    }

    /// Fold a batch of results into the tree.
    ///
    /// Results are applied in sorted key order. Each result adds its score to
    /// every position of its file and attaches the files it extracted.
    pub fn merge_results(&mut self, results: &HashMap<String, ResultPayload>, submission: &Submission) {
        self.promote_base_files(submission);

        let mut keys: Vec<&String> = results.keys().collect();
        keys.sort();

        for key in keys {
            self.merge_result(file_hash(key), &results[key], submission);
        }
    }

    fn merge_result(&mut self, sha256: &str, payload: &ResultPayload, submission: &Submission) {
        let file_type = payload.file_type.as_deref().unwrap_or(UNKNOWN_TYPE);

        let mut targets = self.positions(sha256).to_vec();
        if targets.is_empty() {
            let node = TreeNode::new(sha256, submission.file_name(sha256), file_type);
            let is_base_file = submission.file_name(sha256).is_some();
            let id = self.alloc(node);
            if is_base_file {
                self.roots.push(id);
            } else {
                self.pending.push(id);
            }
            targets.push(id);
        }

        for target in targets {
            let node = &mut self.nodes[target.0];
            if let Some(score) = payload.result.score {
                node.score += score;
            }
            if node.file_type == UNKNOWN_TYPE {
                node.file_type = file_type.to_string();
            }

            for extracted in &payload.response.extracted {
                self.attach_child(target, &extracted.sha256, &extracted.name);
            }
        }
    }

    fn attach_child(&mut self, parent: NodeId, sha256: &str, name: &str) {
        if let Some(existing) = self.child(parent, sha256) {
            self.nodes[existing.0].add_name(name);
            return;
        }

        // A parked node cannot move under its own subtree
        let parked = self
            .pending_node(sha256)
            .filter(|parked| !self.subtree_contains(*parked, parent));
        let child = match parked {
            Some(parked) => {
                if let Some(idx) = self.pending.iter().position(|id| *id == parked) {
                    self.pending.remove(idx);
                }
                self.nodes[parked.0].add_name(name);
                parked
            }
            None => self.alloc(TreeNode::new(sha256, Some(name), UNKNOWN_TYPE)),
        };
        self.nodes[parent.0].children.push(child);
    }

    fn subtree_contains(&self, root: NodeId, target: NodeId) -> bool {
        let mut stack = vec![root];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.nodes[id.0].children.iter().copied());
            }
        }
        false
    }

    /// Move parked nodes that turned out to be base files to the root level
    fn promote_base_files(&mut self, submission: &Submission) {
        let mut idx = 0;
        while idx < self.pending.len() {
            let id = self.pending[idx];
            let node = &self.nodes[id.0];
            match submission.file_name(&node.sha256) {
                Some(name) if self.root(&node.sha256).is_none() => {
                    let name = name.to_string();
                    self.pending.remove(idx);
                    self.nodes[id.0].add_name(&name);
                    self.roots.push(id);
                }
                _ => idx += 1,
            }
        }
    }

    /// Convert to the nested wire form, with the `TBD` node when something is parked
    pub fn to_wire(&self) -> BTreeMap<String, TreeNodeWire> {
        let mut tree: BTreeMap<String, TreeNodeWire> = self
            .roots
            .iter()
            .map(|id| (self.nodes[id.0].sha256.clone(), self.node_to_wire(*id)))
            .collect();

        if !self.pending.is_empty() {
            let children = self
                .pending
                .iter()
                .map(|id| (self.nodes[id.0].sha256.clone(), self.node_to_wire(*id)))
                .collect();
            tree.insert(
                TBD_NODE.to_string(),
                TreeNodeWire {
                    children,
                    name: vec![TBD_NODE.to_string()],
                    score: 0,
                    sha256: TBD_NODE.to_string(),
                    file_type: TBD_NODE.to_string(),
                    truncated: false,
                },
            );
        }
        tree
    }

    fn node_to_wire(&self, id: NodeId) -> TreeNodeWire {
        let node = &self.nodes[id.0];
        TreeNodeWire {
            children: node
                .children
                .iter()
                .map(|child| (self.nodes[child.0].sha256.clone(), self.node_to_wire(*child)))
                .collect(),
            name: node.names.clone(),
            score: node.score,
            sha256: node.sha256.clone(),
            file_type: node.file_type.clone(),
            truncated: node.truncated,
        }
    }

    /// Build a tree from its nested wire form
    pub fn from_wire(wire: &BTreeMap<String, TreeNodeWire>) -> Self {
        let mut tree = FileTree::new();
        for (sha256, node) in wire {
            if sha256 == TBD_NODE {
                for (child_sha, child) in &node.children {
                    let id = tree.insert_wire(child_sha, child);
                    tree.pending.push(id);
                }
            } else {
                let id = tree.insert_wire(sha256, node);
                tree.roots.push(id);
            }
        }
        tree
    }

    fn insert_wire(&mut self, key: &str, wire: &TreeNodeWire) -> NodeId {
        let sha256 = if wire.sha256.is_empty() { key } else { wire.sha256.as_str() };
        let id = self.alloc(TreeNode {
            sha256: sha256.to_string(),
            names: wire.name.clone(),
            score: wire.score,
            file_type: wire.file_type.clone(),
            truncated: wire.truncated,
            children: Vec::new(),
        });
        for (child_sha, child) in &wire.children {
            let child_id = self.insert_wire(child_sha, child);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    /// Depth-first walk yielding `(depth, node)` from every root, then parked nodes
    pub fn walk(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::new();
        for root in self.roots.iter().chain(self.pending.iter()) {
            self.walk_from(*root, 0, &mut out);
        }
        out
    }

    fn walk_from(&self, id: NodeId, depth: usize, out: &mut Vec<(usize, NodeId)>) {
        out.push((depth, id));
        for child in &self.nodes[id.0].children {
            self.walk_from(*child, depth + 1, out);
        }
    }
}
