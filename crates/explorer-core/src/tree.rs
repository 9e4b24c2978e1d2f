//! Test tree model
//!
//! A plain id-keyed tree of workspace, project and suite nodes. Node identity
//! is derived from the data that defines the node, so the same logical entity
//! gets the same [`NodeId`] on every resolution and hosts can diff snapshots
//! without custom equality.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Position, Url};

use crate::error::{ExplorerError, ExplorerResult};

/// Tree shared between the resolver, the orchestrator and the host
pub type SharedTree = Arc<RwLock<TestTree>>;

/// Deterministic node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Identifier of a workspace root
    pub fn workspace(folder: &Url) -> Self {
        Self(format!("workspace {}", folder))
    }

    /// Identifier of a project root
    pub fn project(folder: &Url) -> Self {
        Self(format!("project {}", folder))
    }

    /// Identifier of a suite or test, from its label path below the project
    ///
    /// Labels are escaped before joining, so distinct paths never share an
    /// id even when labels contain `/`. A space cannot occur in a serialized
    /// URL and separates the folder from the path.
    pub fn suite(project_folder: &Url, label_path: &[&str]) -> Self {
        let path: Vec<String> = label_path.iter().map(|label| escape_label(label)).collect();
        Self(format!("suite {} {}", project_folder, path.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('/', "\\/")
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lazy resolution state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    /// Children not yet known
    Pending,
    /// A resolution is in flight
    Resolving,
    /// Children are populated
    Resolved,
}

/// A workspace folder
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceRoot {
    pub folder: Url,
    pub name: String,
}

/// A project (manifest + tests directory) inside a workspace
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRoot {
    pub folder: Url,
    /// Owning workspace
    pub workspace: NodeId,
}

/// A suite or a single test
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteNode {
    pub label: String,
    /// Source file as reported by discovery; may not be a valid URI
    pub file: String,
    pub position: Position,
    /// Owning project, regardless of nesting depth
    pub project: NodeId,
}

/// Kind-specific payload of a node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Workspace(WorkspaceRoot),
    Project(ProjectRoot),
    Suite(SuiteNode),
}

impl NodeData {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeData::Workspace(_) => "workspace",
            NodeData::Project(_) => "project",
            NodeData::Suite(_) => "suite",
        }
    }
}

/// A node in the test tree
#[derive(Debug, Clone)]
pub struct TestNode {
    pub id: NodeId,
    pub label: String,
    pub data: NodeData,
    pub status: ResolutionStatus,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TestNode {
    /// Create a workspace root for a folder
    pub fn workspace(folder: Url, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            NodeId::workspace(&folder),
            format!("Elm Tests ({})", name),
            NodeData::Workspace(WorkspaceRoot { folder, name }),
            ResolutionStatus::Pending,
        )
    }

    /// Create a project root owned by `workspace`
    pub fn project(folder: Url, workspace: NodeId) -> Self {
        let label = folder_name(&folder);
        Self::new(
            NodeId::project(&folder),
            label,
            NodeData::Project(ProjectRoot { folder, workspace }),
            ResolutionStatus::Pending,
        )
    }

    /// Create a suite node; suites are resolved as soon as they exist
    pub fn suite(id: NodeId, suite: SuiteNode) -> Self {
        Self::new(
            id,
            suite.label.clone(),
            NodeData::Suite(suite),
            ResolutionStatus::Resolved,
        )
    }

    fn new(id: NodeId, label: String, data: NodeData, status: ResolutionStatus) -> Self {
        Self {
            id,
            label,
            data,
            status,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn as_workspace(&self) -> Option<&WorkspaceRoot> {
        match &self.data {
            NodeData::Workspace(workspace) => Some(workspace),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&ProjectRoot> {
        match &self.data {
            NodeData::Project(project) => Some(project),
            _ => None,
        }
    }

    pub fn as_suite(&self) -> Option<&SuiteNode> {
        match &self.data {
            NodeData::Suite(suite) => Some(suite),
            _ => None,
        }
    }
}

/// Serializable view of a subtree, for hosts rendering the tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub label: String,
    pub kind: &'static str,
    /// Folder URI for workspaces and projects, source file for suites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Source position of a suite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub status: ResolutionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// The test tree
#[derive(Debug, Default)]
pub struct TestTree {
    nodes: HashMap<NodeId, TestNode>,
    roots: Vec<NodeId>,
}

impl TestTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a new tree for sharing
    pub fn shared() -> SharedTree {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: &NodeId) -> Option<&TestNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Look up a node or fail with [`ExplorerError::NodeNotFound`]
    pub fn node(&self, id: &NodeId) -> ExplorerResult<&TestNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| ExplorerError::node_not_found(id))
    }

    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Add a top-level node, replacing any root with the same id
    pub fn add_root(&mut self, mut node: TestNode) -> NodeId {
        let id = node.id.clone();
        node.parent = None;
        node.children.clear();

        if let Some(pos) = self.roots.iter().position(|root| *root == id) {
            self.drop_subtree(&id);
            self.roots[pos] = id.clone();
        } else {
            self.remove(&id);
            self.roots.push(id.clone());
        }

        self.nodes.insert(id.clone(), node);
        id
    }

    /// Attach `node` under `parent`
    ///
    /// A sibling with the same id is replaced in place together with its
    /// subtree. A node with the same id elsewhere in the tree is removed first.
    pub fn attach_child(&mut self, parent: &NodeId, mut node: TestNode) -> ExplorerResult<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(ExplorerError::node_not_found(parent));
        }

        let id = node.id.clone();
        node.parent = Some(parent.clone());
        node.children.clear();

        let sibling_pos = self.children(parent).iter().position(|child| *child == id);
        match sibling_pos {
            Some(_) => self.drop_subtree(&id),
            None => {
                self.remove(&id);
            }
        }

        self.nodes.insert(id.clone(), node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            match sibling_pos {
                Some(pos) => parent_node.children[pos] = id.clone(),
                None => parent_node.children.push(id.clone()),
            }
        }

        Ok(id)
    }

    /// Remove every child subtree of `parent`
    pub fn clear_children(&mut self, parent: &NodeId) {
        let children = match self.nodes.get_mut(parent) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in &children {
            self.drop_subtree(child);
        }
    }

    /// Remove a node and its subtree, detaching it from its parent
    pub fn remove(&mut self, id: &NodeId) -> Option<TestNode> {
        let parent = self.nodes.get(id)?.parent.clone();
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|child| child != id);
                }
            }
            None => self.roots.retain(|root| root != id),
        }

        let children = self.nodes.get(id).map(|n| n.children.clone())?;
        for child in &children {
            self.drop_subtree(child);
        }
        self.nodes.remove(id)
    }

    /// Drop a subtree from the node map without touching the parent's child list
    fn drop_subtree(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.remove(id) {
            for child in &node.children {
                self.drop_subtree(child);
            }
        }
    }

    pub fn set_status(&mut self, id: &NodeId, status: ResolutionStatus) -> ExplorerResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ExplorerError::node_not_found(id))?;
        node.status = status;
        Ok(())
    }

    /// Owning project of a node: the node itself for projects, the stored
    /// back-reference for suites, `None` for workspaces
    pub fn project_of(&self, id: &NodeId) -> Option<&NodeId> {
        let node = self.nodes.get(id)?;
        match &node.data {
            NodeData::Workspace(_) => None,
            NodeData::Project(_) => Some(&node.id),
            NodeData::Suite(suite) => Some(&suite.project),
        }
    }

    /// Pre-order walk of the subtree rooted at `id`, skipping any node (and
    /// its descendants) for which `skip` returns true
    pub fn walk_subtree<F>(&self, id: &NodeId, mut skip: F) -> Vec<&TestNode>
    where
        F: FnMut(&NodeId) -> bool,
    {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if skip(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                out.push(node);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Snapshot of every root
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.roots
            .iter()
            .filter_map(|root| self.snapshot_of(root))
            .collect()
    }

    pub fn snapshot_of(&self, id: &NodeId) -> Option<NodeSnapshot> {
        let node = self.nodes.get(id)?;
        let (file, position) = match &node.data {
            NodeData::Workspace(workspace) => (Some(workspace.folder.to_string()), None),
            NodeData::Project(project) => (Some(project.folder.to_string()), None),
            NodeData::Suite(suite) => (Some(suite.file.clone()), Some(suite.position)),
        };
        Some(NodeSnapshot {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.data.kind_name(),
            file,
            position,
            status: node.status,
            children: node
                .children
                .iter()
                .filter_map(|child| self.snapshot_of(child))
                .collect(),
        })
    }
}

/// Last path segment of a folder URI
pub(crate) fn folder_name(folder: &Url) -> String {
    folder
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_else(|| folder.to_string())
}
