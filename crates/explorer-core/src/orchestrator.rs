//! Run orchestration
//!
//! Turns a run request (selected nodes minus excluded nodes) into one
//! execution batch per project, dispatches the batches concurrently and
//! reports the outcome of each project to the run session.

use explorer_config::RunConfig;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

use crate::protocol::ExecutionRequest;
use crate::service::ExecutionAdapter;
use crate::session::{RunSession, TestState};
use crate::tree::{NodeData, NodeId, SharedTree, TestTree};

/// Nodes to run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Selected nodes; `None` runs every workspace
    pub include: Option<Vec<NodeId>>,
    /// Nodes left out of the run, with their subtrees
    #[serde(default)]
    pub exclude: Vec<NodeId>,
}

impl RunRequest {
    /// Run everything in the tree
    pub fn all() -> Self {
        Self::default()
    }

    /// Run the given nodes
    pub fn of(include: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            include: Some(include.into_iter().collect()),
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, exclude: impl IntoIterator<Item = NodeId>) -> Self {
        self.exclude.extend(exclude);
        self
    }
}

/// Work for a single project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectBatch {
    pub project: NodeId,
    pub request: ExecutionRequest,
    /// Nodes reported Running before dispatch
    pub running: Vec<NodeId>,
}

/// Counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatched: usize,
    pub passed: usize,
    pub failed: usize,
}

/// What was selected within one project
#[derive(Debug, Default)]
struct Selection {
    whole_project: bool,
    suites: Vec<NodeId>,
}

/// Dispatches run requests to the execution adapter
pub struct RunOrchestrator {
    tree: SharedTree,
    adapter: Arc<dyn ExecutionAdapter>,
    config: RunConfig,
}

impl RunOrchestrator {
    pub fn new(tree: SharedTree, adapter: Arc<dyn ExecutionAdapter>, config: RunConfig) -> Self {
        Self {
            tree,
            adapter,
            config,
        }
    }

    /// Compute the per-project batches of a request without running anything
    pub async fn plan(&self, request: &RunRequest) -> Vec<ProjectBatch> {
        let tree = self.tree.read().await;
        plan_batches(&tree, request)
    }

    /// Run the request, report every outcome to `session` and end it
    pub async fn run_tests(&self, request: &RunRequest, session: &dyn RunSession) -> RunSummary {
        let batches = self.plan(request).await;

        // Feedback before any project starts executing
        for batch in &batches {
            for node in &batch.running {
                session.set_state(node, TestState::Running);
            }
        }

        let mut summary = RunSummary {
            dispatched: batches.len(),
            ..RunSummary::default()
        };

        let limit = self
            .config
            .max_parallel_projects
            .unwrap_or(batches.len())
            .max(1);

        let permits = Semaphore::new(limit);
        let outcomes = join_all(batches.into_iter().map(|batch| {
            let permits = &permits;
            async move {
                // The semaphore is never closed
                let _permit = permits.acquire().await.ok();
                self.dispatch(batch, session).await
            }
        }))
        .await;

        summary.passed = outcomes.iter().filter(|passed| **passed).count();
        summary.failed = outcomes.len() - summary.passed;

        session.end();
        info!(
            dispatched = summary.dispatched,
            passed = summary.passed,
            failed = summary.failed,
            "test run finished"
        );
        summary
    }

    /// Run one project; returns whether it passed
    async fn dispatch(&self, batch: ProjectBatch, session: &dyn RunSession) -> bool {
        let ProjectBatch {
            project, request, ..
        } = batch;

        info!(
            project = %project,
            files = request.files.len(),
            "dispatching test run"
        );

        match self.adapter.run_tests(request).await {
            Ok(result) => {
                debug!(project = %project, results = result.leaf_count(), "project passed");
                session.set_state(&project, TestState::Passed);
                session.append_output(&format!("Completed {}\r\n", project));
                true
            }
            Err(message) => {
                warn!(project = %project, error = %message, "project run failed");
                session.set_state(&project, TestState::Failed);
                session.append_message(&project, &message);
                false
            }
        }
    }
}

/// Group the selection by owning project and build one batch per project
pub fn plan_batches(tree: &TestTree, request: &RunRequest) -> Vec<ProjectBatch> {
    let excluded: HashSet<NodeId> = request.exclude.iter().cloned().collect();
    let selected = match &request.include {
        Some(ids) => ids.clone(),
        None => tree.roots().to_vec(),
    };

    let mut selections: BTreeMap<NodeId, Selection> = BTreeMap::new();
    for id in selected.iter().filter(|id| !excluded.contains(*id)) {
        let Some(node) = tree.get(id) else {
            debug!(node = %id, "selected node is not in the tree");
            continue;
        };

        match &node.data {
            NodeData::Workspace(_) => {
                for project in tree.children(id).iter().filter(|p| !excluded.contains(*p)) {
                    selections.entry(project.clone()).or_default().whole_project = true;
                }
            }
            NodeData::Project(_) => {
                selections.entry(id.clone()).or_default().whole_project = true;
            }
            NodeData::Suite(suite) => {
                selections
                    .entry(suite.project.clone())
                    .or_default()
                    .suites
                    .push(id.clone());
            }
        }
    }

    selections
        .into_iter()
        .filter_map(|(project, selection)| plan_project(tree, project, &selection, &excluded))
        .collect()
}

fn plan_project(
    tree: &TestTree,
    project: NodeId,
    selection: &Selection,
    excluded: &HashSet<NodeId>,
) -> Option<ProjectBatch> {
    let project_root = tree.get(&project)?.as_project()?;
    let workspace_folder = tree.get(&project_root.workspace)?.as_workspace()?.folder.clone();
    let project_folder = project_root.folder.clone();

    if selection.whole_project {
        let running = tree
            .walk_subtree(&project, |id| excluded.contains(id))
            .into_iter()
            .map(|node| node.id.clone())
            .collect();

        return Some(ProjectBatch {
            project,
            request: ExecutionRequest {
                workspace_folder,
                project_folder,
                files: Vec::new(),
            },
            running,
        });
    }

    let mut files: BTreeSet<Url> = BTreeSet::new();
    let mut running = Vec::new();
    let mut seen: HashSet<&NodeId> = HashSet::new();

    for selected in &selection.suites {
        for node in tree.walk_subtree(selected, |id| excluded.contains(id)) {
            if !seen.insert(&node.id) {
                continue;
            }
            let Some(suite) = node.as_suite() else {
                continue;
            };
            match Url::parse(&suite.file) {
                Ok(file) => {
                    files.insert(file);
                    running.push(node.id.clone());
                }
                Err(e) => {
                    debug!(node = %node.id, file = %suite.file, error = %e, "skipping node with malformed file");
                }
            }
        }
    }

    if files.is_empty() {
        debug!(project = %project, "no runnable files selected");
        return None;
    }

    Some(ProjectBatch {
        project,
        request: ExecutionRequest {
            workspace_folder,
            project_folder,
            files: files.into_iter().collect(),
        },
        running,
    })
}
