//! Explorer facade
//!
//! Ties the shared tree, the discovery resolver and the run orchestrator
//! together and manages the lifetime of workspace folders.

use explorer_config::{ConfigLoader, ExplorerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;
use tracing::info;

use crate::error::{ExplorerError, ExplorerResult};
use crate::orchestrator::{RunOrchestrator, RunRequest, RunSummary};
use crate::resolver::DiscoveryResolver;
use crate::service::{DiscoveryService, ExecutionAdapter};
use crate::session::RunSession;
use crate::tree::{folder_name, NodeId, NodeSnapshot, ResolutionStatus, SharedTree, TestNode, TestTree};

/// Test explorer for one host session
pub struct TestExplorer {
    tree: SharedTree,
    resolver: DiscoveryResolver,
    orchestrator: RunOrchestrator,
}

impl TestExplorer {
    pub fn new(
        config: ExplorerConfig,
        discovery: Arc<dyn DiscoveryService>,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> Self {
        let tree = TestTree::shared();
        Self {
            resolver: DiscoveryResolver::new(tree.clone(), discovery, config.discovery),
            orchestrator: RunOrchestrator::new(tree.clone(), adapter, config.run),
            tree,
        }
    }

    /// Create an explorer configured by the `elm-test-explorer.toml` found
    /// from `workspace_dir` upwards, with environment overrides applied
    pub fn load(
        workspace_dir: &Path,
        discovery: Arc<dyn DiscoveryService>,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> ExplorerResult<Self> {
        let config = ConfigLoader::new().load_from_directory(workspace_dir)?;
        match &config.config_file {
            Some(file) => info!(config = %file.display(), "loaded explorer configuration"),
            None => info!("no explorer configuration found, using defaults"),
        }
        Ok(Self::new(config.settings, discovery, adapter))
    }

    /// Shared handle to the tree
    pub fn tree(&self) -> SharedTree {
        self.tree.clone()
    }

    pub fn resolver(&self) -> &DiscoveryResolver {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &RunOrchestrator {
        &self.orchestrator
    }

    /// Create the workspace root for a folder; an existing root for the same
    /// folder is kept as is
    pub async fn add_workspace_folder(&self, folder: Url) -> ExplorerResult<NodeId> {
        if folder.to_file_path().is_err() {
            return Err(ExplorerError::InvalidFolderUri(folder.to_string()));
        }

        let id = NodeId::workspace(&folder);
        let mut tree = self.tree.write().await;
        if tree.contains(&id) {
            return Ok(id);
        }

        let name = folder_name(&folder);
        tree.add_root(TestNode::workspace(folder, name));
        info!(workspace = %id, "workspace folder added");
        Ok(id)
    }

    /// Drop a workspace root and everything under it
    pub async fn remove_workspace_folder(&self, folder: &Url) -> bool {
        let id = NodeId::workspace(folder);
        let removed = self.tree.write().await.remove(&id).is_some();
        if removed {
            info!(workspace = %id, "workspace folder removed");
        }
        removed
    }

    /// Resolve or refresh a node
    pub async fn resolve(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        self.resolver.resolve(id, token).await
    }

    /// Resolve a node the first time the host expands it
    pub async fn expand(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        self.resolver.expand(id, token).await
    }

    pub async fn run_tests(&self, request: &RunRequest, session: &dyn RunSession) -> RunSummary {
        self.orchestrator.run_tests(request, session).await
    }

    pub async fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.tree.read().await.snapshot()
    }
}
