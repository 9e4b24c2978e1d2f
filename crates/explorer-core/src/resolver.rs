//! Lazy discovery of the test tree
//!
//! Workspaces are resolved by scanning the folder for project manifests,
//! projects by asking the discovery service for their suites. Each node runs
//! through Pending → Resolving → Resolved; the Resolving status doubles as the
//! in-flight guard, so a second resolution of the same node returns at once.

use explorer_config::DiscoveryConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ExplorerError, ExplorerResult};
use crate::protocol::{FindTestsParams, TestSuite};
use crate::service::DiscoveryService;
use crate::tree::{NodeData, NodeId, ResolutionStatus, SharedTree, SuiteNode, TestNode, TestTree};

/// Outcome of trying to start a resolution
enum Claim<T> {
    Started(T),
    Skipped(ResolutionStatus),
}

/// Resolves workspace and project nodes on demand
pub struct DiscoveryResolver {
    tree: SharedTree,
    service: Arc<dyn DiscoveryService>,
    config: DiscoveryConfig,
}

impl DiscoveryResolver {
    pub fn new(tree: SharedTree, service: Arc<dyn DiscoveryService>, config: DiscoveryConfig) -> Self {
        Self {
            tree,
            service,
            config,
        }
    }

    /// Resolve (or refresh) any node; suites are always resolved
    pub async fn resolve(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        let is_workspace = {
            let tree = self.tree.read().await;
            match tree.node(id)?.data {
                NodeData::Workspace(_) => true,
                NodeData::Project(_) => false,
                NodeData::Suite(_) => return Ok(ResolutionStatus::Resolved),
            }
        };

        if is_workspace {
            self.resolve_workspace(id, token).await
        } else {
            self.resolve_project(id, token).await
        }
    }

    /// First expansion of a node: only Pending nodes are resolved
    pub async fn expand(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        let status = self.tree.read().await.node(id)?.status;
        if status != ResolutionStatus::Pending {
            return Ok(status);
        }
        self.resolve(id, token).await
    }

    /// Scan a workspace folder for projects that have a tests directory
    pub async fn resolve_workspace(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        let folder = match self
            .claim(id, token, "workspace", |node| {
                node.as_workspace().map(|ws| ws.folder.clone())
            })
            .await?
        {
            Claim::Started(folder) => folder,
            Claim::Skipped(status) => return Ok(status),
        };

        let root = match folder.to_file_path() {
            Ok(root) => root,
            Err(()) => {
                self.settle(id, ResolutionStatus::Pending).await?;
                return Err(ExplorerError::InvalidFolderUri(folder.to_string()));
            }
        };

        let config = self.config.clone();
        let scan = tokio::task::spawn_blocking(move || scan_projects(&root, &config));

        let scanned = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(workspace = %id, "workspace resolution cancelled");
                return self.settle(id, ResolutionStatus::Pending).await;
            }
            joined = scan => joined.map_err(|e| ExplorerError::Scan(e.to_string())).and_then(|r| r),
        };

        let project_dirs = match scanned {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(workspace = %id, error = %e, "workspace scan failed");
                return self.settle(id, ResolutionStatus::Pending).await;
            }
        };

        let mut tree = self.tree.write().await;
        if !tree.contains(id) {
            debug!(workspace = %id, "workspace removed while scanning");
            return Ok(ResolutionStatus::Pending);
        }

        let folders: Vec<Url> = project_dirs
            .iter()
            .filter_map(|dir| match Url::from_file_path(dir) {
                Ok(url) => Some(url),
                Err(()) => {
                    warn!(path = %dir.display(), "skipping project folder without a file URI");
                    None
                }
            })
            .collect();

        apply_projects(&mut tree, id, folders)?;
        tree.set_status(id, ResolutionStatus::Resolved)?;
        info!(
            workspace = %id,
            projects = tree.children(id).len(),
            "workspace resolved"
        );
        Ok(ResolutionStatus::Resolved)
    }

    /// Ask the discovery service for a project's suites and replace its children
    pub async fn resolve_project(
        &self,
        id: &NodeId,
        token: &CancellationToken,
    ) -> ExplorerResult<ResolutionStatus> {
        let folder = match self
            .claim(id, token, "project", |node| {
                node.as_project().map(|project| project.folder.clone())
            })
            .await?
        {
            Claim::Started(folder) => folder,
            Claim::Skipped(status) => return Ok(status),
        };

        let params = FindTestsParams {
            project_folder: folder.to_string(),
        };

        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(project = %id, "project resolution cancelled");
                return self.settle(id, ResolutionStatus::Pending).await;
            }
            response = self.service.find_tests(params) => response,
        };

        let suites = match response {
            Ok(response) => response.suites.unwrap_or_default(),
            Err(e) => {
                // Discovery errors are the service's to surface
                warn!(project = %id, error = %e, "test discovery failed");
                return self.settle(id, ResolutionStatus::Pending).await;
            }
        };

        let mut tree = self.tree.write().await;
        if !tree.contains(id) {
            debug!(project = %id, "project removed while discovering");
            return Ok(ResolutionStatus::Pending);
        }

        tree.clear_children(id);
        let mut path = Vec::new();
        for suite in &suites {
            if let Err(e) = attach_suite(&mut tree, id, id, &folder, &mut path, suite) {
                tree.set_status(id, ResolutionStatus::Pending)?;
                return Err(e);
            }
            path.clear();
        }

        tree.set_status(id, ResolutionStatus::Resolved)?;
        info!(project = %id, suites = suites.len(), "project resolved");
        Ok(ResolutionStatus::Resolved)
    }

    /// Mark a node Resolving unless a resolution is already in flight
    async fn claim<T, F>(
        &self,
        id: &NodeId,
        token: &CancellationToken,
        expected: &'static str,
        extract: F,
    ) -> ExplorerResult<Claim<T>>
    where
        F: FnOnce(&TestNode) -> Option<T>,
    {
        let mut tree = self.tree.write().await;
        let node = tree.node(id)?;
        let status = node.status;
        let value = extract(node).ok_or_else(|| ExplorerError::unexpected_kind(id, expected))?;

        if status == ResolutionStatus::Resolving {
            debug!(node = %id, "resolution already in flight");
            return Ok(Claim::Skipped(status));
        }
        if token.is_cancelled() {
            return Ok(Claim::Skipped(status));
        }

        tree.set_status(id, ResolutionStatus::Resolving)?;
        Ok(Claim::Started(value))
    }

    /// Set the final status of a node that may have been removed meanwhile
    async fn settle(
        &self,
        id: &NodeId,
        status: ResolutionStatus,
    ) -> ExplorerResult<ResolutionStatus> {
        let mut tree = self.tree.write().await;
        if tree.contains(id) {
            tree.set_status(id, status)?;
        }
        Ok(status)
    }
}

/// Reconcile a workspace's projects with the scanned folders
///
/// Existing project nodes are kept as they are; vanished ones are removed.
fn apply_projects(tree: &mut TestTree, workspace: &NodeId, folders: Vec<Url>) -> ExplorerResult<()> {
    let wanted: Vec<NodeId> = folders.iter().map(NodeId::project).collect();
    let stale: Vec<NodeId> = tree
        .children(workspace)
        .iter()
        .filter(|child| !wanted.contains(child))
        .cloned()
        .collect();
    for project in &stale {
        tree.remove(project);
    }

    for (folder, project) in folders.into_iter().zip(wanted) {
        if tree.children(workspace).contains(&project) {
            continue;
        }
        tree.attach_child(workspace, TestNode::project(folder, workspace.clone()))?;
    }
    Ok(())
}

fn attach_suite<'a>(
    tree: &mut TestTree,
    parent: &NodeId,
    project: &NodeId,
    project_folder: &Url,
    path: &mut Vec<&'a str>,
    suite: &'a TestSuite,
) -> ExplorerResult<()> {
    path.push(&suite.label);
    let node = TestNode::suite(
        NodeId::suite(project_folder, path.as_slice()),
        SuiteNode {
            label: suite.label.clone(),
            file: suite.file.clone(),
            position: suite.position,
            project: project.clone(),
        },
    );
    let id = tree.attach_child(parent, node)?;

    for child in suite.children() {
        attach_suite(tree, &id, project, project_folder, path, child)?;
    }
    path.pop();
    Ok(())
}

/// Find project directories: a manifest with a tests directory next to it
fn scan_projects(root: &Path, config: &DiscoveryConfig) -> ExplorerResult<Vec<PathBuf>> {
    let metadata = std::fs::metadata(root).map_err(|e| ExplorerError::io(root, e))?;
    if !metadata.is_dir() {
        return Err(ExplorerError::Scan(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let manifest = OsStr::new(&config.manifest);
    let mut projects: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(config.follow_links)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| config.is_excluded(name))
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == manifest)
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .filter(|dir| dir.join(&config.tests_dir).is_dir())
        .collect();

    projects.sort();
    projects.dedup();
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn project(root: &Path, rel: &str, with_tests: bool) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("elm.json"), "{}").unwrap();
        if with_tests {
            fs::create_dir_all(dir.join("tests")).unwrap();
        }
    }

    #[test]
    fn test_scan_requires_tests_dir() {
        let dir = tempdir().unwrap();
        project(dir.path(), "P1", true);
        project(dir.path(), "P2", false);

        let found = scan_projects(dir.path(), &DiscoveryConfig::default()).unwrap();
        assert_eq!(found, vec![dir.path().join("P1")]);
    }

    #[test]
    fn test_scan_skips_excluded_dirs() {
        let dir = tempdir().unwrap();
        project(dir.path(), "app", true);
        project(dir.path(), "node_modules/pkg", true);
        project(dir.path(), "app/elm-stuff/0.19.1/pkg", true);

        let found = scan_projects(dir.path(), &DiscoveryConfig::default()).unwrap();
        assert_eq!(found, vec![dir.path().join("app")]);
    }

    #[test]
    fn test_scan_finds_root_and_nested_projects() {
        let dir = tempdir().unwrap();
        project(dir.path(), "", true);
        project(dir.path(), "libs/core", true);

        let found = scan_projects(dir.path(), &DiscoveryConfig::default()).unwrap();
        assert_eq!(found, vec![dir.path().to_path_buf(), dir.path().join("libs/core")]);
    }

    #[test]
    fn test_scan_custom_manifest() {
        let dir = tempdir().unwrap();
        project(dir.path(), "app", true);
        let config = DiscoveryConfig {
            manifest: "project.json".to_string(),
            ..DiscoveryConfig::default()
        };

        assert!(scan_projects(dir.path(), &config).unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = scan_projects(&missing, &DiscoveryConfig::default()).unwrap_err();
        assert!(matches!(err, ExplorerError::IoError { .. }));
    }
}
