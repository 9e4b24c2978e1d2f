//! Shared fakes and fixtures for explorer integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use explorer_core::{
    CancellationToken, DiscoveryService, ExecutionAdapter, ExecutionRequest, ExplorerConfig,
    ExplorerError, ExplorerResult, FindTestsParams, FindTestsResponse, NodeId, Position,
    SuiteResult, TestExplorer, TestNode, TestSuite, Url,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// A suite descriptor at line 0
pub fn suite(label: &str, file: &str, tests: Vec<TestSuite>) -> TestSuite {
    TestSuite {
        label: label.to_string(),
        file: file.to_string(),
        position: Position::new(0, 0),
        tests: if tests.is_empty() { None } else { Some(tests) },
    }
}

/// Discovery service answering from a fixed table keyed by project folder
#[derive(Default)]
pub struct FakeDiscovery {
    responses: HashMap<String, Result<Vec<TestSuite>, String>>,
    gate: Option<Arc<Notify>>,
    hang: bool,
    calls: AtomicUsize,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suites(mut self, project_folder: &Url, suites: Vec<TestSuite>) -> Self {
        self.responses.insert(project_folder.to_string(), Ok(suites));
        self
    }

    pub fn failing(mut self, project_folder: &Url, message: &str) -> Self {
        self.responses
            .insert(project_folder.to_string(), Err(message.to_string()));
        self
    }

    /// Hold every answer until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Never answer
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryService for FakeDiscovery {
    async fn find_tests(&self, params: FindTestsParams) -> ExplorerResult<FindTestsResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match self.responses.get(&params.project_folder) {
            Some(Ok(suites)) => Ok(FindTestsResponse {
                suites: Some(suites.clone()),
            }),
            Some(Err(message)) => Err(ExplorerError::discovery(message)),
            None => Ok(FindTestsResponse::default()),
        }
    }
}

/// Execution adapter recording requests; fails the configured projects
#[derive(Default)]
pub struct FakeAdapter {
    failures: HashMap<Url, String>,
    requests: Mutex<Vec<ExecutionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, project_folder: &Url, message: &str) -> Self {
        self.failures
            .insert(project_folder.clone(), message.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, project_folder: &Url) -> Vec<ExecutionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.project_folder == *project_folder)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionAdapter for FakeAdapter {
    async fn run_tests(&self, request: ExecutionRequest) -> Result<SuiteResult, String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.get(&request.project_folder) {
            Some(message) => Err(message.clone()),
            None => Ok(SuiteResult {
                label: request.project_folder.to_string(),
                children: Vec::new(),
            }),
        }
    }
}

/// Workspace `file:///ws` whose projects are attached by hand and resolved
/// through `discovery`
pub struct Fixture {
    pub explorer: TestExplorer,
    pub workspace: NodeId,
    pub projects: Vec<NodeId>,
}

pub fn project_folder(name: &str) -> Url {
    url(&format!("file:///ws/{}", name))
}

pub fn suite_id(project: &str, path: &[&str]) -> NodeId {
    NodeId::suite(&project_folder(project), path)
}

pub async fn fixture(
    names: &[&str],
    discovery: FakeDiscovery,
    adapter: Arc<FakeAdapter>,
    config: ExplorerConfig,
) -> Fixture {
    let explorer = TestExplorer::new(config, Arc::new(discovery), adapter);
    let workspace = explorer.add_workspace_folder(url("file:///ws")).await.unwrap();

    let mut projects = Vec::new();
    {
        let tree = explorer.tree();
        let mut tree = tree.write().await;
        for name in names {
            let node = TestNode::project(project_folder(name), workspace.clone());
            projects.push(tree.attach_child(&workspace, node).unwrap());
        }
    }

    let token = CancellationToken::new();
    for project in &projects {
        explorer.resolve(project, &token).await.unwrap();
    }

    Fixture {
        explorer,
        workspace,
        projects,
    }
}
