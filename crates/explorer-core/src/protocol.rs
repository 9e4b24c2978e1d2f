//! Wire types exchanged with the discovery service and the execution adapter

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::{Position, Url};

/// Custom language server request listing the suites of a project
pub enum FindTestsRequest {}

impl Request for FindTestsRequest {
    type Params = FindTestsParams;
    type Result = FindTestsResponse;
    const METHOD: &'static str = "elm/findTests";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindTestsParams {
    /// Project folder URI
    pub project_folder: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindTestsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suites: Option<Vec<TestSuite>>,
}

/// Suite descriptor reported by discovery; tests are suites without children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuite {
    pub label: String,
    pub file: String,
    /// Zero-based line and character
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestSuite>>,
}

impl TestSuite {
    /// Nested descriptors, empty when none were reported
    pub fn children(&self) -> &[TestSuite] {
        self.tests.as_deref().unwrap_or(&[])
    }
}

/// One execution request per project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub workspace_folder: Url,
    pub project_folder: Url,
    /// Files to run; empty means every test file of the project
    pub files: Vec<Url>,
}

impl ExecutionRequest {
    pub fn runs_all(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result tree returned by a successful execution
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuiteResult {
    pub label: String,
    #[serde(default)]
    pub children: Vec<SuiteResult>,
}

impl SuiteResult {
    /// Number of leaf results in the tree
    pub fn leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(SuiteResult::leaf_count).sum()
        }
    }
}
