//! Seams to the external collaborators: discovery service, execution adapter
//! and the language client carrying discovery requests

use async_trait::async_trait;
use serde_json::Value;
use tower_lsp::lsp_types::request::Request;
use tracing::debug;

use crate::error::{ExplorerError, ExplorerResult};
use crate::protocol::{
    ExecutionRequest, FindTestsParams, FindTestsRequest, FindTestsResponse, SuiteResult,
};

/// Lists the suites and tests of a project
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn find_tests(&self, params: FindTestsParams) -> ExplorerResult<FindTestsResponse>;
}

/// Compiles and runs test files of one project
///
/// Failures are reported as the text the host should show to the user.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    async fn run_tests(&self, request: ExecutionRequest) -> Result<SuiteResult, String>;
}

/// JSON-RPC request channel to a language server
#[async_trait]
pub trait LanguageClient: Send + Sync {
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, String>;
}

/// Discovery through the language server's find-tests request
pub struct LspDiscoveryService<C> {
    client: C,
}

impl<C: LanguageClient> LspDiscoveryService<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: LanguageClient> DiscoveryService for LspDiscoveryService<C> {
    async fn find_tests(&self, params: FindTestsParams) -> ExplorerResult<FindTestsResponse> {
        debug!(project = %params.project_folder, "sending {}", FindTestsRequest::METHOD);

        let params = serde_json::to_value(params)?;
        let response = self
            .client
            .send_request(FindTestsRequest::METHOD, params)
            .await
            .map_err(ExplorerError::discovery)?;

        // A null result is a project without tests
        if response.is_null() {
            return Ok(FindTestsResponse::default());
        }
        Ok(serde_json::from_value(response)?)
    }
}
