//! Elm test explorer core
//!
//! Provides the test tree shown by editor hosts and the logic behind it:
//! - Tree model of workspaces, projects and suites
//! - Lazy, cancellable discovery of projects and suites
//! - Run orchestration: per-project batches, concurrent dispatch, result reporting
//! - Run session sinks (in-memory and console)

pub mod error;
pub mod explorer;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod reporter;
pub mod resolver;
pub mod service;
pub mod session;
pub mod tree;

// Re-export main types
pub use error::{ExplorerError, ExplorerResult};
pub use explorer::TestExplorer;
pub use logging::init_logging;
pub use orchestrator::{plan_batches, ProjectBatch, RunOrchestrator, RunRequest, RunSummary};
pub use protocol::{
    ExecutionRequest, FindTestsParams, FindTestsRequest, FindTestsResponse, SuiteResult, TestSuite,
};
pub use reporter::ConsoleSession;
pub use resolver::DiscoveryResolver;
pub use service::{DiscoveryService, ExecutionAdapter, LanguageClient, LspDiscoveryService};
pub use session::{RecordingSession, RunSession, SessionEvent, TestState};
pub use tree::{
    NodeData, NodeId, NodeSnapshot, ProjectRoot, ResolutionStatus, SharedTree, SuiteNode,
    TestNode, TestTree, WorkspaceRoot,
};

// Re-export config and token types used in the public API
pub use explorer_config::{ExplorerConfig, LogConfig};
pub use tokio_util::sync::CancellationToken;
pub use tower_lsp::lsp_types::{Position, Url};
