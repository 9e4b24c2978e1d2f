//! Console run session - print run progress for terminal hosts

use colored::*;
use std::collections::BTreeMap;
use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::session::{RunSession, TestState};
use crate::tree::NodeId;

struct ConsoleState<W> {
    out: W,
    states: BTreeMap<NodeId, TestState>,
    failures: Vec<(NodeId, String)>,
    ended: bool,
}

/// Run session that writes colored progress lines and a summary on `end`
pub struct ConsoleSession<W: Write + Send = Stdout> {
    state: Mutex<ConsoleState<W>>,
    /// Show every state transition, not only final results
    verbose: bool,
    /// Disable colored output
    no_color: bool,
    started: Instant,
}

impl ConsoleSession<Stdout> {
    /// Create a console session printing to stdout
    pub fn stdout(verbose: bool) -> Self {
        Self::new(io::stdout(), verbose)
    }
}

impl<W: Write + Send> ConsoleSession<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                out,
                states: BTreeMap::new(),
                failures: Vec::new(),
                ended: false,
            }),
            verbose,
            no_color: false,
            started: Instant::now(),
        }
    }

    /// Disable colored output
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Consume the session and return the writer
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn paint(&self, text: &str, color: Color) -> ColoredString {
        if self.no_color {
            text.normal()
        } else {
            text.color(color).bold()
        }
    }

    fn print_summary(&self, state: &mut ConsoleState<W>) -> io::Result<()> {
        let passed = state
            .states
            .values()
            .filter(|s| **s == TestState::Passed)
            .count();
        let failed = state
            .states
            .values()
            .filter(|s| **s == TestState::Failed)
            .count();

        writeln!(state.out, "{}", "─".repeat(50))?;

        let status = if failed > 0 {
            self.paint("FAILED", Color::Red)
        } else {
            self.paint("PASSED", Color::Green)
        };
        writeln!(
            state.out,
            "Test result: {} | {} passed, {} failed",
            status, passed, failed
        )?;
        writeln!(state.out, "Time: {:.2?}", self.started.elapsed())?;

        if state.failures.is_empty() {
            return Ok(());
        }

        writeln!(state.out)?;
        writeln!(state.out, "{}", self.paint("Failures:", Color::Red))?;
        for (node, message) in &state.failures {
            writeln!(state.out, "  {} {}", self.paint("●", Color::Red), node)?;
            for line in message.lines() {
                writeln!(state.out, "      {}", line)?;
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> RunSession for ConsoleSession<W> {
    fn set_state(&self, node: &NodeId, new_state: TestState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended {
            return;
        }
        state.states.insert(node.clone(), new_state);

        let line = match new_state {
            TestState::Running if self.verbose => Some(self.paint("RUN ", Color::Cyan)),
            TestState::Running => None,
            TestState::Passed => Some(self.paint("PASS", Color::Green)),
            TestState::Failed => Some(self.paint("FAIL", Color::Red)),
        };
        if let Some(tag) = line {
            let _ = writeln!(state.out, "{} {}", tag, node);
        }
    }

    fn append_message(&self, node: &NodeId, message: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended {
            return;
        }
        state.failures.push((node.clone(), message.to_string()));
    }

    fn append_output(&self, output: &str) {
        if !self.verbose {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended {
            return;
        }
        let _ = write!(state.out, "{}", output.replace("\r\n", "\n"));
    }

    fn end(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.ended {
            return;
        }
        state.ended = true;
        let _ = self.print_summary(&mut state);
        let _ = state.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower_lsp::lsp_types::Url;

    fn node(name: &str) -> NodeId {
        NodeId::project(&Url::parse(&format!("file:///ws/{}", name)).unwrap())
    }

    fn render(verbose: bool, run: impl FnOnce(&ConsoleSession<Vec<u8>>)) -> String {
        let session = ConsoleSession::new(Vec::new(), verbose).with_no_color(true);
        run(&session);
        String::from_utf8(session.into_inner()).unwrap()
    }

    #[test]
    fn test_console_all_pass() {
        let out = render(false, |session| {
            session.set_state(&node("a"), TestState::Running);
            session.set_state(&node("a"), TestState::Passed);
            session.end();
        });

        assert!(out.contains("PASS project file:///ws/a"));
        assert!(!out.contains("RUN"));
        assert!(out.contains("Test result: PASSED | 1 passed, 0 failed"));
        assert!(!out.contains("Failures:"));
    }

    #[test]
    fn test_console_with_failures() {
        let out = render(true, |session| {
            session.set_state(&node("a"), TestState::Running);
            session.set_state(&node("b"), TestState::Running);
            session.set_state(&node("a"), TestState::Passed);
            session.set_state(&node("b"), TestState::Failed);
            session.append_message(&node("b"), "compile error\nin Main.elm");
            session.append_output("Completed project file:///ws/a\r\n");
            session.end();
        });

        assert!(out.contains("RUN  project file:///ws/a"));
        assert!(out.contains("Completed project file:///ws/a\n"));
        assert!(out.contains("Test result: FAILED | 1 passed, 1 failed"));
        assert!(out.contains("Failures:"));
        assert!(out.contains("      in Main.elm"));
    }

    #[test]
    fn test_console_end_is_final() {
        let out = render(false, |session| {
            session.end();
            session.set_state(&node("late"), TestState::Passed);
            session.end();
        });

        assert_eq!(out.matches("Test result").count(), 1);
        assert!(!out.contains("late"));
    }

    #[test]
    fn test_console_empty_run() {
        let out = render(true, |session| session.end());
        assert!(out.contains("0 passed, 0 failed"));
    }
}
