use std::borrow::Cow;

use super::safety::SafetyFilter;
use super::session::Session;
use crate::utils::{log_debug, log_warn, ExecutionError};

/// Lua source text destined for the remote REPL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment(String);

impl CodeFragment {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CodeFragment {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl From<&str> for CodeFragment {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl AsRef<str> for CodeFragment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shell command that pipes `code` verbatim into the REPL's stdin.
///
/// `printf '%s\n'` rather than `echo` so backslashes are never interpreted.
pub fn build_repl_command(code: &str, repl_command: &str) -> String {
    let quoted = shell_escape::unix::escape(Cow::Borrowed(code));
    format!("printf '%s\\n' {} | {}", quoted, repl_command)
}

/// Sends code fragments to the device REPL and returns its textual answer
#[derive(Debug, Clone)]
pub struct ExecutionChannel {
    filter: SafetyFilter,
    repl_command: String,
}

impl ExecutionChannel {
    pub fn new(filter: SafetyFilter, repl_command: impl Into<String>) -> Self {
        Self {
            filter,
            repl_command: repl_command.into(),
        }
    }

    pub fn filter(&self) -> &SafetyFilter {
        &self.filter
    }

    /// Execute `code` and wait for the REPL to finish.
    ///
    /// Rejected fragments never reach the transport. Remote stderr and a
    /// non-zero REPL exit are logged as warnings and do not fail the call;
    /// the returned stdout is trimmed.
    pub async fn execute(
        &self,
        session: &mut Session,
        code: &CodeFragment,
    ) -> Result<String, ExecutionError> {
        if !session.is_connected() {
            return Err(ExecutionError::NotConnected);
        }

        if let Some(pattern) = self.filter.first_match(code.as_str()) {
            log_warn("[SAFETY]", format!("Rejected fragment matching `{}`", pattern));
            return Err(ExecutionError::UnsafeCodeRejected {
                pattern: pattern.to_string(),
            });
        }

        let command = build_repl_command(code.as_str(), &self.repl_command);
        log_debug(format!("Executing {} bytes of Lua on {}", code.as_str().len(), session.host()));

        let output = session.run_command(&command).await?;

        let diagnostics = output.stderr.trim();
        if !diagnostics.is_empty() {
            log_warn("[REMOTE]", format!("Warning: {}", diagnostics));
        }

        if !output.success() {
            log_warn(
                "[REMOTE]",
                format!("{} exited with status {}", self.repl_command, output.exit_code),
            );
        }

        Ok(output.stdout.trim().to_string())
    }
}
