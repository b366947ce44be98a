//! Code execution tools - Python snippets and shell commands
//!
//! Both run as child processes bounded by a timeout. A process that overruns
//! is killed and the timeout is reported in the result text rather than as
//! an error, so the model can see what happened.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{required_str, Tool};
use crate::error::Error;
use crate::Result;

/// Captured outcome of one child process.
#[derive(Debug, Clone, PartialEq)]
struct ExecOutcome {
    output: String,
    error: String,
    return_code: i32,
}

impl ExecOutcome {
    fn render(&self) -> String {
        let mut text = format!("Output: {}\n", self.output);
        if !self.error.is_empty() {
            text.push_str(&format!("Error: {}\n", self.error));
        }
        text.push_str(&format!("Return code: {}", self.return_code));
        text
    }
}

async fn run(mut command: Command, timeout: Duration, what: &str) -> Result<ExecOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| Error::Tool(format!("Failed to start {}: {}", what, e)))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(ExecOutcome {
                output: String::from_utf8_lossy(&output.stdout).to_string(),
                error: String::from_utf8_lossy(&output.stderr).to_string(),
                return_code: output.status.code().unwrap_or(-1),
            })
        }
        Err(_) => {
            // Dropping the wait future drops the child, which kills it.
            warn!("{} timed out after {:?}", what, timeout);
            Ok(ExecOutcome {
                output: String::new(),
                error: format!("{} timed out after {} seconds", what, timeout.as_secs()),
                return_code: -1,
            })
        }
    }
}

fn python_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Execute Python code from a temporary script
pub struct PythonExecTool {
    timeout: Duration,
}

impl PythonExecTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        "execute_python"
    }

    fn description(&self) -> &str {
        "Execute Python code. Use this to run calculations, process data, or test code."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let code = required_str(&params, "code")?;

        let dir = std::env::temp_dir();
        let script = dir.join(format!("gravity_{}.py", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&script, code).await?;
        debug!("Running Python script {:?}", script);

        let mut command = Command::new(python_interpreter());
        command.arg(&script).current_dir(&dir);
        let outcome = run(command, self.timeout, "Execution").await;

        if let Err(e) = tokio::fs::remove_file(&script).await {
            debug!("Could not remove {:?}: {}", script, e);
        }

        Ok(outcome?.render())
    }
}

/// Execute a shell command from the home directory
pub struct ShellExecTool {
    timeout: Duration,
    working_dir: PathBuf,
}

impl ShellExecTool {
    pub fn new(timeout: Duration) -> Self {
        let working_dir = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self { timeout, working_dir }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "execute_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command. Use with caution."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let line = required_str(&params, "command")?;
        debug!("Running shell command: {}", line);

        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(line);
            c
        };
        command.current_dir(&self.working_dir);

        Ok(run(command, self.timeout, "Command").await?.render())
    }
}
