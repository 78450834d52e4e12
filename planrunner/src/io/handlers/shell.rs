//! Shell handler: runs command strings through the configured interpreter.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::{FILENAME_KEYS, HandlerRequest, OperationHandler, resolve};
use crate::core::operation::{HandlerKind, Operation, Platform, ShellAction};
use crate::io::config::ControllerConfig;
use crate::io::process::run_bounded;

const COMMAND_KEYS: [&str; 2] = ["command", "cmd"];

pub struct ShellHandler {
    workdir: PathBuf,
    program: Vec<String>,
    output_limit_bytes: usize,
}

impl ShellHandler {
    pub fn new(workdir: &Path, config: &ControllerConfig) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            program: config.shell.program.clone(),
            output_limit_bytes: config.shell_output_limit_bytes,
        }
    }

    /// Run `command` and return its stdout. Non-zero exit or timeout is an error.
    #[instrument(skip(self, request), fields(timeout_secs = request.timeout.as_secs()))]
    pub(crate) fn run(&self, command: &str, request: &HandlerRequest<'_>) -> Result<String> {
        let (program, args) = self
            .program
            .split_first()
            .ok_or_else(|| anyhow!("shell.program is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(command).current_dir(&self.workdir);

        info!("running shell command");
        let process = run_bounded(cmd, request.timeout, self.output_limit_bytes)
            .with_context(|| format!("run `{command}`"))?;
        if process.timed_out.is_some() {
            warn!("shell command timed out");
        } else if !process.status.success() {
            warn!(exit_code = ?process.status.code(), "shell command failed");
        }
        process.into_stdout(command)
    }
}

impl OperationHandler for ShellHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Shell
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value> {
        match request.operation {
            Operation::Shell(ShellAction::Execute) => {
                let command = request.require_str(&COMMAND_KEYS)?;
                self.run(command, request).map(Value::String)
            }
            Operation::Shell(ShellAction::ExecuteAndRead) => {
                let command = request.require_str(&COMMAND_KEYS)?;
                let stdout = self.run(command, request)?;
                let path = resolve(&self.workdir, request.require_str(&FILENAME_KEYS)?);
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                Ok(json!({ "command_output": stdout, "file_content": content }))
            }
            Operation::LaunchApplication { application } => {
                let command = Platform::current().launch_command(application)?;
                self.run(&command, request)?;
                Ok(json!(format!("Launched {application}")))
            }
            other => bail!("shell handler cannot run {other:?}"),
        }
    }
}
