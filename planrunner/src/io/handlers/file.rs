//! Local file handler.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{FILENAME_KEYS, HandlerRequest, OperationHandler, resolve};
use crate::core::operation::{FileAction, HandlerKind, Operation};

pub struct FileHandler {
    workdir: PathBuf,
}

impl FileHandler {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
        }
    }
}

impl OperationHandler for FileHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::File
    }

    #[instrument(skip_all, fields(operation = ?request.operation))]
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value> {
        let Operation::File(action) = request.operation else {
            bail!("file handler cannot run {:?}", request.operation);
        };
        let path = resolve(&self.workdir, request.require_str(&FILENAME_KEYS)?);
        let content = request.str_param(&["content", "text"]).unwrap_or_default();
        debug!(path = %path.display(), "file operation");

        match action {
            FileAction::Create => {
                write_file(&path, content)?;
                Ok(json!(format!("Created file {}", path.display())))
            }
            FileAction::Read => read_file(&path).map(Value::String),
            FileAction::Delete => {
                fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;
                Ok(json!(format!("Deleted file {}", path.display())))
            }
            FileAction::ReadAndAppend => {
                append_file(&path, content)?;
                read_file(&path).map(Value::String)
            }
            FileAction::Conditional => {
                if path.exists() {
                    append_file(&path, content)?;
                    Ok(json!(format!("Appended to file {}", path.display())))
                } else {
                    write_file(&path, content)?;
                    Ok(json!(format!("Created file {}", path.display())))
                }
            }
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("write {}", path.display()))
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn append_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("open {} for append", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}
