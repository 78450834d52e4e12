//! Local directory handler.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{HandlerRequest, OperationHandler, resolve};
use crate::core::operation::{DirectoryAction, HandlerKind, Operation};

const DIRECTORY_KEYS: [&str; 4] = ["directory", "dir", "path", "directory_name"];

pub struct DirectoryHandler {
    workdir: PathBuf,
}

impl DirectoryHandler {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
        }
    }
}

impl OperationHandler for DirectoryHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Directory
    }

    #[instrument(skip_all, fields(operation = ?request.operation))]
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value> {
        let Operation::Directory(action) = request.operation else {
            bail!("directory handler cannot run {:?}", request.operation);
        };

        match action {
            DirectoryAction::Create => {
                let path = resolve(&self.workdir, request.require_str(&DIRECTORY_KEYS)?);
                debug!(path = %path.display(), "creating directory");
                fs::create_dir_all(&path)
                    .with_context(|| format!("create directory {}", path.display()))?;
                Ok(json!(format!("Created directory {}", path.display())))
            }
            DirectoryAction::List => {
                let path = resolve(
                    &self.workdir,
                    request.str_param(&DIRECTORY_KEYS).unwrap_or("."),
                );
                list_sorted(&path).map(|names| json!(names))
            }
        }
    }
}

fn list_sorted(path: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(path)
        .with_context(|| format!("list directory {}", path.display()))?
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .with_context(|| format!("read entry in {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}
