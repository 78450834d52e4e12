//! Operation handlers.
//!
//! The [`OperationHandler`] trait decouples the controller from the systems
//! that actually touch files, processes, or browsers. The controller looks up
//! a handler by [`HandlerKind`] in a [`HandlerRegistry`]; tests register
//! scripted handlers that never leave the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::operation::{HandlerKind, Operation};
use crate::core::types::Parameters;
use crate::io::config::ControllerConfig;

pub mod browser;
pub mod directory;
pub mod file;
pub mod shell;

pub use browser::BrowserHandler;
pub use directory::DirectoryHandler;
pub use file::FileHandler;
pub use shell::ShellHandler;

/// Keys accepted for a file path, in lookup order.
pub const FILENAME_KEYS: [&str; 3] = ["filename", "file_path", "path"];

/// One handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerRequest<'a> {
    pub operation: &'a Operation,
    /// Parameters after `$` capture and substitution.
    pub parameters: &'a Parameters,
    /// Time left for this call (step limit bounded by the plan deadline).
    pub timeout: Duration,
}

impl HandlerRequest<'_> {
    /// String parameter under the first present key.
    pub fn str_param(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.parameters.get(*key))
            .find_map(Value::as_str)
    }

    pub fn require_str(&self, keys: &[&str]) -> Result<&str> {
        self.str_param(keys)
            .ok_or_else(|| anyhow!("missing parameter `{}`", keys.join("` / `")))
    }
}

/// Executes routed operations of one family.
pub trait OperationHandler {
    fn kind(&self) -> HandlerKind;

    /// Run the operation and return its output. Errors mark the step failed.
    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value>;
}

/// Handlers keyed by family. At most one handler per kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKind, Box<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local file, directory, shell, and browser handlers rooted at `workdir`.
    pub fn local(workdir: impl Into<PathBuf>, config: &ControllerConfig) -> Self {
        let workdir = workdir.into();
        Self::new()
            .register(FileHandler::new(&workdir))
            .register(DirectoryHandler::new(&workdir))
            .register(ShellHandler::new(&workdir, config))
            .register(BrowserHandler::new(&workdir, config))
    }

    /// Add a handler, replacing any previous one of the same kind.
    #[must_use]
    pub fn register(mut self, handler: impl OperationHandler + 'static) -> Self {
        self.handlers.insert(handler.kind(), Box::new(handler));
        self
    }

    pub fn get(&self, kind: HandlerKind) -> Option<&dyn OperationHandler> {
        self.handlers.get(&kind).map(Box::as_ref)
    }
}

/// Resolve `path` against `workdir` unless it is already absolute.
pub(crate) fn resolve(workdir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::FileAction;
    use serde_json::json;

    struct Named(HandlerKind, &'static str);

    impl OperationHandler for Named {
        fn kind(&self) -> HandlerKind {
            self.0
        }

        fn handle(&self, _request: &HandlerRequest<'_>) -> Result<Value> {
            Ok(json!(self.1))
        }
    }

    #[test]
    fn register_replaces_same_kind() {
        let registry = HandlerRegistry::new()
            .register(Named(HandlerKind::File, "first"))
            .register(Named(HandlerKind::File, "second"));
        let op = Operation::File(FileAction::Read);
        let params = Parameters::new();
        let request = HandlerRequest {
            operation: &op,
            parameters: &params,
            timeout: Duration::from_secs(1),
        };
        let handler = registry.get(HandlerKind::File).expect("file handler");
        assert_eq!(handler.handle(&request).expect("handle"), json!("second"));
        assert!(registry.get(HandlerKind::Browser).is_none());
    }

    #[test]
    fn filename_keys_are_tried_in_order() {
        let op = Operation::File(FileAction::Read);
        let params = json!({"path": "c.txt", "file_path": "b.txt"})
            .as_object()
            .cloned()
            .expect("object");
        let request = HandlerRequest {
            operation: &op,
            parameters: &params,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(request.str_param(&FILENAME_KEYS), Some("b.txt"));
        let err = request.require_str(&["url"]).expect_err("missing");
        assert_eq!(err.to_string(), "missing parameter `url`");
    }

    #[test]
    fn relative_paths_join_workdir() {
        let workdir = Path::new("/tmp/work");
        assert_eq!(resolve(workdir, "a.txt"), PathBuf::from("/tmp/work/a.txt"));
        assert_eq!(resolve(workdir, "/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
