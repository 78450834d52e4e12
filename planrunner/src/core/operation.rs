//! Operation routing table.
//!
//! Plans name operations with free-form strings (`file.create`,
//! `execute_shell_command`, `browser.click`). [`Operation::route`] maps those
//! names onto a closed set of variants so dispatch is an exhaustive `match`
//! and anything unrecognized lands in [`Operation::Unsupported`].

use std::fmt;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::core::types::Parameters;

/// Parameter keys that name an application to launch.
pub const APPLICATION_KEYS: [&str; 4] = ["application_name", "application", "app", "program"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Create,
    Read,
    Delete,
    ReadAndAppend,
    /// Append when the file exists, create it otherwise.
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryAction {
    Create,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellAction {
    Execute,
    ExecuteAndRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    Open,
    ExecuteJs,
    Click,
}

/// Routed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    File(FileAction),
    Directory(DirectoryAction),
    Shell(ShellAction),
    Browser(BrowserAction),
    /// Launch a desktop application through the shell handler.
    LaunchApplication { application: String },
    /// No routing rule matched.
    Unsupported(String),
}

/// Handler family responsible for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    File,
    Directory,
    Shell,
    Browser,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerKind::File => "file",
            HandlerKind::Directory => "directory",
            HandlerKind::Shell => "shell",
            HandlerKind::Browser => "browser",
        };
        f.write_str(name)
    }
}

impl Operation {
    /// Route an operation name (plus its parameters, for the launch heuristic).
    ///
    /// Order: exact names, then `file.`/`directory.`/`shell.` prefixes, then the
    /// application-launch heuristic. A known prefix with an unknown action is
    /// unsupported rather than falling through to the heuristic.
    pub fn route(name: &str, parameters: &Parameters) -> Operation {
        let name = name.trim();
        if let Some(op) = route_exact(name) {
            return op;
        }
        if let Some(action) = name.strip_prefix("file.") {
            return route_file(action).unwrap_or_else(|| Operation::Unsupported(name.to_string()));
        }
        if let Some(action) = name.strip_prefix("directory.") {
            return route_directory(action)
                .unwrap_or_else(|| Operation::Unsupported(name.to_string()));
        }
        if let Some(action) = name.strip_prefix("shell.") {
            return route_shell(action).unwrap_or_else(|| Operation::Unsupported(name.to_string()));
        }
        if let Some(application) = launch_target(name, parameters) {
            return Operation::LaunchApplication { application };
        }
        Operation::Unsupported(name.to_string())
    }

    /// Handler family for this operation, or `None` when unsupported.
    pub fn handler_kind(&self) -> Option<HandlerKind> {
        match self {
            Operation::File(_) => Some(HandlerKind::File),
            Operation::Directory(_) => Some(HandlerKind::Directory),
            Operation::Shell(_) | Operation::LaunchApplication { .. } => Some(HandlerKind::Shell),
            Operation::Browser(_) => Some(HandlerKind::Browser),
            Operation::Unsupported(_) => None,
        }
    }
}

fn route_exact(name: &str) -> Option<Operation> {
    let op = match name {
        "execute_shell_command" => Operation::Shell(ShellAction::Execute),
        "open_browser" | "launch_browser" | "browser.open" => {
            Operation::Browser(BrowserAction::Open)
        }
        "execute_javascript" | "browser.execute_js" => Operation::Browser(BrowserAction::ExecuteJs),
        "click_element" | "browser.click" => Operation::Browser(BrowserAction::Click),
        "conditional_file_operation" => Operation::File(FileAction::Conditional),
        _ => return None,
    };
    Some(op)
}

fn route_file(action: &str) -> Option<Operation> {
    let action = match action {
        "create" => FileAction::Create,
        "read" => FileAction::Read,
        "delete" => FileAction::Delete,
        "read_and_append" => FileAction::ReadAndAppend,
        _ => return None,
    };
    Some(Operation::File(action))
}

fn route_directory(action: &str) -> Option<Operation> {
    let action = match action {
        "create" => DirectoryAction::Create,
        "list" => DirectoryAction::List,
        _ => return None,
    };
    Some(Operation::Directory(action))
}

fn route_shell(action: &str) -> Option<Operation> {
    let action = match action {
        "execute" => ShellAction::Execute,
        "execute_and_read" => ShellAction::ExecuteAndRead,
        _ => return None,
    };
    Some(Operation::Shell(action))
}

/// Application named by the parameters, or derived from an `open`/`launch` operation name.
fn launch_target(name: &str, parameters: &Parameters) -> Option<String> {
    let from_params = APPLICATION_KEYS
        .iter()
        .filter_map(|key| parameters.get(*key))
        .find_map(non_empty_str);
    if let Some(app) = from_params {
        return Some(app);
    }

    let lowered = name.to_lowercase();
    if !lowered.contains("open") && !lowered.contains("launch") {
        return None;
    }
    let derived = lowered
        .split(['_', '.', '-', ' '])
        .filter(|word| !word.is_empty())
        .filter(|word| !matches!(*word, "open" | "launch" | "app" | "application"))
        .collect::<Vec<_>>()
        .join(" ");
    if derived.is_empty() { None } else { Some(derived) }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Target platform for synthesized launch commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// Shell command that launches `application` on this platform.
    ///
    /// The Linux form detaches output so the launched program does not hold
    /// the captured pipes open.
    pub fn launch_command(self, application: &str) -> Result<String> {
        let quoted = self.quote(application)?;
        Ok(match self {
            Platform::MacOs => format!("open -a {quoted}"),
            Platform::Windows => format!("start \"\" {quoted}"),
            Platform::Linux => format!("{quoted} >/dev/null 2>&1 &"),
        })
    }

    /// Shell command that opens `url` in the default browser.
    pub fn open_url_command(self, url: &str) -> Result<String> {
        let quoted = self.quote(url)?;
        Ok(match self {
            Platform::MacOs => format!("open {quoted}"),
            Platform::Windows => format!("start \"\" {quoted}"),
            Platform::Linux => format!("xdg-open {quoted} >/dev/null 2>&1"),
        })
    }

    /// Quote `value` as one argument for this platform's shell.
    ///
    /// POSIX shells get single quotes with embedded `'` spliced as `'\''`.
    /// `cmd` has no escape for `"` inside a quoted argument, so those values
    /// are rejected.
    fn quote(self, value: &str) -> Result<String> {
        match self {
            Platform::Windows => {
                if value.contains('"') {
                    bail!("{value:?} contains a double quote and cannot be passed to cmd");
                }
                Ok(format!("\"{value}\""))
            }
            Platform::MacOs | Platform::Linux => {
                Ok(format!("'{}'", value.replace('\'', r"'\''")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn routes_exact_names() {
        let empty = Parameters::new();
        assert_eq!(
            Operation::route("execute_shell_command", &empty),
            Operation::Shell(ShellAction::Execute)
        );
        assert_eq!(
            Operation::route("launch_browser", &empty),
            Operation::Browser(BrowserAction::Open)
        );
        assert_eq!(
            Operation::route("execute_javascript", &empty),
            Operation::Browser(BrowserAction::ExecuteJs)
        );
        assert_eq!(
            Operation::route("browser.click", &empty),
            Operation::Browser(BrowserAction::Click)
        );
        assert_eq!(
            Operation::route("conditional_file_operation", &empty),
            Operation::File(FileAction::Conditional)
        );
    }

    #[test]
    fn routes_prefixed_families() {
        let empty = Parameters::new();
        assert_eq!(
            Operation::route("file.read_and_append", &empty),
            Operation::File(FileAction::ReadAndAppend)
        );
        assert_eq!(
            Operation::route("directory.list", &empty),
            Operation::Directory(DirectoryAction::List)
        );
        assert_eq!(
            Operation::route("shell.execute_and_read", &empty),
            Operation::Shell(ShellAction::ExecuteAndRead)
        );
    }

    #[test]
    fn unknown_action_in_known_family_is_unsupported() {
        let op = Operation::route("file.open", &params(json!({"app": "Finder"})));
        assert_eq!(op, Operation::Unsupported("file.open".to_string()));
        assert_eq!(op.handler_kind(), None);
    }

    #[test]
    fn application_key_triggers_launch() {
        let op = Operation::route("start_program", &params(json!({"program": "Calculator"})));
        assert_eq!(
            op,
            Operation::LaunchApplication {
                application: "Calculator".to_string()
            }
        );
        assert_eq!(op.handler_kind(), Some(HandlerKind::Shell));
    }

    #[test]
    fn launch_name_derives_application() {
        let op = Operation::route("open_calculator", &Parameters::new());
        assert_eq!(
            op,
            Operation::LaunchApplication {
                application: "calculator".to_string()
            }
        );
    }

    #[test]
    fn bare_open_without_target_is_unsupported() {
        let op = Operation::route("open", &Parameters::new());
        assert_eq!(op, Operation::Unsupported("open".to_string()));
    }

    #[test]
    fn unknown_operation_is_unsupported() {
        let op = Operation::route("unknown.thing", &Parameters::new());
        assert_eq!(op, Operation::Unsupported("unknown.thing".to_string()));
    }

    #[test]
    fn launch_commands_per_platform() {
        assert_eq!(
            Platform::MacOs.launch_command("Safari").expect("macos"),
            "open -a 'Safari'"
        );
        assert_eq!(
            Platform::Windows.launch_command("notepad").expect("windows"),
            "start \"\" \"notepad\""
        );
        assert_eq!(
            Platform::Linux.launch_command("gedit").expect("linux"),
            "'gedit' >/dev/null 2>&1 &"
        );
    }

    #[test]
    fn embedded_quotes_stay_inside_one_argument() {
        assert_eq!(
            Platform::Linux
                .open_url_command("https://x.test/?q=\"a\";rm -rf ~")
                .expect("linux"),
            "xdg-open 'https://x.test/?q=\"a\";rm -rf ~' >/dev/null 2>&1"
        );
        assert_eq!(
            Platform::MacOs.launch_command("it's").expect("macos"),
            r"open -a 'it'\''s'"
        );
    }

    #[test]
    fn windows_rejects_double_quotes() {
        let err = Platform::Windows
            .open_url_command("https://x.test/\" & calc")
            .expect_err("must reject");
        assert!(err.to_string().contains("double quote"), "{err}");
    }
}
