//! Browser handler.
//!
//! Opening a URL goes through the platform opener. Script execution and
//! element clicks need an automation driver, which this crate does not ship.

use std::path::Path;

use anyhow::{Result, bail};
use serde_json::{Value, json};

use super::{HandlerRequest, OperationHandler, ShellHandler};
use crate::core::operation::{BrowserAction, HandlerKind, Operation, Platform};
use crate::io::config::ControllerConfig;

const URL_KEYS: [&str; 3] = ["url", "link", "address"];

pub struct BrowserHandler {
    shell: ShellHandler,
}

impl BrowserHandler {
    pub fn new(workdir: &Path, config: &ControllerConfig) -> Self {
        Self {
            shell: ShellHandler::new(workdir, config),
        }
    }
}

impl OperationHandler for BrowserHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Browser
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<Value> {
        let Operation::Browser(action) = request.operation else {
            bail!("browser handler cannot run {:?}", request.operation);
        };
        match action {
            BrowserAction::Open => {
                let url = request.require_str(&URL_KEYS)?;
                let url = normalize_url(url);
                let command = Platform::current().open_url_command(&url)?;
                self.shell.run(&command, request)?;
                Ok(json!(format!("Opened {url}")))
            }
            BrowserAction::ExecuteJs => {
                bail!("JavaScript execution requires a browser automation driver")
            }
            BrowserAction::Click => bail!("element clicks require a browser automation driver"),
        }
    }
}

/// Prefix bare hosts with `https://`.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::types::Parameters;

    #[test]
    fn bare_host_gets_https() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://a.b/c"), "http://a.b/c");
    }

    #[test]
    fn click_without_driver_is_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handler = BrowserHandler::new(temp.path(), &ControllerConfig::default());
        let op = Operation::Browser(BrowserAction::Click);
        let params = Parameters::new();
        let err = handler
            .handle(&HandlerRequest {
                operation: &op,
                parameters: &params,
                timeout: Duration::from_secs(1),
            })
            .expect_err("must fail");
        assert!(err.to_string().contains("automation driver"));
    }
}
