//! File-operation classification for extracted shell commands.
//!
//! A side pass over a bare command: recognizes common file commands by their
//! leading tokens and captures filenames, content, and directories. The
//! result only enriches extraction metadata.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// File operation recognized in a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Create,
    Append,
    Read,
    Delete,
    Search,
    List,
    Copy,
    Move,
    CreateDirectory,
}

/// Classified command: operation plus captured parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCommand {
    pub operation: FileOperation,
    pub params: Map<String, Value>,
}

struct Rule {
    pattern: Regex,
    build: fn(&Captures<'_>) -> Option<FileCommand>,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |pattern: &str, build: fn(&Captures<'_>) -> Option<FileCommand>| Rule {
        pattern: Regex::new(pattern).expect("valid file-op regex"),
        build,
    };
    vec![
        rule(
            r#"^echo\s+(?:-[a-zA-Z]+\s+)?(?:"([^"]*)"|'([^']*)'|(.*?))\s*(>>?)\s*(\S+)\s*$"#,
            build_echo,
        ),
        rule(r"^touch\s+(.+)$", build_touch),
        rule(r"^(cat|head|tail)\s+(.+)$", build_read),
        rule(r"^rm\s+(.+)$", build_delete),
        rule(
            r#"^find(?:\s+([^-\s]\S*))?.*?\s-i?name\s+["']?([^"'\s]+)["']?"#,
            build_find,
        ),
        rule(r"^grep\s+(.+)$", build_grep),
        rule(r"^ls(?:\s+(.*))?$", build_list),
        rule(r"^(cp|mv)\s+(.+)$", build_copy_move),
        rule(r"^mkdir\s+(.+)$", build_mkdir),
    ]
});

/// Classify the first segment of `command` (before `&&`, `||`, `;` or `|`).
pub fn classify(command: &str) -> Option<FileCommand> {
    let segment = first_segment(command);
    RULES.iter().find_map(|rule| {
        rule.pattern
            .captures(segment)
            .and_then(|caps| (rule.build)(&caps))
    })
}

fn first_segment(command: &str) -> &str {
    let trimmed = command.trim();
    let end = ["&&", "||", ";", "|"]
        .iter()
        .filter_map(|sep| trimmed.find(sep))
        .min()
        .unwrap_or(trimmed.len());
    trimmed[..end].trim()
}

/// Whitespace tokens with surrounding quotes removed.
fn tokens(args: &str) -> Vec<String> {
    args.split_whitespace()
        .map(|token| token.trim_matches(['"', '\'']).to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn operands(args: &str) -> Vec<String> {
    tokens(args)
        .into_iter()
        .filter(|token| !token.starts_with('-'))
        .collect()
}

fn command(operation: FileOperation, params: Value) -> Option<FileCommand> {
    Some(FileCommand {
        operation,
        params: params.as_object().cloned().unwrap_or_default(),
    })
}

fn build_echo(caps: &Captures<'_>) -> Option<FileCommand> {
    let content = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map_or("", |m| m.as_str());
    let operation = if &caps[4] == ">>" {
        FileOperation::Append
    } else {
        FileOperation::Create
    };
    command(
        operation,
        json!({ "filename": &caps[5], "content": content }),
    )
}

fn build_touch(caps: &Captures<'_>) -> Option<FileCommand> {
    let files = operands(&caps[1]);
    let first = files.first()?.clone();
    if files.len() > 1 {
        return command(
            FileOperation::Create,
            json!({ "filename": first, "filenames": files }),
        );
    }
    command(FileOperation::Create, json!({ "filename": first }))
}

fn build_read(caps: &Captures<'_>) -> Option<FileCommand> {
    let args = &caps[2];
    if let Some((_, target)) = args.split_once('>') {
        let filename = operands(target).into_iter().next()?;
        return command(FileOperation::Create, json!({ "filename": filename }));
    }
    let filename = operands(args).pop()?;
    command(FileOperation::Read, json!({ "filename": filename }))
}

fn build_delete(caps: &Captures<'_>) -> Option<FileCommand> {
    let args = tokens(&caps[1]);
    let recursive = args
        .iter()
        .any(|token| token.starts_with('-') && token.contains(['r', 'R']));
    let files = operands(&caps[1]);
    let first = files.first()?.clone();
    command(
        FileOperation::Delete,
        json!({ "filename": first, "filenames": files, "recursive": recursive }),
    )
}

fn build_find(caps: &Captures<'_>) -> Option<FileCommand> {
    let directory = caps.get(1).map_or(".", |m| m.as_str());
    command(
        FileOperation::Search,
        json!({ "directory": directory, "pattern": &caps[2] }),
    )
}

fn build_grep(caps: &Captures<'_>) -> Option<FileCommand> {
    let mut args = operands(&caps[1]).into_iter();
    let pattern = args.next()?;
    match args.next() {
        Some(target) => command(
            FileOperation::Search,
            json!({ "pattern": pattern, "filename": target }),
        ),
        None => command(FileOperation::Search, json!({ "pattern": pattern })),
    }
}

fn build_list(caps: &Captures<'_>) -> Option<FileCommand> {
    let directory = caps
        .get(1)
        .and_then(|m| operands(m.as_str()).into_iter().next())
        .unwrap_or_else(|| ".".to_string());
    command(FileOperation::List, json!({ "directory": directory }))
}

fn build_copy_move(caps: &Captures<'_>) -> Option<FileCommand> {
    let files = operands(&caps[2]);
    let [source, destination] = files.as_slice() else {
        return None;
    };
    let operation = if &caps[1] == "cp" {
        FileOperation::Copy
    } else {
        FileOperation::Move
    };
    command(
        operation,
        json!({ "source": source, "destination": destination }),
    )
}

fn build_mkdir(caps: &Captures<'_>) -> Option<FileCommand> {
    let directory = operands(&caps[1]).into_iter().next()?;
    command(
        FileOperation::CreateDirectory,
        json!({ "directory": directory }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_ok(cmd: &str) -> FileCommand {
        classify(cmd).unwrap_or_else(|| panic!("expected classification for {cmd}"))
    }

    #[test]
    fn echo_redirect_is_create_with_content() {
        let got = classify_ok("echo \"hello world\" > notes.txt");
        assert_eq!(got.operation, FileOperation::Create);
        assert_eq!(got.params["filename"], "notes.txt");
        assert_eq!(got.params["content"], "hello world");
    }

    #[test]
    fn echo_append_redirect_is_append() {
        let got = classify_ok("echo more >> log.txt");
        assert_eq!(got.operation, FileOperation::Append);
        assert_eq!(got.params["content"], "more");
    }

    #[test]
    fn touch_is_create() {
        let got = classify_ok("touch a.txt");
        assert_eq!(got.operation, FileOperation::Create);
        assert_eq!(got.params["filename"], "a.txt");
    }

    #[test]
    fn head_with_flags_reads_last_operand() {
        let got = classify_ok("head -n 5 data.csv");
        assert_eq!(got.operation, FileOperation::Read);
        assert_eq!(got.params["filename"], "data.csv");
    }

    #[test]
    fn rm_records_recursive_flag() {
        let got = classify_ok("rm -rf build");
        assert_eq!(got.operation, FileOperation::Delete);
        assert_eq!(got.params["filename"], "build");
        assert_eq!(got.params["recursive"], true);
    }

    #[test]
    fn find_and_grep_are_search() {
        let find = classify_ok("find src -name '*.rs'");
        assert_eq!(find.operation, FileOperation::Search);
        assert_eq!(find.params["directory"], "src");
        assert_eq!(find.params["pattern"], "*.rs");

        let grep = classify_ok("grep -i todo main.rs");
        assert_eq!(grep.operation, FileOperation::Search);
        assert_eq!(grep.params["pattern"], "todo");
        assert_eq!(grep.params["filename"], "main.rs");
    }

    #[test]
    fn ls_defaults_to_current_directory() {
        let got = classify_ok("ls -la");
        assert_eq!(got.operation, FileOperation::List);
        assert_eq!(got.params["directory"], ".");
    }

    #[test]
    fn cp_and_mv_capture_source_and_destination() {
        let cp = classify_ok("cp a.txt b.txt");
        assert_eq!(cp.operation, FileOperation::Copy);
        assert_eq!(cp.params["source"], "a.txt");
        assert_eq!(cp.params["destination"], "b.txt");

        assert_eq!(classify_ok("mv -f a b").operation, FileOperation::Move);
    }

    #[test]
    fn classifies_first_segment_only() {
        let got = classify_ok("mkdir -p out && cd out");
        assert_eq!(got.operation, FileOperation::CreateDirectory);
        assert_eq!(got.params["directory"], "out");
    }

    #[test]
    fn unrelated_command_is_unclassified() {
        assert!(classify("cargo build --release").is_none());
    }
}
