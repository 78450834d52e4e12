//! Bare shell command extraction from prose AI responses.
//!
//! Strategies run in a fixed order and the first match wins; there is no
//! scoring across strategies. A refusal phrase short-circuits the chain.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::extract::ExtractionSource;

pub const CODE_BLOCK_CONFIDENCE: f64 = 0.9;
pub const INLINE_CODE_CONFIDENCE: f64 = 0.7;
pub const ARABIC_COMMAND_CONFIDENCE: f64 = 0.6;
pub const INDICATOR_PHRASE_CONFIDENCE: f64 = 0.5;
pub const LINE_PATTERN_CONFIDENCE: f64 = 0.3;

/// Fence labels accepted as shell code blocks (empty = unlabeled).
const SHELL_LABELS: [&str; 7] = ["", "bash", "shell", "sh", "zsh", "console", "terminal"];

/// Leading words that mark a line as a shell command.
const COMMAND_VERBS: [&str; 28] = [
    "ls", "cat", "grep", "find", "echo", "mkdir", "touch", "rm", "cp", "mv", "pwd", "cd", "head",
    "tail", "wc", "chmod", "chown", "du", "df", "ps", "kill", "git", "curl", "wget", "tar", "sed",
    "awk", "sort",
];

static REFUSAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:I cannot|I can not|I can['’]t|I am unable|I'm unable|I’m unable|I won['’]t|I will not|not possible|security risk|not allowed)",
    )
    .expect("valid refusal regex")
});
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});
static INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid inline regex"));
static INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)(?:you can run|you can use|use the command|run the command|run this command|try running|execute the command|type the command)\s*:?\s*["'“]?([^"'”\r\n]+?)["'”]?\s*$"#,
    )
    .expect("valid indicator regex")
});

/// Command located by one of the strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMatch {
    pub command: String,
    pub source: ExtractionSource,
    pub confidence: f64,
}

/// Result of the legacy extraction chain.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandExtraction {
    /// The response declines the request; carries the refusing sentence.
    Refusal(String),
    Found(CommandMatch),
    NotFound,
}

/// Run the legacy chain over `text`.
pub fn extract_command(text: &str) -> CommandExtraction {
    if let Some(message) = detect_refusal(text) {
        return CommandExtraction::Refusal(message);
    }

    let strategies: [(fn(&str) -> Option<String>, ExtractionSource, f64); 5] = [
        (
            code_block,
            ExtractionSource::CodeBlock,
            CODE_BLOCK_CONFIDENCE,
        ),
        (
            inline_code,
            ExtractionSource::InlineCode,
            INLINE_CODE_CONFIDENCE,
        ),
        (
            indicator_phrase,
            ExtractionSource::IndicatorPhrase,
            INDICATOR_PHRASE_CONFIDENCE,
        ),
        (
            arabic_command,
            ExtractionSource::ArabicCommand,
            ARABIC_COMMAND_CONFIDENCE,
        ),
        (
            line_pattern,
            ExtractionSource::LinePattern,
            LINE_PATTERN_CONFIDENCE,
        ),
    ];

    strategies
        .iter()
        .find_map(|(strategy, source, confidence)| {
            strategy(text).map(|command| CommandMatch {
                command,
                source: *source,
                confidence: *confidence,
            })
        })
        .map_or(CommandExtraction::NotFound, CommandExtraction::Found)
}

/// First line containing a refusal phrase, narrowed to the sentence around it.
fn detect_refusal(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let found = REFUSAL.find(line)?;
        let terminators = ['.', '!', '?'];
        let start = line[..found.start()]
            .rfind(terminators)
            .map_or(0, |idx| idx + 1);
        let end = line[found.end()..]
            .find(terminators)
            .map_or(line.len(), |idx| found.end() + idx + 1);
        Some(line[start..end].trim().to_string())
    })
}

fn code_block(text: &str) -> Option<String> {
    FENCE.captures_iter(text).find_map(|caps| {
        let label = caps[1].to_lowercase();
        if !SHELL_LABELS.contains(&label.as_str()) {
            return None;
        }
        let body = caps[2]
            .lines()
            .map(strip_prompt)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!body.is_empty()).then_some(body)
    })
}

fn inline_code(text: &str) -> Option<String> {
    let without_fences = FENCE.replace_all(text, "");
    INLINE
        .captures_iter(&without_fences)
        .map(|caps| caps[1].trim().to_string())
        .filter(|span| !span.is_empty())
        .fold(None, |longest: Option<String>, span| match longest {
            Some(current) if current.chars().count() >= span.chars().count() => Some(current),
            _ => Some(span),
        })
}

fn indicator_phrase(text: &str) -> Option<String> {
    INDICATOR.captures_iter(text).find_map(|caps| {
        let command = strip_trailing_period(caps[1].trim());
        (!command.is_empty()).then(|| command.to_string())
    })
}

/// Arabic verb groups mapped to the shell command they stand for.
#[derive(Clone, Copy)]
enum ArabicVerb {
    Create,
    Delete,
    Read,
    Write,
}

const ARABIC_VERBS: [(ArabicVerb, &[&str]); 4] = [
    (ArabicVerb::Create, &["أنشئ", "انشئ", "إنشاء", "انشاء"]),
    (ArabicVerb::Delete, &["احذف", "حذف", "امسح"]),
    (ArabicVerb::Read, &["اقرأ", "اقرا", "اعرض", "قراءة"]),
    (ArabicVerb::Write, &["اكتب", "كتابة"]),
];

const ARABIC_NAME_MARKERS: [&str; 2] = ["باسم", "بإسم"];
const ARABIC_FILE_MARKERS: [&str; 2] = ["ملف", "الملف"];
const ARABIC_CONTENT_MARKERS: [&str; 3] = ["بالمحتوى", "المحتوى", "محتوى"];

fn arabic_command(text: &str) -> Option<String> {
    let verb = ARABIC_VERBS
        .iter()
        .find(|(_, words)| words.iter().any(|word| text.contains(word)))
        .map(|(verb, _)| *verb)?;

    let words: Vec<&str> = text.split_whitespace().collect();
    let filename = word_after(&words, &ARABIC_NAME_MARKERS)
        .or_else(|| word_after(&words, &ARABIC_FILE_MARKERS))?;
    let content = words
        .iter()
        .position(|word| ARABIC_CONTENT_MARKERS.contains(word))
        .map(|idx| words[idx + 1..].join(" "));

    let command = match (verb, content) {
        (ArabicVerb::Create, None) => format!("touch {filename}"),
        (ArabicVerb::Create | ArabicVerb::Write, Some(content)) => {
            format!("echo \"{content}\" > {filename}")
        }
        (ArabicVerb::Write, None) => format!("echo \"\" > {filename}"),
        (ArabicVerb::Delete, _) => format!("rm {filename}"),
        (ArabicVerb::Read, _) => format!("cat {filename}"),
    };
    Some(command)
}

/// Token following the first occurrence of any marker, skipping other markers.
fn word_after(words: &[&str], markers: &[&str]) -> Option<String> {
    let idx = words.iter().position(|word| markers.contains(word))?;
    words[idx + 1..]
        .iter()
        .find(|word| !ARABIC_NAME_MARKERS.contains(*word) && !ARABIC_FILE_MARKERS.contains(*word))
        .map(|word| word.trim_end_matches(['.', '،', ',', '؟', '!']).to_string())
        .filter(|word| !word.is_empty())
}

fn line_pattern(text: &str) -> Option<String> {
    text.lines().map(strip_prompt).find_map(|line| {
        let first = line.split_whitespace().next()?;
        COMMAND_VERBS
            .contains(&first)
            .then(|| line.to_string())
    })
}

fn strip_prompt(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix("$ ").unwrap_or(line).trim()
}

/// Drop one sentence-ending period, but keep `..` intact.
fn strip_trailing_period(command: &str) -> &str {
    match command.strip_suffix('.') {
        Some(rest) if !rest.ends_with('.') => rest.trim_end(),
        _ => command,
    }
}
