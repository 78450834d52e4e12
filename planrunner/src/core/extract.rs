//! Plan extraction from AI responses.
//!
//! Converts raw model output (or an already-parsed JSON object) into a
//! [`Plan`] or a bare shell command, plus [`ExtractionMetadata`] describing
//! where the result came from and how confident the match is.
//!
//! Priority order:
//! 1. Structured input is used as-is.
//! 2. The first fenced ```json block holding a JSON object.
//! 3. The first balanced `{...}` region holding a JSON object.
//! 4. An object with a `plan` list is a plan response.
//! 5. An object with a `command` string becomes a one-step shell plan.
//! 6. Any other object is an extraction error.
//!
//! Text with no JSON object at all goes through the legacy command chain in
//! [`crate::core::command`]. Extraction never fails with `Err`; problems are
//! reported through `metadata.is_error`.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::command::{CommandExtraction, extract_command};
use crate::core::file_ops::{FileOperation, classify};
use crate::core::invariants::validate_invariants;
use crate::core::types::{DEFAULT_PLAN_CONFIDENCE, Plan, PlanStep};

/// Message reported when nothing usable was found.
pub const NO_PLAN_MESSAGE: &str = "No plan or command found in AI response.";

/// Confidence of a `{"command": ...}` response that does not state its own.
pub const LEGACY_COMMAND_CONFIDENCE: f64 = 0.8;

/// Operation used for bare shell commands.
pub const SHELL_COMMAND_OPERATION: &str = "execute_shell_command";

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)```").expect("valid json fence regex")
});

/// Where an extraction result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Object with a `plan` list.
    PlanJson,
    /// Object with a legacy `command` field.
    LegacyFallback,
    /// JSON object with neither `plan` nor `command`.
    Json,
    CodeBlock,
    InlineCode,
    IndicatorPhrase,
    ArabicCommand,
    LinePattern,
}

/// Describes how an extraction was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Strategy that produced the result; `None` when nothing matched or the response refused.
    pub source: Option<ExtractionSource>,
    pub confidence: f64,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_operation: Option<FileOperation>,
    #[serde(default)]
    pub operation_params: Map<String, Value>,
}

impl ExtractionMetadata {
    fn matched(source: ExtractionSource, confidence: f64) -> Self {
        Self {
            source: Some(source),
            confidence,
            is_error: false,
            error_message: None,
            alternatives: Vec::new(),
            file_operation: None,
            operation_params: Map::new(),
        }
    }

    fn error(source: Option<ExtractionSource>, message: impl Into<String>) -> Self {
        Self {
            source,
            confidence: 0.0,
            is_error: true,
            error_message: Some(message.into()),
            alternatives: Vec::new(),
            file_operation: None,
            operation_params: Map::new(),
        }
    }

    /// Fill `file_operation`/`operation_params` from a shell command.
    fn classify_command(&mut self, command: &str) {
        if let Some(found) = classify(command) {
            self.file_operation = Some(found.operation);
            self.operation_params = found.params;
        }
    }
}

/// Extracted payload: a full plan or a bare shell command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Extracted {
    Plan(Plan),
    Command(String),
}

impl Extracted {
    /// Normalize to a plan; a bare command becomes a one-step shell plan.
    pub fn into_plan(self, confidence: f64) -> Plan {
        match self {
            Extracted::Plan(plan) => plan,
            Extracted::Command(command) => {
                let mut plan = Plan::new(vec![shell_step(&command, confidence, None)]);
                plan.overall_confidence = confidence;
                plan
            }
        }
    }
}

/// Result of one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub success: bool,
    pub payload: Option<Extracted>,
    pub metadata: ExtractionMetadata,
}

impl Extraction {
    fn found(payload: Extracted, metadata: ExtractionMetadata) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            metadata,
        }
    }

    fn failed(metadata: ExtractionMetadata) -> Self {
        Self {
            success: false,
            payload: None,
            metadata,
        }
    }
}

/// Extractor input: raw model text or an already-parsed response.
#[derive(Debug, Clone, Copy)]
pub enum ResponseInput<'a> {
    Text(&'a str),
    Structured(&'a Value),
}

impl<'a> From<&'a str> for ResponseInput<'a> {
    fn from(text: &'a str) -> Self {
        ResponseInput::Text(text)
    }
}

impl<'a> From<&'a String> for ResponseInput<'a> {
    fn from(text: &'a String) -> Self {
        ResponseInput::Text(text)
    }
}

impl<'a> From<&'a Value> for ResponseInput<'a> {
    fn from(value: &'a Value) -> Self {
        ResponseInput::Structured(value)
    }
}

/// Extract a plan or command from an AI response.
pub fn extract<'a>(input: impl Into<ResponseInput<'a>>) -> Extraction {
    match input.into() {
        ResponseInput::Structured(Value::Object(object)) => from_object(object),
        ResponseInput::Structured(Value::String(text)) => extract_text(text),
        ResponseInput::Structured(other) => Extraction::failed(ExtractionMetadata::error(
            Some(ExtractionSource::Json),
            format!("{NO_PLAN_MESSAGE} (expected a JSON object, got {})", kind_of(other)),
        )),
        ResponseInput::Text(text) => extract_text(text),
    }
}

fn extract_text(text: &str) -> Extraction {
    if let Some(object) = find_json_object(text) {
        debug!(keys = ?object.keys().collect::<Vec<_>>(), "found json object in response");
        return from_object(&object);
    }
    from_prose(text)
}

fn from_object(object: &Map<String, Value>) -> Extraction {
    if let Some(Value::Array(steps)) = object.get("plan") {
        return match parse_plan(object, steps) {
            Ok(plan) => {
                let mut metadata =
                    ExtractionMetadata::matched(ExtractionSource::PlanJson, plan.overall_confidence);
                metadata.alternatives = plan.alternatives.clone();
                Extraction::found(Extracted::Plan(plan), metadata)
            }
            Err(err) => Extraction::failed(ExtractionMetadata::error(
                Some(ExtractionSource::PlanJson),
                format!("invalid plan: {err:#}"),
            )),
        };
    }

    if let Some(command) = object
        .get("command")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|command| !command.is_empty())
    {
        let confidence = object
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(LEGACY_COMMAND_CONFIDENCE);
        let explanation = object
            .get("explanation")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut plan = Plan::new(vec![shell_step(command, confidence, explanation)]);
        plan.overall_confidence = confidence;
        plan.alternatives = alternatives_of(object);

        let mut metadata =
            ExtractionMetadata::matched(ExtractionSource::LegacyFallback, confidence);
        metadata.alternatives = plan.alternatives.clone();
        metadata.classify_command(command);
        return Extraction::found(Extracted::Plan(plan), metadata);
    }

    Extraction::failed(ExtractionMetadata::error(
        Some(ExtractionSource::Json),
        NO_PLAN_MESSAGE,
    ))
}

fn from_prose(text: &str) -> Extraction {
    match extract_command(text) {
        CommandExtraction::Refusal(message) => {
            debug!(%message, "response refused the request");
            Extraction::failed(ExtractionMetadata::error(None, message))
        }
        CommandExtraction::Found(found) => {
            let mut metadata = ExtractionMetadata::matched(found.source, found.confidence);
            metadata.classify_command(&found.command);
            Extraction::found(Extracted::Command(found.command), metadata)
        }
        CommandExtraction::NotFound => {
            Extraction::failed(ExtractionMetadata::error(None, NO_PLAN_MESSAGE))
        }
    }
}

/// Build a plan from a `{"plan": [...], ...}` object, enforcing plan invariants.
pub fn plan_from_object(object: &Map<String, Value>) -> Result<Plan> {
    let steps = object
        .get("plan")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing `plan` array"))?;
    parse_plan(object, steps)
}

fn parse_plan(object: &Map<String, Value>, raw_steps: &[Value]) -> Result<Plan> {
    let steps = raw_steps
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_step(index, raw))
        .collect::<Result<Vec<_>>>()?;

    let plan = Plan {
        steps,
        overall_confidence: object
            .get("overall_confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_PLAN_CONFIDENCE),
        alternatives: alternatives_of(object),
        language: object
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let errors = validate_invariants(&plan);
    if !errors.is_empty() {
        return Err(anyhow!("{}", errors.join("; ")));
    }
    Ok(plan)
}

/// Parse one step, numbering it by position when `step` is missing.
fn parse_step(index: usize, raw: &Value) -> Result<PlanStep> {
    let Value::Object(fields) = raw else {
        return Err(anyhow!("plan[{index}] must be an object"));
    };
    let mut fields = fields.clone();
    if fields.get("step").is_none_or(Value::is_null) {
        fields.insert("step".to_string(), json!(index + 1));
    }
    serde_json::from_value(Value::Object(fields)).with_context(|| format!("plan[{index}]"))
}

fn shell_step(command: &str, confidence: f64, explanation: Option<String>) -> PlanStep {
    let mut parameters = Map::new();
    parameters.insert("command".to_string(), Value::String(command.to_string()));
    let mut step = PlanStep::new(1, SHELL_COMMAND_OPERATION, parameters);
    step.description = "Execute shell command".to_string();
    step.confidence = confidence;
    step.explanation = explanation;
    step
}

fn alternatives_of(object: &Map<String, Value>) -> Vec<Value> {
    object
        .get("alternatives")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First JSON object in `text`: fenced ```json blocks first, then balanced braces.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    let fenced = JSON_FENCE
        .captures_iter(text)
        .find_map(|caps| parse_object(caps[1].trim()));
    if fenced.is_some() {
        return fenced;
    }
    first_balanced_object(text)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Try every `{` in order as the start of a balanced object.
///
/// One scan resolves the closing offset of every brace it opens outside a
/// string, so a start is only scanned again when an earlier scan saw it
/// inside a string literal.
fn first_balanced_object(text: &str) -> Option<Map<String, Value>> {
    // start offset -> end offset, `None` when the brace never closes
    let mut ends: HashMap<usize, Option<usize>> = HashMap::new();
    for (start, _) in text.match_indices('{') {
        if !ends.contains_key(&start) {
            scan_braces(text.as_bytes(), start, &mut ends);
        }
        if let Some(&Some(end)) = ends.get(&start) {
            if let Some(map) = parse_object(&text[start..end]) {
                return Some(map);
            }
        }
    }
    None
}

/// Match braces from the `{` at `start` until it closes or the text ends.
///
/// Braces inside JSON strings (including escaped quotes) are ignored.
fn scan_braces(bytes: &[u8], start: usize, ends: &mut HashMap<usize, Option<usize>>) {
    let mut open: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => open.push(offset),
            b'}' => {
                if let Some(opened) = open.pop() {
                    ends.insert(opened, Some(offset + 1));
                }
                if open.is_empty() {
                    return;
                }
            }
            _ => {}
        }
    }
    for opened in open {
        ends.insert(opened, None);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn plan_of(extraction: &Extraction) -> &Plan {
        match &extraction.payload {
            Some(Extracted::Plan(plan)) => plan,
            other => panic!("expected plan payload, got {other:?}"),
        }
    }

    #[test]
    fn plan_response_in_json_fence() {
        let text = r#"Here is the plan:
```json
{"plan": [{"step": 1, "operation": "file.create", "parameters": {"filename": "a.txt"}}],
 "overall_confidence": 0.8, "language": "en"}
```"#;
        let extraction = extract(text);

        assert!(extraction.success);
        assert_eq!(extraction.metadata.source, Some(ExtractionSource::PlanJson));
        assert_eq!(extraction.metadata.confidence, 0.8);
        let plan = plan_of(&extraction);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.language, "en");
    }

    #[test]
    fn plan_confidence_defaults() {
        let extraction = extract(r#"{"plan": [{"operation": "directory.list"}]}"#);
        assert!(extraction.success);
        assert_eq!(extraction.metadata.confidence, DEFAULT_PLAN_CONFIDENCE);
        assert_eq!(plan_of(&extraction).steps[0].step, 1);
    }

    #[test]
    fn plan_found_by_brace_scan_inside_prose() {
        let text = "Sure! {not json} The plan is {\"plan\": [{\"step\": 1, \"operation\": \"shell.execute\", \"parameters\": {\"command\": \"echo }\"}}]} hope it helps";
        let extraction = extract(text);
        assert!(extraction.success);
        assert_eq!(
            plan_of(&extraction).steps[0].parameters["command"],
            "echo }"
        );
    }

    #[test]
    fn plan_path_skips_legacy_strategies() {
        let text = "I cannot promise this works.\n{\"plan\": [{\"step\": 1, \"operation\": \"file.read\"}]}";
        let extraction = extract(text);
        assert!(extraction.success);
        assert_eq!(extraction.metadata.source, Some(ExtractionSource::PlanJson));
    }

    #[test]
    fn duplicate_step_numbers_are_an_extraction_error() {
        let extraction = extract(
            r#"{"plan": [{"step": 1, "operation": "file.read"}, {"step": 1, "operation": "file.delete"}]}"#,
        );
        assert!(!extraction.success);
        assert!(extraction.metadata.is_error);
        let message = extraction.metadata.error_message.expect("message");
        assert!(message.contains("duplicate step number 1"));
    }

    #[test]
    fn step_without_operation_is_an_extraction_error() {
        let extraction = extract(r#"{"plan": [{"step": 1, "description": "x"}]}"#);
        assert!(!extraction.success);
        let message = extraction.metadata.error_message.expect("message");
        assert!(message.contains("plan[0]"));
    }

    #[test]
    fn legacy_command_object_becomes_one_step_plan() {
        let extraction = extract(r#"{"command": "touch notes.txt", "explanation": "creates it"}"#);
        assert!(extraction.success);
        assert_eq!(
            extraction.metadata.source,
            Some(ExtractionSource::LegacyFallback)
        );
        assert_eq!(extraction.metadata.confidence, LEGACY_COMMAND_CONFIDENCE);
        assert_eq!(
            extraction.metadata.file_operation,
            Some(FileOperation::Create)
        );
        let plan = plan_of(&extraction);
        assert_eq!(plan.steps[0].operation, SHELL_COMMAND_OPERATION);
        assert_eq!(plan.steps[0].explanation.as_deref(), Some("creates it"));
    }

    #[test]
    fn object_without_plan_or_command_fails() {
        let extraction = extract(r#"{"answer": 42}"#);
        assert!(!extraction.success);
        assert!(extraction.payload.is_none());
        assert_eq!(extraction.metadata.source, Some(ExtractionSource::Json));
        assert_eq!(
            extraction.metadata.error_message.as_deref(),
            Some(NO_PLAN_MESSAGE)
        );
    }

    #[test]
    fn structured_input_is_used_directly() {
        let value = json!({"plan": [{"step": 2, "operation": "file.read"}]});
        let extraction = extract(&value);
        assert!(extraction.success);
        assert_eq!(plan_of(&extraction).steps[0].step, 2);
    }

    #[test]
    fn inline_code_scenario() {
        let extraction = extract("`ls -la`");
        assert!(extraction.success);
        assert_eq!(
            extraction.payload,
            Some(Extracted::Command("ls -la".to_string()))
        );
        assert_eq!(
            extraction.metadata.source,
            Some(ExtractionSource::InlineCode)
        );
        assert_eq!(extraction.metadata.confidence, 0.7);
        assert_eq!(extraction.metadata.file_operation, Some(FileOperation::List));
    }

    #[test]
    fn refusal_is_reported_as_error() {
        let extraction = extract("I cannot run that, it is a security risk.\n`rm -rf /`");
        assert!(!extraction.success);
        assert!(extraction.metadata.is_error);
        assert!(extraction.metadata.source.is_none());
        assert_eq!(
            extraction.metadata.error_message.as_deref(),
            Some("I cannot run that, it is a security risk.")
        );
    }

    #[test]
    fn prose_without_anything_fails_with_fixed_message() {
        let extraction = extract("Nothing to see here.");
        assert!(!extraction.success);
        assert_eq!(
            extraction.metadata.error_message.as_deref(),
            Some(NO_PLAN_MESSAGE)
        );
    }

    #[test]
    fn command_payload_converts_to_shell_plan() {
        let plan = Extracted::Command("pwd".to_string()).into_plan(0.3);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].parameters["command"], "pwd");
        assert_eq!(plan.overall_confidence, 0.3);
    }

    #[test]
    fn brace_scan_ignores_braces_in_strings() {
        let text = r#"{"a": "}{", "b": {"c": "\"}"}} tail"#;
        let mut ends = HashMap::new();
        scan_braces(text.as_bytes(), 0, &mut ends);
        let end = ends[&0].expect("balanced");
        assert_eq!(&text[end..], " tail");
        assert_eq!(&text[ends[&17].expect("nested")..end], "}");
    }

    #[test]
    fn stray_open_brace_before_object_is_skipped() {
        let text = r#"Use { carefully: {"command": "ls -la"}"#;
        let object = find_json_object(text).expect("object");
        assert_eq!(object["command"], "ls -la");
    }

    #[test]
    fn unbalanced_braces_scan_in_linear_time() {
        let text = "{".repeat(200_000);
        let started = Instant::now();
        let extraction = extract(&text);
        assert!(!extraction.success);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "took {:?}",
            started.elapsed()
        );
    }
}
