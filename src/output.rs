//! Output formatting.
//!
//! Commands emit either human-readable text or a machine-readable JSON
//! envelope on stdout. In JSON mode every command, successful or not, prints
//! exactly one `{success, command, data?, error?}` object; progress bars and
//! text chatter are suppressed so stdout stays parseable.

use serde::Serialize;

/// How command results are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text (default).
    #[default]
    Text,
    /// JSON envelope for programmatic consumption.
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Envelope wrapping every command result in JSON mode.
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Prints a success envelope in JSON mode; no-op in text mode (callers
/// render their own text).
pub fn emit_result<T: Serialize>(format: OutputFormat, command: &str, data: T) {
    if format.is_json() {
        let envelope = CommandResult {
            success: true,
            command: command.to_string(),
            data: Some(data),
            error: None,
        };
        print_json(&envelope);
    }
}

/// Prints a failure envelope in JSON mode, or a single error line on stderr
/// in text mode.
pub fn emit_error(format: OutputFormat, command: &str, error: &crate::error::Error) {
    if format.is_json() {
        let envelope: CommandResult<()> = CommandResult {
            success: false,
            command: command.to_string(),
            data: None,
            error: Some(error.to_string()),
        };
        print_json(&envelope);
    } else {
        eprintln!("Error: {error}");
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = CommandResult {
            success: true,
            command: "push".to_string(),
            data: Some(serde_json::json!({"s3_key": "images/a"})),
            error: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["command"], "push");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_omits_data() {
        let envelope: CommandResult<()> = CommandResult {
            success: false,
            command: "pull".to_string(),
            data: None,
            error: Some("boom".to_string()),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}
