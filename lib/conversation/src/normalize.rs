//! Conversation normalization.
//!
//! Structured parts that the model cannot consume are rewritten into plain
//! text before a conversation is submitted. Normalization keeps the message
//! count and part order intact and is idempotent: a rewritten part is a
//! `text` part and is never recognized as a structured part again.

use crate::message::{Conversation, ErrorReport, Message, Part};

const ERROR_REPORT_PREAMBLE: &str =
    "There are errors in the generated code. This is the summary of the errors we have:\n";
const ERROR_REPORT_PATHS_PREAMBLE: &str = "The following files may contain errors:\n";
const ERROR_REPORT_INSTRUCTION: &str = "Fix the errors reported.";

/// Normalizes every message of a conversation.
#[must_use]
pub fn normalize(conversation: &[Message]) -> Conversation {
    conversation.iter().map(normalize_message).collect()
}

/// Normalizes a single message, preserving part order.
#[must_use]
pub fn normalize_message(message: &Message) -> Message {
    Message {
        parts: message.parts.iter().map(normalize_part).collect(),
        ..message.clone()
    }
}

fn normalize_part(part: &Part) -> Part {
    match part {
        Part::ReportErrors { data } => Part::text(render_error_report(data)),
        other => other.clone(),
    }
}

/// Renders an error report as model instructions.
///
/// The path block is omitted entirely when the report names no files.
#[must_use]
pub fn render_error_report(report: &ErrorReport) -> String {
    let mut text = String::from(ERROR_REPORT_PREAMBLE);
    text.push_str(&format!("```{}```\n", report.summary));
    if !report.paths.is_empty() {
        text.push_str(ERROR_REPORT_PATHS_PREAMBLE);
        text.push_str(&format!("```{}```\n", report.paths.join("\n")));
    }
    text.push_str(ERROR_REPORT_INSTRUCTION);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;
    use serde_json::json;

    fn report(summary: &str, paths: &[&str]) -> Part {
        Part::ReportErrors {
            data: ErrorReport {
                summary: summary.to_string(),
                paths: paths.iter().map(ToString::to_string).collect(),
            },
        }
    }

    fn sample_conversation() -> Conversation {
        vec![
            Message::system("be terse"),
            Message::new(MessageRole::User, "u1")
                .with_part(Part::text("build a todo app"))
                .with_part(report("TS2304: Cannot find name 'x'", &["src/app.ts", "src/lib.ts"])),
            Message::new(MessageRole::Assistant, "a1")
                .with_part(Part::Reasoning {
                    text: "look at app.ts".to_string(),
                })
                .with_part(Part::ToolCall {
                    tool_call_id: "c1".to_string(),
                    tool_name: "read_file".to_string(),
                    input: json!({"path": "src/app.ts"}),
                }),
            Message::new(MessageRole::User, "u2").with_part(report("lint failed", &[])),
        ]
    }

    #[test]
    fn report_with_paths_renders_summary_then_paths() {
        let text = render_error_report(&ErrorReport {
            summary: "boom".to_string(),
            paths: vec!["a.ts".to_string(), "b.ts".to_string()],
        });
        assert_eq!(
            text,
            "There are errors in the generated code. This is the summary of the errors we have:\n\
             ```boom```\n\
             The following files may contain errors:\n\
             ```a.ts\nb.ts```\n\
             Fix the errors reported."
        );
        let summary_at = text.find("```boom```").expect("summary block");
        let paths_at = text.find("```a.ts").expect("paths block");
        assert!(summary_at < paths_at);
    }

    #[test]
    fn report_without_paths_omits_path_block() {
        let text = render_error_report(&ErrorReport {
            summary: "boom".to_string(),
            paths: Vec::new(),
        });
        assert!(!text.contains("The following files may contain errors"));
        assert!(text.ends_with("```boom```\nFix the errors reported."));
    }

    #[test]
    fn normalize_rewrites_only_error_reports() {
        let original = sample_conversation();
        let normalized = normalize(&original);

        assert_eq!(normalized.len(), original.len());
        assert!(
            normalized
                .iter()
                .flat_map(|m| &m.parts)
                .all(Part::is_model_consumable)
        );
        assert_eq!(normalized[0], original[0]);
        assert_eq!(normalized[2], original[2]);
        assert_eq!(normalized[1].parts[0], original[1].parts[0]);
        match &normalized[1].parts[1] {
            Part::Text { text } => assert!(text.contains("src/app.ts\nsrc/lib.ts")),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(&sample_conversation());
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn unrecognized_parts_pass_through_unchanged() {
        let conversation = vec![
            Message::new(MessageRole::Assistant, "a1")
                .with_part(Part::Other(json!({ "type": "step-start" })))
                .with_part(Part::text("Hello!"))
                .with_part(Part::Other(json!({
                    "type": "tool-get_cloud_resources",
                    "toolCallId": "c1",
                    "state": "output-available",
                    "input": {},
                    "output": { "buckets": 0 }
                }))),
            Message::new(MessageRole::User, "u1")
                .with_part(Part::Other(json!({ "type": "data-usage", "data": { "tokens": 12 } })))
                .with_part(report("boom", &[])),
        ];
        let normalized = normalize(&conversation);
        assert_eq!(normalized[0], conversation[0]);
        assert_eq!(normalized[1].parts[0], conversation[1].parts[0]);
        assert!(matches!(normalized[1].parts[1], Part::Text { .. }));
        assert_eq!(normalize(&normalized), normalized);
    }

    #[test]
    fn normalize_preserves_ids_and_roles() {
        let normalized = normalize(&sample_conversation());
        let ids: Vec<_> = normalized.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["", "u1", "a1", "u2"]);
        assert_eq!(normalized[3].role, MessageRole::User);
    }
}
