use crate::error_context::ErrorContext;
use crate::query_task::TaskOutcome;
use crate::value::StructuredValue;

pub const NO_RESULT_TEXT: &str = "no result";
pub const LIMIT_EXCEEDED_MARKER: &str = "/* Limit exceeded */";

#[must_use]
pub fn render_outcome(outcome: &TaskOutcome, source_text: &str) -> String {
    match outcome {
        TaskOutcome::NotRun => String::new(),
        TaskOutcome::Success { values, truncated } => render_values(values, *truncated),
        TaskOutcome::Failure(error) => ErrorContext::from_error(error, source_text).render(),
    }
}

#[must_use]
pub fn render_values(values: &[StructuredValue], truncated: bool) -> String {
    let mut text = String::new();
    if values.is_empty() {
        text.push_str(NO_RESULT_TEXT);
        text.push('\n');
        return text;
    }

    let numbered = values.len() > 1;
    for (index, value) in values.iter().enumerate() {
        if numbered {
            text.push_str(&format!("/* {} */\n", index + 1));
        }
        let rendered = value
            .to_pretty_json()
            .unwrap_or_else(|error| format!("/* unprintable {}: {error} */", value.type_name()));
        text.push_str(&rendered);
        text.push('\n');
    }

    if truncated {
        text.push('\n');
        text.push_str(LIMIT_EXCEEDED_MARKER);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{render_outcome, render_values};
    use crate::query_task::{ExecutionError, TaskOutcome};
    use crate::value::StructuredValue;

    #[test]
    fn single_value_has_no_ordinal() {
        let value = StructuredValue::from(json!({"_id": 1, "name": "ana"}));
        assert_eq!(
            render_values(&[value], false),
            "{\n  \"_id\": 1,\n  \"name\": \"ana\"\n}\n"
        );
    }

    #[test]
    fn multiple_values_are_numbered_and_truncation_is_marked() {
        let values = vec![StructuredValue::Int32(1), StructuredValue::from("two")];
        assert_eq!(
            render_values(&values, true),
            "/* 1 */\n1\n/* 2 */\n\"two\"\n\n/* Limit exceeded */\n"
        );
    }

    #[test]
    fn zero_values_render_no_result() {
        assert_eq!(render_values(&[], false), "no result\n");
    }

    #[test]
    fn failure_text_matches_grid_message() {
        let error = ExecutionError::syntax("Unexpected token `X` in position 8.", 8);
        let text = render_outcome(&TaskOutcome::Failure(error.clone()), "SELECT $X");
        assert!(text.starts_with(error.message()));
        assert!(text.ends_with("-------^\n"));
    }

    #[test]
    fn not_run_renders_nothing() {
        assert_eq!(render_outcome(&TaskOutcome::NotRun, "SELECT 1"), "");
    }
}
