use std::time::Duration;

use crate::error_context::ErrorContext;
use crate::grid_view::GridView;
use crate::query_task::{QueryTask, TaskOutcome};
use crate::text_view::render_outcome;
use crate::value::{Document, StructuredValue};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSummary {
    pub count_text: String,
    pub elapsed_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub grid: GridView,
    pub text: String,
    pub error: Option<ErrorContext>,
    pub parameters: String,
    pub summary: ResultSummary,
}

#[must_use]
pub fn project(task: &QueryTask) -> Projection {
    let outcome = task.outcome();
    Projection {
        grid: GridView::from_outcome(outcome),
        text: render_outcome(outcome, task.source_text()),
        error: task
            .error()
            .map(|error| ErrorContext::from_error(error, task.source_text())),
        parameters: parameters_text(task.parameters()),
        summary: ResultSummary {
            count_text: result_count_text(outcome),
            elapsed_text: elapsed_text(task.elapsed()),
        },
    }
}

#[must_use]
pub fn result_count_text(outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::NotRun | TaskOutcome::Failure(_) => String::new(),
        TaskOutcome::Success { values, truncated } => match values.len() {
            0 => "no documents".to_string(),
            1 => "1 document".to_string(),
            count => format!("{count}{} documents", if *truncated { "+" } else { "" }),
        },
    }
}

/// `hh:mm:ss.fffffff`, seven fractional digits of 100ns ticks.
#[must_use]
pub fn elapsed_text(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    let ticks = elapsed.subsec_nanos() / 100;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ticks:07}")
}

#[must_use]
pub fn parameters_text(parameters: &Document) -> String {
    StructuredValue::Document(parameters.clone())
        .to_pretty_json()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::{elapsed_text, project, result_count_text};
    use crate::grid_view::ERROR_COLUMN;
    use crate::query_task::{ExecutionError, QueryTask, TaskOutcome};
    use crate::text_view::LIMIT_EXCEEDED_MARKER;
    use crate::value::StructuredValue;

    fn completed(source: &str, outcome: TaskOutcome) -> QueryTask {
        let mut task = QueryTask::with_source("test", "");
        task.begin_execution(source);
        task.finish_execution(outcome, Duration::from_millis(12));
        task
    }

    #[test]
    fn truncated_results_mark_text_and_count() {
        let task = completed(
            "SELECT $ FROM numbers",
            TaskOutcome::Success {
                values: vec![StructuredValue::Int32(1), StructuredValue::Int32(2)],
                truncated: true,
            },
        );

        let projection = project(&task);
        assert!(projection
            .text
            .trim_end()
            .ends_with(LIMIT_EXCEEDED_MARKER));
        assert_eq!(projection.summary.count_text, "2+ documents");
        assert_eq!(projection.error, None);
        assert_eq!(projection.parameters, "{}");
    }

    #[test]
    fn failure_grid_and_text_share_message() {
        let error = ExecutionError::syntax("Unexpected token `FORM` in position 10.", 10);
        let task = completed("SELECT $ FORM users", TaskOutcome::Failure(error));

        let projection = project(&task);
        let grid_message = projection.grid.cell_text(0, ERROR_COLUMN);
        let context = projection.error.expect("failure has an error view");

        assert_eq!(grid_message, context.message);
        assert!(projection.text.starts_with(&grid_message));
        assert_eq!(context.excerpt.as_deref(), Some("SELECT $ FORM users"));
        assert_eq!(context.caret_line.as_deref(), Some("---------^"));
        assert_eq!(projection.summary.count_text, "");
    }

    #[test]
    fn count_text_covers_singular_and_plural() {
        let success = |count: usize, truncated: bool| TaskOutcome::Success {
            values: vec![StructuredValue::Null; count],
            truncated,
        };
        assert_eq!(result_count_text(&TaskOutcome::NotRun), "");
        assert_eq!(result_count_text(&success(0, false)), "no documents");
        assert_eq!(result_count_text(&success(1, false)), "1 document");
        assert_eq!(result_count_text(&success(3, false)), "3 documents");
        assert_eq!(result_count_text(&success(1000, true)), "1000+ documents");
    }

    #[test]
    fn elapsed_text_uses_tick_precision() {
        assert_eq!(
            elapsed_text(Duration::from_micros(3_723_004_567)),
            "01:02:03.0045670"
        );
        assert_eq!(elapsed_text(Duration::ZERO), "00:00:00.0000000");
    }
}
