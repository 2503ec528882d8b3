use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::value::{Document, StructuredValue};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Parse failure; `position` is a 1-based character offset into the statement text.
    #[error("{message}")]
    Syntax { message: String, position: usize },
    #[error("{message}")]
    Runtime { message: String },
}

impl ExecutionError {
    #[must_use]
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    #[must_use]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { message, .. } | Self::Runtime { message } => message,
        }
    }

    #[must_use]
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }

    #[must_use]
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. } => Some(*position),
            Self::Runtime { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskOutcome {
    #[default]
    NotRun,
    Success {
        values: Vec<StructuredValue>,
        truncated: bool,
    },
    Failure(ExecutionError),
}

#[derive(Debug, Clone)]
pub struct QueryTask {
    id: TaskId,
    title: String,
    source_text: String,
    parameters: Document,
    outcome: TaskOutcome,
    elapsed: Duration,
    executing: bool,
}

impl QueryTask {
    #[must_use]
    pub fn new() -> Self {
        let id = TaskId::next();
        Self {
            id,
            title: format!("Query {}", id.get()),
            source_text: String::new(),
            parameters: Document::new(),
            outcome: TaskOutcome::NotRun,
            elapsed: Duration::ZERO,
            executing: false,
        }
    }

    #[must_use]
    pub fn with_source(title: impl Into<String>, source_text: impl Into<String>) -> Self {
        let mut task = Self::new();
        task.title = title.into();
        task.source_text = source_text.into();
        task
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn set_source_text(&mut self, text: impl Into<String>) -> bool {
        if self.executing {
            return false;
        }
        self.source_text = text.into();
        true
    }

    #[must_use]
    pub fn parameters(&self) -> &Document {
        &self.parameters
    }

    #[must_use]
    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.executing
    }

    #[must_use]
    pub fn error(&self) -> Option<&ExecutionError> {
        match &self.outcome {
            TaskOutcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    pub(crate) fn begin_execution(&mut self, editor_text: &str) {
        if !self.executing {
            self.source_text = editor_text.trim().to_string();
        }
        self.executing = true;
        self.parameters = Document::new();
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut Document {
        &mut self.parameters
    }

    pub(crate) fn finish_execution(&mut self, outcome: TaskOutcome, elapsed: Duration) {
        self.outcome = outcome;
        self.elapsed = elapsed;
        self.executing = false;
    }
}

impl Default for QueryTask {
    fn default() -> Self {
        Self::new()
    }
}
