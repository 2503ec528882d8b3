use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::query_task::{ExecutionError, QueryTask, TaskOutcome};
use crate::results_buffer::ResultsBuffer;
use crate::statement_reader::StatementReader;
use crate::value::{Document, StructuredValue};

pub const DEFAULT_ROW_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueryRunnerError {
    #[error("the database has not been opened")]
    NotConnected,
}

#[async_trait]
pub trait ValueCursor: Send {
    async fn next_value(&mut self) -> Result<Option<StructuredValue>, ExecutionError>;
}

#[async_trait]
pub trait DocumentEngine: Send + Sync {
    type Cursor: ValueCursor + Send;

    fn is_open(&self) -> bool;

    async fn execute_next(
        &self,
        reader: &mut StatementReader,
        parameters: &mut Document,
    ) -> Result<Self::Cursor, ExecutionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCommand {
    Begin,
    Commit,
    Rollback,
    Checkpoint,
}

impl TransactionCommand {
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::Checkpoint => "CHECKPOINT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub statements: usize,
    pub rows: usize,
    pub truncated: bool,
    pub failed: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct BatchResult {
    statements: usize,
    values: Vec<StructuredValue>,
    truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRunner {
    row_limit: usize,
}

impl QueryRunner {
    #[must_use]
    pub fn new(row_limit: usize) -> Self {
        Self { row_limit }
    }

    #[must_use]
    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    /// Engine failures are captured into the task; the only error returned is
    /// `NotConnected`, raised before the task is touched.
    #[tracing::instrument(
        skip_all,
        fields(
            task_id = task.id().get(),
            sql_preview = %editor_text.chars().take(100).collect::<String>()
        )
    )]
    pub async fn execute<E: DocumentEngine>(
        &self,
        engine: Option<&E>,
        task: &mut QueryTask,
        editor_text: &str,
    ) -> Result<ExecutionSummary, QueryRunnerError> {
        let Some(engine) = engine.filter(|engine| engine.is_open()) else {
            warn!("execution requested without an open database");
            return Err(QueryRunnerError::NotConnected);
        };

        task.begin_execution(editor_text);
        let sql = task.source_text().to_string();
        let started_at = Instant::now();
        let batch = self.run_batch(engine, &sql, task.parameters_mut()).await;
        let elapsed = started_at.elapsed();

        let summary = match batch {
            Ok(batch) => {
                info!(
                    statements = batch.statements,
                    rows = batch.values.len(),
                    truncated = batch.truncated,
                    elapsed_ms = elapsed.as_millis(),
                    "query batch finished"
                );
                let summary = ExecutionSummary {
                    statements: batch.statements,
                    rows: batch.values.len(),
                    truncated: batch.truncated,
                    failed: false,
                    elapsed,
                };
                task.finish_execution(
                    TaskOutcome::Success {
                        values: batch.values,
                        truncated: batch.truncated,
                    },
                    elapsed,
                );
                summary
            }
            Err(error) => {
                warn!(%error, syntax = error.is_syntax_error(), "query batch failed");
                task.finish_execution(TaskOutcome::Failure(error), elapsed);
                ExecutionSummary {
                    statements: 0,
                    rows: 0,
                    truncated: false,
                    failed: true,
                    elapsed,
                }
            }
        };

        Ok(summary)
    }

    async fn run_batch<E: DocumentEngine>(
        &self,
        engine: &E,
        sql: &str,
        parameters: &mut Document,
    ) -> Result<BatchResult, ExecutionError> {
        let mut reader = StatementReader::new(sql);
        let mut batch = BatchResult::default();

        while !reader.is_exhausted() && engine.is_open() {
            let statement_start = reader.position();
            let mut cursor = engine.execute_next(&mut reader, parameters).await?;
            if reader.position() == statement_start {
                return Err(ExecutionError::runtime(format!(
                    "engine did not consume input at position {}",
                    statement_start + 1
                )));
            }

            let (values, truncated) = self.drain(&mut cursor).await?;
            batch.statements += 1;
            debug!(
                statement = batch.statements,
                rows = values.len(),
                truncated,
                "statement finished"
            );
            batch.values = values;
            batch.truncated = truncated;
        }

        Ok(batch)
    }

    async fn drain<C: ValueCursor>(
        &self,
        cursor: &mut C,
    ) -> Result<(Vec<StructuredValue>, bool), ExecutionError> {
        let mut buffer = ResultsBuffer::new(self.row_limit);
        while let Some(value) = cursor.next_value().await? {
            if !buffer.push(value) {
                break;
            }
        }
        Ok(buffer.into_parts())
    }
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_LIMIT)
    }
}
