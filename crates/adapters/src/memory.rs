use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use doclens_core::connection_manager::{
    BackendError, ConnectionBackend, ConnectionMode, ConnectionOptions,
};
use doclens_core::console_templates::is_valid_collection_name;
use doclens_core::query_runner::{DocumentEngine, ValueCursor};
use doclens_core::query_task::ExecutionError;
use doclens_core::statement_reader::StatementReader;
use doclens_core::value::{Document, StructuredValue};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

const READ_ONLY_MESSAGE: &str = "This database is opened in read-only mode";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("failed to read database file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse database file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("database file at {path} is not a document database")]
    Layout { path: PathBuf },
    #[error("failed to serialize database: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write database file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<StorageError> for BackendError {
    fn from(error: StorageError) -> Self {
        Self::new(error.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Collection {
    documents: Vec<Document>,
    next_id: i64,
}

impl Collection {
    fn from_documents(documents: Vec<Document>) -> Self {
        let next_id = documents
            .iter()
            .filter_map(|document| match document.get("_id") {
                Some(StructuredValue::Int32(id)) => Some(i64::from(*id)),
                Some(StructuredValue::Int64(id)) => Some(*id),
                _ => None,
            })
            .max()
            .map_or(1, |max| max.saturating_add(1));
        Self { documents, next_id }
    }

    fn insert(&mut self, mut document: Document) -> Result<(), ExecutionError> {
        match document.get("_id") {
            Some(id) => {
                if self
                    .documents
                    .iter()
                    .any(|existing| existing.get("_id") == Some(id))
                {
                    return Err(ExecutionError::runtime(format!(
                        "Cannot insert duplicate key in unique index '_id'. The duplicate value is '{id}'."
                    )));
                }
                let explicit = match id {
                    StructuredValue::Int32(value) => Some(i64::from(*value)),
                    StructuredValue::Int64(value) => Some(*value),
                    _ => None,
                };
                if let Some(explicit) = explicit {
                    self.next_id = self.next_id.max(explicit.saturating_add(1));
                }
            }
            None => {
                let id = i32::try_from(self.next_id)
                    .map_or(StructuredValue::Int64(self.next_id), StructuredValue::Int32);
                self.next_id = self.next_id.saturating_add(1);
                document.shift_insert(0, "_id".to_string(), id);
            }
        }
        self.documents.push(document);
        Ok(())
    }
}

type Collections = BTreeMap<String, Collection>;

#[derive(Debug, Default)]
struct DatabaseState {
    collections: Collections,
    /// Committed state saved by `BEGIN`, restored by `ROLLBACK`.
    snapshot: Option<Collections>,
}

impl DatabaseState {
    fn committed(&self) -> &Collections {
        self.snapshot.as_ref().unwrap_or(&self.collections)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend;

#[async_trait]
impl ConnectionBackend for MemoryBackend {
    type Connection = MemoryDatabase;

    async fn open(&self, options: &ConnectionOptions) -> Result<Self::Connection, BackendError> {
        Ok(MemoryDatabase::open(options)?)
    }

    async fn close(&self, connection: &Self::Connection) -> Result<(), BackendError> {
        Ok(connection.close()?)
    }
}

#[derive(Debug)]
pub struct MemoryDatabase {
    options: ConnectionOptions,
    file: Option<PathBuf>,
    open: AtomicBool,
    state: Mutex<DatabaseState>,
}

impl MemoryDatabase {
    pub fn open(options: &ConnectionOptions) -> Result<Self, StorageError> {
        let file = (!options.is_in_memory()).then(|| PathBuf::from(&options.path));
        let collections = match &file {
            Some(path) if path.exists() => load_collections(path)?,
            Some(path) if options.read_only => {
                return Err(StorageError::Missing { path: path.clone() })
            }
            _ => Collections::new(),
        };

        info!(
            path = %options.path,
            collections = collections.len(),
            "document store loaded"
        );
        Ok(Self {
            options: options.clone(),
            file,
            open: AtomicBool::new(true),
            state: Mutex::new(DatabaseState {
                collections,
                snapshot: None,
            }),
        })
    }

    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn close(&self) -> Result<(), StorageError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(committed) = state.snapshot.take() {
            state.collections = committed;
        }
        self.flush(&state.collections)
    }

    fn flush(&self, collections: &Collections) -> Result<(), StorageError> {
        match &self.file {
            Some(path) if !self.options.read_only => save_collections(path, collections),
            _ => Ok(()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DatabaseState>, ExecutionError> {
        self.state
            .lock()
            .map_err(|_| ExecutionError::runtime("database state is unavailable"))
    }

    fn ensure_writable(&self) -> Result<(), ExecutionError> {
        if self.options.read_only {
            Err(ExecutionError::runtime(READ_ONLY_MESSAGE))
        } else {
            Ok(())
        }
    }

    fn run_statement(
        &self,
        reader: &mut StatementReader,
    ) -> Result<Vec<StructuredValue>, ExecutionError> {
        let mut parser = Parser { reader };
        parser.skip_separators();
        if parser.reader.is_exhausted() {
            let rest = parser.reader.len();
            parser.reader.advance(rest);
            return Ok(Vec::new());
        }

        let (verb, position) = parser.word();
        let values = match verb.to_ascii_uppercase().as_str() {
            "INSERT" => self.insert(&mut parser)?,
            "SELECT" => self.select(&mut parser)?,
            "EXPLAIN" => self.explain(&mut parser)?,
            "ANALYZE" => self.analyze(&mut parser)?,
            "REBUILD" => self.rebuild(&mut parser)?,
            "DELETE" => self.delete(&mut parser)?,
            "DROP" => self.drop_collection(&mut parser)?,
            "RENAME" => self.rename(&mut parser)?,
            "BEGIN" => self.begin(&mut parser)?,
            "COMMIT" => self.commit(&mut parser)?,
            "ROLLBACK" => self.rollback(&mut parser)?,
            "CHECKPOINT" => self.checkpoint(&mut parser)?,
            _ => return Err(parser.unexpected(verb, position)),
        };
        debug!(statement = %verb.to_ascii_uppercase(), rows = values.len(), "statement executed");
        Ok(values)
    }

    fn insert(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.keyword("INTO")?;
        let collection = parser.collection()?;
        parser.keyword("VALUES")?;
        let documents = parser.documents()?;
        parser.finish()?;
        self.ensure_writable()?;

        let mut state = self.lock()?;
        let target = state.collections.entry(collection).or_default();
        let mut staged = target.clone();
        for document in documents {
            staged.insert(document)?;
        }
        let inserted = staged.documents.len() - target.documents.len();
        *target = staged;
        Ok(vec![count_value(inserted)])
    }

    fn select(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        let query = parser.select_query()?;
        let mut values = self.read_source(&query.source)?;

        if let Some((field, expected)) = &query.filter {
            values.retain(|value| {
                value
                    .as_document()
                    .and_then(|document| document.get(field.as_str()))
                    == Some(expected)
            });
        }
        if query.counting {
            let mut document = Document::new();
            document.insert("count".to_string(), count_value(values.len()));
            values = vec![StructuredValue::Document(document)];
        }
        if let Some(limit) = query.limit {
            values.truncate(limit);
        }

        match query.target {
            None => Ok(values),
            Some(Target::File(path)) => {
                write_json_file(&path, &values)
                    .map_err(|error| ExecutionError::runtime(error.to_string()))?;
                Ok(vec![count_value(values.len())])
            }
            Some(Target::Collection(name)) => {
                self.ensure_writable()?;
                let mut state = self.lock()?;
                let target = state.collections.entry(name).or_default();
                let mut staged = target.clone();
                for value in values {
                    match value {
                        StructuredValue::Document(document) => staged.insert(document)?,
                        other => {
                            return Err(ExecutionError::runtime(format!(
                                "Only documents can be inserted, found {}",
                                other.type_name()
                            )))
                        }
                    }
                }
                let inserted = staged.documents.len() - target.documents.len();
                *target = staged;
                Ok(vec![count_value(inserted)])
            }
        }
    }

    fn read_source(&self, source: &Source) -> Result<Vec<StructuredValue>, ExecutionError> {
        match source {
            Source::File(path) => {
                read_json_file(path).map_err(|error| ExecutionError::runtime(error.to_string()))
            }
            Source::System(name) => {
                let state = self.lock()?;
                match name.as_str() {
                    "$database" => Ok(vec![StructuredValue::Document(self.database_info(&state))]),
                    "$cols" => Ok(collection_infos(&state.collections)),
                    "$indexes" => Ok(index_infos(&state.collections)),
                    _ => Err(ExecutionError::runtime(format!(
                        "Unknown system collection `{name}`"
                    ))),
                }
            }
            Source::Collection(name) => {
                let state = self.lock()?;
                Ok(state
                    .collections
                    .get(name)
                    .map(|collection| {
                        collection
                            .documents
                            .iter()
                            .cloned()
                            .map(StructuredValue::Document)
                            .collect()
                    })
                    .unwrap_or_default())
            }
        }
    }

    fn explain(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.keyword("SELECT")?;
        let query = parser.select_query()?;

        let mut plan = Document::new();
        plan.insert("source".to_string(), query.source.label().into());
        let index = match query.source {
            Source::Collection(_) => "FULL INDEX SCAN(_id)",
            Source::System(_) | Source::File(_) => "VIRTUAL",
        };
        plan.insert("index".to_string(), index.into());
        plan.insert(
            "select".to_string(),
            if query.counting { "COUNT(*)" } else { "$" }.into(),
        );
        plan.insert(
            "filters".to_string(),
            StructuredValue::Array(
                query
                    .filter
                    .iter()
                    .map(|(field, value)| format!("{field} = {value}").into())
                    .collect(),
            ),
        );
        plan.insert(
            "limit".to_string(),
            query
                .limit
                .map_or(StructuredValue::Null, count_value),
        );
        plan.insert(
            "into".to_string(),
            query
                .target
                .as_ref()
                .map_or(StructuredValue::Null, |target| target.label().into()),
        );
        Ok(vec![StructuredValue::Document(plan)])
    }

    fn analyze(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        let name = parser.collection()?;
        parser.finish()?;

        let state = self.lock()?;
        let documents = state
            .collections
            .get(&name)
            .map_or(&[][..], |collection| collection.documents.as_slice());
        let mut fields = Vec::<&str>::new();
        for key in documents.iter().flat_map(|document| document.keys()) {
            if !fields.contains(&key.as_str()) {
                fields.push(key.as_str());
            }
        }

        let mut stats = Document::new();
        stats.insert("collection".to_string(), name.as_str().into());
        stats.insert("documents".to_string(), count_value(documents.len()));
        stats.insert(
            "fields".to_string(),
            StructuredValue::Array(fields.into_iter().map(StructuredValue::from).collect()),
        );
        Ok(vec![StructuredValue::Document(stats)])
    }

    fn rebuild(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        let options = parser.rebuild_options()?;
        parser.finish()?;
        self.ensure_writable()?;

        let mut state = self.lock()?;
        if state.snapshot.is_some() {
            return Err(ExecutionError::runtime(
                "Rebuild is not allowed inside a transaction",
            ));
        }
        let rebuilt: Collections = std::mem::take(&mut state.collections)
            .into_iter()
            .map(|(name, collection)| (name, Collection::from_documents(collection.documents)))
            .collect();
        state.collections = rebuilt;
        self.flush(&state.collections)
            .map_err(|error| ExecutionError::runtime(error.to_string()))?;
        info!(options = options.len(), "database rebuilt");
        Ok(vec![StructuredValue::Int32(0)])
    }

    fn delete(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        let collection = parser.collection()?;
        parser.finish()?;
        self.ensure_writable()?;

        let mut state = self.lock()?;
        let removed = state
            .collections
            .get_mut(&collection)
            .map_or(0, |collection| collection.documents.drain(..).count());
        Ok(vec![count_value(removed)])
    }

    fn drop_collection(
        &self,
        parser: &mut Parser<'_>,
    ) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.keyword("COLLECTION")?;
        let collection = parser.collection()?;
        parser.finish()?;
        self.ensure_writable()?;

        let mut state = self.lock()?;
        let existed = state.collections.remove(&collection).is_some();
        Ok(vec![StructuredValue::Boolean(existed)])
    }

    fn rename(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.keyword("COLLECTION")?;
        let from = parser.collection()?;
        parser.keyword("TO")?;
        let to = parser.collection()?;
        parser.finish()?;
        self.ensure_writable()?;

        let mut state = self.lock()?;
        if state.collections.contains_key(&to) {
            return Err(ExecutionError::runtime(format!(
                "Collection `{to}` already exists"
            )));
        }
        let renamed = match state.collections.remove(&from) {
            Some(collection) => {
                state.collections.insert(to, collection);
                true
            }
            None => false,
        };
        Ok(vec![StructuredValue::Boolean(renamed)])
    }

    fn begin(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        if parser.peek_keyword("TRANS") {
            parser.keyword("TRANS")?;
        } else if parser.peek_keyword("TRANSACTION") {
            parser.keyword("TRANSACTION")?;
        }
        parser.finish()?;

        let mut state = self.lock()?;
        if state.snapshot.is_some() {
            return Ok(vec![StructuredValue::Boolean(false)]);
        }
        state.snapshot = Some(state.collections.clone());
        Ok(vec![StructuredValue::Boolean(true)])
    }

    fn commit(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.finish()?;
        let mut state = self.lock()?;
        Ok(vec![StructuredValue::Boolean(state.snapshot.take().is_some())])
    }

    fn rollback(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.finish()?;
        let mut state = self.lock()?;
        let rolled_back = match state.snapshot.take() {
            Some(committed) => {
                state.collections = committed;
                true
            }
            None => false,
        };
        Ok(vec![StructuredValue::Boolean(rolled_back)])
    }

    fn checkpoint(&self, parser: &mut Parser<'_>) -> Result<Vec<StructuredValue>, ExecutionError> {
        parser.finish()?;
        let state = self.lock()?;
        self.flush(state.committed())
            .map_err(|error| ExecutionError::runtime(error.to_string()))?;
        Ok(vec![StructuredValue::Int32(0)])
    }

    fn database_info(&self, state: &DatabaseState) -> Document {
        let name = self
            .file
            .as_deref()
            .and_then(Path::file_stem)
            .map_or_else(|| self.options.path.clone(), |stem| stem.to_string_lossy().into_owned());
        let mode = match self.options.mode {
            ConnectionMode::Direct => "direct",
            ConnectionMode::Shared => "shared",
        };

        let mut info = Document::new();
        info.insert("name".to_string(), name.into());
        info.insert("path".to_string(), self.options.path.clone().into());
        info.insert("readOnly".to_string(), self.options.read_only.into());
        info.insert("mode".to_string(), mode.into());
        info.insert(
            "collation".to_string(),
            self.options
                .collation
                .clone()
                .map_or(StructuredValue::Null, StructuredValue::String),
        );
        info.insert(
            "initialSizeMB".to_string(),
            StructuredValue::Int64(i64::from(self.options.initial_size_mb)),
        );
        info.insert(
            "collections".to_string(),
            count_value(state.collections.len()),
        );
        info.insert(
            "inTransaction".to_string(),
            state.snapshot.is_some().into(),
        );
        info
    }
}

#[async_trait]
impl DocumentEngine for MemoryDatabase {
    type Cursor = MemoryCursor;

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn execute_next(
        &self,
        reader: &mut StatementReader,
        _parameters: &mut Document,
    ) -> Result<Self::Cursor, ExecutionError> {
        if !self.is_open() {
            return Err(ExecutionError::runtime("The database is closed"));
        }
        let values = self.run_statement(reader)?;
        Ok(MemoryCursor {
            values: values.into_iter(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryCursor {
    values: std::vec::IntoIter<StructuredValue>,
}

#[async_trait]
impl ValueCursor for MemoryCursor {
    async fn next_value(&mut self) -> Result<Option<StructuredValue>, ExecutionError> {
        Ok(self.values.next())
    }
}

fn count_value(count: usize) -> StructuredValue {
    i32::try_from(count).map_or_else(
        |_| StructuredValue::Int64(i64::try_from(count).unwrap_or(i64::MAX)),
        StructuredValue::Int32,
    )
}

fn collection_infos(collections: &Collections) -> Vec<StructuredValue> {
    collections
        .iter()
        .map(|(name, collection)| {
            let mut info = Document::new();
            info.insert("name".to_string(), name.as_str().into());
            info.insert("type".to_string(), "user".into());
            info.insert("count".to_string(), count_value(collection.documents.len()));
            StructuredValue::Document(info)
        })
        .collect()
}

fn index_infos(collections: &Collections) -> Vec<StructuredValue> {
    collections
        .keys()
        .map(|name| {
            let mut info = Document::new();
            info.insert("collection".to_string(), name.as_str().into());
            info.insert("name".to_string(), "_id".into());
            info.insert("expression".to_string(), "$._id".into());
            info.insert("unique".to_string(), true.into());
            StructuredValue::Document(info)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Source {
    Collection(String),
    System(String),
    File(PathBuf),
}

impl Source {
    fn label(&self) -> String {
        match self {
            Self::Collection(name) | Self::System(name) => name.clone(),
            Self::File(path) => format!("$file('{}')", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Collection(String),
    File(PathBuf),
}

impl Target {
    fn label(&self) -> String {
        match self {
            Self::Collection(name) => name.clone(),
            Self::File(path) => format!("$file('{}')", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SelectQuery {
    counting: bool,
    target: Option<Target>,
    source: Source,
    filter: Option<(String, StructuredValue)>,
    limit: Option<usize>,
}

fn is_word_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '$'
}

struct Parser<'r> {
    reader: &'r mut StatementReader,
}

impl Parser<'_> {
    fn skip_separators(&mut self) {
        self.reader
            .consume_while(|character| character.is_whitespace() || character == ';');
    }

    fn word(&mut self) -> (String, usize) {
        self.reader.skip_whitespace();
        let position = self.reader.position() + 1;
        (self.reader.consume_while(is_word_char), position)
    }

    fn word_or_star(&mut self) -> (String, usize) {
        self.reader.skip_whitespace();
        if self.reader.peek() == Some('*') {
            let position = self.reader.position() + 1;
            self.reader.next_char();
            return ("*".to_string(), position);
        }
        self.word()
    }

    fn peek_keyword(&mut self, expected: &str) -> bool {
        let mut lookahead = self.reader.clone();
        lookahead.skip_whitespace();
        lookahead
            .consume_while(is_word_char)
            .eq_ignore_ascii_case(expected)
    }

    fn keyword(&mut self, expected: &str) -> Result<(), ExecutionError> {
        let (word, position) = self.word();
        if word.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(self.unexpected(word, position))
        }
    }

    fn symbol(&mut self, expected: char) -> Result<(), ExecutionError> {
        self.reader.skip_whitespace();
        if self.reader.peek() == Some(expected) {
            self.reader.next_char();
            return Ok(());
        }
        let position = self.reader.position() + 1;
        Err(self.unexpected(String::new(), position))
    }

    fn collection(&mut self) -> Result<String, ExecutionError> {
        let (name, position) = self.word();
        if is_valid_collection_name(&name) && !name.starts_with('$') {
            Ok(name)
        } else {
            Err(self.unexpected(name, position))
        }
    }

    /// `$|*|COUNT(*) [INTO target] FROM source [WHERE field = literal] [LIMIT n]`
    fn select_query(&mut self) -> Result<SelectQuery, ExecutionError> {
        let (projection, position) = self.word_or_star();
        let counting = match projection.to_ascii_uppercase().as_str() {
            "$" | "*" => false,
            "COUNT" => {
                self.symbol('(')?;
                self.symbol('*')?;
                self.symbol(')')?;
                true
            }
            _ => return Err(self.unexpected(projection, position)),
        };

        let target = if self.peek_keyword("INTO") {
            self.keyword("INTO")?;
            Some(self.target()?)
        } else {
            None
        };
        self.keyword("FROM")?;
        let source = self.source()?;

        let filter = if self.peek_keyword("WHERE") {
            self.keyword("WHERE")?;
            let (field, field_position) = self.word();
            if field.is_empty() || field.starts_with('$') {
                return Err(self.unexpected(field, field_position));
            }
            self.symbol('=')?;
            Some((field, self.literal()?))
        } else {
            None
        };
        let limit = if self.peek_keyword("LIMIT") {
            self.keyword("LIMIT")?;
            Some(self.number()?)
        } else {
            None
        };
        self.finish()?;

        Ok(SelectQuery {
            counting,
            target,
            source,
            filter,
            limit,
        })
    }

    fn source(&mut self) -> Result<Source, ExecutionError> {
        let (name, position) = self.word();
        if name.eq_ignore_ascii_case("$file") {
            return Ok(Source::File(self.file_argument()?));
        }
        if !is_valid_collection_name(&name) {
            return Err(self.unexpected(name, position));
        }
        Ok(if name.starts_with('$') {
            Source::System(name)
        } else {
            Source::Collection(name)
        })
    }

    fn target(&mut self) -> Result<Target, ExecutionError> {
        let (name, position) = self.word();
        if name.eq_ignore_ascii_case("$file") {
            return Ok(Target::File(self.file_argument()?));
        }
        if is_valid_collection_name(&name) && !name.starts_with('$') {
            Ok(Target::Collection(name))
        } else {
            Err(self.unexpected(name, position))
        }
    }

    fn file_argument(&mut self) -> Result<PathBuf, ExecutionError> {
        self.symbol('(')?;
        let path = self.quoted()?;
        self.symbol(')')?;
        Ok(PathBuf::from(path))
    }

    fn quoted(&mut self) -> Result<String, ExecutionError> {
        self.reader.skip_whitespace();
        let position = self.reader.position() + 1;
        let Some(quote @ ('\'' | '"')) = self.reader.peek() else {
            return Err(self.unexpected(String::new(), position));
        };
        self.reader.next_char();
        let text = self.reader.consume_while(|character| character != quote);
        if self.reader.next_char().is_none() {
            let end = self.reader.position() + 1;
            return Err(self.unexpected(String::new(), end));
        }
        Ok(text)
    }

    fn literal(&mut self) -> Result<StructuredValue, ExecutionError> {
        self.reader.skip_whitespace();
        if self.reader.peek() == Some('\'') {
            return self.quoted().map(StructuredValue::String);
        }
        self.json_value().map(|(value, _)| StructuredValue::from(value))
    }

    fn rebuild_options(&mut self) -> Result<Vec<(String, String)>, ExecutionError> {
        self.reader.skip_whitespace();
        if self.reader.peek() != Some('{') {
            return Ok(Vec::new());
        }
        self.reader.next_char();

        let mut options = Vec::new();
        loop {
            let (key, position) = self.word();
            if !matches!(key.to_ascii_lowercase().as_str(), "collation" | "password") {
                return Err(self.unexpected(key, position));
            }
            self.symbol(':')?;
            options.push((key, self.quoted()?));

            self.reader.skip_whitespace();
            match self.reader.peek() {
                Some(',') => {
                    self.reader.next_char();
                }
                _ => {
                    self.symbol('}')?;
                    return Ok(options);
                }
            }
        }
    }

    fn number(&mut self) -> Result<usize, ExecutionError> {
        let (raw, position) = self.word();
        raw.parse()
            .map_err(|_| self.unexpected(raw.clone(), position))
    }

    fn json_value(&mut self) -> Result<(JsonValue, usize), ExecutionError> {
        self.reader.skip_whitespace();
        let position = self.reader.position() + 1;
        let rest = self.reader.remaining();
        let mut stream = serde_json::Deserializer::from_str(&rest).into_iter::<JsonValue>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            Some(Err(error)) => {
                return Err(ExecutionError::syntax(
                    format!("Invalid document in position {position}: {error}"),
                    position,
                ))
            }
            None => return Err(self.unexpected(String::new(), position)),
        };
        let consumed = rest
            .get(..stream.byte_offset())
            .map_or(0, |parsed| parsed.chars().count());
        self.reader.advance(consumed);
        Ok((value, position))
    }

    fn documents(&mut self) -> Result<Vec<Document>, ExecutionError> {
        let mut documents = Vec::new();
        loop {
            let (value, position) = self.json_value()?;
            match StructuredValue::from(value) {
                StructuredValue::Document(document) => documents.push(document),
                other => {
                    return Err(ExecutionError::syntax(
                        format!(
                            "Expected a document but found {} in position {position}.",
                            other.type_name()
                        ),
                        position,
                    ))
                }
            }

            self.reader.skip_whitespace();
            if self.reader.peek() != Some(',') {
                return Ok(documents);
            }
            self.reader.next_char();
        }
    }

    fn finish(&mut self) -> Result<(), ExecutionError> {
        self.reader.skip_whitespace();
        match self.reader.peek() {
            None => Ok(()),
            Some(';') => {
                self.reader.next_char();
                Ok(())
            }
            Some(_) => {
                let (word, position) = self.word_or_star();
                Err(self.unexpected(word, position))
            }
        }
    }

    fn unexpected(&self, token: String, position: usize) -> ExecutionError {
        let shown = if token.is_empty() {
            self.reader.peek().map(String::from)
        } else {
            Some(token)
        };
        match shown {
            Some(token) => ExecutionError::syntax(
                format!("Unexpected token `{token}` in position {position}."),
                position,
            ),
            None => ExecutionError::syntax(
                format!("Unexpected end of input in position {position}."),
                position,
            ),
        }
    }
}

fn load_collections(path: &Path) -> Result<Collections, StorageError> {
    let raw = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Collections::new());
    }

    let root: JsonValue = serde_json::from_str(&raw).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let layout_error = || StorageError::Layout {
        path: path.to_path_buf(),
    };

    let stored = root
        .get("collections")
        .and_then(JsonValue::as_object)
        .ok_or_else(layout_error)?;
    let mut collections = Collections::new();
    for (name, documents) in stored {
        let documents = documents
            .as_array()
            .ok_or_else(layout_error)?
            .iter()
            .map(|document| match StructuredValue::from(document.clone()) {
                StructuredValue::Document(document) => Ok(document),
                _ => Err(layout_error()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        collections.insert(name.clone(), Collection::from_documents(documents));
    }
    Ok(collections)
}

fn save_collections(path: &Path, collections: &Collections) -> Result<(), StorageError> {
    let stored = collections
        .iter()
        .map(|(name, collection)| {
            serde_json::to_value(&collection.documents).map(|documents| (name.clone(), documents))
        })
        .collect::<Result<serde_json::Map<String, JsonValue>, _>>()
        .map_err(|source| StorageError::Serialize { source })?;
    let rendered = serde_json::to_string_pretty(&serde_json::json!({ "collections": stored }))
        .map_err(|source| StorageError::Serialize { source })?;

    fs::write(path, rendered).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), collections = collections.len(), "document store flushed");
    Ok(())
}

fn read_json_file(path: &Path) -> Result<Vec<StructuredValue>, StorageError> {
    let raw = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root: JsonValue = serde_json::from_str(&raw).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(match root {
        JsonValue::Array(items) => items.into_iter().map(StructuredValue::from).collect(),
        other => vec![StructuredValue::from(other)],
    })
}

fn write_json_file(path: &Path, values: &[StructuredValue]) -> Result<(), StorageError> {
    let rendered =
        serde_json::to_string_pretty(values).map_err(|source| StorageError::Serialize { source })?;
    fs::write(path, rendered).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}
