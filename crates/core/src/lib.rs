pub mod completion;
pub mod connection_manager;
pub mod console_templates;
pub mod error_context;
pub mod grid_view;
pub mod keywords;
pub mod projection;
pub mod query_runner;
pub mod query_task;
pub mod results_buffer;
pub mod settings;
pub mod statement_reader;
pub mod text_view;
pub mod value;
