use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("`{template}` needs a collection name")]
    MissingCollection { template: &'static str },
    #[error("`{0}` is not a valid collection name")]
    InvalidCollectionName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTemplate {
    Empty,
    Query,
    Count,
    Explain,
    Indexes,
    Export,
    Analyze,
    Rename,
    Drop,
    DatabaseInfo,
    Rebuild,
    Import,
}

impl ConsoleTemplate {
    pub const ALL: [Self; 12] = [
        Self::Empty,
        Self::Query,
        Self::Count,
        Self::Explain,
        Self::Indexes,
        Self::Export,
        Self::Analyze,
        Self::Rename,
        Self::Drop,
        Self::DatabaseInfo,
        Self::Rebuild,
        Self::Import,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Empty => "New console",
            Self::Query => "Query collection",
            Self::Count => "Count documents",
            Self::Explain => "Explain plan",
            Self::Indexes => "Indexes",
            Self::Export => "Export to JSON",
            Self::Analyze => "Analyze",
            Self::Rename => "Rename collection",
            Self::Drop => "Drop collection",
            Self::DatabaseInfo => "Database info",
            Self::Rebuild => "Rebuild database",
            Self::Import => "Import from JSON",
        }
    }

    #[must_use]
    pub fn requires_collection(self) -> bool {
        !matches!(
            self,
            Self::Empty | Self::DatabaseInfo | Self::Rebuild | Self::Import
        )
    }

    pub fn render(
        self,
        collection: Option<&str>,
        export_dir: &Path,
    ) -> Result<String, TemplateError> {
        let name = if self.requires_collection() {
            let name = collection
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or(TemplateError::MissingCollection {
                    template: self.title(),
                })?;
            if !is_valid_collection_name(name) {
                return Err(TemplateError::InvalidCollectionName(name.to_string()));
            }
            name
        } else {
            ""
        };

        let sql = match self {
            Self::Empty => String::new(),
            Self::Query => format!("SELECT $ FROM {name};"),
            Self::Count => format!("SELECT COUNT(*) FROM {name};"),
            Self::Explain => format!("EXPLAIN SELECT $ FROM {name};"),
            Self::Indexes => format!("SELECT $ FROM $indexes WHERE collection = \"{name}\";"),
            Self::Export => {
                let file = json_file(export_dir, name);
                format!("SELECT $\n  INTO $file('{file}')\n  FROM {name};")
            }
            Self::Analyze => format!("ANALYZE {name};"),
            Self::Rename => format!("RENAME COLLECTION {name} TO new_name;"),
            Self::Drop => format!("DROP COLLECTION {name};"),
            Self::DatabaseInfo => "SELECT $ FROM $database;".to_string(),
            Self::Rebuild => {
                "REBUILD { collation: 'en-US/IgnoreCase', password: 'newpassword' };".to_string()
            }
            Self::Import => {
                let file = json_file(export_dir, "import");
                format!("SELECT $\n  INTO new_col\n  FROM $file('{file}');")
            }
        };
        Ok(sql)
    }
}

fn json_file(dir: &Path, stem: &str) -> String {
    dir.join(format!("{stem}.json"))
        .display()
        .to_string()
        .replace('\\', "/")
}

#[must_use]
pub fn is_valid_collection_name(name: &str) -> bool {
    let body = name.strip_prefix('$').unwrap_or(name);
    let mut chars = body.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|character| character.is_ascii_alphanumeric() || character == '_')
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{is_valid_collection_name, ConsoleTemplate, TemplateError};

    fn render(template: ConsoleTemplate, collection: &str) -> String {
        template
            .render(Some(collection), Path::new("/home/ana/Documents"))
            .expect("template renders")
    }

    #[test]
    fn collection_templates_embed_the_name() {
        assert_eq!(render(ConsoleTemplate::Query, "users"), "SELECT $ FROM users;");
        assert_eq!(
            render(ConsoleTemplate::Count, "users"),
            "SELECT COUNT(*) FROM users;"
        );
        assert_eq!(
            render(ConsoleTemplate::Explain, "users"),
            "EXPLAIN SELECT $ FROM users;"
        );
        assert_eq!(
            render(ConsoleTemplate::Indexes, "users"),
            "SELECT $ FROM $indexes WHERE collection = \"users\";"
        );
        assert_eq!(render(ConsoleTemplate::Analyze, "users"), "ANALYZE users;");
        assert_eq!(
            render(ConsoleTemplate::Rename, "users"),
            "RENAME COLLECTION users TO new_name;"
        );
        assert_eq!(render(ConsoleTemplate::Drop, "users"), "DROP COLLECTION users;");
    }

    #[test]
    fn export_writes_into_export_directory() {
        assert_eq!(
            render(ConsoleTemplate::Export, "users"),
            "SELECT $\n  INTO $file('/home/ana/Documents/users.json')\n  FROM users;"
        );
    }

    #[test]
    fn database_templates_ignore_collection() {
        let sql = ConsoleTemplate::DatabaseInfo
            .render(None, Path::new("."))
            .expect("template renders");
        assert_eq!(sql, "SELECT $ FROM $database;");
        assert_eq!(
            ConsoleTemplate::Empty
                .render(Some("ignored"), Path::new("."))
                .expect("template renders"),
            ""
        );
        assert_eq!(
            ConsoleTemplate::Import
                .render(None, Path::new("/data"))
                .expect("template renders"),
            "SELECT $\n  INTO new_col\n  FROM $file('/data/import.json');"
        );
    }

    #[test]
    fn collection_templates_reject_missing_or_invalid_names() {
        assert_eq!(
            ConsoleTemplate::Query.render(Some("  "), Path::new(".")),
            Err(TemplateError::MissingCollection {
                template: "Query collection"
            })
        );
        assert_eq!(
            ConsoleTemplate::Drop.render(Some("users; DROP"), Path::new(".")),
            Err(TemplateError::InvalidCollectionName("users; DROP".to_string()))
        );
    }

    #[test]
    fn validates_collection_names() {
        assert!(is_valid_collection_name("users"));
        assert!(is_valid_collection_name("_tmp2"));
        assert!(is_valid_collection_name("$database"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("2users"));
        assert!(!is_valid_collection_name("user-name"));
        assert!(!is_valid_collection_name("$"));
    }
}
