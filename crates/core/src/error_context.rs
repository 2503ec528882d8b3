use crate::query_task::ExecutionError;

const EXCERPT_BEFORE: usize = 30;
const EXCERPT_AFTER: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub message: String,
    pub excerpt: Option<String>,
    pub caret_line: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn from_error(error: &ExecutionError, source_text: &str) -> Self {
        let located = error
            .position()
            .and_then(|position| source_excerpt(source_text, position));
        let (excerpt, caret_line) = located.unzip();

        Self {
            message: error.message().to_string(),
            excerpt,
            caret_line,
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.message);
        text.push('\n');
        if let (Some(excerpt), Some(caret_line)) = (&self.excerpt, &self.caret_line) {
            text.push('\n');
            text.push_str(excerpt);
            text.push('\n');
            text.push_str(caret_line);
            text.push('\n');
        }
        text
    }
}

/// Positions outside `[1, len]` are clamped; only empty source yields `None`.
#[must_use]
pub fn source_excerpt(source_text: &str, position: usize) -> Option<(String, String)> {
    let chars = source_text.chars().collect::<Vec<_>>();
    if chars.is_empty() {
        return None;
    }

    let len = chars.len();
    let position = position.clamp(1, len);
    let start = (position.saturating_sub(EXCERPT_BEFORE).max(1) - 1).min(len);
    let end = position.saturating_add(EXCERPT_AFTER).min(len).max(start);

    let excerpt = chars[start..end]
        .iter()
        .map(|&character| match character {
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect::<String>();

    let caret_column = (position - 1 - start).min(end - start - 1);
    let caret_line = format!("{}^", "-".repeat(caret_column));

    Some((excerpt, caret_line))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{source_excerpt, ErrorContext};
    use crate::query_task::ExecutionError;

    #[test]
    fn caret_lands_on_last_character_at_end_of_text() {
        let sql = "SELECT * FROM";
        let (excerpt, caret_line) = source_excerpt(sql, sql.len()).expect("excerpt");

        assert_eq!(excerpt, "SELECT * FROM");
        assert_eq!(caret_line.chars().count(), excerpt.chars().count());
        assert!(caret_line.ends_with('^'));
        assert_eq!(caret_line, "------------^");
    }

    #[test]
    fn end_of_input_position_clamps_to_last_column() {
        let (excerpt, caret_line) = source_excerpt("SELECT * FROM", 14).expect("excerpt");
        assert_eq!(excerpt, "SELECT * FROM");
        assert_eq!(caret_line.chars().count(), excerpt.chars().count());
        assert_eq!(caret_line, format!("{}^", "-".repeat(12)));
    }

    #[test]
    fn long_source_is_windowed_around_position() {
        let sql = format!("{}BROKEN{}", "a".repeat(40), "b".repeat(40));
        let (excerpt, caret_line) = source_excerpt(&sql, 41).expect("excerpt");

        assert_eq!(excerpt, format!("{}BROKEN{}", "a".repeat(30), "b".repeat(10)));
        assert_eq!(caret_line, format!("{}^", "-".repeat(30)));
    }

    #[test]
    fn newlines_become_spaces() {
        let (excerpt, caret_line) =
            source_excerpt("SELECT $\r\nFROM\nusers WHERE", 17).expect("excerpt");
        assert_eq!(excerpt, "SELECT $  FROM users WHERE");
        assert_eq!(caret_line, format!("{}^", "-".repeat(16)));
    }

    #[test]
    fn excerpt_is_total_for_boundary_positions() {
        let sql = "SELECT $ FROM users";
        for position in [0, 1, sql.len(), sql.len() + 100] {
            let (excerpt, caret_line) =
                source_excerpt(sql, position).expect("non-empty source has an excerpt");
            assert!(caret_line.ends_with('^'));
            assert!(caret_line.chars().count() <= excerpt.chars().count());
        }

        assert_eq!(
            source_excerpt(sql, 0),
            Some(("SELECT $ FROM us".to_string(), "^".to_string()))
        );
        assert_eq!(
            source_excerpt(sql, sql.len() + 100),
            Some((sql.to_string(), format!("{}^", "-".repeat(18))))
        );
        assert_eq!(source_excerpt("", 5), None);
    }

    #[test]
    fn runtime_errors_render_message_only() {
        let context = ErrorContext::from_error(&ExecutionError::runtime("disk full"), "SELECT 1");
        assert_eq!(context.excerpt, None);
        assert_eq!(context.caret_line, None);
        assert_eq!(context.render(), "disk full\n");
    }

    #[test]
    fn syntax_errors_render_excerpt_block() {
        let error = ExecutionError::syntax("Unexpected token `FORM` in position 10.", 10);
        let context = ErrorContext::from_error(&error, "SELECT $ FORM users");

        assert_eq!(
            context.render(),
            "Unexpected token `FORM` in position 10.\n\nSELECT $ FORM users\n---------^\n"
        );
    }

    #[test]
    fn syntax_error_against_empty_source_has_no_excerpt() {
        let error = ExecutionError::syntax("Unexpected end of input", 1);
        let context = ErrorContext::from_error(&error, "");
        assert_eq!(context.render(), "Unexpected end of input\n");
    }
}
