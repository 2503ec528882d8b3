#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementReader {
    chars: Vec<char>,
    position: usize,
}

impl StatementReader {
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.chars[self.position..]
            .iter()
            .all(|character| character.is_whitespace())
    }

    #[must_use]
    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let character = self.peek()?;
        self.position += 1;
        Some(character)
    }

    pub fn skip_whitespace(&mut self) {
        self.consume_while(char::is_whitespace);
    }

    pub fn consume_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> String {
        let start = self.position;
        while self.peek().is_some_and(&mut predicate) {
            self.position += 1;
        }
        self.chars[start..self.position].iter().collect()
    }

    #[must_use]
    pub fn remaining(&self) -> String {
        self.chars[self.position..].iter().collect()
    }

    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count).min(self.chars.len());
    }
}
