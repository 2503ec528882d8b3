//! Offsets are character offsets, not byte offsets.

use std::ops::Range;

use crate::keywords::filter_keywords;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompletionState {
    #[default]
    Idle,
    Suggesting {
        partial_word: String,
    },
}

impl CompletionState {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Suggesting { .. })
    }

    #[must_use]
    pub fn partial_word(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Suggesting { partial_word } => Some(partial_word),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent<'a> {
    TextEntering {
        document: &'a str,
        input: char,
        caret_offset: usize,
        has_selection: bool,
    },
    Backspace {
        document: &'a str,
        caret_offset: usize,
    },
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupEffect {
    None,
    Show(Vec<&'static str>),
    Hide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: CompletionState,
    pub effect: PopupEffect,
    /// The popup already refiltered for this key; the editor still applies it.
    pub key_handled: bool,
}

impl Transition {
    fn unchanged(state: &CompletionState) -> Self {
        Self {
            state: state.clone(),
            effect: PopupEffect::None,
            key_handled: false,
        }
    }

    fn close(state: &CompletionState) -> Self {
        Self {
            state: CompletionState::Idle,
            effect: if state.is_open() {
                PopupEffect::Hide
            } else {
                PopupEffect::None
            },
            key_handled: false,
        }
    }

    fn suggest(partial_word: String, key_handled: bool) -> Self {
        let suggestions = filter_keywords(&partial_word);
        Self {
            state: CompletionState::Suggesting { partial_word },
            effect: PopupEffect::Show(suggestions),
            key_handled,
        }
    }
}

#[must_use]
pub fn transition(state: &CompletionState, event: CompletionEvent<'_>) -> Transition {
    match event {
        CompletionEvent::TextEntering {
            document,
            input,
            caret_offset,
            has_selection,
        } => {
            if input == ' ' {
                return Transition::close(state);
            }

            let run = if has_selection {
                input.to_string()
            } else {
                let mut run = word_before_caret(document, caret_offset);
                if input.is_ascii_alphabetic() {
                    run.push(input);
                }
                run
            };
            if run.is_empty() {
                return Transition::unchanged(state);
            }

            let inside_word = char_before_caret(document, caret_offset)
                .is_some_and(char::is_alphabetic);
            if !state.is_open() && inside_word {
                return Transition::unchanged(state);
            }
            Transition::suggest(run, false)
        }
        CompletionEvent::Backspace {
            document,
            caret_offset,
        } => {
            let CompletionState::Suggesting { partial_word } = state else {
                return Transition::unchanged(state);
            };

            let mut run = word_before_caret(document, caret_offset);
            if run.is_empty() {
                return Transition::suggest(partial_word.clone(), true);
            }
            run.pop();
            Transition::suggest(run, true)
        }
        CompletionEvent::Dismissed => Transition::close(state),
    }
}

#[must_use]
pub fn word_before_caret(document: &str, caret_offset: usize) -> String {
    let before = document.chars().take(caret_offset).collect::<Vec<_>>();
    let start = before
        .iter()
        .rposition(|character| !character.is_ascii_alphabetic())
        .map_or(0, |index| index + 1);
    before[start..].iter().collect()
}

#[must_use]
pub fn char_before_caret(document: &str, caret_offset: usize) -> Option<char> {
    caret_offset
        .checked_sub(1)
        .and_then(|index| document.chars().nth(index))
}

pub fn commit_suggestion(
    document: &mut String,
    segment: Range<usize>,
    suggestion: &str,
) -> Option<usize> {
    let start = byte_offset(document, segment.start);
    let end = byte_offset(document, segment.end);
    if start >= end {
        return None;
    }
    document.replace_range(start..end, suggestion);
    Some(segment.start + suggestion.chars().count())
}

#[must_use]
pub fn byte_offset(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map_or(text.len(), |(index, _)| index)
}

#[derive(Debug, Clone, Default)]
pub struct CompletionEngine {
    state: CompletionState,
    suggestions: Vec<&'static str>,
    selected: usize,
    anchor: Option<usize>,
}

impl CompletionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: CompletionEvent<'_>) -> bool {
        let was_open = self.state.is_open();
        let next = transition(&self.state, event);

        if !was_open && next.state.is_open() {
            if let CompletionEvent::TextEntering { caret_offset, .. } = event {
                self.anchor = Some(caret_offset);
            }
        }

        match next.effect {
            PopupEffect::None => {}
            PopupEffect::Show(suggestions) => {
                self.suggestions = suggestions;
                self.selected = 0;
            }
            PopupEffect::Hide => self.clear(),
        }
        self.state = next.state;
        next.key_handled
    }

    #[must_use]
    pub fn state(&self) -> &CompletionState {
        &self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    #[must_use]
    pub fn suggestions(&self) -> &[&'static str] {
        &self.suggestions
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn selected_suggestion(&self) -> Option<&'static str> {
        self.suggestions.get(self.selected).copied()
    }

    pub fn select_next(&mut self) {
        if !self.suggestions.is_empty() {
            self.selected = (self.selected + 1) % self.suggestions.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.suggestions.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.suggestions.len() - 1);
        }
    }

    pub fn dismiss(&mut self) {
        self.handle(CompletionEvent::Dismissed);
    }

    #[must_use]
    pub fn trigger_segment(&self, caret_offset: usize) -> Range<usize> {
        match self.anchor {
            Some(anchor) if anchor <= caret_offset => anchor..caret_offset,
            _ => caret_offset..caret_offset,
        }
    }

    pub fn commit(&mut self, document: &mut String, caret_offset: usize) -> Option<usize> {
        let suggestion = self.selected_suggestion();
        let segment = self.trigger_segment(caret_offset);
        self.dismiss();
        commit_suggestion(document, segment, suggestion?)
    }

    fn clear(&mut self) {
        self.suggestions.clear();
        self.selected = 0;
        self.anchor = None;
    }
}
