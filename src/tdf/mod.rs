//! TDF text metadata parser
//!
//! TDF files (`.tdf`, `.fbi`, `.ota`, `.gui`) are nested sections of
//! `key=value;` properties:
//!
//! ```text
//! [UNITINFO]
//!     {
//!     UnitName=ARMCOM;
//!     [WEAPON1] { Range=300; }
//!     }
//! ```
//!
//! The parser is a byte-level state machine yielding [`Token`]s. Callers
//! either walk the token stream, skipping to the sections they want, or
//! extract whole sections into [`TdfObject`]s.

mod object;

pub use object::TdfObject;

use crate::common::latin1;
use crate::vfs::FileRead;
use crate::Result;
use std::collections::HashMap;

const SECTION_NAME_START: u8 = b'[';
const SECTION_NAME_STOP: u8 = b']';
const SECTION_BODY_START: u8 = b'{';
const SECTION_BODY_STOP: u8 = b'}';
const KEY_VALUE_SEPARATOR: u8 = b'=';
const KEY_VALUE_STOP: u8 = b';';

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\r' | b'\t')
}

/// A lexical event of the TDF grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A `[name] {` section opening
    ObjectBegin(String),
    /// A section's closing `}`
    ObjectEnd(String),
    /// A `key=value;` pair
    Property(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingSection,
    ReadingSectionName,
    SeekingSectionStart,
    SeekingKeyValue,
    ReadingKey,
    ReadingValue,
}

#[derive(Debug, Default)]
struct Scanner {
    parents: Vec<String>,
    section: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,
    whitespace: Vec<u8>,
}

impl Scanner {
    fn end_object(&mut self) -> (State, Option<Token>) {
        let name = self.parents.pop().unwrap_or_default();
        let next = if self.parents.is_empty() {
            State::SeekingSection
        } else {
            State::SeekingKeyValue
        };
        (next, Some(Token::ObjectEnd(name)))
    }

    fn transition(&mut self, state: State, byte: u8) -> (State, Option<Token>) {
        match state {
            State::SeekingSection => {
                if byte == SECTION_NAME_START {
                    self.section.clear();
                    (State::ReadingSectionName, None)
                } else {
                    (state, None)
                }
            }

            State::ReadingSectionName => {
                if byte == SECTION_NAME_STOP {
                    (State::SeekingSectionStart, None)
                } else {
                    self.section.push(byte);
                    (state, None)
                }
            }

            State::SeekingSectionStart => match byte {
                SECTION_BODY_START => {
                    let name = latin1(&self.section);
                    self.parents.push(name.clone());
                    (State::SeekingKeyValue, Some(Token::ObjectBegin(name)))
                }
                SECTION_BODY_STOP => self.end_object(),
                _ => (state, None),
            },

            State::SeekingKeyValue => match byte {
                b if is_whitespace(b) => (state, None),
                SECTION_NAME_START => {
                    self.section.clear();
                    (State::ReadingSectionName, None)
                }
                SECTION_BODY_STOP => self.end_object(),
                _ => {
                    self.key.clear();
                    self.key.push(byte);
                    self.whitespace.clear();
                    (State::ReadingKey, None)
                }
            },

            State::ReadingKey => {
                if byte == KEY_VALUE_SEPARATOR {
                    self.value.clear();
                    self.whitespace.clear();
                    (State::ReadingValue, None)
                } else if is_whitespace(byte) {
                    self.whitespace.push(byte);
                    (state, None)
                } else {
                    self.key.append(&mut self.whitespace);
                    self.key.push(byte);
                    (state, None)
                }
            }

            State::ReadingValue => {
                if byte == KEY_VALUE_STOP {
                    let token = Token::Property(latin1(&self.key), latin1(&self.value));
                    (State::SeekingKeyValue, Some(token))
                } else if is_whitespace(byte) {
                    // Leading whitespace is dropped, interior runs are kept
                    if !self.value.is_empty() {
                        self.whitespace.push(byte);
                    }
                    (state, None)
                } else {
                    self.value.append(&mut self.whitespace);
                    self.value.push(byte);
                    (state, None)
                }
            }
        }
    }
}

/// Incremental parser over one TDF document
#[derive(Debug)]
pub struct TdfParser {
    data: Vec<u8>,
    position: usize,
    state: State,
    scanner: Scanner,
}

impl TdfParser {
    /// Parse the given bytes
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
            state: State::SeekingSection,
            scanner: Scanner::default(),
        }
    }

    /// Parse the whole contents of a file
    pub fn from_handle<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        handle.seek_to(0);
        Ok(Self::new(handle.read_to_end_data()?))
    }

    /// Feed every token of `data` to `handler`
    pub fn parse(data: &[u8], mut handler: impl FnMut(Token)) {
        let mut state = State::SeekingSection;
        let mut scanner = Scanner::default();
        for &byte in data {
            let (next, token) = scanner.transition(state, byte);
            state = next;
            if let Some(token) = token {
                handler(token);
            }
        }
    }

    /// Whether every byte has been consumed
    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Number of open sections
    pub fn depth(&self) -> usize {
        self.scanner.parents.len()
    }

    /// Innermost open section
    pub fn current_object(&self) -> Option<&str> {
        self.scanner.parents.last().map(String::as_str)
    }

    /// Open sections, outermost first
    pub fn current_objects(&self) -> &[String] {
        &self.scanner.parents
    }

    /// Consume one byte; `None` at the end of input
    fn advance(&mut self) -> Option<Option<Token>> {
        let byte = *self.data.get(self.position)?;
        self.position += 1;
        let (next, token) = self.scanner.transition(self.state, byte);
        self.state = next;
        Some(token)
    }

    /// Next token, or `None` at the end of input
    pub fn next_token(&mut self) -> Option<Token> {
        while let Some(step) = self.advance() {
            if step.is_some() {
                return step;
            }
        }
        None
    }

    /// Advance into the next child section named `name`, ignoring ASCII case
    ///
    /// Returns `false` if the current section ends or the input runs out
    /// first.
    pub fn skip_to_object(&mut self, name: &str) -> bool {
        let start = self.depth();
        while let Some(token) = self.next_token() {
            match token {
                Token::ObjectBegin(section) => {
                    if self.depth() - 1 == start && section.eq_ignore_ascii_case(name) {
                        return true;
                    }
                }
                Token::ObjectEnd(_) => {
                    if self.depth() < start {
                        return false;
                    }
                }
                Token::Property(..) => {}
            }
        }
        false
    }

    /// Advance into the next child section of the current one and return its name
    pub fn skip_to_next_object(&mut self) -> Option<String> {
        let start = self.depth();
        while let Some(token) = self.next_token() {
            match token {
                Token::ObjectBegin(section) => {
                    if self.depth() - 1 == start {
                        return Some(section);
                    }
                }
                Token::ObjectEnd(_) => {
                    if self.depth() < start {
                        return None;
                    }
                }
                Token::Property(..) => {}
            }
        }
        None
    }

    /// Advance past the end of the current section
    pub fn skip_object(&mut self) {
        let start = self.depth();
        if start == 0 {
            return;
        }
        while let Some(token) = self.next_token() {
            if matches!(token, Token::ObjectEnd(_)) && self.depth() == start - 1 {
                return;
            }
        }
    }

    /// Visit each direct property of the current section, consuming it
    pub fn for_each_property(&mut self, mut visit: impl FnMut(&str, &str)) {
        let start = self.depth();
        while let Some(step) = self.advance() {
            match step {
                Some(Token::Property(key, value)) if self.depth() == start => visit(&key, &value),
                Some(Token::ObjectEnd(_)) if start > 0 && self.depth() == start - 1 => return,
                _ => {}
            }
        }
    }

    /// Extract every remaining top-level section
    pub fn extract_all(&mut self) -> HashMap<String, TdfObject> {
        let mut levels = vec![TdfObject::default()];
        while let Some(token) = self.next_token() {
            match token {
                Token::ObjectBegin(_) => levels.push(TdfObject::default()),
                Token::ObjectEnd(name) => {
                    // Stray closing braces at the top level are ignored
                    if levels.len() > 1 {
                        let finished = levels.pop().unwrap_or_default();
                        if let Some(parent) = levels.last_mut() {
                            parent.subobjects.insert(name, finished);
                        }
                    }
                }
                Token::Property(key, value) => {
                    if let Some(current) = levels.last_mut() {
                        current.properties.insert(key, value);
                    }
                }
            }
        }
        levels.swap_remove(0).subobjects
    }

    /// Extract the rest of the current section
    ///
    /// Call after entering a section with [`skip_to_object`](Self::skip_to_object)
    /// or [`skip_to_next_object`](Self::skip_to_next_object). With
    /// `normalize_keys` property keys are lowercased.
    pub fn extract_object(&mut self, normalize_keys: bool) -> TdfObject {
        let mut levels = vec![TdfObject::default()];
        while let Some(token) = self.next_token() {
            match token {
                Token::ObjectBegin(_) => levels.push(TdfObject::default()),
                Token::ObjectEnd(name) => {
                    if levels.len() == 1 {
                        break;
                    }
                    let finished = levels.pop().unwrap_or_default();
                    if let Some(parent) = levels.last_mut() {
                        parent.subobjects.insert(name, finished);
                    }
                }
                Token::Property(key, value) => {
                    let key = if normalize_keys { key.to_lowercase() } else { key };
                    if let Some(current) = levels.last_mut() {
                        current.properties.insert(key, value);
                    }
                }
            }
        }
        levels.swap_remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "[Root]\r\n\t{\r\n\tFull Name = Simple  Unit ;\r\n\tCount=3;\r\n\t[Child]\r\n\t\t{\r\n\t\tEmpty=;\r\n\t\t}\r\n\t}\r\n[Other] { a=1; }\r\n";

    fn tokens(text: &str) -> Vec<Token> {
        let mut out = Vec::new();
        TdfParser::parse(text.as_bytes(), |token| out.push(token));
        out
    }

    fn prop(key: &str, value: &str) -> Token {
        Token::Property(key.into(), value.into())
    }

    #[test]
    fn test_token_stream() {
        assert_eq!(
            tokens(SIMPLE),
            vec![
                Token::ObjectBegin("Root".into()),
                prop("Full Name", "Simple  Unit"),
                prop("Count", "3"),
                Token::ObjectBegin("Child".into()),
                prop("Empty", ""),
                Token::ObjectEnd("Child".into()),
                Token::ObjectEnd("Root".into()),
                Token::ObjectBegin("Other".into()),
                prop("a", "1"),
                Token::ObjectEnd("Other".into()),
            ]
        );
    }

    #[test]
    fn test_text_outside_sections_is_ignored() {
        let stream = tokens("junk = 1;\n// comment\n[A]{x=1;}");
        assert_eq!(stream.len(), 3);
        assert_eq!(stream[1], prop("x", "1"));
    }

    #[test]
    fn test_extract_all() {
        let mut parser = TdfParser::new(SIMPLE);
        let all = parser.extract_all();

        assert_eq!(all.len(), 2);
        let root = &all["Root"];
        assert_eq!(root.property("Count"), Some("3"));
        assert_eq!(root.object("Child").and_then(|c| c.property("Empty")), Some(""));
        assert_eq!(all["Other"].property("a"), Some("1"));
        assert!(parser.is_at_end());
    }

    #[test]
    fn test_stray_close_brace() {
        let mut parser = TdfParser::new("[A]{x=1;}[X]}[B]{y=2;}");
        let all = parser.extract_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["A"].property("x"), Some("1"));
        assert_eq!(all["B"].property("y"), Some("2"));
    }

    #[test]
    fn test_navigation() {
        let mut parser = TdfParser::new(SIMPLE);

        assert!(parser.skip_to_object("other"));
        assert_eq!(parser.current_object(), Some("Other"));
        assert_eq!(parser.depth(), 1);

        let mut parser = TdfParser::new(SIMPLE);
        assert_eq!(parser.skip_to_next_object().as_deref(), Some("Root"));
        assert_eq!(parser.skip_to_next_object().as_deref(), Some("Child"));
        parser.skip_object();
        assert_eq!(parser.current_objects(), ["Root".to_string()]);
        // Root has no more children
        assert_eq!(parser.skip_to_next_object(), None);
        assert_eq!(parser.depth(), 0);
        assert!(!parser.skip_to_object("Missing"));
    }

    #[test]
    fn test_for_each_property_stays_at_depth() {
        let mut parser = TdfParser::new(SIMPLE);
        parser.skip_to_object("Root");

        let mut seen = Vec::new();
        parser.for_each_property(|key, value| seen.push(format!("{key}={value}")));

        assert_eq!(seen, ["Full Name=Simple  Unit", "Count=3"]);
        assert_eq!(parser.depth(), 0);
    }

    #[test]
    fn test_extract_object_normalizes_keys() {
        let mut parser = TdfParser::new(SIMPLE);
        parser.skip_to_object("Root");
        let root = parser.extract_object(true);

        assert_eq!(root.property("full name"), Some("Simple  Unit"));
        assert!(root.object("Child").is_some());
        assert_eq!(parser.depth(), 0);
        assert_eq!(parser.skip_to_next_object().as_deref(), Some("Other"));
    }
}
