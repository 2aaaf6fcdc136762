//! Static reader for top-level literal assignments in Python scripts.
//!
//! Only `NAME = <literal>` statements at column zero and the module
//! docstring are recognized. Nothing is evaluated: any value that is not a
//! plain literal (calls, names, f-strings, arithmetic) is treated as absent.

use std::collections::BTreeMap;

/// A Python literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Integers, or strings holding an integer.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(i) => u32::try_from(*i).ok(),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// A string, or a list of strings.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            Self::Str(s) => Some(vec![s.clone()]),
            Self::List(items) => items
                .iter()
                .map(|i| i.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// A dict with string keys and string values.
    pub fn as_string_map(&self) -> Option<BTreeMap<String, String>> {
        let Self::Dict(entries) = self else {
            return None;
        };
        entries
            .iter()
            .map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect()
    }
}

/// Literals found in one script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptLiterals {
    pub docstring: Option<String>,
    pub assignments: BTreeMap<String, Literal>,
}

impl ScriptLiterals {
    pub fn get(&self, name: &str) -> Option<&Literal> {
        self.assignments.get(name)
    }
}

/// Scan `source` for the module docstring and top-level literal assignments.
pub fn read_literals(source: &str) -> ScriptLiterals {
    let mut scanner = Scanner::new(source);
    let mut out = ScriptLiterals::default();
    let mut first = true;

    loop {
        scanner.skip_blank_lines();
        if scanner.eof() {
            break;
        }
        let start = scanner.pos;
        scanner.depth = 0;

        if scanner.peek().is_some_and(|c| c == ' ' || c == '\t') {
            // Indented: not top-level.
        } else if first && scanner.at_string_start() {
            if let Some((doc, false)) = scanner.parse_string()
                && scanner.at_statement_end()
            {
                out.docstring = Some(clean_docstring(&doc));
            }
        } else if let Some(name) = scanner.parse_identifier() {
            scanner.skip_inline_ws();
            if scanner.peek() == Some('=') && scanner.peek_at(1) != Some('=') {
                scanner.pos += 1;
                scanner.skip_inline_ws();
                if let Some(value) = scanner.parse_value()
                    && scanner.at_statement_end()
                {
                    out.assignments.insert(name, value);
                }
            }
        }

        first = false;
        scanner.pos = start;
        scanner.skip_statement();
    }

    out
}

/// Strip common indentation and surrounding blank lines.
fn clean_docstring(doc: &str) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.trim()
            } else {
                l.get(indent..).unwrap_or_else(|| l.trim_start()).trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    /// Open brackets around the value being parsed.
    depth: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Skip empty lines and comment-only lines.
    fn skip_blank_lines(&mut self) {
        loop {
            let line_start = self.pos;
            self.skip_inline_ws();
            match self.peek() {
                Some('\n' | '\r') => self.pos += 1,
                Some('#') => self.skip_to_line_end(),
                None => return,
                Some(_) => {
                    self.pos = line_start;
                    return;
                },
            }
        }
    }

    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Spaces, tabs and backslash line continuations.
    fn skip_inline_ws(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t') => self.pos += 1,
                Some('\\') if matches!(self.peek_at(1), Some('\n')) => self.pos += 2,
                Some('\\') if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.pos += 3;
                },
                _ => return,
            }
        }
    }

    /// Any whitespace including newlines and comments (inside brackets).
    fn skip_any_ws(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('\\') => self.pos += 1,
                Some('#') => self.skip_to_line_end(),
                _ => return,
            }
        }
    }

    fn at_statement_end(&mut self) -> bool {
        self.skip_inline_ws();
        matches!(self.peek(), None | Some('\n' | '\r' | '#' | ';'))
    }

    /// Consume one logical line, honoring strings and open brackets.
    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\n' if depth == 0 => {
                    self.pos += 1;
                    return;
                },
                '#' => self.skip_to_line_end(),
                '\\' => self.pos += 2,
                '(' | '[' | '{' => {
                    depth += 1;
                    self.pos += 1;
                },
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                },
                _ if self.at_string_start() => {
                    if self.parse_string().is_none() {
                        // Unterminated string: give up on the rest of the file.
                        self.pos = self.chars.len();
                    }
                },
                _ => self.pos += 1,
            }
        }
    }

    fn parse_identifier(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => self.pos += 1,
            _ => return None,
        }
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    /// Length of a string prefix (`r`, `b`, `u`, `f`, `rb`, ...) at the cursor
    /// if it is followed by a quote.
    fn string_prefix_len(&self) -> Option<usize> {
        let mut len = 0;
        while len < 2 {
            match self.peek_at(len) {
                Some('r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F') => len += 1,
                _ => break,
            }
        }
        matches!(self.peek_at(len), Some('\'' | '"')).then_some(len)
    }

    fn at_string_start(&self) -> bool {
        self.string_prefix_len().is_some()
    }

    /// Parse one string literal. Returns the text and whether it was an
    /// f-string, or `None` when unterminated.
    fn parse_string(&mut self) -> Option<(String, bool)> {
        let prefix_len = self.string_prefix_len()?;
        let prefix: String = self.chars[self.pos..self.pos + prefix_len]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();
        self.pos += prefix_len;
        let raw = prefix.contains('r');
        let formatted = prefix.contains('f');

        let quote = self.peek()?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let c = self.peek()?;
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' && !triple {
                return None;
            }
            if c == '\\' {
                let next = self.peek_at(1)?;
                self.pos += 2;
                if raw {
                    text.push('\\');
                    text.push(next);
                    continue;
                }
                match next {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    '\\' | '\'' | '"' => text.push(next),
                    '\n' => {},
                    other => {
                        text.push('\\');
                        text.push(other);
                    },
                }
                continue;
            }
            text.push(c);
            self.pos += 1;
        }
        Some((text, formatted))
    }

    fn parse_value(&mut self) -> Option<Literal> {
        match self.peek()? {
            '[' => self.parse_sequence(']').map(Literal::List),
            '(' => self.parse_parenthesized(),
            '{' => self.parse_dict(),
            '-' | '+' => {
                let negative = self.peek() == Some('-');
                self.pos += 1;
                self.skip_inline_ws();
                match self.parse_number()? {
                    Literal::Int(i) if negative => Some(Literal::Int(-i)),
                    Literal::Float(f) if negative => Some(Literal::Float(-f)),
                    other => Some(other),
                }
            },
            c if c.is_ascii_digit() || c == '.' => self.parse_number(),
            _ if self.at_string_start() => self.parse_joined_strings(),
            _ => {
                let word = self.parse_identifier()?;
                match word.as_str() {
                    "True" => Some(Literal::Bool(true)),
                    "False" => Some(Literal::Bool(false)),
                    "None" => Some(Literal::None),
                    _ => None,
                }
            },
        }
    }

    /// `"a" "b"` and `("a"\n "b")` concatenation.
    fn parse_joined_strings(&mut self) -> Option<Literal> {
        let mut joined = String::new();
        loop {
            let (text, formatted) = self.parse_string()?;
            if formatted {
                return None;
            }
            joined.push_str(&text);
            let save = self.pos;
            if self.depth > 0 {
                self.skip_any_ws();
            } else {
                self.skip_inline_ws();
            }
            if !self.at_string_start() {
                self.pos = save;
                return Some(Literal::Str(joined));
            }
        }
    }

    fn parse_number(&mut self) -> Option<Literal> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16).ok().map(Literal::Int);
        }
        text.parse::<i64>()
            .map(Literal::Int)
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(Literal::Float))
    }

    /// `(x)` is `x`; `()`, `(x,)` and `(x, y)` are tuples.
    fn parse_parenthesized(&mut self) -> Option<Literal> {
        self.pos += 1;
        self.depth += 1;
        self.skip_any_ws();
        if self.peek()? == ')' {
            self.pos += 1;
            self.depth -= 1;
            return Some(Literal::List(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_any_ws();
        match self.peek()? {
            ')' => {
                self.pos += 1;
                self.depth -= 1;
                Some(first)
            },
            ',' => {
                self.pos += 1;
                let mut items = vec![first];
                items.extend(self.parse_items(')')?);
                Some(Literal::List(items))
            },
            _ => None,
        }
    }

    fn parse_sequence(&mut self, close: char) -> Option<Vec<Literal>> {
        self.pos += 1;
        self.depth += 1;
        self.parse_items(close)
    }

    /// Comma-separated values up to `close`; leaves the bracket depth restored.
    fn parse_items(&mut self, close: char) -> Option<Vec<Literal>> {
        let mut items = Vec::new();
        loop {
            self.skip_any_ws();
            if self.peek()? == close {
                self.pos += 1;
                self.depth -= 1;
                return Some(items);
            }
            items.push(self.parse_value()?);
            self.skip_any_ws();
            match self.peek()? {
                ',' => self.pos += 1,
                c if c == close => {},
                _ => return None,
            }
        }
    }

    fn parse_dict(&mut self) -> Option<Literal> {
        self.pos += 1;
        self.depth += 1;
        let mut entries = Vec::new();
        loop {
            self.skip_any_ws();
            if self.peek()? == '}' {
                self.pos += 1;
                self.depth -= 1;
                return Some(Literal::Dict(entries));
            }
            let key = self.parse_value()?;
            self.skip_any_ws();
            if self.peek()? != ':' {
                return None;
            }
            self.pos += 1;
            self.skip_any_ws();
            let value = self.parse_value()?;
            entries.push((key, value));
            self.skip_any_ws();
            match self.peek()? {
                ',' => self.pos += 1,
                '}' => {},
                _ => return None,
            }
        }
    }
}
