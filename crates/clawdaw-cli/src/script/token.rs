//! Line tokenizer and argument cursor.
//!
//! A line splits on whitespace into words; double quotes keep spaces
//! inside a word and `\"` / `\\` escape inside quotes. A word is a keyword
//! argument when it starts with an unquoted identifier followed by `=`.

use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use clawdaw_spec::CoreError;

struct Word {
    text: String,
    /// Whether the word opened with a quote.
    quoted: bool,
}

fn split_words(line: &str) -> Result<Vec<Word>, CoreError> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut text = String::new();
        let mut in_quotes = false;
        let quoted = first == '"';
        while let Some(&c) = chars.peek() {
            if !in_quotes && c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '"' => in_quotes = !in_quotes,
                '\\' if in_quotes => match chars.peek() {
                    Some(&next @ ('"' | '\\')) => {
                        chars.next();
                        text.push(next);
                    }
                    _ => text.push('\\'),
                },
                _ => text.push(c),
            }
        }
        if in_quotes {
            return Err(CoreError::syntax(format!("unterminated quote in: {}", line.trim())));
        }
        words.push(Word { text, quoted });
    }
    Ok(words)
}

fn keyword_split(word: &Word) -> Option<(&str, &str)> {
    if word.quoted {
        return None;
    }
    let (key, value) = word.text.split_once('=')?;
    let mut chars = key.chars();
    let head = chars.next()?;
    let ident = (head.is_ascii_alphabetic() || head == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    ident.then_some((key, value))
}

/// One tokenized command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub name: String,
    pub positional: Vec<String>,
    pub keyword: BTreeMap<String, String>,
}

impl Tokens {
    /// Tokenizes `line`. Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Tokens>, CoreError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        let mut words = split_words(trimmed)?.into_iter();
        let Some(head) = words.next() else {
            return Ok(None);
        };

        let mut positional = Vec::new();
        let mut keyword = BTreeMap::new();
        for word in words {
            match keyword_split(&word) {
                Some((key, value)) => {
                    let key = key.to_lowercase();
                    if keyword.contains_key(&key) {
                        return Err(CoreError::syntax(format!(
                            "option '{}' given twice to {}",
                            key, head.text
                        )));
                    }
                    keyword.insert(key, value.to_string());
                }
                None => positional.push(word.text),
            }
        }
        Ok(Some(Tokens {
            name: head.text.to_lowercase(),
            positional,
            keyword,
        }))
    }
}

/// Consuming cursor over a command's arguments.
///
/// Every argument must be consumed; [`Args::finish`] rejects leftovers so
/// misspelled options fail loudly instead of being ignored.
#[derive(Debug)]
pub struct Args {
    command: String,
    positional: VecDeque<String>,
    keyword: BTreeMap<String, String>,
}

impl Args {
    pub fn new(tokens: Tokens) -> Self {
        Self {
            command: tokens.name,
            positional: tokens.positional.into(),
            keyword: tokens.keyword,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn remaining_positional(&self) -> usize {
        self.positional.len()
    }

    pub fn peek(&self) -> Option<&str> {
        self.positional.front().map(String::as_str)
    }

    pub fn optional(&mut self) -> Option<String> {
        self.positional.pop_front()
    }

    pub fn required(&mut self, what: &str) -> Result<String, CoreError> {
        self.positional.pop_front().ok_or_else(|| {
            CoreError::syntax(format!("{} needs <{}>", self.command, what))
        })
    }

    pub fn required_as<T: FromStr>(&mut self, what: &str) -> Result<T, CoreError> {
        let text = self.required(what)?;
        self.convert(what, &text)
    }

    pub fn optional_as<T: FromStr>(&mut self, what: &str) -> Result<Option<T>, CoreError> {
        match self.optional() {
            Some(text) => self.convert(what, &text).map(Some),
            None => Ok(None),
        }
    }

    /// Removes a positional word equal to `flag`, wherever it is.
    pub fn flag(&mut self, flag: &str) -> bool {
        match self.positional.iter().position(|w| w.eq_ignore_ascii_case(flag)) {
            Some(i) => {
                self.positional.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn kw(&mut self, key: &str) -> Option<String> {
        self.keyword.remove(key)
    }

    pub fn kw_as<T: FromStr>(&mut self, key: &str) -> Result<Option<T>, CoreError> {
        match self.keyword.remove(key) {
            Some(text) => self.convert(key, &text).map(Some),
            None => Ok(None),
        }
    }

    pub fn kw_or<T: FromStr>(&mut self, key: &str, default: T) -> Result<T, CoreError> {
        Ok(self.kw_as(key)?.unwrap_or(default))
    }

    fn convert<T: FromStr>(&self, what: &str, text: &str) -> Result<T, CoreError> {
        text.trim().parse::<T>().map_err(|_| {
            CoreError::syntax(format!(
                "{}: invalid {} '{}'",
                self.command, what, text
            ))
        })
    }

    /// Fails if any argument was not consumed.
    pub fn finish(self) -> Result<(), CoreError> {
        if let Some(extra) = self.positional.front() {
            return Err(CoreError::syntax(format!(
                "{}: unexpected argument '{}'",
                self.command, extra
            )));
        }
        if let Some(key) = self.keyword.keys().next() {
            return Err(CoreError::syntax(format!(
                "{}: unknown option '{}'",
                self.command, key
            )));
        }
        Ok(())
    }
}

/// Parses `0/1`, `true/false`, `yes/no` and `on/off`.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
