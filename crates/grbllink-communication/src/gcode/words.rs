//! G-code word tokenizer
//!
//! Splits a block into letter/value words. Spans index into the
//! comment-stripped text so callers can splice words out without
//! reformatting the rest of the line.

use grbllink_core::GcodeError;
use std::ops::Range;

/// One `letter value` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// Upper-case letter
    pub letter: char,
    /// Numeric value
    pub value: f64,
    /// Byte range in the comment-stripped text
    pub span: Range<usize>,
}

impl Word {
    /// `G<code>` with `code` compared to a tenth (so `G92.1` is not `G92`)
    pub fn is_g(&self, code: f64) -> bool {
        self.letter == 'G' && (self.value - code).abs() < 0.05
    }

    /// `M<code>`
    pub fn is_m(&self, code: f64) -> bool {
        self.letter == 'M' && (self.value - code).abs() < 0.05
    }
}

/// A tokenized block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Text with comments removed and whitespace trimmed
    pub text: String,
    /// Words in order of appearance
    pub words: Vec<Word>,
}

impl Block {
    /// Tokenize one line of G-code
    pub fn parse(line: &str) -> Result<Self, GcodeError> {
        let text = strip_comments(line);
        let words = tokenize(&text).map_err(|word| GcodeError::InvalidWord {
            line: line.trim().to_string(),
            word,
        })?;
        Ok(Self { text, words })
    }

    /// First word with this letter
    pub fn word(&self, letter: char) -> Option<&Word> {
        self.words.iter().find(|w| w.letter == letter)
    }

    /// Value of the first word with this letter
    pub fn value(&self, letter: char) -> Option<f64> {
        self.word(letter).map(|w| w.value)
    }

    pub fn has(&self, letter: char) -> bool {
        self.word(letter).is_some()
    }

    pub fn has_g(&self, code: f64) -> bool {
        self.words.iter().any(|w| w.is_g(code))
    }

    pub fn has_m(&self, code: f64) -> bool {
        self.words.iter().any(|w| w.is_m(code))
    }

    /// Text with the given word removed and whitespace collapsed
    pub fn without(&self, word: &Word) -> String {
        let mut out = String::with_capacity(self.text.len());
        out.push_str(&self.text[..word.span.start]);
        out.push(' ');
        out.push_str(&self.text[word.span.end..]);
        out.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Remove `( ... )` and `; ...` comments
pub fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            ';' if depth == 0 => break,
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Tokenize comment-free text; the error carries the offending word
fn tokenize(text: &str) -> Result<Vec<Word>, String> {
    let bytes = text.as_bytes();
    let mut words = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            return Err(c.to_string());
        }

        let start = i;
        i += 1;
        while i < bytes.len() && (bytes[i] as char).is_ascii_whitespace() {
            i += 1;
        }
        let number_start = i;
        while i < bytes.len() && matches!(bytes[i], b'0'..=b'9' | b'.' | b'+' | b'-') {
            i += 1;
        }

        let number = &text[number_start..i];
        let value = number
            .parse::<f64>()
            .map_err(|_| text[start..i].trim().to_string())?;
        words.push(Word {
            letter: c.to_ascii_uppercase(),
            value,
            span: start..i,
        });
    }

    Ok(words)
}

/// Format a value for output: four decimals, trailing zeros trimmed
pub fn format_number(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
