//! # Source Scanner
//!
//! A backtracking cursor over UTF-8 source text plus the primitive grammar
//! rules: trivia (whitespace and comments), integers, floats, rationals,
//! quoted and bare strings, boolean keywords and identifiers.
//!
//! Every rule follows the combinator discipline: on a match it consumes
//! input and returns `Some`, on a non-match it restores the cursor and
//! returns `None` so an enclosing alternative can try something else. Hard
//! errors that no alternative may recover (zero denominator, unterminated
//! string or block comment) are returned as `Err`.

use crate::error::{FilePos, PrepError};
use crate::numb::Numb;

/// Saved cursor state for backtracking.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pos: usize,
    line: usize,
    col: usize,
}

/// Cursor into one source document, tracking line and column.
pub struct Cursor<'a> {
    src: &'a str,
    file: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(file: &'a str, src: &'a str) -> Self {
        Self {
            src,
            file,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    pub fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
        self.col = mark.col;
    }

    pub fn filepos(&self) -> FilePos {
        FilePos::new(self.file, self.line, self.col)
    }

    pub fn syntax_error(&self, message: &str) -> PrepError {
        PrepError::Syntax {
            pos: self.filepos(),
            message: message.to_string(),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// Consume `s` if the input starts with it.
    pub fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            for _ in s.chars() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    /// Consume `c` if it is next.
    pub fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace, `//` line comments and `/- ... -/` block comments.
    /// Block comments nest; the balance of `/-`/`-/` pairs is tracked, not
    /// just the first close.
    pub fn skip_trivia(&mut self) -> Result<(), PrepError> {
        loop {
            if let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.bump();
                    continue;
                }
            }
            if self.starts_with("//") {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            if self.starts_with("/-") {
                let open = self.filepos();
                self.eat_str("/-");
                let mut depth = 1usize;
                while depth > 0 {
                    if self.at_end() {
                        return Err(PrepError::Syntax {
                            pos: open,
                            message: "unterminated block comment".to_string(),
                        });
                    }
                    if self.starts_with("/-") {
                        self.eat_str("/-");
                        depth += 1;
                    } else if self.starts_with("-/") {
                        self.eat_str("-/");
                        depth -= 1;
                    } else {
                        self.bump();
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    /// A run of decimal digits. Returns the slice, or `None` if the next
    /// character is not a digit.
    fn digits(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos > start {
            Some(&self.src[start..self.pos])
        } else {
            None
        }
    }

    fn sign(&mut self) -> i64 {
        if self.eat_char('-') {
            -1
        } else {
            self.eat_char('+');
            1
        }
    }

    /// A plain integer with optional sign.
    pub fn integer(&mut self) -> Option<i64> {
        let mark = self.mark();
        let sign = self.sign();
        match self.digits() {
            Some(d) => match d.parse::<i64>() {
                Ok(n) => Some(sign * n),
                Err(_) => {
                    self.reset(mark);
                    None
                }
            },
            None => {
                self.reset(mark);
                None
            }
        }
    }

    /// A rational literal: `N/D`, `N+P/D` or `N-P/D`. Plain `N` with no
    /// slash is left for the integer rule. A zero denominator is a hard
    /// error carrying the current position.
    pub fn rational(&mut self) -> Result<Option<Numb>, PrepError> {
        let mark = self.mark();
        let sign = self.sign();
        let whole = match self.digits().and_then(|d| d.parse::<i64>().ok()) {
            Some(n) => n,
            None => {
                self.reset(mark);
                return Ok(None);
            }
        };

        // N/D form
        if self.eat_char('/') {
            let den_pos = self.filepos();
            match self.digits().and_then(|d| d.parse::<i64>().ok()) {
                Some(den) => {
                    return match Numb::rational(sign * whole, den) {
                        Some(n) => Ok(Some(n)),
                        None => Err(PrepError::DivisionByZero { pos: den_pos }),
                    };
                }
                None => {
                    self.reset(mark);
                    return Ok(None);
                }
            }
        }

        // mixed forms N+P/D and N-P/D
        let part_sign = if self.eat_char('+') {
            1
        } else if self.eat_char('-') {
            -1
        } else {
            self.reset(mark);
            return Ok(None);
        };
        let num = match self.digits().and_then(|d| d.parse::<i64>().ok()) {
            Some(n) => n,
            None => {
                self.reset(mark);
                return Ok(None);
            }
        };
        if !self.eat_char('/') {
            // "N+P" without a slash is not a rational; give the whole text back
            self.reset(mark);
            return Ok(None);
        }
        let den_pos = self.filepos();
        let den = match self.digits().and_then(|d| d.parse::<i64>().ok()) {
            Some(d) => d,
            None => {
                self.reset(mark);
                return Ok(None);
            }
        };
        let part = match Numb::rational(part_sign * num, den) {
            Some(p) => p,
            None => return Err(PrepError::DivisionByZero { pos: den_pos }),
        };
        Ok(Some(Numb::Int(sign * whole) + part))
    }

    /// A strict float: requires a decimal point or exponent so it never
    /// shadows the integer rule.
    pub fn float(&mut self) -> Option<f64> {
        let mark = self.mark();
        let start = self.pos;
        self.sign();
        let int_digits = self.digits().is_some();
        let mut strict = false;
        if self.eat_char('.') {
            let frac_digits = self.digits().is_some();
            if !int_digits && !frac_digits {
                self.reset(mark);
                return None;
            }
            strict = true;
        } else if !int_digits {
            self.reset(mark);
            return None;
        }
        if self.peek() == Some('e') || self.peek() == Some('E') {
            let exp_mark = self.mark();
            self.bump();
            self.sign();
            if self.digits().is_some() {
                strict = true;
            } else {
                self.reset(exp_mark);
            }
        }
        if !strict {
            self.reset(mark);
            return None;
        }
        match self.src[start..self.pos].parse::<f64>() {
            Ok(x) => Some(x),
            Err(_) => {
                self.reset(mark);
                None
            }
        }
    }

    /// A number: ordered choice of rational, strict float, integer.
    /// The first alternative that matches wins.
    pub fn number(&mut self) -> Result<Option<Numb>, PrepError> {
        if let Some(n) = self.rational()? {
            return Ok(Some(n));
        }
        if let Some(x) = self.float() {
            return Ok(Some(Numb::Float(x)));
        }
        Ok(self.integer().map(Numb::Int))
    }

    /// A quoted string with backslash escapes. An unterminated string is a
    /// hard error at the opening quote.
    pub fn quoted_string(&mut self) -> Result<Option<String>, PrepError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Ok(None),
        };
        let open = self.filepos();
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(PrepError::Syntax {
                        pos: open,
                        message: "unterminated string".to_string(),
                    })
                }
                Some(c) if c == quote => return Ok(Some(out)),
                Some('\\') => match self.bump() {
                    None => {
                        return Err(PrepError::Syntax {
                            pos: open,
                            message: "unterminated string".to_string(),
                        })
                    }
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// An unquoted run of characters ended by whitespace, a comment start,
    /// or any character in `delims`. The delimiter set is caller-supplied
    /// because it depends on the enclosing construct.
    pub fn bare_string(&mut self, delims: &str) -> Option<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || delims.contains(c) {
                break;
            }
            if self.starts_with("//") || self.starts_with("/-") {
                break;
            }
            self.bump();
        }
        if self.pos > start {
            Some(self.src[start..self.pos].to_string())
        } else {
            None
        }
    }

    /// A string value: quoted, or bare with the given delimiter set.
    pub fn string_value(&mut self, delims: &str) -> Result<Option<String>, PrepError> {
        if let Some(s) = self.quoted_string()? {
            return Ok(Some(s));
        }
        Ok(self.bare_string(delims))
    }

    /// A boolean keyword. Case-insensitive, and the keyword must be
    /// followed by a non-alphanumeric boundary so `yes` does not match the
    /// start of `yesterday`.
    pub fn boolean(&mut self) -> Option<bool> {
        const TRUE_WORDS: [&str; 6] = ["true", "yes", "on", "y", "t", "1"];
        const FALSE_WORDS: [&str; 6] = ["false", "off", "no", "n", "f", "0"];
        let mark = self.mark();
        for (words, value) in [(TRUE_WORDS, true), (FALSE_WORDS, false)] {
            for word in words {
                if self.eat_keyword(word) {
                    return Some(value);
                }
                self.reset(mark);
            }
        }
        None
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let head = match rest.get(..word.len()) {
            Some(h) => h,
            None => return false,
        };
        if !head.eq_ignore_ascii_case(word) {
            return false;
        }
        if let Some(next) = rest[word.len()..].chars().next() {
            if next.is_alphanumeric() {
                return false;
            }
        }
        for _ in 0..word.len() {
            self.bump();
        }
        true
    }

    /// A setting or structure-field identifier.
    pub fn identifier(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.bump();
            }
            _ => return None,
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        Some(self.src[start..self.pos].to_string())
    }
}
