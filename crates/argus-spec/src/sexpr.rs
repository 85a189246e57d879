//! S-expression reader for JDWP protocol spec text.
//!
//! The published spec is a flat sequence of parenthesized forms made of bare
//! tokens and double-quoted descriptive strings. Adjacent string literals
//! concatenate (the spec wraps long descriptions across lines); the model
//! layer discards them, but the reader keeps them so callers can decide.

use crate::ParseError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sexpr {
    /// A bare token, e.g. `CommandSet`, `Version=1`, `int`.
    Token(String),
    /// One or more adjacent double-quoted literals, unescaped and joined.
    Literal(String),
    /// A parenthesized form.
    List(Vec<Sexpr>),
}

impl Sexpr {
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Sexpr::Token(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// The head token of a list form, if this is one.
    pub fn head(&self) -> Option<&str> {
        self.as_list().and_then(|items| items.first()?.as_token())
    }
}

/// Parses a complete spec text into its top-level forms.
pub fn parse(text: &str) -> Result<Vec<Sexpr>, ParseError> {
    let mut parser = Parser {
        chars: text.char_indices().peekable(),
        text,
    };
    let mut forms = Vec::new();
    while let Some(form) = parser.next_expr()? {
        forms.push(form);
    }
    Ok(forms)
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn next_expr(&mut self) -> Result<Option<Sexpr>, ParseError> {
        self.skip_whitespace();
        let Some(&(pos, ch)) = self.chars.peek() else {
            return Ok(None);
        };
        match ch {
            '(' => {
                self.chars.next();
                self.list(pos).map(Some)
            }
            ')' => Err(ParseError::UnbalancedParens { at: pos }),
            '"' => self.literal(pos).map(Some),
            _ => Ok(Some(self.token())),
        }
    }

    fn list(&mut self, open_at: usize) -> Result<Sexpr, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some(&(_, ')')) => {
                    self.chars.next();
                    return Ok(Sexpr::List(items));
                }
                Some(_) => {
                    let expr = self
                        .next_expr()?
                        .ok_or(ParseError::UnbalancedParens { at: open_at })?;
                    items.push(expr);
                }
                None => return Err(ParseError::UnbalancedParens { at: open_at }),
            }
        }
    }

    /// Reads one or more adjacent quoted literals as a single `Literal`.
    fn literal(&mut self, start: usize) -> Result<Sexpr, ParseError> {
        let mut joined = String::new();
        loop {
            let (open, _) = self.chars.next().expect("peeked quote");
            let mut closed = false;
            for (pos, ch) in self.chars.by_ref() {
                if ch == '"' {
                    joined.push_str(&self.text[open + 1..pos]);
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(ParseError::UnterminatedString { at: start });
            }
            self.skip_whitespace();
            match self.chars.peek() {
                Some(&(_, '"')) => continue,
                _ => return Ok(Sexpr::Literal(joined)),
            }
        }
    }

    fn token(&mut self) -> Sexpr {
        let mut token = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '"' {
                break;
            }
            token.push(ch);
            self.chars.next();
        }
        Sexpr::Token(token)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.chars.next();
        }
    }
}
