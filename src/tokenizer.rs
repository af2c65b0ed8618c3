//! Lexical analysis: turns KXI source text into a stream of tokens.
//!
//! The scanner works one physical line at a time and hands out tokens with a
//! single token of lookahead. Characters are first sorted into a handful of
//! classes and the scanner then greedily consumes runs of the same class.
//! Nothing here knows about the grammar beyond the fixed keyword set.

use std::fmt;
use std::str::Lines;

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Number,
  Character,
  Identifier,
  Punctuation,
  Keyword,
  Symbol,
  Unknown,
  Eof,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TokenKind::Number => "NUMBER",
      TokenKind::Character => "CHARACTER",
      TokenKind::Identifier => "IDENTIFIER",
      TokenKind::Punctuation => "PUNCTUATION",
      TokenKind::Keyword => "KEYWORDS",
      TokenKind::Symbol => "SYMBOLS",
      TokenKind::Unknown => "UNKNOWN",
      TokenKind::Eof => "EOF",
    };
    f.pad(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub line: usize,
  pub lexeme: String,
}

impl Token {
  pub fn new(kind: TokenKind, line: usize, lexeme: impl Into<String>) -> Self {
    Self {
      kind,
      line,
      lexeme: lexeme.into(),
    }
  }

  /// True when the token is the given keyword, symbol or punctuation.
  pub fn is(&self, text: &str) -> bool {
    matches!(
      self.kind,
      TokenKind::Keyword | TokenKind::Symbol | TokenKind::Punctuation
    ) && self.lexeme == text
  }

  pub fn is_eof(&self) -> bool {
    self.kind == TokenKind::Eof
  }
}

pub const KEYWORDS: &[&str] = &[
  "atoi",
  "and",
  "bool",
  "block",
  "break",
  "case",
  "class",
  "char",
  "cin",
  "cout",
  "default",
  "else",
  "false",
  "if",
  "int",
  "itoa",
  "kxi2019",
  "lock",
  "main",
  "new",
  "null",
  "object",
  "or",
  "public",
  "private",
  "protected",
  "return",
  "release",
  "string",
  "spawn",
  "sym",
  "set",
  "switch",
  "this",
  "true",
  "thread",
  "unprotected",
  "unlock",
  "void",
  "while",
  "wait",
];

const TWO_CHAR_SYMBOLS: &[&str] = &["&&", "||", "==", "!=", "<=", ">=", "<<", ">>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
  Whitespace,
  Digit,
  Letter,
  Apostrophe,
  Backslash,
  Slash,
  Exclamation,
  Symbol,
  Punctuation,
  Other,
}

fn classify(c: char) -> CharClass {
  match c {
    ' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c' => CharClass::Whitespace,
    '0'..='9' => CharClass::Digit,
    'a'..='z' | 'A'..='Z' => CharClass::Letter,
    '\'' => CharClass::Apostrophe,
    '\\' => CharClass::Backslash,
    '/' => CharClass::Slash,
    '!' => CharClass::Exclamation,
    '=' | '+' | '-' | '*' | '(' | ')' | '<' | '>' | '[' | ']' | '{' | '}' | '|' | '&' => {
      CharClass::Symbol
    }
    '.' | ',' | ';' | ':' => CharClass::Punctuation,
    _ => CharClass::Other,
  }
}

/// Line-buffered scanner with one token of lookahead.
pub struct Scanner<'a> {
  lines: Lines<'a>,
  buffer: Vec<char>,
  pos: usize,
  line: usize,
  exhausted: bool,
  peeked: Option<Token>,
}

impl<'a> Scanner<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      lines: source.lines(),
      buffer: Vec::new(),
      pos: 0,
      line: 0,
      exhausted: false,
      peeked: None,
    }
  }

  /// Next token, rejecting anything the character classes could not place.
  pub fn next(&mut self) -> CompileResult<Token> {
    let token = self.next_raw();
    reject_unknown(token)
  }

  /// Look at the upcoming token without consuming it.
  pub fn peek(&mut self) -> CompileResult<&Token> {
    if self.peeked.is_none() {
      let token = self.scan();
      self.peeked = Some(token);
    }
    match self.peeked.as_ref() {
      Some(token) if token.kind == TokenKind::Unknown => Err(CompileError::Lexical {
        line: token.line,
        lexeme: token.lexeme.clone(),
      }),
      Some(token) => Ok(token),
      None => Err(CompileError::internal("scanner lookahead vanished")),
    }
  }

  /// Next token including `Unknown` ones; used by the token listing.
  pub fn next_raw(&mut self) -> Token {
    match self.peeked.take() {
      Some(token) => token,
      None => self.scan(),
    }
  }

  fn fill_line(&mut self) -> bool {
    if self.exhausted {
      return false;
    }
    self.line += 1;
    match self.lines.next() {
      Some(text) => {
        self.buffer = text.chars().collect();
        self.pos = 0;
        true
      }
      None => {
        self.exhausted = true;
        false
      }
    }
  }

  fn at(&self, offset: usize) -> Option<char> {
    self.buffer.get(self.pos + offset).copied()
  }

  fn class_at(&self, offset: usize) -> Option<CharClass> {
    self.at(offset).map(classify)
  }

  fn take(&mut self, count: usize) -> String {
    let end = (self.pos + count).min(self.buffer.len());
    let text: String = self.buffer[self.pos..end].iter().collect();
    self.pos = end;
    text
  }

  fn take_while(&mut self, keep: impl Fn(CharClass) -> bool) -> String {
    let mut len = 0;
    while self.class_at(len).is_some_and(&keep) {
      len += 1;
    }
    self.take(len)
  }

  fn scan(&mut self) -> Token {
    loop {
      let Some(c) = self.at(0) else {
        if !self.fill_line() {
          return Token::new(TokenKind::Eof, self.line, "EOF");
        }
        continue;
      };

      let line = self.line;
      match classify(c) {
        CharClass::Whitespace => self.pos += 1,
        CharClass::Digit => {
          let text = self.take_while(|class| class == CharClass::Digit);
          return Token::new(TokenKind::Number, line, text);
        }
        CharClass::Letter => {
          let text = self.take_while(|class| matches!(class, CharClass::Digit | CharClass::Letter));
          let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword
          } else {
            TokenKind::Identifier
          };
          return Token::new(kind, line, text);
        }
        CharClass::Apostrophe => return self.scan_character(line),
        CharClass::Exclamation => {
          if self.at(1) == Some('=') {
            let text = self.take(2);
            return Token::new(TokenKind::Symbol, line, text);
          }
          let text = self.take(1);
          return Token::new(TokenKind::Unknown, line, text);
        }
        CharClass::Symbol => {
          if let Some(next) = self.at(1)
            && classify(next) == CharClass::Symbol
            && TWO_CHAR_SYMBOLS.contains(&format!("{c}{next}").as_str())
          {
            let text = self.take(2);
            return Token::new(TokenKind::Symbol, line, text);
          }
          let text = self.take(1);
          return Token::new(TokenKind::Symbol, line, text);
        }
        CharClass::Punctuation => {
          let text = self.take(1);
          return Token::new(TokenKind::Punctuation, line, text);
        }
        CharClass::Slash => {
          if self.class_at(1) == Some(CharClass::Slash) {
            // comment: drop the rest of the line
            self.pos = self.buffer.len();
            continue;
          }
          let text = self.take(1);
          return Token::new(TokenKind::Symbol, line, text);
        }
        CharClass::Backslash | CharClass::Other => {
          let text = self.take(1);
          return Token::new(TokenKind::Unknown, line, text);
        }
      }
    }
  }

  fn scan_character(&mut self, line: usize) -> Token {
    let escaped = self.class_at(1) == Some(CharClass::Backslash)
      && self.at(2) == Some('n')
      && self.class_at(3) == Some(CharClass::Apostrophe);
    if escaped {
      let text = self.take(4);
      return Token::new(TokenKind::Character, line, text);
    }

    let plain = self
      .class_at(1)
      .is_some_and(|class| !matches!(class, CharClass::Apostrophe | CharClass::Backslash))
      && self.class_at(2) == Some(CharClass::Apostrophe);
    if plain {
      let text = self.take(3);
      return Token::new(TokenKind::Character, line, text);
    }

    let text = self.take(1);
    Token::new(TokenKind::Unknown, line, text)
  }
}

fn reject_unknown(token: Token) -> CompileResult<Token> {
  if token.kind == TokenKind::Unknown {
    return Err(CompileError::Lexical {
      line: token.line,
      lexeme: token.lexeme,
    });
  }
  Ok(token)
}

/// Lex the whole input into a vector terminated by an `Eof` token.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
  let mut scanner = Scanner::new(source);
  let mut tokens = Vec::new();
  loop {
    let token = scanner.next()?;
    let done = token.is_eof();
    tokens.push(token);
    if done {
      return Ok(tokens);
    }
  }
}

/// Token listing in the `<line> : <KIND> <lexeme>` layout, Unknown tokens
/// included.
pub fn token_listing(source: &str) -> String {
  let mut scanner = Scanner::new(source);
  let mut out = String::new();
  loop {
    let token = scanner.next_raw();
    out.push_str(&format!("{} : \t{:<15}{}\n", token.line, token.kind, token.lexeme));
    if token.is_eof() {
      return out;
    }
  }
}

/// Numeric value of a character literal lexeme such as `'a'` or `'\n'`.
pub fn char_value(lexeme: &str) -> Option<u8> {
  match lexeme.as_bytes() {
    [b'\'', b'\\', b'n', b'\''] => Some(b'\n'),
    [b'\'', c, b'\''] => Some(*c),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lexemes(source: &str) -> Vec<(TokenKind, String)> {
    tokenize(source)
      .unwrap()
      .into_iter()
      .map(|t| (t.kind, t.lexeme))
      .collect()
  }

  #[test]
  fn classifies_basic_tokens() {
    let tokens = lexemes("int x1 = 42;");
    assert_eq!(
      tokens,
      vec![
        (TokenKind::Keyword, "int".to_string()),
        (TokenKind::Identifier, "x1".to_string()),
        (TokenKind::Symbol, "=".to_string()),
        (TokenKind::Number, "42".to_string()),
        (TokenKind::Punctuation, ";".to_string()),
        (TokenKind::Eof, "EOF".to_string()),
      ]
    );
  }

  #[test]
  fn two_character_symbols_are_greedy() {
    let tokens = lexemes("a<=b && c!=d || e == f << >> >= <");
    let symbols: Vec<_> = tokens
      .iter()
      .filter(|(kind, _)| *kind == TokenKind::Symbol)
      .map(|(_, text)| text.as_str())
      .collect();
    assert_eq!(symbols, vec!["<=", "&&", "!=", "||", "==", "<<", ">>", ">=", "<"]);
  }

  #[test]
  fn symbol_pairs_outside_the_set_split() {
    let tokens = lexemes("(-)");
    let symbols: Vec<_> = tokens.iter().map(|(_, text)| text.as_str()).collect();
    assert_eq!(symbols, vec!["(", "-", ")", "EOF"]);
  }

  #[test]
  fn character_literals() {
    let tokens = lexemes("'a' '\\n' '1'");
    assert_eq!(tokens[0], (TokenKind::Character, "'a'".to_string()));
    assert_eq!(tokens[1], (TokenKind::Character, "'\\n'".to_string()));
    assert_eq!(tokens[2], (TokenKind::Character, "'1'".to_string()));
    assert_eq!(char_value("'\\n'"), Some(10));
    assert_eq!(char_value("'a'"), Some(97));
  }

  #[test]
  fn comments_are_discarded_and_lines_counted() {
    let tokens = tokenize("a // b c\n/ d\n").unwrap();
    assert_eq!(tokens[0].lexeme, "a");
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[1].lexeme, "/");
    assert_eq!(tokens[1].line, 2);
    assert_eq!(tokens[2].lexeme, "d");
    assert!(tokens[3].is_eof());
    assert_eq!(tokens[3].line, 3);
  }

  #[test]
  fn lone_bang_is_a_lexical_error() {
    let err = tokenize("x = !y;").unwrap_err();
    assert_eq!(err.to_string(), "1: Unknown token !");
  }

  #[test]
  fn bad_character_literal_is_a_lexical_error() {
    let err = tokenize("c = '';").unwrap_err();
    assert!(matches!(err, CompileError::Lexical { .. }));
  }

  #[test]
  fn peek_does_not_consume() {
    let mut scanner = Scanner::new("class A");
    assert_eq!(scanner.peek().unwrap().lexeme, "class");
    assert_eq!(scanner.next().unwrap().lexeme, "class");
    assert_eq!(scanner.next().unwrap().lexeme, "A");
    assert!(scanner.next().unwrap().is_eof());
    assert!(scanner.next().unwrap().is_eof());
  }

  #[test]
  fn listing_names_kinds_in_a_fixed_column() {
    let listing = token_listing("class =");
    assert_eq!(listing, "1 : \tKEYWORDS       class\n1 : \tSYMBOLS        =\n2 : \tEOF            EOF\n");
  }

  #[test]
  fn listing_keeps_unknown_tokens() {
    let listing = token_listing("a @");
    assert!(listing.contains("UNKNOWN"));
    assert!(listing.contains("@"));
  }

  #[test]
  fn two_scanners_agree() {
    let source = "class A { public int x; }\nvoid kxi2019 main() { cout << 'x'; }";
    assert_eq!(tokenize(source).unwrap(), tokenize(source).unwrap());
  }
}
