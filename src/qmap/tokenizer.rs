//! Splits map source text into positioned tokens. Knows nothing about the grammar or dialects.

use std::borrow::Cow;

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TokenKind {
	#[strum(serialize = "`{{`")]
	BraceOpen,
	#[strum(serialize = "`}}`")]
	BraceClose,
	#[strum(serialize = "`(`")]
	ParenOpen,
	#[strum(serialize = "`)`")]
	ParenClose,
	#[strum(serialize = "`[`")]
	BracketOpen,
	#[strum(serialize = "`]`")]
	BracketClose,
	#[strum(serialize = "string")]
	String,
	#[strum(serialize = "number")]
	Number,
	/// Anything unquoted that isn't a number or a delimiter, such as material names.
	#[strum(serialize = "word")]
	Word,
	#[strum(serialize = "comment")]
	Comment,
	/// An unterminated string. The text is what was read before giving up.
	#[strum(serialize = "unterminated string")]
	Error,
	#[strum(serialize = "end of file")]
	Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
	pub kind: TokenKind,
	/// For strings, the unescaped contents without quotes. For comments, the text after `//`.
	pub text: Cow<'a, str>,
	pub location: FileLocation,
}
impl Token<'_> {
	pub fn number(&self) -> Option<f64> {
		match self.kind {
			TokenKind::Number => self.text.parse().ok(),
			_ => None,
		}
	}

	/// Describes the token for error messages.
	pub fn describe(&self) -> String {
		match self.kind {
			TokenKind::String => format!("string \"{}\"", self.text),
			TokenKind::Number | TokenKind::Word => format!("{} `{}`", self.kind, self.text),
			_ => self.kind.to_string(),
		}
	}
}

/// A saved tokenizer position, see [`Tokenizer::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerState {
	offset: usize,
	location: FileLocation,
}

/// Lazily produces [`Token`]s from a string. Cheap to snapshot and rewind, which is how the parser does lookahead.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
	source: &'a str,
	offset: usize,
	location: FileLocation,
}

impl<'a> Tokenizer<'a> {
	pub fn new(source: &'a str) -> Self {
		Self {
			source,
			offset: 0,
			location: FileLocation::new(1, 1),
		}
	}

	/// The location of the next character to be read.
	pub fn location(&self) -> FileLocation {
		self.location
	}

	pub fn snapshot(&self) -> TokenizerState {
		TokenizerState {
			offset: self.offset,
			location: self.location,
		}
	}

	pub fn restore(&mut self, state: TokenizerState) {
		self.offset = state.offset;
		self.location = state.location;
	}

	fn remaining(&self) -> &'a str {
		&self.source[self.offset..]
	}

	fn peek_char(&self) -> Option<char> {
		self.remaining().chars().next()
	}

	fn peek_second_char(&self) -> Option<char> {
		self.remaining().chars().nth(1)
	}

	fn advance(&mut self) -> Option<char> {
		let c = self.peek_char()?;
		self.offset += c.len_utf8();
		if c == '\n' {
			self.location.line += 1;
			self.location.column = 1;
		} else {
			self.location.column += 1;
		}
		Some(c)
	}

	fn skip_whitespace(&mut self) {
		while self.peek_char().is_some_and(char::is_whitespace) {
			self.advance();
		}
	}

	fn token(&self, kind: TokenKind, text: impl Into<Cow<'a, str>>, location: FileLocation) -> Token<'a> {
		Token {
			kind,
			text: text.into(),
			location,
		}
	}

	/// Reads the next token, including comments.
	pub fn next_token(&mut self) -> Token<'a> {
		self.skip_whitespace();

		let location = self.location;
		let start = self.offset;

		let Some(c) = self.peek_char() else {
			return self.token(TokenKind::Eof, "", location);
		};

		let single = match c {
			'(' => Some(TokenKind::ParenOpen),
			')' => Some(TokenKind::ParenClose),
			'[' => Some(TokenKind::BracketOpen),
			']' => Some(TokenKind::BracketClose),
			// Half-Life masked textures start with `{`, so braces only stand alone when followed by whitespace.
			'{' if self.peek_second_char().is_none_or(char::is_whitespace) => Some(TokenKind::BraceOpen),
			'}' if self.peek_second_char().is_none_or(char::is_whitespace) => Some(TokenKind::BraceClose),
			_ => None,
		};
		if let Some(kind) = single {
			self.advance();
			return self.token(kind, &self.source[start..self.offset], location);
		}

		if c == '/' && self.peek_second_char() == Some('/') {
			while self.peek_char().is_some_and(|c| c != '\n') {
				self.advance();
			}
			return self.token(TokenKind::Comment, self.source[start + 2..self.offset].trim(), location);
		}

		if c == '"' {
			return self.read_string(location);
		}

		while self.peek_char().is_some_and(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '"')) {
			self.advance();
		}
		let text = &self.source[start..self.offset];
		let kind = if is_number(text) { TokenKind::Number } else { TokenKind::Word };

		self.token(kind, text, location)
	}

	fn read_string(&mut self, location: FileLocation) -> Token<'a> {
		self.advance(); // Opening quote
		let content_start = self.offset;
		// Only allocated once an escape sequence shows up.
		let mut unescaped: Option<String> = None;

		loop {
			let segment_end = self.offset;
			match self.peek_char() {
				None | Some('\n') => {
					let text = &self.source[content_start..self.offset];
					return self.token(TokenKind::Error, text, location);
				}
				Some('"') => {
					self.advance();
					let text = match unescaped {
						Some(s) => Cow::Owned(s),
						None => Cow::Borrowed(&self.source[content_start..segment_end]),
					};
					return self.token(TokenKind::String, text, location);
				}
				Some('\\') if matches!(self.peek_second_char(), Some('"' | '\\')) => {
					let s = unescaped.get_or_insert_with(|| self.source[content_start..segment_end].to_string());
					self.advance();
					if let Some(escaped) = self.advance() {
						s.push(escaped);
					}
				}
				Some(c) => {
					self.advance();
					if let Some(s) = &mut unescaped {
						s.push(c);
					}
				}
			}
		}
	}

	/// Reads the next token that isn't a comment.
	pub fn next_significant(&mut self) -> Token<'a> {
		loop {
			let token = self.next_token();
			if token.kind != TokenKind::Comment {
				return token;
			}
		}
	}

	/// Returns what [`next_significant`](Self::next_significant) would, without consuming it.
	pub fn peek_significant(&mut self) -> Token<'a> {
		let state = self.snapshot();
		let token = self.next_significant();
		self.restore(state);
		token
	}
}

impl<'a> Iterator for Tokenizer<'a> {
	type Item = Token<'a>;

	/// Yields every token including comments, stopping before [`TokenKind::Eof`].
	fn next(&mut self) -> Option<Self::Item> {
		let token = self.next_token();
		(token.kind != TokenKind::Eof).then_some(token)
	}
}

fn is_number(text: &str) -> bool {
	// Rejects `inf`, `nan` and friends, which `f64::from_str` would happily accept.
	text.chars().any(|c| c.is_ascii_digit())
		&& text.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
		&& text.parse::<f64>().is_ok()
}

/// Escapes a string for writing between double quotes.
///
/// Backslashes are only doubled where they'd otherwise read back as an escape. Quoted strings can't span lines,
/// so line breaks are written as `\n`, which Quake engines display as a line break.
pub fn escape_string(s: &str) -> Cow<'_, str> {
	if !s.contains(['"', '\\', '\n']) {
		return Cow::Borrowed(s);
	}
	let mut out = String::with_capacity(s.len() + 2);
	let mut chars = s.chars().peekable();
	while let Some(c) = chars.next() {
		match c {
			'"' => out.push_str("\\\""),
			'\\' if matches!(chars.peek(), None | Some('"' | '\\')) => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			c => out.push(c),
		}
	}
	Cow::Owned(out)
}
