//! The textual dialects of the `.map` format.

use qmap::tokenizer::{TokenKind, Tokenizer};

use crate::*;

/// Which numeric layout brush face lines use, and what optional blocks a document may contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::EnumIter)]
pub enum MapFormat {
	/// Original Quake: `( p1 ) ( p2 ) ( p3 ) material xoff yoff rot xscale yscale`
	Standard,
	/// Standard plus surface contents, flags and value.
	Quake2,
	#[strum(serialize = "Quake2 (Valve)")]
	Quake2Valve,
	/// Explicit texture axes: `( p1 ) ( p2 ) ( p3 ) material [ ux uy uz uoff ] [ vx vy vz voff ] rot xscale yscale`
	#[default]
	Valve,
	/// Quake2 face lines and `patchDef2` blocks.
	Quake3,
	#[strum(serialize = "Quake3 (Valve)")]
	Quake3Valve,
	#[strum(serialize = "Quake3 (legacy)")]
	Quake3Legacy,
	/// Standard plus one trailing value that is read and discarded.
	Hexen2,
	/// Quake2 plus an optional `r g b` face color.
	Daikatana,
}

impl MapFormat {
	/// Whether face lines carry explicit texture axes instead of deriving them from the face normal.
	pub fn is_valve(self) -> bool {
		matches!(self, Self::Valve | Self::Quake2Valve | Self::Quake3Valve)
	}

	/// Whether face lines carry surface contents, flags and value.
	pub fn has_surface_attributes(self) -> bool {
		matches!(
			self,
			Self::Quake2 | Self::Quake2Valve | Self::Quake3 | Self::Quake3Valve | Self::Quake3Legacy | Self::Daikatana
		)
	}

	pub fn has_color(self) -> bool {
		self == Self::Daikatana
	}

	pub fn supports_patches(self) -> bool {
		matches!(self, Self::Quake3 | Self::Quake3Valve | Self::Quake3Legacy)
	}

	/// The format named by a `// Format:` comment near the top of `text`, as TrenchBroom writes it.
	pub fn from_header(text: &str) -> Option<Self> {
		text.lines()
			.take(16)
			.filter_map(|line| line.trim().strip_prefix("// Format:"))
			.find_map(|name| name.trim().parse().ok())
	}

	/// Tries to figure out which format `text` is written in.
	///
	/// Looks for the `// Format:` header comment written by TrenchBroom first, then at the layout of the first brush face.
	///
	/// Optional face fields make this a guess: a Quake 2 document whose first face has no surface attributes looks like
	/// [`Standard`](Self::Standard). [`MapReader::parse_any`] confirms the guess by parsing.
	pub fn detect(text: &str) -> Option<Self> {
		if let Some(format) = Self::from_header(text) {
			return Some(format);
		}

		let has_patches = text.contains("patchDef2");
		let mut tokenizer = Tokenizer::new(text);

		loop {
			let token = tokenizer.next_significant();
			match token.kind {
				TokenKind::Eof => break,
				TokenKind::ParenOpen => {
					let restore = tokenizer.snapshot();
					if let Some(format) = Self::detect_face_line(&mut tokenizer, has_patches) {
						return Some(format);
					}
					tokenizer.restore(restore);
				}
				_ => {}
			}
		}

		has_patches.then_some(Self::Quake3)
	}

	/// Assumes the first `(` of a face line was just consumed.
	fn detect_face_line(tokenizer: &mut Tokenizer, has_patches: bool) -> Option<Self> {
		let line = tokenizer.location().line;

		for point in 0..3 {
			if point > 0 && tokenizer.next_significant().kind != TokenKind::ParenOpen {
				return None;
			}
			for _ in 0..3 {
				if tokenizer.next_significant().kind != TokenKind::Number {
					return None;
				}
			}
			if tokenizer.next_significant().kind != TokenKind::ParenClose {
				return None;
			}
		}

		// Material
		if !matches!(tokenizer.next_significant().kind, TokenKind::Word | TokenKind::String | TokenKind::Number) {
			return None;
		}

		let mut valve = false;
		let mut numbers = 0;

		loop {
			let restore = tokenizer.snapshot();
			let token = tokenizer.next_significant();
			if token.location.line != line {
				tokenizer.restore(restore);
				break;
			}
			match token.kind {
				TokenKind::Number => numbers += 1,
				TokenKind::BracketOpen => {
					valve = true;
					numbers = 0;
				}
				TokenKind::BracketClose => numbers = 0,
				_ => break,
			}
		}

		match (valve, numbers) {
			(true, 3) => Some(Self::Valve),
			(true, 6) if has_patches => Some(Self::Quake3Valve),
			(true, 6) => Some(Self::Quake2Valve),
			(false, 5) if has_patches => Some(Self::Quake3Legacy),
			(false, 5) => Some(Self::Standard),
			(false, 6) => Some(Self::Hexen2),
			(false, 8) if has_patches => Some(Self::Quake3),
			(false, 8) => Some(Self::Quake2),
			(false, 11) => Some(Self::Daikatana),
			_ => None,
		}
	}
}
