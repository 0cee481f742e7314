//! Walks the token stream of a map document and reports its structure through [`MapParserCallback`].
//!
//! The grammar is shared by every dialect, only the numeric layout of face lines depends on the [`MapFormat`].
//! Errors never abort the walk: the offending block is reported and skipped, and parsing resumes at the next block.

use crate::*;
use qmap::tokenizer::{Token, TokenKind, Tokenizer};

/// Receives the structure of a document as it's parsed.
///
/// Brush callbacks for a block are only made once the whole block parsed successfully, a skipped brush leaves no trace.
pub trait MapParserCallback {
	fn on_begin_entity(&mut self, location: FileLocation, properties: Vec<EntityProperty>, status: &dyn DiagnosticsSink);
	fn on_end_entity(&mut self, location: FileLocation, status: &dyn DiagnosticsSink);
	fn on_begin_brush(&mut self, location: FileLocation, status: &dyn DiagnosticsSink);
	fn on_end_brush(&mut self, location: FileLocation, status: &dyn DiagnosticsSink);
	fn on_standard_face(&mut self, location: FileLocation, points: [DVec3; 3], attributes: BrushFaceAttributes, status: &dyn DiagnosticsSink);
	fn on_valve_face(
		&mut self,
		location: FileLocation,
		points: [DVec3; 3],
		attributes: BrushFaceAttributes,
		u_axis: DVec3,
		v_axis: DVec3,
		status: &dyn DiagnosticsSink,
	);
	fn on_patch(
		&mut self,
		start: FileLocation,
		end: FileLocation,
		row_count: usize,
		column_count: usize,
		control_points: Vec<PatchPoint>,
		material_name: String,
		status: &dyn DiagnosticsSink,
	);
}

/// How a face's plane was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FacePlane {
	Points([DVec3; 3]),
	/// Normal and distance, for faces that don't come from a face line.
	Plane(BrushPlane),
}

/// Everything a face line says about a face, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDescriptor {
	pub location: FileLocation,
	pub plane: FacePlane,
	pub attributes: BrushFaceAttributes,
	/// Explicit texture axes, only in Valve dialects.
	pub uv_axes: Option<[DVec3; 2]>,
}
impl FaceDescriptor {
	fn report_to<C: MapParserCallback + ?Sized>(self, callback: &mut C, status: &dyn DiagnosticsSink) {
		let points = match self.plane {
			FacePlane::Points(points) => points,
			FacePlane::Plane(plane) => plane.points(),
		};
		match self.uv_axes {
			Some([u_axis, v_axis]) => callback.on_valve_face(self.location, points, self.attributes, u_axis, v_axis, status),
			None => callback.on_standard_face(self.location, points, self.attributes, status),
		}
	}
}

struct SyntaxError {
	kind: DiagnosticKind,
	location: FileLocation,
	message: String,
}
impl SyntaxError {
	fn structural(location: FileLocation, message: impl Into<String>) -> Self {
		Self {
			kind: DiagnosticKind::StructuralError,
			location,
			message: message.into(),
		}
	}

	/// Describes `token` appearing where `expected` should have been.
	fn unexpected(token: &Token, expected: &str) -> Self {
		match token.kind {
			TokenKind::Error => Self {
				kind: DiagnosticKind::LexError,
				location: token.location,
				message: format!("unterminated string \"{}\"", token.text),
			},
			_ => Self::structural(token.location, format!("expected {expected}, found {}", token.describe())),
		}
	}

	fn report(self, status: &dyn DiagnosticsSink) {
		match self.kind {
			DiagnosticKind::LexError => status.lex_error(self.location, self.message),
			_ => status.structural_error(self.location, self.message),
		}
	}
}

type ParseResult<T> = Result<T, SyntaxError>;

const PATCH_DEF: &str = "patchDef2";
/// Block keywords of other editors' extensions, recognized only to skip them cleanly.
const UNSUPPORTED_BLOCKS: &[&str] = &["brushDef", "brushDef3", "patchDef3"];

/// How an entity block ended.
enum EntityEnd {
	/// Closed by its `}`, or skipped.
	Done,
	/// Cut short by the `{` of another entity at this location, which the caller should parse next.
	Interrupted(FileLocation),
}

/// What a `{` opens, decided by the token after it.
enum BlockKind {
	Entity,
	Brush,
	Patch,
	Unsupported(String),
	Other,
}

pub struct MapParser<'a> {
	tokenizer: Tokenizer<'a>,
	format: MapFormat,
}

impl<'a> MapParser<'a> {
	pub fn new(source: &'a str, format: MapFormat) -> Self {
		Self {
			tokenizer: Tokenizer::new(source),
			format,
		}
	}

	pub fn format(&self) -> MapFormat {
		self.format
	}

	/// Parses a whole document: a sequence of entities. Brushes and patches outside of any entity are reported as orphans.
	pub fn parse_entities<C: MapParserCallback + ?Sized>(&mut self, callback: &mut C, status: &dyn DiagnosticsSink) {
		self.parse_top_level(callback, status, true);
	}

	/// Parses a bare sequence of brush and patch blocks.
	pub fn parse_brushes<C: MapParserCallback + ?Sized>(&mut self, callback: &mut C, status: &dyn DiagnosticsSink) {
		self.parse_top_level(callback, status, false);
	}

	/// Parses bare face lines, as copied from a brush.
	pub fn parse_brush_faces<C: MapParserCallback + ?Sized>(&mut self, callback: &mut C, status: &dyn DiagnosticsSink) {
		loop {
			let token = self.tokenizer.peek_significant();
			match token.kind {
				TokenKind::Eof => break,
				TokenKind::ParenOpen => match self.parse_face() {
					Ok(face) => face.report_to(callback, status),
					Err(err) => {
						err.report(status);
						self.skip_to_next_line_face(token.location.line);
					}
				},
				_ => {
					self.tokenizer.next_significant();
					SyntaxError::unexpected(&token, "face").report(status);
					self.skip_to_next_line_face(token.location.line);
				}
			}
		}
	}

	fn parse_top_level<C: MapParserCallback + ?Sized>(&mut self, callback: &mut C, status: &dyn DiagnosticsSink, entities: bool) {
		// Only the first of a run of unexpected tokens is reported.
		let mut in_garbage = false;

		loop {
			let token = self.tokenizer.next_significant();
			match token.kind {
				TokenKind::Eof => break,
				TokenKind::BraceOpen => {
					in_garbage = false;
					// `{ }` is an empty entity in documents, but an empty brush in brush lists.
					let kind = match self.peek_block_kind() {
						BlockKind::Brush if entities && self.tokenizer.peek_significant().kind == TokenKind::BraceClose => BlockKind::Entity,
						kind => kind,
					};
					match kind {
						BlockKind::Entity if entities => {
							let mut start = token.location;
							while let EntityEnd::Interrupted(next) = self.parse_entity(start, callback, status) {
								start = next;
							}
						}
						BlockKind::Brush => self.parse_brush(token.location, callback, status),
						BlockKind::Patch => self.parse_patch(token.location, 1, callback, status),
						BlockKind::Unsupported(keyword) => self.skip_unsupported(token.location, &keyword, 1, status),
						_ => {
							let next = self.tokenizer.peek_significant();
							SyntaxError::unexpected(&next, if entities { "entity, brush or patch" } else { "brush or patch" }).report(status);
							self.skip_block(1);
						}
					}
				}
				_ => {
					if !in_garbage {
						SyntaxError::unexpected(&token, "`{`").report(status);
					}
					in_garbage = true;
				}
			}
		}
	}

	/// Looks at the token after a `{` without consuming it.
	fn peek_block_kind(&mut self) -> BlockKind {
		let token = self.tokenizer.peek_significant();
		match token.kind {
			// A brush can legitimately be empty, it's rejected later when building.
			TokenKind::ParenOpen | TokenKind::BraceClose => BlockKind::Brush,
			TokenKind::String | TokenKind::BraceOpen => BlockKind::Entity,
			TokenKind::Word if token.text == PATCH_DEF => BlockKind::Patch,
			TokenKind::Word if UNSUPPORTED_BLOCKS.contains(&token.text.as_ref()) => BlockKind::Unsupported(token.text.into_owned()),
			_ => BlockKind::Other,
		}
	}

	/// Consumes tokens until `depth` braces have been closed, or the document ends.
	fn skip_block(&mut self, mut depth: usize) {
		while depth > 0 {
			match self.tokenizer.next_significant().kind {
				TokenKind::BraceOpen => depth += 1,
				TokenKind::BraceClose => depth -= 1,
				TokenKind::Eof => return,
				_ => {}
			}
		}
	}

	fn skip_unsupported(&mut self, location: FileLocation, keyword: &str, depth: usize, status: &dyn DiagnosticsSink) {
		SyntaxError::structural(location, format!("`{keyword}` blocks are not supported, skipping")).report(status);
		self.skip_block(depth);
	}

	/// Skips to the first `(` on a line after `line`.
	fn skip_to_next_line_face(&mut self, line: usize) {
		loop {
			let state = self.tokenizer.snapshot();
			let token = self.tokenizer.next_significant();
			match token.kind {
				TokenKind::Eof => return,
				TokenKind::ParenOpen if token.location.line > line => {
					self.tokenizer.restore(state);
					return;
				}
				_ => {}
			}
		}
	}

	/// Reads the next token, expecting `kind`. Braces and the end of the document are left unconsumed on a mismatch, so block skipping stays balanced.
	fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token<'a>> {
		let state = self.tokenizer.snapshot();
		let token = self.tokenizer.next_significant();
		if token.kind == kind {
			return Ok(token);
		}
		if matches!(token.kind, TokenKind::BraceOpen | TokenKind::BraceClose | TokenKind::Eof) {
			self.tokenizer.restore(state);
		}
		Err(SyntaxError::unexpected(&token, expected))
	}

	fn expect_number(&mut self) -> ParseResult<f64> {
		let token = self.expect(TokenKind::Number, "number")?;
		token
			.number()
			.ok_or_else(|| SyntaxError::structural(token.location, format!("invalid number `{}`", token.text)))
	}

	fn expect_count(&mut self) -> ParseResult<usize> {
		let location = self.tokenizer.peek_significant().location;
		let number = self.expect_number()?;
		if number < 0. || number.fract() != 0. || number > u32::MAX as f64 {
			return Err(SyntaxError::structural(location, format!("expected a count, found `{number}`")));
		}
		Ok(number as usize)
	}

	fn expect_numbers<const N: usize>(&mut self) -> ParseResult<[f64; N]> {
		let mut out = [0.; N];
		for value in &mut out {
			*value = self.expect_number()?;
		}
		Ok(out)
	}

	/// Material names are usually bare words, but may be quoted, or look like numbers.
	fn expect_material(&mut self) -> ParseResult<String> {
		let state = self.tokenizer.snapshot();
		let token = self.tokenizer.next_significant();
		match token.kind {
			TokenKind::Word | TokenKind::String | TokenKind::Number => Ok(token.text.into_owned()),
			_ => {
				if matches!(token.kind, TokenKind::BraceOpen | TokenKind::BraceClose | TokenKind::Eof) {
					self.tokenizer.restore(state);
				}
				Err(SyntaxError::unexpected(&token, "material name"))
			}
		}
	}

	fn next_is_number(&mut self) -> bool {
		self.tokenizer.peek_significant().kind == TokenKind::Number
	}

	/// Parses an entity, assuming its `{` was just consumed.
	fn parse_entity<C: MapParserCallback + ?Sized>(&mut self, start: FileLocation, callback: &mut C, status: &dyn DiagnosticsSink) -> EntityEnd {
		let mut properties = Vec::new();

		loop {
			let token = self.tokenizer.peek_significant();
			match token.kind {
				TokenKind::String => {
					self.tokenizer.next_significant();
					let value = self.tokenizer.peek_significant();
					match value.kind {
						TokenKind::String => {
							self.tokenizer.next_significant();
							properties.push(EntityProperty::new(token.text, value.text));
						}
						TokenKind::Error => {
							// Just this property is lost.
							self.tokenizer.next_significant();
							SyntaxError::unexpected(&value, "property value").report(status);
						}
						_ => {
							SyntaxError::structural(value.location, format!("expected value for property \"{}\", found {}", token.text, value.describe()))
								.report(status);
							self.skip_block(1);
							return EntityEnd::Done;
						}
					}
				}
				TokenKind::Error => {
					self.tokenizer.next_significant();
					SyntaxError::unexpected(&token, "property").report(status);
				}
				_ => break,
			}
		}

		callback.on_begin_entity(start, properties, status);

		loop {
			let token = self.tokenizer.next_significant();
			match token.kind {
				TokenKind::BraceClose => {
					callback.on_end_entity(token.location, status);
					return EntityEnd::Done;
				}
				TokenKind::BraceOpen => match self.peek_block_kind() {
					BlockKind::Brush => self.parse_brush(token.location, callback, status),
					BlockKind::Patch => self.parse_patch(token.location, 1, callback, status),
					BlockKind::Unsupported(keyword) => self.skip_unsupported(token.location, &keyword, 1, status),
					BlockKind::Entity => {
						// A missing `}`, the entity we're in ends here without ever being closed.
						SyntaxError::structural(start, "entity is not closed").report(status);
						return EntityEnd::Interrupted(token.location);
					}
					BlockKind::Other => {
						let next = self.tokenizer.peek_significant();
						SyntaxError::unexpected(&next, "brush or patch").report(status);
						self.skip_block(1);
					}
				},
				TokenKind::Eof => {
					SyntaxError::structural(start, "entity is not closed").report(status);
					return EntityEnd::Done;
				}
				TokenKind::String => {
					SyntaxError::structural(token.location, format!("property \"{}\" after brushes is ignored", token.text)).report(status);
					if self.tokenizer.peek_significant().kind == TokenKind::String {
						self.tokenizer.next_significant();
					}
				}
				_ => SyntaxError::unexpected(&token, "brush, patch or `}`").report(status),
			}
		}
	}

	/// Parses a brush, assuming its `{` was just consumed.
	fn parse_brush<C: MapParserCallback + ?Sized>(&mut self, start: FileLocation, callback: &mut C, status: &dyn DiagnosticsSink) {
		let mut faces = Vec::new();

		let end = loop {
			let token = self.tokenizer.peek_significant();
			match token.kind {
				TokenKind::ParenOpen => match self.parse_face() {
					Ok(face) => faces.push(face),
					Err(err) => {
						err.report(status);
						self.skip_block(1);
						return;
					}
				},
				TokenKind::BraceClose => {
					self.tokenizer.next_significant();
					break token.location;
				}
				TokenKind::Eof => {
					SyntaxError::structural(start, "brush is not closed").report(status);
					return;
				}
				_ => {
					SyntaxError::unexpected(&token, "face or `}`").report(status);
					self.skip_block(1);
					return;
				}
			}
		};

		callback.on_begin_brush(start, status);
		for face in faces {
			face.report_to(callback, status);
		}
		callback.on_end_brush(end, status);
	}

	fn parse_point(&mut self) -> ParseResult<DVec3> {
		self.expect(TokenKind::ParenOpen, "`(`")?;
		let point = DVec3::from_array(self.expect_numbers()?);
		self.expect(TokenKind::ParenClose, "`)`")?;
		Ok(point)
	}

	fn parse_face(&mut self) -> ParseResult<FaceDescriptor> {
		let location = self.tokenizer.peek_significant().location;
		let points = [self.parse_point()?, self.parse_point()?, self.parse_point()?];
		let mut attributes = BrushFaceAttributes::new(self.expect_material()?);

		let uv_axes = if self.format.is_valve() {
			let mut axes = [DVec3::ZERO; 2];
			for (axis, offset) in axes.iter_mut().zip([&mut attributes.offset.x, &mut attributes.offset.y]) {
				self.expect(TokenKind::BracketOpen, "`[`")?;
				let [x, y, z, o] = self.expect_numbers()?;
				self.expect(TokenKind::BracketClose, "`]`")?;
				*axis = dvec3(x, y, z);
				*offset = o;
			}
			Some(axes)
		} else {
			let [x, y] = self.expect_numbers()?;
			attributes.offset = dvec2(x, y);
			None
		};

		let [rotation, scale_x, scale_y] = self.expect_numbers()?;
		attributes.rotation = rotation;
		attributes.scale = dvec2(scale_x, scale_y);

		if self.format.has_surface_attributes() && self.next_is_number() {
			let [contents, flags, value] = self.expect_numbers()?;
			// Flags are bit sets, values past i32::MAX wrap around.
			attributes.surface_contents = Some(contents as i64 as i32);
			attributes.surface_flags = Some(flags as i64 as i32);
			attributes.surface_value = Some(value as f32);

			if self.format.has_color() && self.next_is_number() {
				let color = self.expect_numbers::<3>()?;
				attributes.color = Some(color.map(|c| c.round().clamp(0., 255.) as u8));
			}
		}

		if self.format == MapFormat::Hexen2 && self.next_is_number() {
			// Hexen 2 face lines carry an extra value no tool uses.
			self.expect_number()?;
		}

		Ok(FaceDescriptor {
			location,
			plane: FacePlane::Points(points),
			attributes,
			uv_axes,
		})
	}

	/// Parses a patch, assuming the `{` in front of `patchDef2` was just consumed, leaving the parser `depth` braces deep.
	fn parse_patch<C: MapParserCallback + ?Sized>(&mut self, start: FileLocation, depth: usize, callback: &mut C, status: &dyn DiagnosticsSink) {
		let mut inner_depth = 0;
		match self.parse_patch_body(&mut inner_depth) {
			Ok((row_count, column_count, control_points, material_name, end)) => {
				callback.on_patch(start, end, row_count, column_count, control_points, material_name, status);
			}
			Err(err) => {
				err.report(status);
				self.skip_block(depth + inner_depth);
			}
		}
	}

	fn parse_patch_body(&mut self, inner_depth: &mut usize) -> ParseResult<(usize, usize, Vec<PatchPoint>, String, FileLocation)> {
		self.expect(TokenKind::Word, PATCH_DEF)?;
		self.expect(TokenKind::BraceOpen, "`{`")?;
		*inner_depth = 1;

		let material_name = self.expect_material()?;

		self.expect(TokenKind::ParenOpen, "`(`")?;
		let row_count = self.expect_count()?;
		let column_count = self.expect_count()?;
		// The remaining header values are unused.
		while self.next_is_number() {
			self.expect_number()?;
		}
		self.expect(TokenKind::ParenClose, "`)`")?;

		// Rows are read as they come, mismatched counts are caught when building. The header counts are untrusted, so nothing is reserved from them.
		let mut control_points = Vec::new();
		self.expect(TokenKind::ParenOpen, "`(`")?;
		while self.tokenizer.peek_significant().kind == TokenKind::ParenOpen {
			self.tokenizer.next_significant();
			while self.tokenizer.peek_significant().kind == TokenKind::ParenOpen {
				self.tokenizer.next_significant();
				let [x, y, z, u, v] = self.expect_numbers()?;
				self.expect(TokenKind::ParenClose, "`)`")?;
				control_points.push(PatchPoint::new(dvec3(x, y, z), dvec2(u, v)));
			}
			self.expect(TokenKind::ParenClose, "`)`")?;
		}
		self.expect(TokenKind::ParenClose, "`)`")?;

		self.expect(TokenKind::BraceClose, "`}`")?;
		*inner_depth = 0;
		let end = self.expect(TokenKind::BraceClose, "`}`")?.location;

		Ok((row_count, column_count, control_points, material_name, end))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use qmap::test_fixtures::*;

	/// Records callbacks as readable lines.
	#[derive(Default)]
	struct Recorder {
		events: Vec<String>,
		faces: Vec<(BrushFaceAttributes, Option<[DVec3; 2]>)>,
	}
	impl MapParserCallback for Recorder {
		fn on_begin_entity(&mut self, location: FileLocation, properties: Vec<EntityProperty>, _: &dyn DiagnosticsSink) {
			let properties = properties.iter().map(|p| format!("{}={}", p.key, p.value)).join(",");
			self.events.push(format!("entity {}:{} [{properties}]", location.line, location.column));
		}
		fn on_end_entity(&mut self, location: FileLocation, _: &dyn DiagnosticsSink) {
			self.events.push(format!("end entity {}", location.line));
		}
		fn on_begin_brush(&mut self, location: FileLocation, _: &dyn DiagnosticsSink) {
			self.events.push(format!("brush {}", location.line));
		}
		fn on_end_brush(&mut self, location: FileLocation, _: &dyn DiagnosticsSink) {
			self.events.push(format!("end brush {}", location.line));
		}
		fn on_standard_face(&mut self, _: FileLocation, _: [DVec3; 3], attributes: BrushFaceAttributes, _: &dyn DiagnosticsSink) {
			self.events.push("face".s());
			self.faces.push((attributes, None));
		}
		fn on_valve_face(&mut self, _: FileLocation, _: [DVec3; 3], attributes: BrushFaceAttributes, u: DVec3, v: DVec3, _: &dyn DiagnosticsSink) {
			self.events.push("face".s());
			self.faces.push((attributes, Some([u, v])));
		}
		fn on_patch(
			&mut self,
			start: FileLocation,
			end: FileLocation,
			row_count: usize,
			column_count: usize,
			control_points: Vec<PatchPoint>,
			material_name: String,
			_: &dyn DiagnosticsSink,
		) {
			self.events.push(format!(
				"patch {}-{} {row_count}x{column_count} {} {material_name}",
				start.line,
				end.line,
				control_points.len()
			));
		}
	}

	fn parse(text: &str, format: MapFormat) -> (Recorder, ParserStatus) {
		let mut recorder = Recorder::default();
		let status = ParserStatus::default();
		MapParser::new(text, format).parse_entities(&mut recorder, &status);
		(recorder, status)
	}

	#[test]
	fn entity_with_brush() {
		let text = format!("{{\n\"classname\" \"worldspawn\"\n\"wad\" \"a.wad\"\n{{\n{}}}\n}}\n", standard_cube_faces());
		let (recorder, status) = parse(&text, MapFormat::Standard);

		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.events[0], "entity 1:1 [classname=worldspawn,wad=a.wad]");
		assert_eq!(recorder.events[1], "brush 4");
		assert_eq!(recorder.events.iter().filter(|event| *event == "face").count(), 6);
		assert_eq!(recorder.events[8], "end brush 11");
		assert_eq!(recorder.events[9], "end entity 12");
	}

	#[test]
	fn valve_face() {
		let text = "{\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) {masked [ 1 0 0 8 ] [ 0 -1 0 -4 ] 45 0.5 2\n( 0 0 0 ) ( 1 0 0 ) ( 0 0 1 ) \"with space\" [ 1 0 0 0 ] [ 0 0 -1 0 ] 0 1 1\n}";
		let mut recorder = Recorder::default();
		let status = ParserStatus::default();
		MapParser::new(text, MapFormat::Valve).parse_brushes(&mut recorder, &status);

		assert!(status.is_empty(), "{:?}", status.diagnostics());
		let (attributes, axes) = &recorder.faces[0];
		assert_eq!(attributes.material_name, "{masked");
		assert_eq!(attributes.offset, dvec2(8., -4.));
		assert_eq!(attributes.rotation, 45.);
		assert_eq!(attributes.scale, dvec2(0.5, 2.));
		assert_eq!(*axes, Some([DVec3::X, DVec3::NEG_Y]));
		assert_eq!(recorder.faces[1].0.material_name, "with space");
	}

	#[test]
	fn dialect_extras() {
		let line = "( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) e1u1/floor 0 0 0 1 1";

		let (recorder, status) = parse(&format!("{{\n{{\n{line} 8 4294967295 2.5\n{line}\n}}\n}}"), MapFormat::Quake2);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.faces[0].0.surface_contents, Some(8));
		assert_eq!(recorder.faces[0].0.surface_flags, Some(-1));
		assert_eq!(recorder.faces[0].0.surface_value, Some(2.5));
		assert!(!recorder.faces[1].0.has_surface_attributes());

		let (recorder, status) = parse(&format!("{{\n{{\n{line} 1 2 3 255 128 0\n}}\n}}"), MapFormat::Daikatana);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.faces[0].0.color, Some([255, 128, 0]));

		let (recorder, status) = parse(&format!("{{\n{{\n{line} -1\n}}\n}}"), MapFormat::Hexen2);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.faces.len(), 1);

		// Surface attributes are a syntax error in Standard.
		let (recorder, status) = parse(&format!("{{\n{{\n{line} 8 0 0\n}}\n}}"), MapFormat::Standard);
		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert!(recorder.faces.is_empty());
	}

	#[test]
	fn orphans() {
		let text = format!("{{\n{}}}\n{}", standard_cube_faces(), PATCH_3X3);
		let (recorder, status) = parse(&text, MapFormat::Quake3Legacy);

		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.events[0], "brush 1");
		assert_eq!(recorder.events.last().unwrap(), "patch 9-20 3x3 9 common/caulk");
		assert!(!recorder.events.iter().any(|event| event.starts_with("entity")));
	}

	#[test]
	fn bad_brush_is_skipped() {
		let text = format!(
			"{{\n\"classname\" \"worldspawn\"\n{{\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) tex 0 0 0 1\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) tex 0 0 0 1 1\n}}\n{{\n{}}}\n}}",
			standard_cube_faces()
		);
		let (recorder, status) = parse(&text, MapFormat::Standard);

		let diagnostics = status.diagnostics();
		assert_eq!(diagnostics.len(), 1);
		assert_eq!(diagnostics[0].kind, DiagnosticKind::StructuralError);
		assert_eq!(diagnostics[0].location, Some(FileLocation::new(5, 1)));
		assert_eq!(recorder.events.iter().filter(|event| event.starts_with("brush")).collect_vec(), ["brush 7"]);
		assert_eq!(recorder.events.last().unwrap(), "end entity 15");
	}

	#[test]
	fn unclosed_entities() {
		// Runs into the next entity.
		let text = "{\n\"classname\" \"light\"\n{\n\"classname\" \"info_null\"\n}\n";
		let (recorder, status) = parse(text, MapFormat::Standard);
		let diagnostics = status.diagnostics();
		assert_eq!(diagnostics.len(), 1);
		assert_eq!(diagnostics[0].kind, DiagnosticKind::StructuralError);
		assert_eq!(diagnostics[0].location, Some(FileLocation::new(1, 1)));
		assert_eq!(recorder.events, ["entity 1:1 [classname=light]", "entity 3:1 [classname=info_null]", "end entity 5"]);

		// Runs into the end of the document.
		let (recorder, status) = parse("\n{\n\"classname\" \"light\"\n", MapFormat::Standard);
		assert_eq!(status.diagnostics()[0].location, Some(FileLocation::new(2, 1)));
		assert_eq!(recorder.events, ["entity 2:1 [classname=light]"]);
	}

	#[test]
	fn long_run_of_unclosed_entities() {
		let mut text = "{\n\"classname\" \"worldspawn\"\n}\n".s();
		for _ in 0..100_000 {
			text += "{ \"classname\" \"info_null\"\n";
		}
		let (recorder, status) = parse(&text, MapFormat::Standard);

		assert_eq!(status.count(DiagnosticKind::StructuralError), 100_000);
		assert_eq!(recorder.events.len(), 2 + 100_000);
		assert_eq!(recorder.events.last().map(String::as_str), Some("entity 100003:1 [classname=info_null]"));
	}

	#[test]
	fn bad_properties() {
		// A key without a value loses the whole entity.
		let (recorder, status) = parse("{\n\"classname\"\n}\n{\n\"classname\" \"light\"\n}", MapFormat::Standard);
		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert_eq!(recorder.events, ["entity 4:1 [classname=light]", "end entity 6"]);

		// An unterminated value only loses the property.
		let (recorder, status) = parse("{\n\"classname\" \"light\n\"origin\" \"0 0 0\"\n}", MapFormat::Standard);
		assert_eq!(status.count(DiagnosticKind::LexError), 1);
		assert_eq!(recorder.events, ["entity 1:1 [origin=0 0 0]", "end entity 4"]);
	}

	#[test]
	fn top_level_garbage() {
		let (recorder, status) = parse("junk more junk\n{\n\"classname\" \"light\"\n}\n}", MapFormat::Standard);
		assert_eq!(status.count(DiagnosticKind::StructuralError), 2);
		assert_eq!(recorder.events.len(), 2);
	}

	#[test]
	fn unsupported_blocks() {
		let text = "{\n\"classname\" \"worldspawn\"\n{\nbrushDef\n{\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) ( ( 1 0 0 ) ( 0 1 0 ) ) tex\n}\n}\n}";
		let (recorder, status) = parse(text, MapFormat::Quake3);
		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert_eq!(recorder.events, ["entity 1:1 [classname=worldspawn]", "end entity 9"]);
	}

	#[test]
	fn patches() {
		let text = format!("{{\n\"classname\" \"worldspawn\"\n{}}}", PATCH_3X3);
		let (recorder, status) = parse(&text, MapFormat::Quake3);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.events[1], "patch 3-14 3x3 9 common/caulk");

		// Short rows reach the callback as is.
		let text = "{\npatchDef2\n{\ntex\n( 3 3 0 0 0 )\n(\n( ( 0 0 0 0 0 ) ( 0 0 0 0 0 ) ( 0 0 0 0 0 ) )\n( ( 0 0 0 0 0 ) ( 0 0 0 0 0 ) )\n)\n}\n}";
		let (recorder, status) = parse(text, MapFormat::Quake3);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.events, ["patch 1-11 3x3 5 tex"]);

		// Header counts aren't trusted for anything but the callback.
		let text = "{\npatchDef2\n{\ntex\n( 4294967295 4294967295 0 0 0 )\n(\n( ( 0 0 0 0 0 ) )\n)\n}\n}";
		let (recorder, status) = parse(text, MapFormat::Quake3);
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(recorder.events, ["patch 1-10 4294967295x4294967295 1 tex"]);

		// A broken patch is skipped entirely, the entity it's in survives.
		let text = "{\n\"classname\" \"worldspawn\"\n{\npatchDef2\n{\ntex\n( 3 3 0 0 0 )\n(\n( ( 0 0 0 0 ) )\n)\n}\n}\n}";
		let (recorder, status) = parse(text, MapFormat::Quake3);
		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert_eq!(recorder.events, ["entity 1:1 [classname=worldspawn]", "end entity 13"]);
	}

	#[test]
	fn face_lines() {
		let text = "( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) a 0 0 0 1 1\n( 0 0 0 ) ( 0 1 ) ( 1 0 0 ) b 0 0 0 1 1\n( 0 0 0 ) ( 0 1 0 ) ( 1 0 0 ) c 0 0 0 1 1\n";
		let mut recorder = Recorder::default();
		let status = ParserStatus::default();
		MapParser::new(text, MapFormat::Standard).parse_brush_faces(&mut recorder, &status);

		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert_eq!(recorder.faces.iter().map(|(attributes, _)| attributes.material_name.as_str()).collect_vec(), ["a", "c"]);
	}
}
