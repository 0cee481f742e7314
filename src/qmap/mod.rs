//! Reading `.map` text into nodes.
//!
//! Reading is a pipeline: [`tokenizer`] and [`parser`] walk the text, [`collector`] stores what was found as raw records,
//! [`builder`] turns records into nodes in parallel, and [`resolver`] puts every node where it belongs.
//! [`writer`] goes the other way.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use strum::IntoEnumIterator;

use crate::*;
use collector::{ObjectCollector, ObjectInfo};
use parser::MapParser;
use tokenizer::{TokenKind, Tokenizer};

pub mod builder;
pub mod collector;
pub mod parser;
pub mod resolver;
pub mod tokenizer;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_fixtures;

/// Reads map text. Holds the configuration and the worker pool brushes are built on, so keep it around between reads.
pub struct MapReader {
	pub config: MapReaderConfig,
	executor: Arc<dyn ParallelExecutor>,
}

impl MapReader {
	/// Creates a reader, with a worker pool sized by [`MapReaderConfig::worker_threads`].
	pub fn new(config: MapReaderConfig) -> Self {
		let executor: Arc<dyn ParallelExecutor> = match config.worker_threads {
			Some(1) => Arc::new(SequentialExecutor),
			threads => Arc::new(TaskPoolExecutor::new(threads)),
		};
		Self { config, executor }
	}

	/// Builds brushes and patches on `executor` instead.
	pub fn with_executor(mut self, executor: Arc<dyn ParallelExecutor>) -> Self {
		self.executor = executor;
		self
	}

	pub fn executor(&self) -> &dyn ParallelExecutor {
		self.executor.as_ref()
	}

	/// Reads a whole document written in `source` into a world, converting faces to `target`.
	///
	/// Recoverable problems are reported to `status` and the affected parts skipped.
	/// Fails only if the document has nothing to read, or the world factory fails.
	pub fn parse(&self, text: &str, source: MapFormat, target: MapFormat, status: &dyn DiagnosticsSink) -> Result<WorldNode, MapReadError> {
		let (source, objects) = collect_any(text, [source], status, |parser, collector, status| parser.parse_entities(collector, status));
		self.read_world(text, source, objects.into_objects(), target, status)
	}

	/// Reads a whole document whose dialect isn't known, such as a file of a game supporting several formats.
	///
	/// A `// Format:` header in the text is tried first, then each of `candidates` in order (every format if it's empty).
	/// The first format the document parses under without syntax errors is used, otherwise the one with the fewest.
	pub fn parse_any(&self, text: &str, candidates: &[MapFormat], target: MapFormat, status: &dyn DiagnosticsSink) -> Result<WorldNode, MapReadError> {
		let candidates = match candidates {
			[] => MapFormat::iter().collect_vec(),
			candidates => candidates.to_vec(),
		};
		let (source, objects) = collect_any(
			text,
			MapFormat::from_header(text).into_iter().chain(candidates),
			status,
			|parser, collector, status| parser.parse_entities(collector, status),
		);
		self.read_world(text, source, objects.into_objects(), target, status)
	}

	fn read_world(&self, text: &str, source: MapFormat, objects: Vec<ObjectInfo>, target: MapFormat, status: &dyn DiagnosticsSink) -> Result<WorldNode, MapReadError> {
		let start = Instant::now();
		if objects.is_empty() {
			return Err(nothing_found(text, "entities"));
		}
		debug!("Parsed {} objects as {source}", objects.len());

		let built = builder::build_nodes(&objects, target, &self.config, self.executor(), status);
		let world = resolver::resolve_world(built, target, &self.config, status)?;

		debug!("Read world with {} layers in {:.2?}", world.count(NodeKind::Layer), start.elapsed());
		Ok(world)
	}

	/// Reads entities, brushes and patches for insertion into an existing world, as when pasting.
	///
	/// The dialect is detected from the text, then `target` and the remaining formats are tried, as in [`parse_any`](Self::parse_any).
	pub fn parse_fragment(&self, text: &str, target: MapFormat, world_bounds: Bounds, status: &dyn DiagnosticsSink) -> Result<Vec<Node>, MapReadError> {
		let (_, collector) = collect_any(text, fragment_candidates(text, target), status, |parser, collector, status| {
			parser.parse_entities(collector, status)
		});
		let objects = collector.into_objects();
		if objects.is_empty() {
			return Err(nothing_found(text, "entities or brushes"));
		}

		let config = MapReaderConfig {
			world_bounds,
			..self.config.clone()
		};
		let built = builder::build_nodes(&objects, target, &config, self.executor(), status);
		Ok(resolver::resolve_fragment(built, status))
	}

	/// Reads bare face lines, as copied from a brush to transfer its material and alignment.
	pub fn parse_face_attributes(&self, text: &str, target: MapFormat, status: &dyn DiagnosticsSink) -> Result<Vec<BrushFace>, MapReadError> {
		let (_, collector) = collect_any(text, fragment_candidates(text, target), status, |parser, collector, status| {
			parser.parse_brush_faces(collector, status)
		});
		let descriptors = collector.into_loose_faces();
		if descriptors.is_empty() {
			return Err(nothing_found(text, "brush faces"));
		}

		Ok(descriptors
			.iter()
			.filter_map(|descriptor| match builder::build_face(descriptor, target, &self.config) {
				Ok(face) => Some(face),
				Err(err) => {
					status.construction_error(descriptor.location, format!("Skipping face: {err}"));
					None
				}
			})
			.collect())
	}
}

impl Default for MapReader {
	fn default() -> Self {
		Self::new(default())
	}
}

/// Formats to try for clipboard text: what the text looks like, then what we'd write, then anything else.
fn fragment_candidates(text: &str, target: MapFormat) -> impl Iterator<Item = MapFormat> {
	MapFormat::detect(text).into_iter().chain([target]).chain(MapFormat::iter())
}

/// Diagnostics of a parse attempt, held back until it's known whether the attempt is kept.
#[derive(Default)]
struct HeldDiagnostics(Mutex<Vec<Diagnostic>>);
impl HeldDiagnostics {
	fn syntax_errors(&self) -> usize {
		self.0
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.filter(|diagnostic| matches!(diagnostic.kind, DiagnosticKind::LexError | DiagnosticKind::StructuralError))
			.count()
	}

	fn forward_to(self, status: &dyn DiagnosticsSink) {
		for diagnostic in self.0.into_inner().unwrap_or_else(PoisonError::into_inner) {
			status.report(diagnostic);
		}
	}
}
impl DiagnosticsSink for HeldDiagnostics {
	fn report(&self, diagnostic: Diagnostic) {
		self.0.lock().unwrap_or_else(PoisonError::into_inner).push(diagnostic);
	}
}

/// Parses `text` as each of `candidates` until one has no syntax errors, keeping the attempt with the fewest otherwise.
/// Only the kept attempt's diagnostics reach `status`.
fn collect_any(
	text: &str,
	candidates: impl IntoIterator<Item = MapFormat>,
	status: &dyn DiagnosticsSink,
	read: impl Fn(&mut MapParser<'_>, &mut ObjectCollector, &dyn DiagnosticsSink),
) -> (MapFormat, ObjectCollector) {
	let mut best: Option<(usize, MapFormat, ObjectCollector, HeldDiagnostics)> = None;

	for format in candidates.into_iter().unique() {
		let held = HeldDiagnostics::default();
		let mut collector = ObjectCollector::default();
		read(&mut MapParser::new(text, format), &mut collector, &held);

		let errors = held.syntax_errors();
		if best.as_ref().is_none_or(|(fewest, ..)| errors < *fewest) {
			best = Some((errors, format, collector, held));
		}
		if errors == 0 {
			break;
		}
	}

	match best {
		Some((errors, format, collector, held)) => {
			if errors > 0 {
				debug!("No format parsed cleanly, keeping {format} with {errors} errors");
			}
			held.forward_to(status);
			(format, collector)
		}
		None => (MapFormat::default(), ObjectCollector::default()),
	}
}

/// The error for a read that produced nothing, depending on whether there was anything to read in the first place.
fn nothing_found(text: &str, expected: &'static str) -> MapReadError {
	if Tokenizer::new(text).next_significant().kind == TokenKind::Eof {
		MapReadError::EmptyDocument
	} else {
		MapReadError::NoContent { expected }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_fixtures::*;
	use writer::MapWriter;

	fn reader() -> MapReader {
		MapReader::new(MapReaderConfig::new("Quake").worker_threads(Some(1)))
	}

	fn brushes(world: &WorldNode) -> Vec<&Brush> {
		let mut brushes = Vec::new();
		world.visit(&mut |node| brushes.extend(node.as_brush()));
		brushes
	}

	#[test]
	fn round_trip() {
		let reader = reader();
		let status = ParserStatus::default();
		let world = reader.parse(&layered_map(), MapFormat::Valve, MapFormat::Valve, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());

		let text = MapWriter::new(&reader.config).serialize(&world, MapFormat::Valve, false);
		let reread = reader.parse(&text, MapFormat::Valve, MapFormat::Valve, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(reread, world);
		assert_eq!(MapWriter::new(&reader.config).serialize(&reread, MapFormat::Valve, false), text);
	}

	#[test]
	fn quake3_round_trip() {
		let text = format!(
			"{{\n\"classname\" \"worldspawn\"\n\"message\" \"say \\\"hi\\\"\"\n{{\n{}}}\n{PATCH_3X3}}}\n",
			standard_cube_faces()
				.replace("__TB_empty 0 0 0 1 1", "e1u1/floor 8 -4 22.5 0.25 0.75 1 134217728 3.5")
				.replacen("e1u1/floor", "\"my floor\"", 1)
		);
		let reader = reader();
		let status = ParserStatus::default();
		let world = reader.parse(&text, MapFormat::Quake3, MapFormat::Quake3, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(world.entity.get_raw("message"), Some("say \"hi\""));

		let face = &brushes(&world)[0].faces()[0];
		assert_eq!(face.attributes.material_name, "my floor");
		assert_eq!(face.attributes.surface_flags, Some(134217728));
		assert_eq!(face.attributes.surface_value, Some(3.5));

		let written = MapWriter::new(&reader.config).serialize(&world, MapFormat::Quake3, false);
		let reread = reader.parse(&written, MapFormat::Quake3, MapFormat::Quake3, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(reread, world);
	}

	#[test]
	fn worker_count_determinism() {
		let mut text = "{\n\"classname\" \"worldspawn\"\n".s();
		for i in 0..48 {
			let offset = dvec3(i as f64 * 256., 0., (i % 5) as f64 * 64.);
			text += "{\n";
			for points in CUBE_FACES {
				let [p1, p2, p3] = points.map(|p| util::format_vec3(p + offset));
				text += &format!("( {p1} ) ( {p2} ) ( {p3} ) tex{i} 0 0 0 1 1\n");
			}
			text += "}\n";
		}
		text += "}\n";

		let read = |threads: usize| {
			let reader = MapReader::new(MapReaderConfig::default().worker_threads(Some(threads)));
			let status = ParserStatus::default();
			let world = reader.parse(&text, MapFormat::Standard, MapFormat::Valve, &status).unwrap();
			assert!(status.is_empty(), "{:?}", status.diagnostics());
			world
		};

		let sequential = read(1);
		assert_eq!(brushes(&sequential).len(), 48);
		assert_eq!(brushes(&sequential)[7].faces()[0].attributes.material_name, "tex7");
		assert_eq!(read(2), sequential);
		assert_eq!(read(8), sequential);
	}

	#[test]
	fn orphan_brush() {
		let status = ParserStatus::default();
		let world = reader()
			.parse(&format!("{{\n{}}}\n", standard_cube_faces()), MapFormat::Standard, MapFormat::Standard, &status)
			.unwrap();

		assert_eq!(status.count(DiagnosticKind::ResolutionWarning), 1);
		assert!(!status.has_errors());
		assert_eq!(world.children.len(), 1);

		let default_layer = world.default_layer().unwrap();
		assert_eq!(default_layer.children.len(), 1);
		let Node::Entity(entity) = &default_layer.children[0] else { panic!("{:?}", default_layer.children[0]) };
		assert_eq!(entity.children.len(), 1);
		assert_eq!(entity.children[0].kind(), NodeKind::Brush);
	}

	#[test]
	fn degenerate_brush() {
		let collinear = "( 0 0 0 ) ( 1 1 1 ) ( 2 2 2 ) tex 0 0 0 1 1\n";
		let text = format!(
			"{{\n\"classname\" \"worldspawn\"\n{{\n{collinear}{cube}}}\n{{\n{cube}}}\n}}\n{{\n\"classname\" \"light\"\n}}\n",
			cube = standard_cube_faces()
		);
		let status = ParserStatus::default();
		let world = reader().parse(&text, MapFormat::Standard, MapFormat::Standard, &status).unwrap();

		let diagnostics = status.diagnostics();
		assert_eq!(diagnostics.len(), 1);
		assert_eq!(diagnostics[0].kind, DiagnosticKind::ConstructionError);
		assert_eq!(diagnostics[0].location, Some(FileLocation::new(3, 1)));
		assert_eq!(brushes(&world).len(), 1);
		assert_eq!(world.count(NodeKind::Entity), 1);
	}

	#[test]
	fn patch_validity() {
		let eight = PATCH_3X3.replacen(" ( 64 64 0 1 1 )", "", 1);
		let status = ParserStatus::default();
		let world = reader()
			.parse(&format!("{{\n\"classname\" \"worldspawn\"\n{eight}}}\n"), MapFormat::Quake3, MapFormat::Quake3, &status)
			.unwrap();
		assert_eq!(status.count(DiagnosticKind::ConstructionError), 1);
		assert_eq!(world.count(NodeKind::Patch), 0);

		let status = ParserStatus::default();
		let world = reader()
			.parse(&format!("{{\n\"classname\" \"worldspawn\"\n{PATCH_3X3}}}\n"), MapFormat::Quake3, MapFormat::Quake3, &status)
			.unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(world.count(NodeKind::Patch), 1);

		let Node::Patch(node) = &world.default_layer().unwrap().children[0] else { unreachable!() };
		let positions = node.patch.control_points().iter().map(|point| point.position).collect_vec();
		assert_eq!(positions[..4], [dvec3(-64., -64., 0.), dvec3(0., -64., 0.), dvec3(64., -64., 0.), dvec3(-64., 0., 0.)]);
		assert_eq!(node.patch.point(1, 1).unwrap().uv, dvec2(0.5, 0.5));
	}

	#[test]
	fn dialect_cross_conversion() {
		let config = MapReaderConfig::new("Quake");
		let reader = MapReader::new(config.clone().worker_threads(Some(1)));
		let writer = MapWriter::new(&config);

		let faces = CUBE_FACES
			.iter()
			.map(|points| {
				let attributes = BrushFaceAttributes {
					offset: dvec2(8., -4.),
					rotation: 30.,
					scale: dvec2(2., 0.5),
					..BrushFaceAttributes::new("tex")
				};
				let mut face = BrushFace::new(*points, attributes, UvProjection::Paraxial).unwrap();
				face.convert_to_parallel();
				face
			})
			.collect();
		let original = Brush::new(faces, &config.world_bounds).unwrap();

		let mut world = WorldNode::new(Entity::with_classname("worldspawn"), MapFormat::Valve);
		world.default_layer_mut().unwrap().children.push(Node::Brush(BrushNode { brush: original.clone() }));

		let status = ParserStatus::default();
		let valve = writer.serialize(&world, MapFormat::Valve, false);
		let standard = writer.serialize(&reader.parse(&valve, MapFormat::Valve, MapFormat::Standard, &status).unwrap(), MapFormat::Standard, false);
		let back = reader.parse(&standard, MapFormat::Standard, MapFormat::Valve, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());

		let brush = brushes(&back)[0].clone();
		for (index, (face, original_face)) in brush.faces().iter().zip(original.faces()).enumerate() {
			assert!(matches!(face.uv, UvProjection::Parallel { .. }));
			for vertex in brush.face_vertices(index) {
				assert_almost_eq!(face.uv_coords(vertex), original_face.uv_coords(vertex), 0.0001);
			}
		}
	}

	#[test]
	fn unclosed_entity() {
		let text = format!("{{\n\"classname\" \"worldspawn\"\n}}\n{{\n\"classname\" \"func_door\"\n{{\n{}}}\n", standard_cube_faces());
		let status = ParserStatus::default();
		let world = reader().parse(&text, MapFormat::Standard, MapFormat::Standard, &status).unwrap();

		let errors = status.diagnostics().into_iter().filter(|diagnostic| diagnostic.severity == Severity::Error).collect_vec();
		assert_eq!(errors.len(), 1);
		assert_eq!(errors[0].kind, DiagnosticKind::StructuralError);
		assert_eq!(errors[0].location, Some(FileLocation::new(4, 1)));

		let mut classnames = Vec::new();
		world.visit(&mut |node| classnames.extend(node.entity().and_then(|entity| entity.classname().ok())));
		assert!(!classnames.contains(&"func_door"));
	}

	#[test]
	fn fragments() {
		let reader = reader();
		let status = ParserStatus::default();
		let world = reader.parse(&layered_map(), MapFormat::Valve, MapFormat::Valve, &status).unwrap();
		let details = world.custom_layers().next().unwrap();

		let text = MapWriter::new(&reader.config).serialize_nodes(&details.children, MapFormat::Standard);
		let nodes = reader.parse_fragment(&text, MapFormat::Valve, Bounds::default(), &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(nodes.iter().map(Node::kind).collect_vec(), [NodeKind::Brush, NodeKind::Group, NodeKind::Entity]);
		assert!(matches!(nodes[0].as_brush().unwrap().faces()[0].uv, UvProjection::Parallel { .. }));

		// Too small to hold the brushes.
		let nodes = reader.parse_fragment(&text, MapFormat::Valve, Bounds::from_extent(32.), &status).unwrap();
		assert_eq!(status.count(DiagnosticKind::ConstructionError), 2);
		assert_eq!(nodes.len(), 2);
	}

	#[test]
	fn face_attributes() {
		let reader = reader();
		let status = ParserStatus::default();
		let faces = reader.parse_face_attributes(&valve_cube_faces(), MapFormat::Standard, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(faces.len(), 6);
		assert!(faces.iter().all(|face| face.uv == UvProjection::Paraxial));

		for face in &faces {
			assert_eq!(face.attributes.material_name, "__TB_empty");
			assert_almost_eq!(face.attributes.rotation, 0., 0.0001);
			assert_almost_eq!(face.attributes.scale, DVec2::ONE, 0.0001);
			assert_almost_eq!(face.attributes.offset, DVec2::ZERO, 0.0001);
		}

		let text = MapWriter::new(&reader.config).serialize_brush_faces(&faces, MapFormat::Standard);
		assert_eq!(text.lines().count(), 6);
	}

	/// A Quake 2 brush whose first face has no surface attributes, which makes it look like a standard one.
	fn quake2_without_leading_extras() -> String {
		let faces = standard_cube_faces()
			.lines()
			.enumerate()
			.map(|(i, line)| if i == 0 { line.s() } else { format!("{line} 1 16 0") })
			.join("\n");
		format!("{{\n\"classname\" \"worldspawn\"\n{{\n{faces}\n}}\n}}\n")
	}

	#[test]
	fn unknown_format() {
		let text = quake2_without_leading_extras();
		assert_eq!(MapFormat::detect(&text), Some(MapFormat::Standard));

		let reader = reader();
		let status = ParserStatus::default();
		let world = reader
			.parse_any(&text, &[MapFormat::Standard, MapFormat::Valve, MapFormat::Quake2], MapFormat::Quake2, &status)
			.unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());

		let faces = brushes(&world)[0].faces();
		assert_eq!(faces[0].attributes.surface_flags, None);
		assert_eq!(faces[1].attributes.surface_contents, Some(1));
		assert_eq!(faces[1].attributes.surface_flags, Some(16));

		// Nothing parses cleanly, the closest candidate still gets read.
		let status = ParserStatus::default();
		let world = reader.parse_any(&text, &[MapFormat::Valve, MapFormat::Standard], MapFormat::Quake2, &status).unwrap();
		assert!(status.count(DiagnosticKind::StructuralError) > 0);
		assert_eq!(world.entity.classname().ok(), Some("worldspawn"));

		// Clipboard text gets the same treatment.
		let status = ParserStatus::default();
		let nodes = reader.parse_fragment(&text, MapFormat::Valve, Bounds::default(), &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(nodes.iter().map(Node::kind).collect_vec(), [NodeKind::Brush]);
	}

	#[test]
	fn format_header_comes_first() {
		let reader = reader();
		let text = quake2_without_leading_extras();
		let status = ParserStatus::default();
		let world = reader.parse_any(&text, &[MapFormat::Standard], MapFormat::Quake2, &status).unwrap();
		assert_eq!(status.count(DiagnosticKind::StructuralError), 1);
		assert!(brushes(&world).is_empty());

		let text = format!("// Game: Quake 2\n// Format: Quake2\n{text}");
		let status = ParserStatus::default();
		let world = reader.parse_any(&text, &[MapFormat::Standard], MapFormat::Quake2, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(brushes(&world)[0].faces()[5].attributes.surface_flags, Some(16));
	}

	#[test]
	fn untrusted_patch_header() {
		let huge = PATCH_3X3.replace("( 3 3 0 0 0 )", "( 4294967295 4294967295 0 0 0 )");
		let status = ParserStatus::default();
		let world = reader()
			.parse(&format!("{{\n\"classname\" \"worldspawn\"\n{huge}}}\n"), MapFormat::Quake3, MapFormat::Quake3, &status)
			.unwrap();

		let diagnostics = status.diagnostics();
		assert_eq!(diagnostics.len(), 1);
		assert_eq!(diagnostics[0].kind, DiagnosticKind::ConstructionError);
		assert_eq!(diagnostics[0].location, Some(FileLocation::new(3, 1)));
		assert_eq!(world.count(NodeKind::Patch), 0);
	}

	#[test]
	fn multiline_values() {
		let reader = reader();
		let mut world = WorldNode::new(Entity::with_classname("worldspawn"), MapFormat::Valve);
		world.entity.set("message", "The Slipgate Complex\nby John Romero");

		let text = MapWriter::new(&reader.config).serialize(&world, MapFormat::Valve, false);
		assert!(text.contains("\"message\" \"The Slipgate Complex\\nby John Romero\""));

		let status = ParserStatus::default();
		let reread = reader.parse(&text, MapFormat::Valve, MapFormat::Valve, &status).unwrap();
		assert!(status.is_empty(), "{:?}", status.diagnostics());
		assert_eq!(reread.entity.get_raw("message"), Some("The Slipgate Complex\\nby John Romero"));
		assert_eq!(MapWriter::new(&reader.config).serialize(&reread, MapFormat::Valve, false), text);
	}

	#[test]
	fn nothing_to_read() {
		let reader = reader();
		let status = ParserStatus::default();
		assert!(matches!(
			reader.parse("// just a comment\n", MapFormat::Standard, MapFormat::Standard, &status),
			Err(MapReadError::EmptyDocument)
		));
		assert!(matches!(
			reader.parse("what is this", MapFormat::Standard, MapFormat::Standard, &status),
			Err(MapReadError::NoContent { .. })
		));
		assert!(matches!(
			reader.parse_face_attributes("", MapFormat::Standard, &status),
			Err(MapReadError::EmptyDocument)
		));
	}
}
