//! Writes nodes back out as map text.

use std::fmt::Write;

use crate::*;
use entity::keys;
use qmap::tokenizer::escape_string;
use util::{format_number, format_vec3};

/// Serializes worlds, node fragments and bare faces in any [`MapFormat`].
#[derive(Debug, Clone, Copy)]
pub struct MapWriter<'a> {
	config: &'a MapReaderConfig,
}

impl<'a> MapWriter<'a> {
	pub fn new(config: &'a MapReaderConfig) -> Self {
		Self { config }
	}

	/// Writes a whole document.
	///
	/// When `exporting`, the output is meant for compilers rather than the editor: layers marked as omitted are left out,
	/// all `_tb_` properties are removed, layer and group brushes end up in worldspawn, and long property values are folded.
	pub fn serialize(&self, world: &WorldNode, target: MapFormat, exporting: bool) -> String {
		let mut writer = NodeWriter::new(self.config, target, exporting);
		writer.reserve_ids(&world.children);
		writer.header();

		if exporting {
			let mut leaves = Vec::new();
			let mut entities = Vec::new();
			for layer in world.layers().filter(|layer| !layer.layer.omit_from_export()) {
				flatten(&layer.children, &mut leaves, &mut entities);
			}

			writer.entity(&world.entity, Vec::new(), leaves);
			for entity in entities {
				writer.entity(&entity.entity, Vec::new(), leaves_of(&entity.children));
			}
		} else {
			let default_layer = world.default_layer();
			let children = default_layer.map(|layer| layer.children.as_slice()).unwrap_or_default();

			let metadata = default_layer.map(|layer| layer_metadata(&layer.layer)).unwrap_or_default();
			writer.entity(&world.entity, metadata, leaves_of(children));
			writer.children(children, None);

			for layer in world.custom_layers() {
				writer.layer(layer);
			}
		}

		writer.out
	}

	/// Writes nodes for pasting elsewhere. Top level brushes and patches are put in a worldspawn entity.
	pub fn serialize_nodes(&self, nodes: &[Node], target: MapFormat) -> String {
		let mut writer = NodeWriter::new(self.config, target, false);
		writer.reserve_ids(nodes);

		let leaves = leaves_of(nodes);
		if !leaves.is_empty() {
			writer.entity(&Entity::with_classname(keys::WORLDSPAWN), Vec::new(), leaves);
		}
		for node in nodes {
			match node {
				Node::Layer(layer) => writer.layer(layer),
				Node::World(world) => world.layers().for_each(|layer| writer.layer(layer)),
				_ => writer.children(std::slice::from_ref(node), None),
			}
		}

		writer.out
	}

	/// Writes one face line per face.
	pub fn serialize_brush_faces(&self, faces: &[BrushFace], target: MapFormat) -> String {
		let mut out = String::new();
		for face in faces {
			write_face(&mut out, face, target);
		}
		out
	}
}

/// Splits nodes into their brushes and patches, and the entities further down.
fn flatten<'n>(nodes: &'n [Node], leaves: &mut Vec<&'n Node>, entities: &mut Vec<&'n EntityNode>) {
	for node in nodes {
		match node {
			Node::Brush(_) | Node::Patch(_) => leaves.push(node),
			Node::Entity(entity) => entities.push(entity),
			Node::Layer(_) | Node::Group(_) | Node::World(_) => flatten(node.children(), leaves, entities),
		}
	}
}

fn leaves_of(nodes: &[Node]) -> Vec<&Node> {
	nodes.iter().filter(|node| matches!(node, Node::Brush(_) | Node::Patch(_))).collect()
}

fn layer_metadata(layer: &Layer) -> Vec<EntityProperty> {
	let mut properties = Vec::new();
	if let Some(color) = &layer.color {
		properties.push(EntityProperty::new(keys::TB_LAYER_COLOR, color));
	}
	for (flag, key) in [
		(LayerFlag::Locked, keys::TB_LAYER_LOCKED),
		(LayerFlag::Hidden, keys::TB_LAYER_HIDDEN),
		(LayerFlag::OmitFromExport, keys::TB_LAYER_OMIT_FROM_EXPORT),
	] {
		if layer.flags.contains(flag) {
			properties.push(EntityProperty::new(key, "1"));
		}
	}
	properties
}

struct NodeWriter<'a> {
	config: &'a MapReaderConfig,
	target: MapFormat,
	exporting: bool,
	out: String,
	entity_count: usize,
	next_layer_id: u64,
	next_group_id: u64,
}

impl<'a> NodeWriter<'a> {
	fn new(config: &'a MapReaderConfig, target: MapFormat, exporting: bool) -> Self {
		Self {
			config,
			target,
			exporting,
			out: String::new(),
			entity_count: 0,
			next_layer_id: 1,
			next_group_id: 1,
		}
	}

	/// Makes sure ids assigned to layers and groups without one don't collide with existing ones.
	fn reserve_ids(&mut self, nodes: &[Node]) {
		for node in nodes {
			node.visit(&mut |node| match node {
				Node::Layer(layer) => {
					if let Some(id) = layer.layer.persistent_id {
						self.next_layer_id = self.next_layer_id.max(id + 1);
					}
				}
				Node::Group(group) => {
					if let Some(id) = group.group.persistent_id {
						self.next_group_id = self.next_group_id.max(id + 1);
					}
				}
				_ => {}
			});
		}
	}

	fn header(&mut self) {
		if !self.config.name.is_empty() {
			writeln!(self.out, "// Game: {}", self.config.name).ok();
		}
		writeln!(self.out, "// Format: {}", self.target).ok();
	}

	/// Writes the entities and groups in `nodes`. `parent` is the reference back to the container they're in.
	fn children(&mut self, nodes: &[Node], parent: Option<&EntityProperty>) {
		let parent = parent.into_iter().cloned().collect_vec();
		for node in nodes {
			match node {
				Node::Entity(entity) => self.entity(&entity.entity, parent.clone(), leaves_of(&entity.children)),
				Node::Group(group) => self.group(group, parent.clone()),
				_ => {}
			}
		}
	}

	fn layer(&mut self, layer: &LayerNode) {
		let id = layer.layer.persistent_id.unwrap_or_else(|| {
			self.next_layer_id += 1;
			self.next_layer_id - 1
		});

		let mut properties = vec![
			EntityProperty::new(keys::CLASSNAME, keys::FUNC_GROUP),
			EntityProperty::new(keys::TB_TYPE, keys::TB_LAYER),
			EntityProperty::new(keys::TB_NAME, &layer.layer.name),
			EntityProperty::new(keys::TB_ID, id.to_string()),
		];
		if let Some(sort_index) = layer.layer.sort_index {
			properties.push(EntityProperty::new(keys::TB_LAYER_SORT_INDEX, sort_index.to_string()));
		}
		properties.extend(layer_metadata(&layer.layer));

		self.entity(&Entity::new(properties), Vec::new(), leaves_of(&layer.children));
		self.children(&layer.children, Some(&EntityProperty::new(keys::TB_LAYER, id.to_string())));
	}

	fn group(&mut self, group: &GroupNode, parent: Vec<EntityProperty>) {
		let id = group.group.persistent_id.unwrap_or_else(|| {
			self.next_group_id += 1;
			self.next_group_id - 1
		});

		let mut properties = vec![
			EntityProperty::new(keys::CLASSNAME, keys::FUNC_GROUP),
			EntityProperty::new(keys::TB_TYPE, keys::TB_GROUP),
			EntityProperty::new(keys::TB_NAME, &group.group.name),
			EntityProperty::new(keys::TB_ID, id.to_string()),
		];
		if let Some(linked_group_id) = &group.group.linked_group_id {
			properties.push(EntityProperty::new(keys::TB_LINKED_GROUP_ID, linked_group_id));
		}
		if let Some(transformation) = &group.group.transformation {
			properties.push(EntityProperty::new(keys::TB_TRANSFORMATION, transformation));
		}
		properties.extend(parent);

		self.entity(&Entity::new(properties), Vec::new(), leaves_of(&group.children));
		self.children(&group.children, Some(&EntityProperty::new(keys::TB_GROUP, id.to_string())));
	}

	fn entity(&mut self, entity: &Entity, extra: Vec<EntityProperty>, leaves: Vec<&Node>) {
		let mut entity = entity.clone();
		for property in extra {
			entity.set(property.key, property.value);
		}

		if self.exporting {
			entity.properties.retain(|property| !property.key.starts_with(keys::TB_PREFIX));
			let chunk_size = self.config.property_chunk_size;
			let long = entity
				.properties
				.iter()
				.filter(|property| chunk_size > 0 && property.key != keys::CLASSNAME && property.value.chars().count() > chunk_size)
				.map(|property| (property.key.clone(), property.value.clone()))
				.collect_vec();
			for (key, value) in long {
				entity.set_folded(&key, &value, chunk_size);
			}
		}

		writeln!(self.out, "// entity {}", self.entity_count).ok();
		self.entity_count += 1;
		self.out.push_str("{\n");
		for property in &entity.properties {
			writeln!(self.out, "\"{}\" \"{}\"", escape_string(&property.key), escape_string(&property.value)).ok();
		}

		let (target, index) = (self.target, self.entity_count - 1);
		let leaves = leaves.into_iter().filter(|leaf| {
			let writable = !matches!(leaf, Node::Patch(_)) || target.supports_patches();
			if !writable {
				warn!("Skipping patch in entity {index}, {target} maps can't contain patches");
			}
			writable
		});
		for (i, leaf) in leaves.enumerate() {
			writeln!(self.out, "// brush {i}").ok();
			match leaf {
				Node::Brush(node) => self.brush(&node.brush),
				Node::Patch(node) => self.patch(&node.patch),
				_ => {}
			}
		}
		self.out.push_str("}\n");
	}

	fn brush(&mut self, brush: &Brush) {
		self.out.push_str("{\n");
		for face in brush.faces() {
			write_face(&mut self.out, face, self.target);
		}
		self.out.push_str("}\n");
	}

	fn patch(&mut self, patch: &BezierPatch) {
		writeln!(
			self.out,
			"{{\npatchDef2\n{{\n{}\n( {} {} 0 0 0 )\n(",
			material_name(&patch.material_name),
			patch.row_count(),
			patch.column_count()
		)
		.ok();
		for row in patch.rows() {
			self.out.push('(');
			for point in row {
				write!(
					self.out,
					" ( {} {} {} )",
					format_vec3(point.position),
					format_number(point.uv.x),
					format_number(point.uv.y)
				)
				.ok();
			}
			self.out.push_str(" )\n");
		}
		self.out.push_str(")\n}\n}\n");
	}
}

/// Quotes material names the tokenizer wouldn't read back as a single word.
fn material_name(name: &str) -> std::borrow::Cow<'_, str> {
	let needs_quotes = name.is_empty()
		|| name == "{"
		|| name == "}"
		|| name.starts_with("//")
		|| name.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"'));

	if needs_quotes {
		format!("\"{}\"", escape_string(name)).into()
	} else {
		name.into()
	}
}

fn write_face(out: &mut String, face: &BrushFace, target: MapFormat) {
	let mut face = face.clone();
	face.convert_to(target);
	let attributes = &face.attributes;

	let [p1, p2, p3] = face.points;
	write!(
		out,
		"( {} ) ( {} ) ( {} ) {}",
		format_vec3(p1),
		format_vec3(p2),
		format_vec3(p3),
		material_name(&attributes.material_name)
	)
	.ok();

	match face.uv {
		UvProjection::Parallel { u_axis, v_axis } => write!(
			out,
			" [ {} {} ] [ {} {} ]",
			format_vec3(u_axis),
			format_number(attributes.offset.x),
			format_vec3(v_axis),
			format_number(attributes.offset.y)
		),
		UvProjection::Paraxial => write!(out, " {} {}", format_number(attributes.offset.x), format_number(attributes.offset.y)),
	}
	.ok();

	write!(
		out,
		" {} {} {}",
		format_number(attributes.rotation),
		format_number(attributes.scale.x),
		format_number(attributes.scale.y)
	)
	.ok();

	// Surface values are only written if the face has some, the color needs them in front of it.
	if target.has_surface_attributes() && (attributes.has_surface_attributes() || attributes.color.is_some()) {
		write!(
			out,
			" {} {} {}",
			attributes.surface_contents.unwrap_or(0),
			attributes.surface_flags.unwrap_or(0),
			attributes.surface_value.unwrap_or(0.)
		)
		.ok();
	}
	if let Some([r, g, b]) = attributes.color {
		write!(out, " {r} {g} {b}").ok();
	}
	if target == MapFormat::Hexen2 {
		out.push_str(" 0");
	}
	out.push('\n');
}
