//! Turns raw records into nodes, in parallel.
//!
//! Every record builds independently of every other one. Results are written into a slot per record,
//! so the output order is the document order no matter how the work was split.

use std::time::Instant;

use enumflags2::BitFlags;

use crate::*;
use entity::keys;
use node::LayerFlag;
use brush::BrushError;
use qmap::collector::{BrushInfo, ObjectInfo, PatchInfo};
use qmap::parser::{FaceDescriptor, FacePlane};

/// Reference from an entity or group to the container it's in, by persistent id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
	Layer(u64),
	Group(u64),
	/// The reference exists but isn't a valid id.
	Invalid { key: &'static str, value: String },
}

/// What a record turned into, along with the bookkeeping the resolver needs to place it.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltObject {
	/// A worldspawn entity, and the default layer metadata stored on it.
	World { entity: Entity, default_layer: Layer },
	Layer(Layer),
	Group { group: Group, parent: Option<ContainerRef> },
	Entity { entity: Entity, parent: Option<ContainerRef> },
	/// `parent` is the record index of the entity the block was in.
	Brush { brush: Brush, parent: Option<usize> },
	Patch { patch: BezierPatch, parent: Option<usize> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Built {
	pub object: BuiltObject,
	pub start: FileLocation,
}

/// Builds every record in `objects`. The result has one slot per record, `None` where the record was dropped.
pub fn build_nodes(
	objects: &[ObjectInfo],
	target: MapFormat,
	config: &MapReaderConfig,
	executor: &dyn ParallelExecutor,
	status: &dyn DiagnosticsSink,
) -> Vec<Option<Built>> {
	let start = Instant::now();
	let mut slots: Vec<Option<Built>> = (0..objects.len()).map(|_| None).collect();

	tasks::map_into_slots(executor, objects, &mut slots, |_, object| {
		let built = match object {
			// Unclosed entities were already reported by the parser.
			ObjectInfo::Entity(info) if info.end.is_none() => return None,
			ObjectInfo::Entity(info) => classify_entity(Entity::new(info.properties.clone()), status, info.start),
			ObjectInfo::Brush(info) => build_brush(info, target, config, status)?,
			ObjectInfo::Patch(info) => build_patch(info, status)?,
		};
		Some(Built {
			object: built,
			start: object.start(),
		})
	});

	debug!(
		"Built {} objects in {:.2?} on {} workers",
		objects.len(),
		start.elapsed(),
		executor.worker_count()
	);

	slots
}

/// Sorts an entity into world, layer, group or plain entity, moving the bookkeeping keys into node data.
fn classify_entity(mut entity: Entity, status: &dyn DiagnosticsSink, location: FileLocation) -> BuiltObject {
	if entity.is_worldspawn() {
		let default_layer = Layer {
			color: entity.get_raw(keys::TB_LAYER_COLOR).map(str::to_string),
			flags: layer_flags(&entity),
			..Layer::new(WorldNode::DEFAULT_LAYER_NAME)
		};
		entity.strip_structural_properties();
		return BuiltObject::World { entity, default_layer };
	}

	// Layer and group entities are just containers, their remaining properties (like the classname) are implied.
	match entity.get_raw(keys::TB_TYPE) {
		Some(keys::TB_LAYER) => BuiltObject::Layer(Layer {
			name: name(&entity),
			persistent_id: persistent_id(&entity, status, location),
			sort_index: entity.get(keys::TB_LAYER_SORT_INDEX).ok(),
			color: entity.get_raw(keys::TB_LAYER_COLOR).map(str::to_string),
			flags: layer_flags(&entity),
		}),
		Some(keys::TB_GROUP) => BuiltObject::Group {
			group: Group {
				name: name(&entity),
				persistent_id: persistent_id(&entity, status, location),
				linked_group_id: entity.get_raw(keys::TB_LINKED_GROUP_ID).map(str::to_string),
				transformation: entity.get_raw(keys::TB_TRANSFORMATION).map(str::to_string),
			},
			parent: container_ref(&entity),
		},
		_ => {
			let parent = container_ref(&entity);
			entity.strip_structural_properties();
			BuiltObject::Entity { entity, parent }
		}
	}
}

fn name(entity: &Entity) -> String {
	entity.get_raw(keys::TB_NAME).unwrap_or("Unnamed").to_string()
}

fn persistent_id(entity: &Entity, status: &dyn DiagnosticsSink, location: FileLocation) -> Option<u64> {
	let raw = entity.get_raw(keys::TB_ID)?;
	match raw.trim().parse() {
		Ok(id) => Some(id),
		Err(_) => {
			status.resolution_warning(Some(location), format!("invalid {} \"{raw}\", nothing can be placed inside of this container", keys::TB_ID));
			None
		}
	}
}

fn layer_flags(entity: &Entity) -> BitFlags<LayerFlag> {
	let mut flags = BitFlags::empty();
	for (key, flag) in [
		(keys::TB_LAYER_HIDDEN, LayerFlag::Hidden),
		(keys::TB_LAYER_LOCKED, LayerFlag::Locked),
		(keys::TB_LAYER_OMIT_FROM_EXPORT, LayerFlag::OmitFromExport),
	] {
		if entity.get::<bool>(key).unwrap_or(false) {
			flags |= flag;
		}
	}
	flags
}

/// A group reference takes precedence over a layer reference.
fn container_ref(entity: &Entity) -> Option<ContainerRef> {
	let (key, value) = match entity.get_raw(keys::TB_GROUP) {
		Some(value) => (keys::TB_GROUP, value),
		None => (keys::TB_LAYER, entity.get_raw(keys::TB_LAYER)?),
	};
	let Ok(id) = value.trim().parse() else {
		return Some(ContainerRef::Invalid { key, value: value.to_string() });
	};
	Some(if key == keys::TB_GROUP { ContainerRef::Group(id) } else { ContainerRef::Layer(id) })
}

/// Builds a single face in the `target` dialect.
pub fn build_face(descriptor: &FaceDescriptor, target: MapFormat, config: &MapReaderConfig) -> Result<BrushFace, BrushError> {
	let uv = match descriptor.uv_axes {
		Some([u_axis, v_axis]) => UvProjection::Parallel { u_axis, v_axis },
		None => UvProjection::Paraxial,
	};
	let mut attributes = descriptor.attributes.clone();
	attributes.replace_zero_scale(config.default_face_attributes.scale());

	let mut face = match descriptor.plane {
		FacePlane::Points(points) => BrushFace::new(points, attributes, uv)?,
		FacePlane::Plane(plane) => BrushFace::from_plane(plane, attributes, uv)?,
	};
	face.convert_to(target);
	Ok(face)
}

fn build_brush(info: &BrushInfo, target: MapFormat, config: &MapReaderConfig, status: &dyn DiagnosticsSink) -> Option<BuiltObject> {
	let faces = info
		.faces
		.iter()
		.map(|descriptor| {
			build_face(descriptor, target, config).map_err(|err| format!("face at line {}: {err}", descriptor.location.line))
		})
		.collect::<Result<Vec<_>, _>>();

	let brush = faces.and_then(|faces| Brush::new(faces, &config.world_bounds).map_err(|err| err.to_string()));

	match brush {
		Ok(brush) => Some(BuiltObject::Brush { brush, parent: info.parent }),
		Err(err) => {
			status.construction_error(info.start, format!("Skipping brush: {err}"));
			None
		}
	}
}

fn build_patch(info: &PatchInfo, status: &dyn DiagnosticsSink) -> Option<BuiltObject> {
	match BezierPatch::new(info.row_count, info.column_count, info.control_points.clone(), info.material_name.clone()) {
		Ok(patch) => Some(BuiltObject::Patch { patch, parent: info.parent }),
		Err(err) => {
			status.construction_error(info.start, format!("Skipping patch: {err}"));
			None
		}
	}
}
