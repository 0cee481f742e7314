//! Gathers parser callbacks into a flat list of raw records, the input of the builder.
//!
//! A record's index in the list is its identity for the rest of the read. Parent links between records are indices,
//! resolved only once the whole document has been seen.

use crate::*;
use qmap::parser::{FaceDescriptor, FacePlane, MapParserCallback};

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
	pub properties: Vec<EntityProperty>,
	pub start: FileLocation,
	/// `None` if the entity was never closed.
	pub end: Option<FileLocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrushInfo {
	pub faces: Vec<FaceDescriptor>,
	pub start: FileLocation,
	pub end: FileLocation,
	/// Index of the entity record this brush was inside of.
	pub parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchInfo {
	pub row_count: usize,
	pub column_count: usize,
	pub control_points: Vec<PatchPoint>,
	pub material_name: String,
	pub start: FileLocation,
	pub end: FileLocation,
	pub parent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectInfo {
	Entity(EntityInfo),
	Brush(BrushInfo),
	Patch(PatchInfo),
}
impl ObjectInfo {
	pub fn start(&self) -> FileLocation {
		match self {
			Self::Entity(info) => info.start,
			Self::Brush(info) => info.start,
			Self::Patch(info) => info.start,
		}
	}

	/// `None` for blocks that were never closed.
	pub fn end(&self) -> Option<FileLocation> {
		match self {
			Self::Entity(info) => info.end,
			Self::Brush(info) => Some(info.end),
			Self::Patch(info) => Some(info.end),
		}
	}
}

/// A [`MapParserCallback`] storing everything it's given.
#[derive(Debug, Default)]
pub struct ObjectCollector {
	objects: Vec<ObjectInfo>,
	/// Record indices of the entities currently open.
	entity_stack: Vec<usize>,
	current_brush: Option<(FileLocation, Vec<FaceDescriptor>)>,
	/// Faces given outside of any brush, as when parsing bare face lines.
	loose_faces: Vec<FaceDescriptor>,
}

impl ObjectCollector {
	pub fn objects(&self) -> &[ObjectInfo] {
		&self.objects
	}

	pub fn into_objects(self) -> Vec<ObjectInfo> {
		self.objects
	}

	pub fn into_loose_faces(self) -> Vec<FaceDescriptor> {
		self.loose_faces
	}

	/// Adds a face to the brush being collected, or to the loose faces if there is none.
	pub fn add_face(&mut self, face: FaceDescriptor) {
		match &mut self.current_brush {
			Some((_, faces)) => faces.push(face),
			None => self.loose_faces.push(face),
		}
	}

	fn current_entity(&self) -> Option<usize> {
		self.entity_stack.last().copied()
	}
}

impl MapParserCallback for ObjectCollector {
	fn on_begin_entity(&mut self, location: FileLocation, properties: Vec<EntityProperty>, _status: &dyn DiagnosticsSink) {
		// Entities don't nest, anything still open here was never closed.
		self.entity_stack.clear();

		self.entity_stack.push(self.objects.len());
		self.objects.push(ObjectInfo::Entity(EntityInfo {
			properties,
			start: location,
			end: None,
		}));
	}

	fn on_end_entity(&mut self, location: FileLocation, _status: &dyn DiagnosticsSink) {
		let Some(index) = self.entity_stack.pop() else { return };
		if let Some(ObjectInfo::Entity(info)) = self.objects.get_mut(index) {
			info.end = Some(location);
		}
	}

	fn on_begin_brush(&mut self, location: FileLocation, _status: &dyn DiagnosticsSink) {
		self.current_brush = Some((location, Vec::new()));
	}

	fn on_end_brush(&mut self, location: FileLocation, _status: &dyn DiagnosticsSink) {
		let Some((start, faces)) = self.current_brush.take() else { return };
		self.objects.push(ObjectInfo::Brush(BrushInfo {
			faces,
			start,
			end: location,
			parent: self.current_entity(),
		}));
	}

	fn on_standard_face(&mut self, location: FileLocation, points: [DVec3; 3], attributes: BrushFaceAttributes, _status: &dyn DiagnosticsSink) {
		self.add_face(FaceDescriptor {
			location,
			plane: FacePlane::Points(points),
			attributes,
			uv_axes: None,
		});
	}

	fn on_valve_face(
		&mut self,
		location: FileLocation,
		points: [DVec3; 3],
		attributes: BrushFaceAttributes,
		u_axis: DVec3,
		v_axis: DVec3,
		_status: &dyn DiagnosticsSink,
	) {
		self.add_face(FaceDescriptor {
			location,
			plane: FacePlane::Points(points),
			attributes,
			uv_axes: Some([u_axis, v_axis]),
		});
	}

	fn on_patch(
		&mut self,
		start: FileLocation,
		end: FileLocation,
		row_count: usize,
		column_count: usize,
		control_points: Vec<PatchPoint>,
		material_name: String,
		_status: &dyn DiagnosticsSink,
	) {
		self.objects.push(ObjectInfo::Patch(PatchInfo {
			row_count,
			column_count,
			control_points,
			material_name,
			start,
			end,
			parent: self.current_entity(),
		}));
	}
}
