//! Contains Brush definitions, UV projection math, and dialect conversion of faces.

use crate::*;
use util::ConvertZeroToOne;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrushError {
	#[error("face points are collinear")]
	DegenerateFace,
	#[error("brush has only {count} distinct planes, at least 4 are required")]
	TooFewPlanes { count: usize },
	#[error("brush planes don't form a closed solid")]
	NotClosed,
	#[error("brush has no volume")]
	ZeroVolume,
	#[error("brush vertex {point} is outside the world bounds")]
	OutOfBounds { point: DVec3 },
}

/// Material name and texture alignment of a face, along with the optional per-dialect extras.
#[derive(Debug, Clone, SmartDefault, PartialEq, Serialize, Deserialize)]
pub struct BrushFaceAttributes {
	pub material_name: String,
	pub offset: DVec2,
	/// In degrees.
	pub rotation: f64,
	#[default(DVec2::ONE)]
	pub scale: DVec2,

	/// Quake 2 style surface contents, if the face line had them.
	pub surface_contents: Option<i32>,
	pub surface_flags: Option<i32>,
	pub surface_value: Option<f32>,
	/// Daikatana face color.
	pub color: Option<[u8; 3]>,
}
impl BrushFaceAttributes {
	pub fn new(material_name: impl Into<String>) -> Self {
		Self {
			material_name: material_name.into(),
			..default()
		}
	}

	/// Replaces zero scale components, which would make texture coordinates infinite, with the components of `default_scale`.
	pub fn replace_zero_scale(&mut self, default_scale: DVec2) {
		if self.scale.x == 0. {
			self.scale.x = default_scale.x;
		}
		if self.scale.y == 0. {
			self.scale.y = default_scale.y;
		}
	}

	pub fn has_surface_attributes(&self) -> bool {
		self.surface_contents.is_some() || self.surface_flags.is_some() || self.surface_value.is_some()
	}
}

/// How texture axes are derived for a face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum UvProjection {
	/// Axes come from the axis-aligned plane closest to the face, then get rotated by the face's rotation.
	#[default]
	Paraxial,
	/// Axes are stored explicitly, as in the Valve 220 format. Rotation is baked in.
	Parallel { u_axis: DVec3, v_axis: DVec3 },
}

/// The Quake paraxial base axes: a plane normal followed by its u and v axes.
const BASE_AXES: [[DVec3; 3]; 6] = [
	[DVec3::Z, DVec3::X, DVec3::NEG_Y],
	[DVec3::NEG_Z, DVec3::X, DVec3::NEG_Y],
	[DVec3::X, DVec3::Y, DVec3::NEG_Z],
	[DVec3::NEG_X, DVec3::Y, DVec3::NEG_Z],
	[DVec3::Y, DVec3::X, DVec3::NEG_Z],
	[DVec3::NEG_Y, DVec3::X, DVec3::NEG_Z],
];

/// Returns the base u and v axes of the axis-aligned plane closest to `normal`. On ties, the first in table order wins.
pub fn paraxial_base_axes(normal: DVec3) -> [DVec3; 2] {
	let mut best = 0;
	let mut best_dot = f64::NEG_INFINITY;
	for (i, [base_normal, _, _]) in BASE_AXES.iter().enumerate() {
		let dot = normal.dot(*base_normal);
		if dot > best_dot {
			best = i;
			best_dot = dot;
		}
	}
	[BASE_AXES[best][1], BASE_AXES[best][2]]
}

/// Index of the first non-zero component.
fn major_index(v: DVec3) -> usize {
	if v.x != 0. {
		0
	} else if v.y != 0. {
		1
	} else {
		2
	}
}

/// Sine and cosine of `degrees`, exact for multiples of 90.
fn sin_cos_degrees(degrees: f64) -> (f64, f64) {
	match degrees.rem_euclid(360.) {
		0. => (0., 1.),
		90. => (1., 0.),
		180. => (0., -1.),
		270. => (-1., 0.),
		degrees => degrees.to_radians().sin_cos(),
	}
}

/// Rotates the paraxial base axes in the plane they span.
fn rotated_paraxial_axes(normal: DVec3, rotation: f64) -> [DVec3; 2] {
	let mut axes = paraxial_base_axes(normal);
	let sv = major_index(axes[0]);
	let tv = major_index(axes[1]);
	let (sin, cos) = sin_cos_degrees(rotation);

	for axis in &mut axes {
		let s = cos * axis[sv] - sin * axis[tv];
		let t = sin * axis[sv] + cos * axis[tv];
		axis[sv] = s;
		axis[tv] = t;
	}
	axes
}

/// A surface of a brush: the plane it lies on, the material, and how the material is projected onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushFace {
	/// The three points the plane was defined by, kept so that writing the face back out is lossless.
	pub points: [DVec3; 3],
	pub plane: BrushPlane,
	pub attributes: BrushFaceAttributes,
	pub uv: UvProjection,
}

impl BrushFace {
	pub fn new(points: [DVec3; 3], attributes: BrushFaceAttributes, uv: UvProjection) -> Result<Self, BrushError> {
		let plane = BrushPlane::from_points(points).ok_or(BrushError::DegenerateFace)?;
		Ok(Self {
			points,
			plane,
			attributes,
			uv,
		})
	}

	/// Creates a face from a plane, deriving three points on it.
	pub fn from_plane(plane: BrushPlane, attributes: BrushFaceAttributes, uv: UvProjection) -> Result<Self, BrushError> {
		Self::new(plane.points(), attributes, uv)
	}

	/// The u and v texture axes of this face, before scaling.
	pub fn texture_axes(&self) -> [DVec3; 2] {
		match self.uv {
			UvProjection::Paraxial => rotated_paraxial_axes(self.plane.normal, self.attributes.rotation),
			UvProjection::Parallel { u_axis, v_axis } => [u_axis, v_axis],
		}
	}

	/// Texture coordinates of `point` in texels.
	pub fn uv_coords(&self, point: DVec3) -> DVec2 {
		let [u_axis, v_axis] = self.texture_axes();
		let scale = self.attributes.scale.convert_zero_to_one();
		dvec2(point.dot(u_axis), point.dot(v_axis)) / scale + self.attributes.offset
	}

	/// Converts this face to what `format` can represent: switches the UV projection and drops unsupported extras.
	pub fn convert_to(&mut self, format: MapFormat) {
		match self.uv {
			UvProjection::Paraxial if format.is_valve() => self.convert_to_parallel(),
			UvProjection::Parallel { .. } if !format.is_valve() => self.convert_to_paraxial(),
			_ => {}
		}

		if !format.has_surface_attributes() {
			self.attributes.surface_contents = None;
			self.attributes.surface_flags = None;
			self.attributes.surface_value = None;
		}
		if !format.has_color() {
			self.attributes.color = None;
		}
	}

	/// Bakes the paraxial rotation into explicit axes. Texture coordinates are unchanged.
	pub fn convert_to_parallel(&mut self) {
		let [u_axis, v_axis] = self.texture_axes();
		self.uv = UvProjection::Parallel { u_axis, v_axis };
	}

	/// Finds the paraxial rotation, scale and offset that best reproduce the explicit axes.
	///
	/// Exact when the axes lie in the paraxial plane up to rotation and scale, sheared projections can't be represented.
	pub fn convert_to_paraxial(&mut self) {
		let UvProjection::Parallel { u_axis, v_axis } = self.uv else { return };
		let normal = self.plane.normal;
		let scale = self.attributes.scale.convert_zero_to_one();

		let [base_u, base_v] = paraxial_base_axes(normal);
		let sv = major_index(base_u);
		let tv = major_index(base_v);
		// The normal axis, texture axes have no component along it.
		let k = 3 - sv - tv;

		// Texture gradients over the paraxial plane, with the normal component folded in through the plane equation.
		let flatten = |axis: DVec3, scale: f64| {
			let gradient = dvec2(axis[sv] - axis[k] * normal[sv] / normal[k], axis[tv] - axis[k] * normal[tv] / normal[k]) / scale;
			let offset = axis[k] * -self.plane.distance / normal[k] / scale;
			(gradient, offset)
		};
		let (u_gradient, u_offset) = flatten(u_axis, scale.x);
		let (v_gradient, v_offset) = flatten(v_axis, scale.y);

		let base_u_2d = dvec2(base_u[sv], base_u[tv]);
		let base_v_2d = dvec2(base_v[sv], base_v[tv]);

		if u_gradient.length() < f64::EPSILON {
			// The u axis is parallel to the normal, nothing sensible to recover.
			self.uv = UvProjection::Paraxial;
			return;
		}

		let angle = u_gradient.y.atan2(u_gradient.x) - base_u_2d.y.atan2(base_u_2d.x);
		let rotated_v = DVec2::from_angle(angle).rotate(base_v_2d);
		let v_dot = rotated_v.dot(v_gradient);

		let attributes = &mut self.attributes;
		attributes.rotation = angle.to_degrees().rem_euclid(360.);
		attributes.scale.x = 1. / u_gradient.length();
		if v_dot.abs() > f64::EPSILON {
			attributes.scale.y = 1. / v_dot;
		}
		attributes.offset += dvec2(u_offset, v_offset);

		self.uv = UvProjection::Paraxial;
	}
}

/// A convex hull with material data attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brush {
	faces: Vec<BrushFace>,
	geometry: Polytope,
}

impl Brush {
	/// Computes the geometry of `faces`, failing if they don't form a valid solid within `world_bounds`.
	pub fn new(faces: Vec<BrushFace>, world_bounds: &Bounds) -> Result<Self, BrushError> {
		let planes = faces.iter().map(|face| face.plane).collect_vec();
		let geometry = Polytope::from_planes(&planes, world_bounds)?;
		Ok(Self { faces, geometry })
	}

	pub fn faces(&self) -> &[BrushFace] {
		&self.faces
	}

	pub fn geometry(&self) -> &Polytope {
		&self.geometry
	}

	pub fn bounds(&self) -> Option<Bounds> {
		self.geometry.bounds()
	}

	/// Vertices of the polygon belonging to the face at `index`, in winding order.
	pub fn face_vertices(&self, index: usize) -> impl Iterator<Item = DVec3> + '_ {
		self.geometry.faces.get(index).into_iter().flatten().map(|&v| self.geometry.vertices[v])
	}

	/// Returns `true` if `point` is not on the outside of the brush, else `false`.
	pub fn contains_point(&self, point: DVec3) -> bool {
		// I don't use exactly 0 here just in case the floating-point precision is a bit off
		self.faces.iter().all(|face| face.plane.point_side(point) < 0.000001)
	}

	/// Converts every face to `format`. Planes are unaffected, so the geometry stays valid.
	pub fn convert_to(&mut self, format: MapFormat) {
		for face in &mut self.faces {
			face.convert_to(format);
		}
	}
}
