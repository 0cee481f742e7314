//! Plane math and convex solid construction for brushes.

use std::ops::Neg;

use float_ord::FloatOrd;

use crate::*;
use brush::BrushError;
use util::AlmostEqual;

/// Represents an infinitely large plane in 3d space, used for defining convex hulls like [Brush]es.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrushPlane {
	pub normal: DVec3,
	pub distance: f64,
}

impl BrushPlane {
	/// Margin used when comparing plane normals.
	pub const NORMAL_EPSILON: f64 = 0.000001;
	/// Margin used when comparing plane distances and point sides.
	pub const DISTANCE_EPSILON: f64 = 0.0001;

	/// Converts three points into a [BrushPlane]. The direction of the plane is based on the winding of the points.
	///
	/// Returns `None` if the points are collinear or not finite.
	pub fn from_points(points: [DVec3; 3]) -> Option<Self> {
		if !points.iter().all(|point| point.is_finite()) {
			return None;
		}
		let normal = (points[2] - points[0]).cross(points[1] - points[0]).try_normalize()?;
		Some(Self {
			normal,
			distance: -normal.dot(points[0]),
		})
	}

	/// Builds a plane from a normal and its distance from the origin along it, such that `normal * distance` lies on the plane.
	pub fn from_normal_and_distance(normal: DVec3, distance: f64) -> Option<Self> {
		let normal = normal.try_normalize()?;
		distance.is_finite().then_some(Self { normal, distance: -distance })
	}

	/// Calculates what side of the plane a point is on.
	///
	/// `>0` = Front Side. `<0` = Back Side. `0` = On Plane
	pub fn point_side(&self, point: DVec3) -> f64 {
		self.normal.dot(point) + self.distance
	}

	/// Three points on this plane that [from_points](Self::from_points) turns back into it.
	pub fn points(&self) -> [DVec3; 3] {
		let origin = self.normal * -self.distance;

		// Cross with whichever axis is least aligned with the normal to get a stable tangent.
		let abs = self.normal.abs();
		let axis = if abs.x <= abs.y && abs.x <= abs.z {
			DVec3::X
		} else if abs.y <= abs.z {
			DVec3::Y
		} else {
			DVec3::Z
		};
		let t1 = axis.cross(self.normal).normalize();
		let t2 = self.normal.cross(t1);

		[origin, origin + t2 * 64., origin + t1 * 64.]
	}

	/// Whether both planes describe the same half-space, within [`NORMAL_EPSILON`](Self::NORMAL_EPSILON) and [`DISTANCE_EPSILON`](Self::DISTANCE_EPSILON).
	pub fn is_equivalent(&self, other: &Self) -> bool {
		self.normal.almost_eq(other.normal, Self::NORMAL_EPSILON) && self.distance.almost_eq(other.distance, Self::DISTANCE_EPSILON)
	}

	/// Attempts to calculate the intersection point between 3 planes, returns `None` if there is no intersection, or the planes are parallel.
	pub fn calculate_intersection_point(planes: [&BrushPlane; 3]) -> Option<DVec3> {
		let [p1, p2, p3] = planes;
		let m1 = dvec3(p1.normal.x, p2.normal.x, p3.normal.x);
		let m2 = dvec3(p1.normal.y, p2.normal.y, p3.normal.y);
		let m3 = dvec3(p1.normal.z, p2.normal.z, p3.normal.z);
		let d = -dvec3(p1.distance, p2.distance, p3.distance);

		let u = m2.cross(m3);
		let v = m1.cross(d);

		let denom = m1.dot(u);

		// Check for parallel planes or if planes do not intersect
		if denom.abs() < f64::EPSILON {
			return None;
		}

		Some(dvec3(d.dot(u), m3.dot(v), -m2.dot(v)) / denom)
	}
}
impl Neg for BrushPlane {
	type Output = Self;
	fn neg(self) -> Self::Output {
		Self {
			normal: -self.normal,
			distance: -self.distance,
		}
	}
}

/// An axis-aligned box. Brushes must lie within the world's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
	pub min: DVec3,
	pub max: DVec3,
}
impl Bounds {
	pub const DEFAULT_EXTENT: f64 = 65536.;

	pub const fn new(min: DVec3, max: DVec3) -> Self {
		Self { min, max }
	}

	/// A cube centered on the origin, reaching `extent` units along every axis.
	pub fn from_extent(extent: f64) -> Self {
		Self::new(DVec3::splat(-extent), DVec3::splat(extent))
	}

	pub fn contains(&self, point: DVec3) -> bool {
		point.cmpge(self.min).all() && point.cmple(self.max).all()
	}

	/// The smallest bounds containing all `points`, or `None` if there are none.
	pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
		points
			.into_iter()
			.fold(None, |bounds: Option<Bounds>, point| match bounds {
				Some(bounds) => Some(Self::new(bounds.min.min(point), bounds.max.max(point))),
				None => Some(Self::new(point, point)),
			})
	}
}
impl Default for Bounds {
	fn default() -> Self {
		Self::from_extent(Self::DEFAULT_EXTENT)
	}
}

/// A closed convex solid computed from a set of planes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polytope {
	pub vertices: Vec<DVec3>,
	/// Indices into [`vertices`](Self::vertices), one polygon per input plane, wound counter-clockwise when looking against the plane normal.
	///
	/// Planes that don't touch the solid have an empty polygon.
	pub faces: Vec<Vec<usize>>,
}

impl Polytope {
	/// The margin that vertices can be off by, but are still treated as one.
	pub const VERTEX_PRECISION_MARGIN: f64 = 0.0001;
	pub const MIN_VOLUME: f64 = 0.0001;

	/// Intersects the back half-spaces of every plane in `planes`.
	///
	/// Fails if fewer than 4 distinct planes remain, the result isn't a closed solid with volume, or any vertex lies outside `bounds`.
	pub fn from_planes(planes: &[BrushPlane], bounds: &Bounds) -> Result<Self, BrushError> {
		let mut distinct: Vec<usize> = Vec::with_capacity(planes.len());
		for (i, plane) in planes.iter().enumerate() {
			if !distinct.iter().any(|&j| planes[j].is_equivalent(plane)) {
				distinct.push(i);
			}
		}
		if distinct.len() < 4 {
			return Err(BrushError::TooFewPlanes { count: distinct.len() });
		}

		let contains_point = |point: DVec3| distinct.iter().all(|&i| planes[i].point_side(point) < Self::VERTEX_PRECISION_MARGIN);

		let mut vertices: Vec<DVec3> = Vec::new();
		for (a, b, c) in distinct.iter().tuple_combinations() {
			let Some(intersection) = BrushPlane::calculate_intersection_point([&planes[*a], &planes[*b], &planes[*c]]) else { continue };
			// If the intersection does not exist within the bounds the hull, discard it
			if !contains_point(intersection) {
				continue;
			}
			if !vertices.iter().any(|vertex| vertex.almost_eq(intersection, Self::VERTEX_PRECISION_MARGIN)) {
				vertices.push(intersection);
			}
		}

		let mut faces = vec![Vec::new(); planes.len()];
		for &i in &distinct {
			let plane = &planes[i];
			let mut polygon = (0..vertices.len())
				.filter(|&v| plane.point_side(vertices[v]).abs() < Self::VERTEX_PRECISION_MARGIN)
				.collect_vec();
			if polygon.len() < 3 {
				continue;
			}
			Self::sort_polygon(&vertices, &mut polygon, plane.normal);
			faces[i] = polygon;
		}

		let polytope = Self { vertices, faces };
		if !polytope.is_closed() {
			return Err(BrushError::NotClosed);
		}
		if polytope.volume() < Self::MIN_VOLUME {
			return Err(BrushError::ZeroVolume);
		}
		if let Some(&point) = polytope.vertices.iter().find(|vertex| !bounds.contains(**vertex)) {
			return Err(BrushError::OutOfBounds { point });
		}

		Ok(polytope)
	}

	/// Sorts the vertices of a convex polygon counter-clockwise around its centroid.
	fn sort_polygon(vertices: &[DVec3], polygon: &mut [usize], normal: DVec3) {
		let center = polygon.iter().map(|&v| vertices[v]).sum::<DVec3>() / polygon.len() as f64;
		let reference = vertices[polygon[0]] - center;

		polygon.sort_unstable_by_key(|&v| {
			let vertex_vector = vertices[v] - center;
			FloatOrd(reference.cross(vertex_vector).dot(normal).atan2(reference.dot(vertex_vector)))
		});
	}

	/// Checks the Euler characteristic of the surface, `V - E + F = 2` for a closed convex solid.
	fn is_closed(&self) -> bool {
		let polygons = self.polygons().collect_vec();
		if polygons.len() < 4 {
			return false;
		}

		let mut edges = polygons
			.iter()
			.flat_map(|polygon| polygon.iter().circular_tuple_windows().map(|(&a, &b)| (a.min(b), a.max(b))))
			.collect_vec();
		edges.sort_unstable();
		edges.dedup();

		self.vertices.len() as isize - edges.len() as isize + polygons.len() as isize == 2
	}

	/// Non-empty face polygons.
	pub fn polygons(&self) -> impl Iterator<Item = &Vec<usize>> {
		self.faces.iter().filter(|polygon| !polygon.is_empty())
	}

	pub fn centroid(&self) -> DVec3 {
		if self.vertices.is_empty() {
			return DVec3::ZERO;
		}
		self.vertices.iter().sum::<DVec3>() / self.vertices.len() as f64
	}

	pub fn volume(&self) -> f64 {
		let center = self.centroid();
		let mut volume = 0.;

		for polygon in self.polygons() {
			let first = self.vertices[polygon[0]] - center;
			for (&b, &c) in polygon[1..].iter().tuple_windows() {
				let b = self.vertices[b] - center;
				let c = self.vertices[c] - center;
				volume += first.dot(b.cross(c)).abs() / 6.;
			}
		}

		volume
	}

	pub fn bounds(&self) -> Option<Bounds> {
		Bounds::from_points(self.vertices.iter().copied())
	}
}

#[cfg(test)]
pub(crate) fn cube_planes(half_size: f64) -> Vec<BrushPlane> {
	[DVec3::X, DVec3::NEG_X, DVec3::Y, DVec3::NEG_Y, DVec3::Z, DVec3::NEG_Z]
		.into_iter()
		.map(|normal| BrushPlane { normal, distance: -half_size })
		.collect()
}

#[test]
fn triangle_conversion() {
	let tri_1 = [dvec3(-16., 16., -32.), dvec3(-16., 16., 16.), dvec3(-16., -16., 16.)];
	let tri_2 = [dvec3(16., 16., 16.), dvec3(16., 16., -32.), dvec3(16., -16., -16.)];

	let plane_1 = BrushPlane::from_points(tri_1).unwrap();
	let plane_2 = BrushPlane::from_points(tri_2).unwrap();

	assert_eq!(plane_1.normal, dvec3(-1., 0., 0.));
	assert_eq!(plane_2.normal, dvec3(1., 0., 0.));
	assert_eq!(plane_1.distance, -16.);
	assert_eq!(plane_2.distance, -16.);

	assert_eq!(BrushPlane::from_points([DVec3::ZERO, DVec3::X, DVec3::X * 2.]), None);
}

#[test]
fn plane_points_round_trip() {
	for normal in [DVec3::X, DVec3::NEG_Z, dvec3(1., 2., -3.).normalize(), dvec3(0., -1., 1.).normalize()] {
		let plane = BrushPlane { normal, distance: 24.5 };
		let rebuilt = BrushPlane::from_points(plane.points()).unwrap();
		assert!(plane.is_equivalent(&rebuilt), "{plane:?} != {rebuilt:?}");
	}

	let plane = BrushPlane::from_normal_and_distance(DVec3::Z * 2., 16.).unwrap();
	assert_almost_eq!(plane.point_side(dvec3(5., 5., 16.)), 0., 1e-9);
}

#[test]
fn cube_polytope() {
	let polytope = Polytope::from_planes(&cube_planes(16.), &Bounds::default()).unwrap();

	assert_eq!(polytope.vertices.len(), 8);
	assert!(polytope.faces.iter().all(|face| face.len() == 4));
	assert_almost_eq!(polytope.volume(), 32. * 32. * 32., 1e-6);
	assert_eq!(polytope.bounds(), Some(Bounds::from_extent(16.)));
}

#[test]
fn polytope_failures() {
	let bounds = Bounds::default();
	let mut planes = cube_planes(16.);

	// Missing a side
	assert!(matches!(Polytope::from_planes(&planes[..5], &bounds), Err(BrushError::NotClosed)));

	// Duplicates don't count
	let duplicated = [planes[0], planes[0], planes[1], planes[1]];
	assert!(matches!(Polytope::from_planes(&duplicated, &bounds), Err(BrushError::TooFewPlanes { count: 2 })));

	// Flat
	planes[0].distance = 16.;
	assert!(Polytope::from_planes(&planes, &bounds).is_err());

	assert!(matches!(
		Polytope::from_planes(&cube_planes(16.), &Bounds::from_extent(8.)),
		Err(BrushError::OutOfBounds { .. })
	));
}

#[test]
fn redundant_plane() {
	let mut planes = cube_planes(16.);
	// Lies entirely outside the cube, so it clips nothing.
	planes.push(BrushPlane { normal: DVec3::X, distance: -32. });

	let polytope = Polytope::from_planes(&planes, &Bounds::default()).unwrap();
	assert_eq!(polytope.vertices.len(), 8);
	assert!(polytope.faces[6].is_empty());
}
