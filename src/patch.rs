//! Quake 3 bezier patches.

use crate::*;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
	#[error("patch dimensions must be odd and at least 3, got {rows}x{columns}")]
	InvalidDimensions { rows: usize, columns: usize },
	#[error("{rows}x{columns} patch needs {expected} control points, got {actual}")]
	PointCountMismatch {
		rows: usize,
		columns: usize,
		expected: usize,
		actual: usize,
	},
	#[error("control point {index} is not finite")]
	NonFinitePoint { index: usize },
}

/// A control point of a [`BezierPatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchPoint {
	pub position: DVec3,
	pub uv: DVec2,
}
impl PatchPoint {
	pub const fn new(position: DVec3, uv: DVec2) -> Self {
		Self { position, uv }
	}
}

/// A grid of quadratic bezier control points, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BezierPatch {
	row_count: usize,
	column_count: usize,
	control_points: Vec<PatchPoint>,
	pub material_name: String,
}

impl BezierPatch {
	pub fn new(row_count: usize, column_count: usize, control_points: Vec<PatchPoint>, material_name: impl Into<String>) -> Result<Self, PatchError> {
		// Quadratic segments share their end points, so each dimension is 2n + 1.
		if row_count < 3 || column_count < 3 || row_count % 2 == 0 || column_count % 2 == 0 {
			return Err(PatchError::InvalidDimensions {
				rows: row_count,
				columns: column_count,
			});
		}

		if row_count.checked_mul(column_count) != Some(control_points.len()) {
			return Err(PatchError::PointCountMismatch {
				rows: row_count,
				columns: column_count,
				expected: row_count.saturating_mul(column_count),
				actual: control_points.len(),
			});
		}

		if let Some(index) = control_points.iter().position(|point| !point.position.is_finite() || !point.uv.is_finite()) {
			return Err(PatchError::NonFinitePoint { index });
		}

		Ok(Self {
			row_count,
			column_count,
			control_points,
			material_name: material_name.into(),
		})
	}

	pub fn row_count(&self) -> usize {
		self.row_count
	}
	pub fn column_count(&self) -> usize {
		self.column_count
	}
	pub fn control_points(&self) -> &[PatchPoint] {
		&self.control_points
	}

	pub fn point(&self, row: usize, column: usize) -> Option<&PatchPoint> {
		if column >= self.column_count {
			return None;
		}
		self.control_points.get(row * self.column_count + column)
	}

	pub fn rows(&self) -> impl Iterator<Item = &[PatchPoint]> {
		self.control_points.chunks(self.column_count)
	}

	pub fn bounds(&self) -> Option<Bounds> {
		Bounds::from_points(self.control_points.iter().map(|point| point.position))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn grid(rows: usize, columns: usize) -> Vec<PatchPoint> {
		(0..rows)
			.cartesian_product(0..columns)
			.map(|(row, column)| PatchPoint::new(dvec3(column as f64 * 32., row as f64 * 32., 0.), dvec2(column as f64, row as f64)))
			.collect()
	}

	#[test]
	fn valid_patch() {
		let patch = BezierPatch::new(3, 5, grid(3, 5), "common/caulk").unwrap();
		assert_eq!(patch.rows().count(), 3);
		assert_eq!(patch.point(1, 4).unwrap().position, dvec3(128., 32., 0.));
		assert_eq!(patch.point(0, 5), None);
		assert_eq!(patch.bounds(), Some(Bounds::new(DVec3::ZERO, dvec3(128., 64., 0.))));
	}

	#[test]
	fn invalid_patches() {
		let mut points = grid(3, 3);
		points.pop();
		assert_eq!(
			BezierPatch::new(3, 3, points, "tex"),
			Err(PatchError::PointCountMismatch {
				rows: 3,
				columns: 3,
				expected: 9,
				actual: 8
			})
		);

		// Dimensions whose product doesn't fit a usize.
		assert!(matches!(
			BezierPatch::new(usize::MAX, 3, grid(3, 3), "tex"),
			Err(PatchError::PointCountMismatch { expected: usize::MAX, actual: 9, .. })
		));

		assert!(matches!(BezierPatch::new(4, 3, grid(4, 3), "tex"), Err(PatchError::InvalidDimensions { .. })));
		assert!(matches!(BezierPatch::new(1, 3, grid(1, 3), "tex"), Err(PatchError::InvalidDimensions { .. })));

		let mut points = grid(3, 3);
		points[4].position.z = f64::NAN;
		assert_eq!(BezierPatch::new(3, 3, points, "tex"), Err(PatchError::NonFinitePoint { index: 4 }));
	}
}
