use crate::*;

pub trait AlmostEqual<T> {
	type Margin;
	fn almost_eq(self, other: T, margin: Self::Margin) -> bool;
}

impl AlmostEqual<f32> for f32 {
	type Margin = f32;
	fn almost_eq(self, other: f32, margin: Self::Margin) -> bool {
		(other - self).abs() < margin
	}
}

impl AlmostEqual<f64> for f64 {
	type Margin = f64;
	fn almost_eq(self, other: f64, margin: Self::Margin) -> bool {
		(other - self).abs() < margin
	}
}
impl AlmostEqual<DVec2> for DVec2 {
	type Margin = f64;
	fn almost_eq(self, other: DVec2, margin: Self::Margin) -> bool {
		self.x.almost_eq(other.x, margin) && self.y.almost_eq(other.y, margin)
	}
}
impl AlmostEqual<DVec3> for DVec3 {
	type Margin = f64;
	fn almost_eq(self, other: DVec3, margin: Self::Margin) -> bool {
		self.x.almost_eq(other.x, margin) && self.y.almost_eq(other.y, margin) && self.z.almost_eq(other.z, margin)
	}
}

#[allow(unused)]
macro_rules! assert_almost_eq {
	($left:expr, $right:expr, $margin:expr) => {
		match ($left, $right, $margin) {
			(left, right, margin) => {
				if !$crate::util::AlmostEqual::almost_eq(left, right, margin) {
					panic!("assertion `left.almost_eq(right)` failed\n  left: {left:?}\n right: {right:?}");
				}
			}
		}
	};
	($left:expr, $right:expr, $margin:expr, $($arg:tt)+) => {
		match ($left, $right, $margin) {
			(left, right, margin) => {
				if !$crate::util::AlmostEqual::almost_eq(left, right, margin) {
					panic!($($arg)+);
				}
			}
		}
	};
}

pub trait ConvertZeroToOne {
	/// If this equals to zero, return it where it is one, created for use with division.
	fn convert_zero_to_one(self) -> Self;
}

impl ConvertZeroToOne for f64 {
	fn convert_zero_to_one(self) -> Self {
		if self == 0. { 1. } else { self }
	}
}

impl ConvertZeroToOne for DVec2 {
	fn convert_zero_to_one(self) -> Self {
		dvec2(self.x.convert_zero_to_one(), self.y.convert_zero_to_one())
	}
}

/// Formats a float the way map files expect it: shortest representation that parses back to the same value, without a trailing `.0`.
pub fn format_number(value: f64) -> String {
	// `-0` reads back fine, but it's noise in saved files.
	let value = if value == 0. { 0. } else { value };
	format!("{value}")
}

/// Formats a vector as space separated numbers.
pub fn format_vec3(v: DVec3) -> String {
	format!("{} {} {}", format_number(v.x), format_number(v.y), format_number(v.z))
}

#[test]
fn zero_to_one() {
	assert_eq!(0f64.convert_zero_to_one(), 1.);
	assert_eq!(dvec2(0., -2.).convert_zero_to_one(), dvec2(1., -2.));
}

#[test]
fn number_formatting() {
	assert_eq!(format_number(16.), "16");
	assert_eq!(format_number(-0.), "0");
	assert_eq!(format_number(0.125), "0.125");
	assert_eq!(format_vec3(dvec3(-64., 0.5, 1e-3)), "-64 0.5 0.001");
	assert_eq!(format_number(0.1 + 0.2).parse::<f64>().unwrap(), 0.1 + 0.2);
}
