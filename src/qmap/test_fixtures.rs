//! Map text shared between tests.

use crate::*;
use util::format_vec3;

/// The TrenchBroom default 128x128x32 cube, as plane points.
pub const CUBE_FACES: [[DVec3; 3]; 6] = [
	[dvec3(-64., -64., -16.), dvec3(-64., -63., -16.), dvec3(-64., -64., -15.)],
	[dvec3(-64., -64., -16.), dvec3(-64., -64., -15.), dvec3(-63., -64., -16.)],
	[dvec3(-64., -64., -16.), dvec3(-63., -64., -16.), dvec3(-64., -63., -16.)],
	[dvec3(64., 64., 16.), dvec3(64., 65., 16.), dvec3(65., 64., 16.)],
	[dvec3(64., 64., 16.), dvec3(65., 64., 16.), dvec3(64., 64., 17.)],
	[dvec3(64., 64., 16.), dvec3(64., 64., 17.), dvec3(64., 65., 16.)],
];

/// Face lines of [`CUBE_FACES`] in the standard dialect, one per line.
pub fn standard_cube_faces() -> String {
	cube_faces(|_| "__TB_empty 0 0 0 1 1".s())
}

/// Face lines of [`CUBE_FACES`] in the Valve dialect, with axes matching the paraxial projection.
pub fn valve_cube_faces() -> String {
	cube_faces(|points| {
		let plane = BrushPlane::from_points(points).map(|plane| plane.normal).unwrap_or(DVec3::Z);
		let [u, v] = brush::paraxial_base_axes(plane);
		format!("__TB_empty [ {} 0 ] [ {} 0 ] 0 1 1", format_vec3(u), format_vec3(v))
	})
}

fn cube_faces(rest: impl Fn([DVec3; 3]) -> String) -> String {
	let mut out = String::new();
	for points in CUBE_FACES {
		out += &format!(
			"( {} ) ( {} ) ( {} ) {}\n",
			format_vec3(points[0]),
			format_vec3(points[1]),
			format_vec3(points[2]),
			rest(points)
		);
	}
	out
}

/// A flat 3x3 patch block, lines 1 to 12.
pub const PATCH_3X3: &str = "{
patchDef2
{
common/caulk
( 3 3 0 0 0 )
(
( ( -64 -64 0 0 0 ) ( 0 -64 0 0.5 0 ) ( 64 -64 0 1 0 ) )
( ( -64 0 0 0 0.5 ) ( 0 0 0 0.5 0.5 ) ( 64 0 0 1 0.5 ) )
( ( -64 64 0 0 1 ) ( 0 64 0 0.5 1 ) ( 64 64 0 1 1 ) )
)
}
}
";

/// A Valve document using layers, groups, a linked group, an entity in a group and a brush entity.
pub fn layered_map() -> String {
	let cube = valve_cube_faces();
	format!(
		r#"// Game: Quake
// Format: Valve
// entity 0
{{
"classname" "worldspawn"
"wad" "quake.wad"
// brush 0
{{
{cube}}}
}}
// entity 1
{{
"classname" "info_player_start"
"origin" "0 0 32"
}}
// entity 2
{{
"classname" "func_group"
"_tb_type" "_tb_layer"
"_tb_name" "Details"
"_tb_id" "1"
"_tb_layer_sort_index" "0"
"_tb_layer_hidden" "1"
// brush 0
{{
{cube}}}
}}
// entity 3
{{
"classname" "func_group"
"_tb_type" "_tb_group"
"_tb_name" "Lamps"
"_tb_id" "2"
"_tb_layer" "1"
"_tb_linked_group_id" "{{d6a3c1f0}}"
"_tb_transformation" "1 0 0 0 0 1 0 0 0 0 1 0 0 0 0 1"
}}
// entity 4
{{
"classname" "light"
"origin" "0 0 64"
"_tb_group" "2"
}}
// entity 5
{{
"classname" "func_door"
"_tb_layer" "1"
// brush 0
{{
{cube}}}
}}
"#
	)
}
