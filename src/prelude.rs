pub(crate) use anyhow::anyhow;
pub(crate) use bevy::log::{debug, error, warn};
pub(crate) use bevy::math::{DVec2, DVec3, dvec2, dvec3};
pub(crate) use bevy::utils::default;
pub(crate) use default_struct_builder::*;
pub(crate) use itertools::*;
pub(crate) use nil::prelude::*;
pub(crate) use nil::std_prelude::*;
pub(crate) use serde::*;
pub(crate) use thiserror::Error;

pub use crate::{
	brush::{Brush, BrushFace, BrushFaceAttributes, UvProjection},
	config::{DefaultFaceAttributes, Hook, MapReaderConfig},
	entity::{Entity, EntityProperty, PropertyValue},
	format::MapFormat,
	geometry::{Bounds, BrushPlane, Polytope},
	node::{BrushNode, EntityNode, Group, GroupNode, Layer, LayerFlag, LayerNode, Node, NodeKind, PatchNode, WorldNode},
	patch::{BezierPatch, PatchPoint},
	qmap::{MapReader, writer::MapWriter},
	status::{Diagnostic, DiagnosticKind, DiagnosticsSink, FileLocation, MapReadError, ParserStatus, Severity},
	tasks::{ParallelExecutor, SequentialExecutor, TaskPoolExecutor},
};
