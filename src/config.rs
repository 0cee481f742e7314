use std::any::type_name;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::*;

/// Creates the root of a document from the first worldspawn entity (or an empty one if the document has none) and the target format.
///
/// Called before anything else is attached. The returned world must have a default layer as its first child.
pub type WorldFactoryFn = dyn Fn(Entity, MapFormat) -> anyhow::Result<WorldNode> + Send + Sync;

/// A replaceable callback in [`MapReaderConfig`]. New callbacks are given the one they replace, so they can wrap it instead.
pub struct Hook<F: ?Sized>(pub Arc<F>);
impl<F: ?Sized> Deref for Hook<F> {
	type Target = F;
	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl<F: ?Sized + Send + Sync> fmt::Debug for Hook<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Hook<{}>", type_name::<F>())
	}
}
impl<F: ?Sized> Clone for Hook<F> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}
impl<F: ?Sized> Hook<F> {
	/// Replaces the callback with what `provider` returns. `provider` receives the current callback to optionally call from the new one.
	pub fn set(&mut self, provider: impl FnOnce(Arc<F>) -> Arc<F>) {
		self.0 = provider(self.0.clone());
	}
}

/// How to read and write map documents.
#[derive(Debug, Clone, SmartDefault, DefaultBuilder)]
pub struct MapReaderConfig {
	/// The name of the game, written in the `// Game:` header comment.
	#[builder(into)]
	pub name: String,

	/// Brushes with vertices outside of these bounds are rejected. (Default: 65536 units along every axis)
	pub world_bounds: Bounds,

	/// How many threads build brushes and patches. `None` uses one per available core, `Some(1)` builds on the calling thread.
	pub worker_threads: Option<usize>,

	/// Maximum characters of a property value when writing exported maps, longer values are split into numbered properties.
	/// See [`Entity::set_folded`]. 0 disables splitting. (Default: 1023, what Quake engines can parse)
	#[default(1023)]
	pub property_chunk_size: usize,

	/// Used where a face is missing or has unusable attributes.
	pub default_face_attributes: DefaultFaceAttributes,

	/// Creates the world node, see [`WorldFactoryFn`]. (Default: [`MapReaderConfig::default_world_factory`])
	#[builder(skip)]
	#[default(Hook(Arc::new(Self::default_world_factory)))]
	pub world_factory: Hook<WorldFactoryFn>,
}

impl MapReaderConfig {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..default() }
	}

	/// Builder-style setter for [`world_factory`](Self::world_factory), wraps the previous factory.
	pub fn world_factory(mut self, provider: impl FnOnce(Arc<WorldFactoryFn>) -> Arc<WorldFactoryFn>) -> Self {
		self.world_factory.set(provider);
		self
	}

	/// A world with an empty default layer.
	pub fn default_world_factory(entity: Entity, format: MapFormat) -> anyhow::Result<WorldNode> {
		Ok(WorldNode::new(entity, format))
	}
}

/// Attributes given to faces that don't specify their own, and replacements for unusable values.
#[derive(Debug, Clone, SmartDefault, PartialEq, Serialize, Deserialize)]
pub struct DefaultFaceAttributes {
	/// Material used for new faces. (Default: `__TB_empty`)
	#[default("__TB_empty".s())]
	pub material_name: String,
	/// If [`Some`], overrides the default x and y texture offset.
	pub offset: Option<DVec2>,
	/// If [`Some`], overrides the default texture scale. Also used to replace zero scales.
	pub scale: Option<DVec2>,
	/// If [`Some`], overrides the default texture rotation.
	pub rotation: Option<f64>,
	pub surface_contents: Option<i32>,
	pub surface_flags: Option<i32>,
	pub surface_value: Option<f32>,
	/// The default surface color (only applicable for Daikatana)
	pub color: Option<[u8; 3]>,
}
impl DefaultFaceAttributes {
	/// Returns `true` if any attribute is set to something not the default, else `false`.
	pub fn is_any_set(&self) -> bool {
		self.offset.is_some()
			|| self.scale.is_some()
			|| self.rotation.is_some()
			|| self.surface_contents.is_some()
			|| self.surface_flags.is_some()
			|| self.surface_value.is_some()
			|| self.color.is_some()
	}

	pub fn scale(&self) -> DVec2 {
		self.scale.unwrap_or(DVec2::ONE)
	}

	/// Face attributes for a new face with these defaults.
	pub fn attributes(&self) -> BrushFaceAttributes {
		BrushFaceAttributes {
			material_name: self.material_name.clone(),
			offset: self.offset.unwrap_or_default(),
			rotation: self.rotation.unwrap_or_default(),
			scale: self.scale(),
			surface_contents: self.surface_contents,
			surface_flags: self.surface_flags,
			surface_value: self.surface_value,
			color: self.color,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stacked_world_factories() {
		let config = MapReaderConfig::new("Quake")
			.world_factory(|prev| {
				Arc::new(move |mut entity: Entity, format: MapFormat| {
					entity.set("_sunlight", "200");
					prev(entity, format)
				})
			})
			.world_factory(|prev| {
				Arc::new(move |entity: Entity, format: MapFormat| -> anyhow::Result<WorldNode> {
					let mut world = prev(entity, format)?;
					world.add_layer(LayerNode::new(Layer::new("Lighting")));
					Ok(world)
				})
			});

		let world = (config.world_factory)(Entity::with_classname("worldspawn"), MapFormat::Valve).unwrap();
		assert_eq!(world.entity.get_raw("_sunlight"), Some("200"));
		assert_eq!(world.custom_layers().map(|layer| layer.layer.name.as_str()).collect_vec(), ["Lighting"]);
		assert!(world.is_valid());

		// Replacing without calling the previous factory drops the whole stack.
		let mut rejecting = config.clone();
		rejecting
			.world_factory
			.set(|_| Arc::new(|_: Entity, format: MapFormat| -> anyhow::Result<WorldNode> { Err(anyhow!("{format} maps are not supported")) }));
		let err = (rejecting.world_factory)(Entity::with_classname("worldspawn"), MapFormat::Hexen2).unwrap_err();
		assert_eq!(err.to_string(), "Hexen2 maps are not supported");
		assert!((config.world_factory)(Entity::default(), MapFormat::Hexen2).is_ok());
	}

	#[test]
	fn world_factory_wrapping() {
		let config = MapReaderConfig::new("Quake").worker_threads(Some(2)).world_factory(|prev| {
			Arc::new(move |mut entity: Entity, format: MapFormat| {
				entity.set("message", "Wrapped");
				prev(entity, format)
			})
		});
		assert_eq!(config.worker_threads, Some(2));
		assert_eq!(format!("{:?}", config.world_factory), format!("Hook<{}>", type_name::<WorldFactoryFn>()));

		let world = (config.world_factory)(Entity::with_classname("worldspawn"), MapFormat::Quake2).unwrap();
		assert_eq!(world.entity.get_raw("message"), Some("Wrapped"));
		assert_eq!(world.format, MapFormat::Quake2);
		assert!(world.is_valid());
	}

	#[test]
	fn default_attributes() {
		let defaults = DefaultFaceAttributes::default();
		assert!(!defaults.is_any_set());
		assert_eq!(defaults.attributes(), BrushFaceAttributes::new("__TB_empty"));

		let defaults = DefaultFaceAttributes {
			scale: Some(DVec2::splat(0.5)),
			..default()
		};
		assert!(defaults.is_any_set());
		assert_eq!(defaults.attributes().scale, DVec2::splat(0.5));
	}
}
