//! Attaches built objects to their parents.
//!
//! Objects refer to their containers by record index (brushes and patches) or by persistent id (entities and groups).
//! Id tables are filled from the whole document before anything is attached, so containers declared after their members still resolve.

use bevy::platform::collections::HashMap;

use crate::*;
use entity::keys;
use qmap::builder::{Built, BuiltObject, ContainerRef};

/// Where children can be put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Container {
	/// Top level of a fragment.
	Root,
	DefaultLayer,
	/// Holds brushes and patches with nowhere else to go in a world.
	DefaultEntity,
	Layer(usize),
	Group(usize),
	Entity(usize),
}

enum Item {
	Layer(usize),
	Group(usize),
	Entity(usize),
	Leaf(Node),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
	World,
	Fragment,
}

/// An object waiting for its parent to be decided.
enum Pending {
	Layer(usize),
	Group(usize),
	Entity { slot: usize, parent: Option<ContainerRef> },
	Leaf { node: Node, parent: Option<usize> },
}

struct Resolver<'a> {
	mode: Mode,
	status: &'a dyn DiagnosticsSink,

	layers: Vec<Option<LayerNode>>,
	groups: Vec<Option<GroupNode>>,
	entities: Vec<Option<EntityNode>>,
	group_parents: Vec<Container>,

	layer_ids: HashMap<u64, usize>,
	group_ids: HashMap<u64, usize>,
	/// Where the children of each record go, by record index.
	record_containers: HashMap<usize, Container>,
	children: HashMap<Container, Vec<Item>>,
}

impl<'a> Resolver<'a> {
	fn new(mode: Mode, status: &'a dyn DiagnosticsSink) -> Self {
		Self {
			mode,
			status,
			layers: Vec::new(),
			groups: Vec::new(),
			entities: Vec::new(),
			group_parents: Vec::new(),
			layer_ids: HashMap::default(),
			group_ids: HashMap::default(),
			record_containers: HashMap::default(),
			children: HashMap::default(),
		}
	}

	/// Where entities and groups go if they don't name a valid container.
	fn fallback(&self) -> Container {
		match self.mode {
			Mode::World => Container::DefaultLayer,
			Mode::Fragment => Container::Root,
		}
	}

	/// Where brushes and patches go if they have no valid parent.
	fn leaf_fallback(&self) -> Container {
		match self.mode {
			Mode::World => Container::DefaultEntity,
			Mode::Fragment => Container::Root,
		}
	}

	fn push(&mut self, container: Container, item: Item) {
		self.children.entry(container).or_default().push(item);
	}

	fn add_entity(&mut self, index: usize, entity: Entity, parent: Option<ContainerRef>) -> Pending {
		let slot = self.entities.len();
		self.entities.push(Some(EntityNode::new(entity)));
		self.record_containers.insert(index, Container::Entity(slot));
		Pending::Entity { slot, parent }
	}

	/// Registers every object, returning what still has to be attached, in document order.
	///
	/// Returns the first worldspawn separately in world mode.
	fn register(&mut self, built: Vec<Option<Built>>) -> (Option<(Entity, Layer)>, Vec<(FileLocation, Pending)>) {
		let mut world = None;
		let mut pending = Vec::with_capacity(built.len());
		let mut group_refs = Vec::new();

		for (index, built) in built.into_iter().enumerate() {
			let Some(Built { object, start }) = built else { continue };

			let item = match object {
				BuiltObject::World { entity, default_layer } => match self.mode {
					Mode::World if world.is_none() => {
						world = Some((entity, default_layer));
						self.record_containers.insert(index, Container::DefaultLayer);
						continue;
					}
					Mode::World => {
						self.status
							.resolution_warning(Some(start), "Found a second worldspawn entity, keeping it as a regular entity".s());
						self.add_entity(index, entity, None)
					}
					Mode::Fragment => {
						self.record_containers.insert(index, Container::Root);
						continue;
					}
				},
				BuiltObject::Layer(layer) => {
					let slot = self.layers.len();
					if let Some(id) = layer.persistent_id {
						if self.layer_ids.contains_key(&id) {
							self.status.resolution_warning(Some(start), format!("Duplicate layer id {id}, references resolve to the first layer"));
						} else {
							self.layer_ids.insert(id, slot);
						}
					}
					self.layers.push(Some(LayerNode::new(layer)));
					self.record_containers.insert(index, Container::Layer(slot));
					Pending::Layer(slot)
				}
				BuiltObject::Group { group, parent } => {
					let slot = self.groups.len();
					if let Some(id) = group.persistent_id {
						if self.group_ids.contains_key(&id) {
							self.status.resolution_warning(Some(start), format!("Duplicate group id {id}, references resolve to the first group"));
						} else {
							self.group_ids.insert(id, slot);
						}
					}
					self.groups.push(Some(GroupNode::new(group)));
					group_refs.push((start, parent));
					self.record_containers.insert(index, Container::Group(slot));
					Pending::Group(slot)
				}
				BuiltObject::Entity { entity, parent } => self.add_entity(index, entity, parent),
				BuiltObject::Brush { brush, parent } => Pending::Leaf {
					node: Node::Brush(BrushNode { brush }),
					parent,
				},
				BuiltObject::Patch { patch, parent } => Pending::Leaf {
					node: Node::Patch(PatchNode { patch }),
					parent,
				},
			};
			pending.push((start, item));
		}

		// Groups are resolved ahead of everything else so cycles can be broken before anything is attached.
		self.group_parents = group_refs
			.into_iter()
			.map(|(start, parent)| self.resolve_ref(parent.as_ref(), start, "group"))
			.collect();
		self.break_group_cycles(&pending);

		(world, pending)
	}

	fn resolve_ref(&self, reference: Option<&ContainerRef>, location: FileLocation, what: &str) -> Container {
		let resolved = match reference {
			None => return self.fallback(),
			Some(ContainerRef::Layer(id)) => self.layer_ids.get(id).map(|&slot| Container::Layer(slot)),
			Some(ContainerRef::Group(id)) => self.group_ids.get(id).map(|&slot| Container::Group(slot)),
			Some(ContainerRef::Invalid { .. }) => None,
		};

		resolved.unwrap_or_else(|| {
			let reference = match reference {
				Some(ContainerRef::Layer(id)) => format!("{} {id}", keys::TB_LAYER),
				Some(ContainerRef::Group(id)) => format!("{} {id}", keys::TB_GROUP),
				Some(ContainerRef::Invalid { key, value }) => format!("{key} \"{value}\""),
				None => String::new(),
			};
			self.status.resolution_warning(
				Some(location),
				format!("Could not resolve {reference} of {what}, adding it to the default container instead"),
			);
			self.fallback()
		})
	}

	/// Detaches the first group of every parent cycle found.
	fn break_group_cycles(&mut self, pending: &[(FileLocation, Pending)]) {
		let locations: HashMap<usize, FileLocation> = pending
			.iter()
			.filter_map(|(location, pending)| match pending {
				Pending::Group(slot) => Some((*slot, *location)),
				_ => None,
			})
			.collect();

		for slot in 0..self.group_parents.len() {
			let mut current = self.group_parents[slot];
			for _ in 0..self.group_parents.len() {
				let Container::Group(parent) = current else { break };
				if parent == slot {
					self.status.resolution_warning(
						locations.get(&slot).copied(),
						"Group is contained in itself, adding it to the default container instead".s(),
					);
					self.group_parents[slot] = self.fallback();
					break;
				}
				current = self.group_parents[parent];
			}
		}
	}

	/// Decides the container of every pending object.
	fn attach(&mut self, pending: Vec<(FileLocation, Pending)>) {
		for (location, pending) in pending {
			match pending {
				Pending::Layer(slot) => {
					// Custom layers are direct children of the world, which isn't a container here.
					if self.mode == Mode::Fragment {
						self.push(Container::Root, Item::Layer(slot));
					}
				}
				Pending::Group(slot) => self.push(self.group_parents[slot], Item::Group(slot)),
				Pending::Entity { slot, parent } => {
					let container = self.resolve_ref(parent.as_ref(), location, "entity");
					self.push(container, Item::Entity(slot));
				}
				Pending::Leaf { node, parent } => {
					let what = node.kind().to_string().to_lowercase();
					let container = match parent.map(|index| (index, self.record_containers.get(&index))) {
						Some((_, Some(&container))) => container,
						Some((index, None)) => {
							self.status.resolution_warning(
								Some(location),
								format!("Parent of {what} (object {index}) was skipped, adding it to the default entity instead"),
							);
							self.leaf_fallback()
						}
						None => {
							if self.mode == Mode::World {
								self.status
									.resolution_warning(Some(location), format!("Found {what} outside of any entity, adding it to the default entity"));
							}
							self.leaf_fallback()
						}
					};
					self.push(container, Item::Leaf(node));
				}
			}
		}
	}

	/// Takes the children of `container` out of the resolver, recursively assembling nested containers.
	fn assemble(&mut self, container: Container) -> Vec<Node> {
		let items = self.children.remove(&container).unwrap_or_default();
		let mut nodes = Vec::with_capacity(items.len());

		for item in items {
			let node = match item {
				Item::Leaf(node) => node,
				Item::Entity(slot) => {
					let Some(mut entity) = self.entities[slot].take() else { continue };
					entity.children = self.assemble(Container::Entity(slot));
					Node::Entity(entity)
				}
				Item::Group(slot) => {
					let Some(mut group) = self.groups[slot].take() else { continue };
					group.children = self.assemble(Container::Group(slot));
					Node::Group(group)
				}
				Item::Layer(slot) => {
					let Some(layer) = self.take_layer(slot) else { continue };
					Node::Layer(layer)
				}
			};
			nodes.push(node);
		}

		nodes
	}

	fn take_layer(&mut self, slot: usize) -> Option<LayerNode> {
		let mut layer = self.layers.get_mut(slot)?.take()?;
		layer.children = self.assemble(Container::Layer(slot));
		Some(layer)
	}
}

/// Builds the world of a whole document.
///
/// The world factory is called before anything else is attached. Objects that can't be placed where the document says
/// end up in the default layer, or in a default entity at the end of the default layer for brushes and patches.
pub fn resolve_world(
	built: Vec<Option<Built>>,
	format: MapFormat,
	config: &MapReaderConfig,
	status: &dyn DiagnosticsSink,
) -> Result<WorldNode, MapReadError> {
	let mut resolver = Resolver::new(Mode::World, status);
	let (world, pending) = resolver.register(built);

	let (entity, layer_metadata) = match world {
		Some((entity, layer)) => (entity, Some(layer)),
		None => (Entity::with_classname(keys::WORLDSPAWN), None),
	};
	let mut world = (config.world_factory)(entity, format).map_err(MapReadError::WorldFactory)?;
	if !world.is_valid() {
		return Err(MapReadError::InvalidWorld);
	}

	resolver.attach(pending);

	let mut default_children = resolver.assemble(Container::DefaultLayer);
	let default_entity_children = resolver.assemble(Container::DefaultEntity);
	if !default_entity_children.is_empty() {
		default_children.push(Node::Entity(EntityNode {
			entity: Entity::default(),
			children: default_entity_children,
		}));
	}

	let default_layer = world.default_layer_mut().ok_or(MapReadError::InvalidWorld)?;
	if let Some(metadata) = layer_metadata {
		if metadata.color.is_some() {
			default_layer.layer.color = metadata.color;
		}
		default_layer.layer.flags |= metadata.flags;
	}
	default_layer.children.extend(default_children);

	for slot in 0..resolver.layers.len() {
		if let Some(layer) = resolver.take_layer(slot) {
			world.add_layer(layer);
		}
	}

	Ok(world)
}

/// Builds the top level nodes of a partial document, as pasted from a clipboard.
///
/// Worldspawn entities are dropped and their contents kept at the top level. Nothing is ever wrapped in a default container.
pub fn resolve_fragment(built: Vec<Option<Built>>, status: &dyn DiagnosticsSink) -> Vec<Node> {
	let mut resolver = Resolver::new(Mode::Fragment, status);
	let (_, pending) = resolver.register(built);
	resolver.attach(pending);
	resolver.assemble(Container::Root)
}
