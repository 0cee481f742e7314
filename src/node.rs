//! The scene graph a map document is read into.
//!
//! Ownership is strictly top-down, nodes don't know their parents. "Which layer is this on" style questions are answered by searching from the world.

use enumflags2::{BitFlags, bitflags};

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum NodeKind {
	World,
	Layer,
	Group,
	Entity,
	Brush,
	Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
	World(WorldNode),
	Layer(LayerNode),
	Group(GroupNode),
	Entity(EntityNode),
	Brush(BrushNode),
	Patch(PatchNode),
}

impl Node {
	pub fn kind(&self) -> NodeKind {
		match self {
			Self::World(_) => NodeKind::World,
			Self::Layer(_) => NodeKind::Layer,
			Self::Group(_) => NodeKind::Group,
			Self::Entity(_) => NodeKind::Entity,
			Self::Brush(_) => NodeKind::Brush,
			Self::Patch(_) => NodeKind::Patch,
		}
	}

	pub fn children(&self) -> &[Node] {
		match self {
			Self::World(node) => &node.children,
			Self::Layer(node) => &node.children,
			Self::Group(node) => &node.children,
			Self::Entity(node) => &node.children,
			Self::Brush(_) | Self::Patch(_) => &[],
		}
	}

	/// `None` for leaf nodes.
	pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
		match self {
			Self::World(node) => Some(&mut node.children),
			Self::Layer(node) => Some(&mut node.children),
			Self::Group(node) => Some(&mut node.children),
			Self::Entity(node) => Some(&mut node.children),
			Self::Brush(_) | Self::Patch(_) => None,
		}
	}

	/// Whether a node of kind `child` may be a direct child of this node.
	pub fn can_add_child(&self, child: NodeKind) -> bool {
		use NodeKind::*;
		match self.kind() {
			World => child == Layer,
			Layer | Group => matches!(child, Group | Entity | Brush | Patch),
			Entity => matches!(child, Brush | Patch),
			Brush | Patch => false,
		}
	}

	/// Appends `child`, or hands it back if this node can't hold it.
	pub fn add_child(&mut self, child: Node) -> Result<(), Node> {
		if !self.can_add_child(child.kind()) {
			return Err(child);
		}
		match self.children_mut() {
			Some(children) => {
				children.push(child);
				Ok(())
			}
			None => Err(child),
		}
	}

	/// Calls `f` on this node and every descendant, parents before children.
	pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
		f(self);
		for child in self.children() {
			child.visit(f);
		}
	}

	/// Number of nodes of `kind` in this subtree, including this node.
	pub fn count(&self, kind: NodeKind) -> usize {
		let mut count = 0;
		self.visit(&mut |node| {
			if node.kind() == kind {
				count += 1;
			}
		});
		count
	}

	/// The entity properties of world and entity nodes.
	pub fn entity(&self) -> Option<&Entity> {
		match self {
			Self::World(node) => Some(&node.entity),
			Self::Entity(node) => Some(&node.entity),
			_ => None,
		}
	}

	pub fn as_brush(&self) -> Option<&Brush> {
		match self {
			Self::Brush(node) => Some(&node.brush),
			_ => None,
		}
	}
}

/// Root of a document. The first child is always the default layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldNode {
	/// The worldspawn properties.
	pub entity: Entity,
	pub format: MapFormat,
	pub children: Vec<Node>,
}

impl WorldNode {
	pub const DEFAULT_LAYER_NAME: &'static str = "Default Layer";

	/// A world with an empty default layer.
	pub fn new(entity: Entity, format: MapFormat) -> Self {
		Self::from_parts(entity, format, LayerNode::new(Layer::new(Self::DEFAULT_LAYER_NAME)))
	}

	pub fn from_parts(entity: Entity, format: MapFormat, default_layer: LayerNode) -> Self {
		Self {
			entity,
			format,
			children: vec![Node::Layer(default_layer)],
		}
	}

	/// Whether the first child is a layer, and there are no non-layer children.
	pub fn is_valid(&self) -> bool {
		matches!(self.children.first(), Some(Node::Layer(_))) && self.children.iter().all(|child| child.kind() == NodeKind::Layer)
	}

	pub fn default_layer(&self) -> Option<&LayerNode> {
		match self.children.first() {
			Some(Node::Layer(layer)) => Some(layer),
			_ => None,
		}
	}

	pub fn default_layer_mut(&mut self) -> Option<&mut LayerNode> {
		match self.children.first_mut() {
			Some(Node::Layer(layer)) => Some(layer),
			_ => None,
		}
	}

	/// Every layer except the default one, in document order.
	pub fn custom_layers(&self) -> impl Iterator<Item = &LayerNode> {
		self.layers().skip(1)
	}

	pub fn layers(&self) -> impl Iterator<Item = &LayerNode> {
		self.children.iter().filter_map(|child| match child {
			Node::Layer(layer) => Some(layer),
			_ => None,
		})
	}

	pub fn add_layer(&mut self, layer: LayerNode) {
		self.children.push(Node::Layer(layer));
	}

	/// Finds the layer `node` is on by identity. `node` must be a reference into this world.
	pub fn layer_of(&self, node: &Node) -> Option<&LayerNode> {
		self.layers().find(|layer| {
			let mut found = false;
			for child in &layer.children {
				child.visit(&mut |descendant| found |= std::ptr::eq(descendant, node));
			}
			found
		})
	}

	/// Calls `f` on every node below the world, parents before children.
	pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
		for child in &self.children {
			child.visit(f);
		}
	}

	/// Number of nodes of `kind` below the world.
	pub fn count(&self, kind: NodeKind) -> usize {
		self.children.iter().map(|child| child.count(kind)).sum()
	}
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerFlag {
	Hidden,
	Locked,
	/// Left out when exporting the map for compilation.
	OmitFromExport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
	pub name: String,
	/// The `_tb_id` the layer was stored with. Assigned when writing if `None`.
	pub persistent_id: Option<u64>,
	pub sort_index: Option<i32>,
	/// Stored verbatim, as written by the editor.
	pub color: Option<String>,
	pub flags: BitFlags<LayerFlag>,
}
impl Layer {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..default() }
	}

	pub fn omit_from_export(&self) -> bool {
		self.flags.contains(LayerFlag::OmitFromExport)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
	pub name: String,
	pub persistent_id: Option<u64>,
	/// Groups sharing a linked group id are instances of each other.
	pub linked_group_id: Option<String>,
	/// The transformation of a linked group instance, stored verbatim.
	pub transformation: Option<String>,
}
impl Group {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..default() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerNode {
	pub layer: Layer,
	pub children: Vec<Node>,
}
impl LayerNode {
	pub fn new(layer: Layer) -> Self {
		Self { layer, children: Vec::new() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupNode {
	pub group: Group,
	pub children: Vec<Node>,
}
impl GroupNode {
	pub fn new(group: Group) -> Self {
		Self { group, children: Vec::new() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
	pub entity: Entity,
	pub children: Vec<Node>,
}
impl EntityNode {
	pub fn new(entity: Entity) -> Self {
		Self { entity, children: Vec::new() }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushNode {
	pub brush: Brush,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchNode {
	pub patch: BezierPatch,
}

macro_rules! node_from_impl {
	($($variant:ident($ty:ty)),* $(,)?) => {$(
		impl From<$ty> for Node {
			fn from(value: $ty) -> Self {
				Self::$variant(value)
			}
		}
	)*};
}
node_from_impl!(
	World(WorldNode),
	Layer(LayerNode),
	Group(GroupNode),
	Entity(EntityNode),
	Brush(BrushNode),
	Patch(PatchNode),
);
