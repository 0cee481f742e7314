//! Entity key/value properties, the reserved keys used to encode editor structure, and typed property access.

use std::any::type_name;
use std::mem;

use crate::*;

/// Property keys and values with special meaning.
pub mod keys {
	pub const CLASSNAME: &str = "classname";
	pub const WORLDSPAWN: &str = "worldspawn";
	/// Classname of brush entities that hold layers and groups.
	pub const FUNC_GROUP: &str = "func_group";

	/// Either [`TB_LAYER`] or [`TB_GROUP`] on `func_group` entities.
	pub const TB_TYPE: &str = "_tb_type";
	/// As a [`TB_TYPE`] value, marks a layer. As a key, the id of the layer an entity or group is on.
	pub const TB_LAYER: &str = "_tb_layer";
	/// As a [`TB_TYPE`] value, marks a group. As a key, the id of the group an entity or group is in.
	pub const TB_GROUP: &str = "_tb_group";
	pub const TB_NAME: &str = "_tb_name";
	pub const TB_ID: &str = "_tb_id";
	pub const TB_LAYER_SORT_INDEX: &str = "_tb_layer_sort_index";
	pub const TB_LAYER_LOCKED: &str = "_tb_layer_locked";
	pub const TB_LAYER_HIDDEN: &str = "_tb_layer_hidden";
	pub const TB_LAYER_OMIT_FROM_EXPORT: &str = "_tb_layer_omit_from_export";
	pub const TB_LAYER_COLOR: &str = "_tb_layer_color";
	pub const TB_LINKED_GROUP_ID: &str = "_tb_linked_group_id";
	pub const TB_TRANSFORMATION: &str = "_tb_transformation";

	/// Prefix shared by all editor bookkeeping keys.
	pub const TB_PREFIX: &str = "_tb_";

	/// Keys that are represented by a node's position in the tree rather than stored as properties.
	pub const STRUCTURAL: &[&str] = &[
		TB_TYPE,
		TB_LAYER,
		TB_GROUP,
		TB_NAME,
		TB_ID,
		TB_LAYER_SORT_INDEX,
		TB_LAYER_LOCKED,
		TB_LAYER_HIDDEN,
		TB_LAYER_OMIT_FROM_EXPORT,
		TB_LAYER_COLOR,
		TB_LINKED_GROUP_ID,
		TB_TRANSFORMATION,
	];
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityPropertyError {
	#[error("required property `{property}` not found")]
	RequiredPropertyNotFound { property: String },
	#[error("requires property `{property}` to be a valid `{required_type}`. Error: {error}")]
	PropertyParseError {
		property: String,
		required_type: &'static str,
		error: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityProperty {
	pub key: String,
	pub value: String,
}
impl EntityProperty {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

/// An ordered list of key/value properties. Keys are case-sensitive, and lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
	pub properties: Vec<EntityProperty>,
}

impl Entity {
	pub fn new(properties: Vec<EntityProperty>) -> Self {
		Self { properties }
	}

	/// An entity with just a `classname`.
	pub fn with_classname(classname: impl Into<String>) -> Self {
		Self::new(vec![EntityProperty::new(keys::CLASSNAME, classname)])
	}

	pub fn get_raw(&self, key: &str) -> Option<&str> {
		self.properties.iter().find(|property| property.key == key).map(|property| property.value.as_str())
	}

	pub fn has(&self, key: &str) -> bool {
		self.get_raw(key).is_some()
	}

	/// Gets the classname of the entity, on any valid entity, this will return `Ok`. Otherwise it will return [EntityPropertyError::RequiredPropertyNotFound].
	pub fn classname(&self) -> Result<&str, EntityPropertyError> {
		self.get_raw(keys::CLASSNAME).ok_or_else(|| EntityPropertyError::RequiredPropertyNotFound {
			property: keys::CLASSNAME.s(),
		})
	}

	pub fn is_worldspawn(&self) -> bool {
		self.get_raw(keys::CLASSNAME) == Some(keys::WORLDSPAWN)
	}

	/// Helper function to try to parse a [PropertyValue] property from this entity.
	pub fn get<T: PropertyValue>(&self, key: &str) -> Result<T, EntityPropertyError> {
		let s = self
			.get_raw(key)
			.ok_or_else(|| EntityPropertyError::RequiredPropertyNotFound { property: key.s() })?;

		T::parse_property(s).map_err(|err| EntityPropertyError::PropertyParseError {
			property: key.s(),
			required_type: type_name::<T>(),
			error: format!("{err}"),
		})
	}

	/// Sets the value of the first property with `key`, or appends a new property.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();
		let value = value.into();
		match self.properties.iter_mut().find(|property| property.key == key) {
			Some(property) => property.value = value,
			None => self.properties.push(EntityProperty { key, value }),
		}
	}

	/// Removes every property with `key`, returning the first value.
	pub fn remove(&mut self, key: &str) -> Option<String> {
		let mut removed = None;
		self.properties.retain_mut(|property| {
			if property.key != key {
				return true;
			}
			if removed.is_none() {
				removed = Some(mem::take(&mut property.value));
			}
			false
		});
		removed
	}

	/// Reads a value that may have been split across `key1`, `key2`, ... by [`set_folded`](Self::set_folded).
	///
	/// If `key1` exists, the contiguous run starting at it is concatenated. Otherwise `key` is read as is.
	pub fn folded(&self, key: &str) -> Option<String> {
		if !self.has(&format!("{key}1")) {
			return self.get_raw(key).map(str::to_string);
		}

		let mut value = String::new();
		for i in 1.. {
			let Some(chunk) = self.get_raw(&format!("{key}{i}")) else { break };
			value.push_str(chunk);
		}
		Some(value)
	}

	/// Stores `value` under `key`, splitting it across `key1`, `key2`, ... if it's longer than `chunk_size` characters.
	///
	/// A `chunk_size` of 0 never splits. Any previous value under `key` or its numbered run is replaced.
	pub fn set_folded(&mut self, key: &str, value: &str, chunk_size: usize) {
		self.remove_folded(key);

		if chunk_size == 0 || value.chars().count() <= chunk_size {
			self.set(key, value);
			return;
		}

		let chars = value.chars().collect_vec();
		for (i, chunk) in chars.chunks(chunk_size).enumerate() {
			self.properties.push(EntityProperty::new(format!("{key}{}", i + 1), chunk.iter().collect::<String>()));
		}
	}

	fn remove_folded(&mut self, key: &str) {
		self.remove(key);
		for i in 1.. {
			if self.remove(&format!("{key}{i}")).is_none() {
				break;
			}
		}
	}

	/// Whether any property is editor bookkeeping (starts with `_tb_`).
	pub fn has_editor_properties(&self) -> bool {
		self.properties.iter().any(|property| property.key.starts_with(keys::TB_PREFIX))
	}

	/// Removes the keys in [`keys::STRUCTURAL`].
	pub fn strip_structural_properties(&mut self) {
		self.properties.retain(|property| !keys::STRUCTURAL.contains(&property.key.as_str()));
	}
}

/// A type that can be stored in an entity property.
pub trait PropertyValue: Sized {
	/// Parses a property value into `Self`.
	fn parse_property(input: &str) -> anyhow::Result<Self>;
	/// Converts this value into the string stored in the property.
	fn to_property(&self) -> String;
}

impl PropertyValue for String {
	fn parse_property(input: &str) -> anyhow::Result<Self> {
		Ok(input.to_string())
	}
	fn to_property(&self) -> String {
		self.clone()
	}
}

/// Accepts `1`/`0` as written by the editor, and `true`/`false`.
impl PropertyValue for bool {
	fn parse_property(input: &str) -> anyhow::Result<Self> {
		match input.trim() {
			"1" | "true" => Ok(true),
			"0" | "false" | "" => Ok(false),
			other => Err(anyhow!("expected 0 or 1, found `{other}`")),
		}
	}
	fn to_property(&self) -> String {
		if *self { "1".s() } else { "0".s() }
	}
}

macro_rules! simple_property_value_impl {
	($($ty:ty),* $(,)?) => {$(
		impl PropertyValue for $ty {
			fn parse_property(input: &str) -> anyhow::Result<Self> {
				Ok(input.trim().parse()?)
			}
			fn to_property(&self) -> String {
				self.to_string()
			}
		}
	)*};
}

simple_property_value_impl!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl PropertyValue for DVec3 {
	fn parse_property(input: &str) -> anyhow::Result<Self> {
		<[f64; 3]>::parse_property(input).map(DVec3::from)
	}
	fn to_property(&self) -> String {
		util::format_vec3(*self)
	}
}
impl PropertyValue for DVec2 {
	fn parse_property(input: &str) -> anyhow::Result<Self> {
		<[f64; 2]>::parse_property(input).map(DVec2::from)
	}
	fn to_property(&self) -> String {
		format!("{} {}", util::format_number(self.x), util::format_number(self.y))
	}
}

impl<T: PropertyValue + Default + Copy, const N: usize> PropertyValue for [T; N] {
	fn parse_property(input: &str) -> anyhow::Result<Self> {
		let mut out = [T::default(); N];
		let mut count = 0;

		for (i, input) in input.split_ascii_whitespace().enumerate() {
			if i >= out.len() {
				return Err(anyhow!("Too many elements! Expected: {N}"));
			}
			out[i] = T::parse_property(input)?;
			count += 1;
		}
		if count != N {
			return Err(anyhow!("Too few elements! Expected: {N}, found: {count}"));
		}

		Ok(out)
	}
	fn to_property(&self) -> String {
		self.iter().map(T::to_property).join(" ")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn typed_access() {
		let mut entity = Entity::with_classname("light");
		entity.set("origin", "16 -32 8.5");
		entity.set("light", "300");
		entity.set("spawnflags", "abc");

		assert_eq!(entity.classname(), Ok("light"));
		assert_eq!(entity.get::<DVec3>("origin"), Ok(dvec3(16., -32., 8.5)));
		assert_eq!(entity.get::<u32>("light"), Ok(300));
		assert!(matches!(entity.get::<i32>("spawnflags"), Err(EntityPropertyError::PropertyParseError { .. })));
		assert!(matches!(entity.get::<f64>("wait"), Err(EntityPropertyError::RequiredPropertyNotFound { .. })));
		assert!(entity.get::<[f64; 3]>("light").is_err());

		assert_eq!(Entity::default().classname().unwrap_err().to_string(), "required property `classname` not found");
	}

	#[test]
	fn set_and_remove() {
		let mut entity = Entity::with_classname("worldspawn");
		assert!(entity.is_worldspawn());

		entity.set("wad", "a.wad");
		entity.set("wad", "b.wad");
		assert_eq!(entity.properties.len(), 2);
		assert_eq!(entity.get_raw("wad"), Some("b.wad"));

		entity.properties.push(EntityProperty::new("wad", "c.wad"));
		assert_eq!(entity.remove("wad"), Some("b.wad".s()));
		assert!(!entity.has("wad"));
		assert_eq!(entity.remove("wad"), None);
	}

	#[test]
	fn folding_chunk_boundaries() {
		let mut entity = Entity::with_classname("info_notnull");

		// Exactly the chunk size stays unsplit.
		entity.set_folded("message", "abcd", 4);
		assert_eq!(entity.get_raw("message"), Some("abcd"));
		assert!(!entity.has("message1"));

		// One over splits.
		entity.set_folded("message", "abcde", 4);
		assert!(!entity.has("message"));
		assert_eq!(entity.get_raw("message1"), Some("abcd"));
		assert_eq!(entity.get_raw("message2"), Some("e"));
		assert_eq!(entity.folded("message"), Some("abcde".s()));

		// Exact multiple, and the old second chunk is replaced rather than left dangling.
		entity.set_folded("message", "abcdefgh", 4);
		assert_eq!(entity.get_raw("message2"), Some("efgh"));
		assert!(!entity.has("message3"));

		// Shrinking back removes the numbered run.
		entity.set_folded("message", "hi", 4);
		assert_eq!(entity.get_raw("message"), Some("hi"));
		assert!(!entity.has("message1") && !entity.has("message2"));
		assert_eq!(entity.folded("message"), Some("hi".s()));

		entity.set_folded("message", &"x".repeat(5000), 0);
		assert_eq!(entity.get_raw("message").map(str::len), Some(5000));

		// Multibyte characters count as one.
		entity.set_folded("message", "ééé", 3);
		assert_eq!(entity.get_raw("message"), Some("ééé"));

		assert_eq!(entity.folded("target"), None);
	}

	#[test]
	fn structural_properties() {
		let mut entity = Entity::with_classname("func_group");
		entity.set(keys::TB_TYPE, keys::TB_LAYER);
		entity.set(keys::TB_ID, "3");
		entity.set("_tb_custom", "kept");
		assert!(entity.has_editor_properties());

		entity.strip_structural_properties();
		assert_eq!(entity.properties, vec![EntityProperty::new(keys::CLASSNAME, "func_group"), EntityProperty::new("_tb_custom", "kept")]);
	}

	#[test]
	fn bool_values() {
		assert!(bool::parse_property("1").unwrap());
		assert!(!bool::parse_property("0").unwrap());
		assert!(bool::parse_property("yes").is_err());
		assert_eq!(true.to_property(), "1");
	}
}
