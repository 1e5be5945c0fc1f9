//! Pluggable payload codecs.
//!
//! A [`Codec`] owns the payload of one wire shape, keyed by type name.
//! Identity tagging stays with the walker; a codec only sees the bytes
//! between a `NEW` definition's id and the next slot, and recurses through
//! the context for nested slots so containers of arbitrary element types
//! compose. Built-ins cover the shared containers ([`ListCodec`],
//! [`MapCodec`]), reflective member handles ([`MemberCodec`]), and
//! path-addressed assets ([`AssetCodec`]).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{DeserializeError, RegistryError, SerializeError};
use crate::object::ObjRef;
use crate::types::{TypeDesc, LIST, MAP, MEMBER};
use crate::value::Value;
use crate::walker::{DecodeCx, EncodeCx};

/// A payload codec for one wire shape.
pub trait Codec {
    /// The type name this codec claims.
    fn shape(&self) -> &str;

    /// Encode the payload of a freshly defined value (its `NEW` tag and id
    /// are already written).
    fn encode(&self, value: &Value, cx: &mut EncodeCx<'_>) -> Result<(), SerializeError>;

    /// Decode the payload of definition `id` and settle it on the session.
    /// A payload whose nested slots are all resolved must settle before
    /// returning; one awaiting forward references may settle later.
    fn decode(
        &self,
        ty: &TypeDesc,
        id: u32,
        cx: &mut DecodeCx<'_, '_>,
    ) -> Result<(), DeserializeError>;
}

/// Codecs keyed by wire shape name.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Box<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard set: list, map, and member-handle codecs.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.codecs.insert(LIST.to_owned(), Box::new(ListCodec));
        reg.codecs.insert(MAP.to_owned(), Box::new(MapCodec));
        reg.codecs.insert(MEMBER.to_owned(), Box::new(MemberCodec));
        reg
    }

    pub fn add(&mut self, codec: Box<dyn Codec>) -> Result<(), RegistryError> {
        let shape = codec.shape().to_owned();
        if self.codecs.contains_key(&shape) {
            return Err(RegistryError::DuplicateCodec(shape));
        }
        self.codecs.insert(shape, codec);
        Ok(())
    }

    pub fn get(&self, shape: &str) -> Option<&dyn Codec> {
        self.codecs.get(shape).map(|c| c.as_ref())
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Shared sequences: length, then one slot per element.
///
/// The decoded list settles eagerly with null placeholders, so a list that
/// contains itself (directly or through a cycle) resolves to the one shared
/// allocation; elements patch in place as their slots resolve.
pub struct ListCodec;

impl Codec for ListCodec {
    fn shape(&self) -> &str {
        LIST
    }

    fn encode(&self, value: &Value, cx: &mut EncodeCx<'_>) -> Result<(), SerializeError> {
        let items = value.as_list().ok_or(SerializeError::CodecMismatch {
            shape: LIST.to_owned(),
            kind: value.kind_name(),
        })?;
        let len = items.borrow().len();
        cx.writer().write_u32(len as u32);
        // Clone each element out before recursing: encoding an element may
        // re-enter this list through a cycle and borrow it again.
        for index in 0..len {
            let item = items.borrow()[index].clone();
            cx.encode_slot(&item, &TypeDesc::any())?;
        }
        Ok(())
    }

    fn decode(
        &self,
        _ty: &TypeDesc,
        id: u32,
        cx: &mut DecodeCx<'_, '_>,
    ) -> Result<(), DeserializeError> {
        let len = cx.reader().read_u32()? as usize;
        let items: Rc<RefCell<Vec<Value>>> = Rc::new(RefCell::new(vec![Value::Null; len]));
        cx.settle(id, Value::List(items.clone()));
        for index in 0..len {
            let items = items.clone();
            cx.decode_slot(Box::new(move |value, _queue| {
                items.borrow_mut()[index] = value.clone();
            }))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// Shared associative containers: length, then alternating key and value
/// slots in insertion order.
///
/// Unlike a list, a map cannot settle before its keys exist, so it settles
/// once all `2 * len` slots have resolved. A map reachable through its own
/// keys or values therefore never settles and surfaces as an unsettled
/// root; the format has no answer for that shape.
pub struct MapCodec;

struct MapBuilder {
    keys: Vec<Option<Value>>,
    vals: Vec<Option<Value>>,
    remaining: usize,
}

impl MapBuilder {
    fn build(&self) -> Value {
        let pairs = self
            .keys
            .iter()
            .zip(&self.vals)
            .map(|(k, v)| {
                (
                    k.clone().unwrap_or(Value::Null),
                    v.clone().unwrap_or(Value::Null),
                )
            })
            .collect();
        Value::Map(Rc::new(RefCell::new(pairs)))
    }
}

impl Codec for MapCodec {
    fn shape(&self) -> &str {
        MAP
    }

    fn encode(&self, value: &Value, cx: &mut EncodeCx<'_>) -> Result<(), SerializeError> {
        let pairs = value.as_map().ok_or(SerializeError::CodecMismatch {
            shape: MAP.to_owned(),
            kind: value.kind_name(),
        })?;
        let len = pairs.borrow().len();
        cx.writer().write_u32(len as u32);
        for index in 0..len {
            let (key, val) = pairs.borrow()[index].clone();
            cx.encode_slot(&key, &TypeDesc::any())?;
            cx.encode_slot(&val, &TypeDesc::any())?;
        }
        Ok(())
    }

    fn decode(
        &self,
        _ty: &TypeDesc,
        id: u32,
        cx: &mut DecodeCx<'_, '_>,
    ) -> Result<(), DeserializeError> {
        let len = cx.reader().read_u32()? as usize;
        let builder = Rc::new(RefCell::new(MapBuilder {
            keys: vec![None; len],
            vals: vec![None; len],
            remaining: 2 * len,
        }));

        for index in 0..len {
            for key_slot in [true, false] {
                let builder = builder.clone();
                cx.decode_slot(Box::new(move |value, queue| {
                    let mut b = builder.borrow_mut();
                    let slot = if key_slot {
                        &mut b.keys[index]
                    } else {
                        &mut b.vals[index]
                    };
                    *slot = Some(value.clone());
                    b.remaining -= 1;
                    if b.remaining == 0 {
                        queue.push(id, b.build());
                    }
                }))?;
            }
        }

        // All slots resolved during the walk (or the map is empty): the
        // queue path above never ran for the final slot's own settlement.
        if !cx.is_settled(id) && builder.borrow().remaining == 0 {
            let built = builder.borrow().build();
            cx.settle(id, built);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Member handles
// ---------------------------------------------------------------------------

/// Reflective member handles: declaring type descriptor, member name,
/// static flag. Decode re-resolves the member by name against the running
/// program and fails hard if it no longer exists.
pub struct MemberCodec;

impl Codec for MemberCodec {
    fn shape(&self) -> &str {
        MEMBER
    }

    fn encode(&self, value: &Value, cx: &mut EncodeCx<'_>) -> Result<(), SerializeError> {
        let (declaring, name, is_static) = match value {
            Value::Member {
                declaring,
                name,
                is_static,
            } => (declaring, name, *is_static),
            other => {
                return Err(SerializeError::CodecMismatch {
                    shape: MEMBER.to_owned(),
                    kind: other.kind_name(),
                })
            }
        };
        cx.encode_type(&TypeDesc::named(declaring.clone()))?;
        cx.writer().write_string(name);
        cx.writer().write_bool(is_static);
        Ok(())
    }

    fn decode(
        &self,
        _ty: &TypeDesc,
        id: u32,
        cx: &mut DecodeCx<'_, '_>,
    ) -> Result<(), DeserializeError> {
        let declaring = cx.decode_type()?;
        let name = cx.reader().read_string()?;
        let is_static = cx.reader().read_bool()?;

        let exists = {
            let schemas = cx.schemas();
            match schemas.get(&declaring.name) {
                Some(schema) if is_static => schema.find_static(&name).is_some(),
                Some(schema) => schemas.find_member(schema, &name).is_some(),
                None => false,
            }
        };
        if !exists {
            return Err(DeserializeError::UnknownMember {
                ty: declaring.name,
                member: name,
            });
        }

        cx.settle(
            id,
            Value::Member {
                declaring: declaring.name,
                name,
                is_static,
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Resolves asset instances to stable paths and back. Assets are external
/// resources whose contents never enter the stream; only their address does.
pub trait AssetResolver {
    /// The stable path of a live asset instance, if it has one.
    fn locate(&self, asset: &ObjRef) -> Option<String>;

    /// Reload (or look up) the asset behind a stable path.
    fn resolve(&self, path: &str) -> Option<ObjRef>;
}

/// Path-addressed asset codec: the payload is a single path string.
///
/// One instance per asset type name; register as many as the program has
/// asset kinds, each with its resolver.
pub struct AssetCodec {
    shape: String,
    resolver: Box<dyn AssetResolver>,
}

impl AssetCodec {
    pub fn new(shape: impl Into<String>, resolver: Box<dyn AssetResolver>) -> Self {
        Self {
            shape: shape.into(),
            resolver,
        }
    }
}

impl Codec for AssetCodec {
    fn shape(&self) -> &str {
        &self.shape
    }

    fn encode(&self, value: &Value, cx: &mut EncodeCx<'_>) -> Result<(), SerializeError> {
        let asset = value.as_object().ok_or(SerializeError::CodecMismatch {
            shape: self.shape.clone(),
            kind: value.kind_name(),
        })?;
        let path = self
            .resolver
            .locate(asset)
            .ok_or_else(|| SerializeError::AssetNotLocated(self.shape.clone()))?;
        cx.writer().write_string(&path);
        Ok(())
    }

    fn decode(
        &self,
        _ty: &TypeDesc,
        id: u32,
        cx: &mut DecodeCx<'_, '_>,
    ) -> Result<(), DeserializeError> {
        let path = cx.reader().read_string()?;
        let asset = self
            .resolver
            .resolve(&path)
            .ok_or_else(|| DeserializeError::AssetNotFound(path.clone()))?;
        cx.settle(id, Value::Object(asset));
        Ok(())
    }
}
