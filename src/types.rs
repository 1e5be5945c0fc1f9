//! Type descriptors and the type descriptor codec.
//!
//! A [`TypeDesc`] is a recursive description of a runtime type: a stable
//! name, a generic flag, and (if generic) its argument descriptors. Type
//! descriptors travel through the same interning machinery as object
//! references: the first appearance in a stream writes the full shape (plus
//! the type's static member payload), later appearances are back-references,
//! and pre-registered type handles encode as registration ids.

use crate::error::{DeserializeError, SerializeError};
use crate::schema::TypeSchema;
use crate::session::IdentityKey;
use crate::stream::{TAG_BACKREF, TAG_NEW, TAG_REGISTERED};
use crate::value::Value;
use crate::walker::{resolve_kind, DecodeCx, EncodeCx};

/// The "anything" pseudo-type: the declared type of heterogeneous slots and
/// the recorded type of null values with no better declaration.
pub const ANY: &str = "object";
/// The meta-type of type-as-value slots.
pub const TYPE: &str = "type";
/// The shape key of the sequence container codec.
pub const LIST: &str = "list";
/// The shape key of the associative container codec.
pub const MAP: &str = "map";
/// The shape key of the reflective member-handle codec.
pub const MEMBER: &str = "member";
/// The textual primitive.
pub const STR: &str = "str";

/// A recursive runtime type description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDesc {
    pub name: String,
    pub generic: bool,
    pub args: Vec<TypeDesc>,
}

impl TypeDesc {
    /// A plain (non-generic) type.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generic: false,
            args: Vec::new(),
        }
    }

    /// A generic instantiation.
    pub fn generic(name: impl Into<String>, args: Vec<TypeDesc>) -> Self {
        Self {
            name: name.into(),
            generic: true,
            args,
        }
    }

    pub fn any() -> Self {
        Self::named(ANY)
    }

    /// The runtime descriptor of list values.
    pub fn list() -> Self {
        Self::generic(LIST, vec![Self::any()])
    }

    /// The runtime descriptor of map values.
    pub fn map() -> Self {
        Self::generic(MAP, vec![Self::any(), Self::any()])
    }

    /// Canonical interning key, unique per instantiation
    /// (e.g. `map<str,object>`).
    pub fn key(&self) -> String {
        if !self.generic {
            return self.name.clone();
        }
        let args: Vec<String> = self.args.iter().map(TypeDesc::key).collect();
        format!("{}<{}>", self.name, args.join(","))
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl EncodeCx<'_> {
    /// Encode a type descriptor through the session identity machinery.
    pub fn encode_type(&mut self, ty: &TypeDesc) -> Result<(), SerializeError> {
        let key = IdentityKey::Type(ty.key());
        if let Some(id) = self.registered.id_of(&key) {
            self.out.write_u8(TAG_REGISTERED);
            self.out.write_u32(id);
            return Ok(());
        }
        if let Some(id) = self.session.lookup(&key) {
            self.out.write_u8(TAG_BACKREF);
            self.out.write_u32(id);
            return Ok(());
        }

        let id = self.session.assign(Some(key));
        self.out.write_u8(TAG_NEW);
        self.out.write_u32(id);
        self.out.write_bool(ty.generic);
        self.out.write_string(&ty.name);
        if ty.generic {
            self.out.write_u32(ty.args.len() as u32);
            for arg in &ty.args {
                self.encode_type(arg)?;
            }
        }

        // Static configuration travels with the type on first appearance.
        let schemas = self.schemas;
        match schemas.get(&ty.name) {
            Some(schema) => self.encode_static_groups(schema),
            None => {
                self.out.write_u32(0);
                self.out.write_u32(0);
                Ok(())
            }
        }
    }

    fn encode_static_groups(&mut self, schema: &TypeSchema) -> Result<(), SerializeError> {
        use crate::schema::MemberOrigin;

        for origin in [MemberOrigin::Field, MemberOrigin::Property] {
            let members = schema.included_statics(origin);
            self.out.write_u32(members.len() as u32);
            for member in members {
                let value = (member.get)().map_err(|source| SerializeError::Member {
                    ty: schema.name.to_owned(),
                    member: member.name,
                    source,
                })?;
                self.out.write_string(member.name);
                self.encode_slot(&value, &member.ty)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

impl DecodeCx<'_, '_> {
    /// Decode a type descriptor. An unresolvable type name is fatal.
    pub fn decode_type(&mut self) -> Result<TypeDesc, DeserializeError> {
        match self.input.read_u8()? {
            TAG_BACKREF => {
                let id = self.input.read_u32()?;
                self.settled_type(id)
            }
            TAG_REGISTERED => {
                let id = self.input.read_u32()?;
                match self.registered.value(id) {
                    Some(Value::TypeRef(td)) => Ok(td.clone()),
                    Some(other) => Err(DeserializeError::Corrupt(format!(
                        "registered id {id} holds a {} where a type was expected",
                        other.kind_name()
                    ))),
                    None => Err(DeserializeError::UnknownRegistration(id)),
                }
            }
            TAG_NEW => {
                let id = self.input.read_u32()?;
                self.session.create_record(id)?;
                let generic = self.input.read_bool()?;
                let name = self.input.read_string()?;
                let args = if generic {
                    let count = self.input.read_u32()?;
                    let mut args = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        args.push(self.decode_type()?);
                    }
                    args
                } else {
                    Vec::new()
                };
                let td = TypeDesc {
                    name,
                    generic,
                    args,
                };

                // Must resolve against the running program before anything
                // else can depend on it.
                resolve_kind(self.schemas, self.codecs, &td)?;
                self.session.settle(id, Value::TypeRef(td.clone()));
                self.decode_static_groups(&td)?;
                Ok(td)
            }
            tag => Err(DeserializeError::BadTag(tag)),
        }
    }

    fn settled_type(&mut self, id: u32) -> Result<TypeDesc, DeserializeError> {
        match self.session.settled_value(id) {
            Some(Value::TypeRef(td)) => Ok(td),
            Some(other) => Err(DeserializeError::Corrupt(format!(
                "back-reference {id} holds a {} where a type was expected",
                other.kind_name()
            ))),
            None => Err(DeserializeError::UnknownReference(id)),
        }
    }

    fn decode_static_groups(&mut self, ty: &TypeDesc) -> Result<(), DeserializeError> {
        let schemas = self.schemas;
        let schema = schemas.get(&ty.name);

        for _group in 0..2 {
            let count = self.input.read_u32()?;
            for _ in 0..count {
                let name = self.input.read_string()?;
                let setter = schema.and_then(|s| s.find_static(&name)).map(|m| m.set);
                match setter {
                    Some(set) => {
                        let ty_name = ty.name.clone();
                        let member = name.clone();
                        self.decode_slot(Box::new(move |value, _queue| {
                            if let Err(e) = set(value.clone()) {
                                log::error!(
                                    "failed to apply static member '{ty_name}.{member}': {e}"
                                );
                            }
                        }))?;
                    }
                    None => {
                        log::warn!(
                            "type '{}' has no static member '{name}'; dropping its value",
                            ty.name
                        );
                        self.decode_slot(Box::new(|_, _| {}))?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys() {
        assert_eq!(TypeDesc::named("Node").key(), "Node");
        assert_eq!(TypeDesc::list().key(), "list<object>");
        assert_eq!(
            TypeDesc::generic("map", vec![TypeDesc::named("str"), TypeDesc::list()]).key(),
            "map<str,list<object>>"
        );
    }
}
