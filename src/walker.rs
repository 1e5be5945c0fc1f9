//! The structural walker: per-slot encoding and decoding.
//!
//! A "slot" is one value position on the wire: an interned type descriptor
//! followed by a body. Primitive, string, enum, and type-as-value bodies
//! are direct; everything else goes through the reference tag scheme of
//! [`crate::session`] so identity, sharing, and cycles are preserved.
//!
//! [`EncodeCx`] and [`DecodeCx`] bundle the registries with the per-call
//! session and stream; custom codecs recurse through the same contexts so
//! containers of arbitrary element types compose.

use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::CodecRegistry;
use crate::error::{DeserializeError, SerializeError};
use crate::object::ObjRef;
use crate::primitive::{self, Prim};
use crate::schema::{MemberOrigin, SchemaKind, SchemaRegistry, TypeSchema};
use crate::session::{identity_key, Callback, RegistrationTable, Session};
use crate::stream::{
    ByteReader, ByteWriter, TAG_BACKREF, TAG_NEW, TAG_NULL, TAG_REGISTERED,
};
use crate::types::{TypeDesc, ANY, MEMBER, STR, TYPE};
use crate::value::Value;

/// What a decoded type descriptor means to the walker.
pub enum Kind<'a> {
    Prim(Prim),
    Str,
    /// The "object" pseudo-type: valid only for null and resolved
    /// references, never for a fresh structural payload.
    Any,
    Type,
    Enum,
    Codec(&'a dyn crate::codec::Codec),
    Object(&'a TypeSchema),
    Record(&'a TypeSchema),
}

/// Resolve a type name against the running program. Failure is the fatal
/// "unknown type" decode error: nothing downstream can proceed without it.
pub fn resolve_kind<'a>(
    schemas: &'a SchemaRegistry,
    codecs: &'a CodecRegistry,
    ty: &TypeDesc,
) -> Result<Kind<'a>, DeserializeError> {
    if let Some(prim) = Prim::from_name(&ty.name) {
        return Ok(Kind::Prim(prim));
    }
    match ty.name.as_str() {
        STR => return Ok(Kind::Str),
        ANY => return Ok(Kind::Any),
        TYPE => return Ok(Kind::Type),
        _ => {}
    }
    if let Some(codec) = codecs.get(&ty.name) {
        return Ok(Kind::Codec(codec));
    }
    if let Some(schema) = schemas.get(&ty.name) {
        return Ok(match schema.kind {
            SchemaKind::Reference => Kind::Object(schema),
            SchemaKind::Value => Kind::Record(schema),
            SchemaKind::Enum => Kind::Enum,
        });
    }
    Err(DeserializeError::UnknownType(ty.name.clone()))
}

/// The runtime-observed type descriptor of a reference-kind value. This is
/// what carries polymorphism: a slot declared as a base type records the
/// concrete type of whatever it actually holds.
fn runtime_desc(value: &Value) -> TypeDesc {
    match value {
        Value::Object(rc) => TypeDesc::named(rc.borrow().schema_name()),
        Value::List(_) => TypeDesc::list(),
        Value::Map(_) => TypeDesc::map(),
        Value::Record { ty, .. } => TypeDesc::named(ty.clone()),
        Value::Member { .. } => TypeDesc::named(MEMBER),
        _ => TypeDesc::any(),
    }
}

// ---------------------------------------------------------------------------
// EncodeCx
// ---------------------------------------------------------------------------

/// Everything the encode walk needs: registries, the per-call session, and
/// the output stream.
pub struct EncodeCx<'a> {
    pub(crate) schemas: &'a SchemaRegistry,
    pub(crate) codecs: &'a CodecRegistry,
    pub(crate) registered: &'a RegistrationTable,
    pub(crate) session: &'a mut Session,
    pub(crate) out: &'a mut ByteWriter,
}

impl EncodeCx<'_> {
    /// The raw output stream, for codec payloads.
    pub fn writer(&mut self) -> &mut ByteWriter {
        self.out
    }

    /// Encode one slot: runtime type descriptor, then body.
    pub fn encode_slot(
        &mut self,
        value: &Value,
        declared: &TypeDesc,
    ) -> Result<(), SerializeError> {
        match value {
            Value::Null => {
                // Null has no runtime type; record the declared one, unless
                // the declaration is a direct-body kind (primitive, string,
                // type, enum) that cannot carry a tag byte.
                let direct = Prim::from_name(&declared.name).is_some()
                    || declared.name == STR
                    || declared.name == TYPE
                    || self
                        .schemas
                        .get(&declared.name)
                        .is_some_and(|s| s.kind == SchemaKind::Enum);
                let decl = if direct {
                    TypeDesc::any()
                } else {
                    declared.clone()
                };
                self.encode_type(&decl)?;
                self.out.write_u8(TAG_NULL);
                Ok(())
            }
            Value::Str(s) => {
                self.encode_type(&TypeDesc::named(STR))?;
                self.out.write_string(s);
                Ok(())
            }
            Value::Enum { ty, raw } => {
                self.encode_type(&TypeDesc::named(ty.clone()))?;
                self.out.write_i32(*raw);
                Ok(())
            }
            Value::TypeRef(td) => {
                self.encode_type(&TypeDesc::named(TYPE))?;
                self.encode_type(td)
            }
            Value::Object(_)
            | Value::List(_)
            | Value::Map(_)
            | Value::Record { .. }
            | Value::Member { .. } => {
                let rt = runtime_desc(value);
                self.encode_type(&rt)?;
                self.encode_ref(value, &rt)
            }
            prim => match primitive::kind_of(prim) {
                Some(p) => {
                    self.encode_type(&TypeDesc::named(p.name()))?;
                    primitive::encode(prim, self.out)
                }
                None => Err(SerializeError::NotPrimitive(prim.kind_name())),
            },
        }
    }

    /// Encode a reference-kind value through the tag scheme. The id of a
    /// new definition is written before its payload, so a cyclic payload
    /// that re-encounters this value emits a back-reference instead of
    /// recursing forever.
    fn encode_ref(&mut self, value: &Value, ty: &TypeDesc) -> Result<(), SerializeError> {
        let key = identity_key(value);
        if let Some(key) = &key {
            if let Some(id) = self.registered.id_of(key) {
                self.out.write_u8(TAG_REGISTERED);
                self.out.write_u32(id);
                return Ok(());
            }
            if let Some(id) = self.session.lookup(key) {
                self.out.write_u8(TAG_BACKREF);
                self.out.write_u32(id);
                return Ok(());
            }
        }

        let id = self.session.assign(key);
        self.session.retain(value.clone());
        self.out.write_u8(TAG_NEW);
        self.out.write_u32(id);

        let codecs = self.codecs;
        if let Some(codec) = codecs.get(&ty.name) {
            return codec.encode(value, self);
        }
        match value {
            Value::Object(rc) => {
                let schemas = self.schemas;
                let schema = schemas
                    .get(&ty.name)
                    .ok_or_else(|| SerializeError::UnknownType(ty.name.clone()))?;
                self.encode_member_groups(rc, schema)
            }
            Value::Record { fields, .. } => {
                self.out.write_u32(fields.len() as u32);
                for (name, field) in fields {
                    self.out.write_string(name);
                    self.encode_slot(field, &TypeDesc::any())?;
                }
                // Records carry no property group.
                self.out.write_u32(0);
                Ok(())
            }
            _ => Err(SerializeError::MissingCodec(ty.name.clone())),
        }
    }

    /// Structural payload of an object: field group then property group,
    /// member set chosen by the inclusion policy with inherited members
    /// merged in.
    fn encode_member_groups(
        &mut self,
        rc: &ObjRef,
        schema: &TypeSchema,
    ) -> Result<(), SerializeError> {
        let schemas = self.schemas;
        for origin in [MemberOrigin::Field, MemberOrigin::Property] {
            let members = schemas.included_members(schema, origin);
            self.out.write_u32(members.len() as u32);
            for member in members {
                let value = {
                    let guard = rc.borrow();
                    (member.get)(&*guard)
                }
                .map_err(|source| SerializeError::Member {
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
// DecodeCx
// ---------------------------------------------------------------------------

/// Everything the decode walk needs: registries, the per-call session, and
/// the input stream.
pub struct DecodeCx<'a, 'buf> {
    pub(crate) schemas: &'a SchemaRegistry,
    pub(crate) codecs: &'a CodecRegistry,
    pub(crate) registered: &'a RegistrationTable,
    pub(crate) session: &'a mut Session,
    pub(crate) input: &'a mut ByteReader<'buf>,
}

impl<'buf> DecodeCx<'_, 'buf> {
    /// The raw input stream, for codec payloads.
    pub fn reader(&mut self) -> &mut ByteReader<'buf> {
        self.input
    }

    /// The schema registry, for codecs that re-resolve names.
    pub fn schemas(&self) -> &SchemaRegistry {
        self.schemas
    }

    /// Settle a definition id with its final value, draining any parked
    /// callbacks in FIFO order.
    pub fn settle(&mut self, id: u32, value: Value) {
        self.session.settle(id, value);
    }

    pub fn is_settled(&self, id: u32) -> bool {
        self.session.is_settled(id)
    }

    /// Decode one slot, delivering the resolved value to `on_resolved`
    /// (immediately, or once a forward reference settles).
    pub fn decode_slot(&mut self, on_resolved: Callback) -> Result<(), DeserializeError> {
        let ty = self.decode_type()?;
        let schemas = self.schemas;
        let codecs = self.codecs;
        let kind = resolve_kind(schemas, codecs, &ty)?;
        match kind {
            Kind::Prim(p) => {
                let value = primitive::decode(p, self.input)?;
                self.session.run(on_resolved, &value);
                Ok(())
            }
            Kind::Str => {
                let s = self.input.read_string()?;
                self.session.run(on_resolved, &Value::Str(s));
                Ok(())
            }
            Kind::Enum => {
                let raw = self.input.read_i32()?;
                let value = Value::Enum {
                    ty: ty.name.clone(),
                    raw,
                };
                self.session.run(on_resolved, &value);
                Ok(())
            }
            Kind::Type => {
                let td = self.decode_type()?;
                self.session.run(on_resolved, &Value::TypeRef(td));
                Ok(())
            }
            Kind::Any | Kind::Codec(_) | Kind::Object(_) | Kind::Record(_) => {
                self.decode_ref(&ty, kind, on_resolved)
            }
        }
    }

    fn decode_ref(
        &mut self,
        ty: &TypeDesc,
        kind: Kind<'_>,
        on_resolved: Callback,
    ) -> Result<(), DeserializeError> {
        match self.input.read_u8()? {
            TAG_NULL => {
                self.session.run(on_resolved, &Value::Null);
                Ok(())
            }
            TAG_BACKREF => {
                let id = self.input.read_u32()?;
                self.session.attach(id, on_resolved)
            }
            TAG_REGISTERED => {
                let id = self.input.read_u32()?;
                let value = self
                    .registered
                    .value(id)
                    .cloned()
                    .ok_or(DeserializeError::UnknownRegistration(id))?;
                self.session.run(on_resolved, &value);
                Ok(())
            }
            TAG_NEW => {
                let id = self.input.read_u32()?;
                self.session.create_record(id)?;
                self.decode_payload(ty, kind, id)?;
                // The payload usually settles the record; a record/map with
                // unresolved forward references stays pending and delivers
                // later.
                self.session.attach(id, on_resolved)
            }
            tag => Err(DeserializeError::BadTag(tag)),
        }
    }

    fn decode_payload(
        &mut self,
        ty: &TypeDesc,
        kind: Kind<'_>,
        id: u32,
    ) -> Result<(), DeserializeError> {
        match kind {
            Kind::Codec(codec) => codec.decode(ty, id, self),
            Kind::Object(schema) => self.decode_object(schema, id),
            Kind::Record(_) => self.decode_record(ty, id),
            _ => Err(DeserializeError::Corrupt(format!(
                "type '{}' cannot carry a structural payload",
                ty.name
            ))),
        }
    }

    /// Reconstruct a reference-typed object: allocate, walk members with
    /// the member setter as each slot's resolution callback, then settle.
    /// Settling after the walk (not after each member) is what lets a
    /// cyclic member patch in through the record once the walk returns.
    fn decode_object(&mut self, schema: &TypeSchema, id: u32) -> Result<(), DeserializeError> {
        let schemas = self.schemas;
        let instance = match schema.construct {
            Some(construct) => Some(construct()),
            None => {
                log::warn!(
                    "type '{}' has no zero-argument constructor; decoding as null",
                    schema.name
                );
                None
            }
        };

        for _group in 0..2 {
            let count = self.input.read_u32()?;
            for _ in 0..count {
                let name = self.input.read_string()?;
                let member = schemas.find_member(schema, &name);
                match (&instance, member) {
                    (Some(rc), Some(member)) => {
                        let rc = rc.clone();
                        let set = member.set;
                        let ty_name = schema.name;
                        let member_name = member.name;
                        self.decode_slot(Box::new(move |value, _queue| {
                            if let Err(e) = set(&mut *rc.borrow_mut(), value.clone()) {
                                log::error!(
                                    "failed to apply member '{ty_name}.{member_name}': {e}"
                                );
                            }
                        }))?;
                    }
                    _ => {
                        if member.is_none() {
                            log::warn!(
                                "type '{}' has no member '{name}'; dropping its value",
                                schema.name
                            );
                        }
                        // Consume the slot to keep the stream aligned.
                        self.decode_slot(Box::new(|_, _| {}))?;
                    }
                }
            }
        }

        let value = match instance {
            Some(rc) => Value::Object(rc),
            None => Value::Null,
        };
        self.session.settle(id, value);
        Ok(())
    }

    /// Reconstruct a value-typed record. The record has copy semantics, so
    /// it settles (and is written back into its parent slot) only once
    /// every nested slot has resolved; the write-back cascades naturally
    /// through nested records.
    fn decode_record(&mut self, ty: &TypeDesc, id: u32) -> Result<(), DeserializeError> {
        struct RecordBuilder {
            ty: String,
            slots: Vec<(String, Option<Value>)>,
            missing: usize,
            walk_done: bool,
        }

        impl RecordBuilder {
            fn build(&self) -> Value {
                Value::Record {
                    ty: self.ty.clone(),
                    fields: self
                        .slots
                        .iter()
                        .map(|(name, slot)| {
                            (name.clone(), slot.clone().unwrap_or(Value::Null))
                        })
                        .collect(),
                }
            }
        }

        let builder = Rc::new(RefCell::new(RecordBuilder {
            ty: ty.name.clone(),
            slots: Vec::new(),
            missing: 0,
            walk_done: false,
        }));

        for _group in 0..2 {
            let count = self.input.read_u32()?;
            for _ in 0..count {
                let name = self.input.read_string()?;
                let index = {
                    let mut b = builder.borrow_mut();
                    b.slots.push((name, None));
                    b.missing += 1;
                    b.slots.len() - 1
                };
                let b = builder.clone();
                self.decode_slot(Box::new(move |value, queue| {
                    let mut builder = b.borrow_mut();
                    builder.slots[index].1 = Some(value.clone());
                    builder.missing -= 1;
                    if builder.missing == 0 && builder.walk_done {
                        queue.push(id, builder.build());
                    }
                }))?;
            }
        }

        let finished = {
            let mut b = builder.borrow_mut();
            b.walk_done = true;
            if b.missing == 0 { Some(b.build()) } else { None }
        };
        if let Some(value) = finished {
            self.session.settle(id, value);
        }
        Ok(())
    }
}
