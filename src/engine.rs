//! The serialization engine: registries plus the two entry points.
//!
//! An [`Engine`] is built once from the program's schemas and codecs,
//! validated up front, and then shared: `serialize` and `deserialize` take
//! `&self` and spin up a fresh per-call [`Session`](crate::session::Session),
//! so concurrent-in-spirit calls never observe each other's identity maps.
//! Only the registration table is engine-level state, managed explicitly by
//! the caller.

use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::CodecRegistry;
use crate::error::{DeserializeError, RegistryError, SerializeError};
use crate::object::ObjRef;
use crate::schema::SchemaRegistry;
use crate::session::{RegistrationTable, Session};
use crate::stream::{ByteReader, ByteWriter};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::walker::{DecodeCx, EncodeCx};

pub struct Engine {
    schemas: SchemaRegistry,
    codecs: CodecRegistry,
    registered: RegistrationTable,
}

impl Engine {
    /// Build an engine with the standard codec set. Schema mistakes
    /// (unknown bases, inheritance cycles) fail here, not mid-stream.
    pub fn new(schemas: SchemaRegistry) -> Result<Self, RegistryError> {
        Self::with_codecs(schemas, CodecRegistry::with_builtins())
    }

    /// Build an engine with a caller-assembled codec registry.
    pub fn with_codecs(
        schemas: SchemaRegistry,
        codecs: CodecRegistry,
    ) -> Result<Self, RegistryError> {
        schemas.validate()?;
        Ok(Self {
            schemas,
            codecs,
            registered: RegistrationTable::new(),
        })
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    // -- registration -------------------------------------------------------

    /// Pre-register an object: it will encode as a registration id and
    /// decode back to this very handle, never structurally. Idempotent.
    pub fn register(&mut self, handle: ObjRef) -> u32 {
        self.registered.register_object(handle)
    }

    /// Pre-register a type handle, shortening every later appearance of
    /// that type to a registration id.
    pub fn register_type(&mut self, ty: TypeDesc) -> u32 {
        self.registered.register_type(ty)
    }

    /// Drop all registrations and reset id assignment. Streams written
    /// against the old table are no longer decodable.
    pub fn clear_registrations(&mut self) {
        self.registered.clear();
    }

    // -- entry points -------------------------------------------------------

    /// Encode an object graph rooted at `root` into a self-contained byte
    /// stream.
    pub fn serialize(&self, root: &Value) -> Result<Vec<u8>, SerializeError> {
        if root.is_null() {
            return Err(SerializeError::NullRoot);
        }
        let mut session = Session::new();
        let mut out = ByteWriter::new();
        let mut cx = EncodeCx {
            schemas: &self.schemas,
            codecs: &self.codecs,
            registered: &self.registered,
            session: &mut session,
            out: &mut out,
        };
        cx.encode_slot(root, &TypeDesc::any())?;
        Ok(out.into_bytes())
    }

    /// Reconstruct the object graph held in `bytes`.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value, DeserializeError> {
        let mut session = Session::new();
        let mut input = ByteReader::new(bytes);
        let root: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
        {
            let mut cx = DecodeCx {
                schemas: &self.schemas,
                codecs: &self.codecs,
                registered: &self.registered,
                session: &mut session,
                input: &mut input,
            };
            let slot = root.clone();
            cx.decode_slot(Box::new(move |value, _queue| {
                *slot.borrow_mut() = Some(value.clone());
            }))?;
        }
        let value = root.borrow_mut().take();
        value.ok_or(DeserializeError::UnsettledRoot)
    }
}
