//! Statically declared persistence schemas.
//!
//! There is no runtime reflection here: every persisted type registers a
//! [`TypeSchema`] at program start naming its members and their accessor
//! functions. The schema preserves the "persist everything eligible vs.
//! explicit allow-list" duality through [`Inclusion`] and [`MemberKind`],
//! and supports base-schema chains so derived types inherit members.

use std::collections::HashMap;

use crate::error::{MemberError, RegistryError};
use crate::object::{ObjRef, Persist};
use crate::types::TypeDesc;
use crate::value::Value;

/// Reads a member off a borrowed instance.
pub type Getter = fn(&dyn Persist) -> Result<Value, MemberError>;
/// Writes a member on a mutably borrowed instance.
pub type Setter = fn(&mut dyn Persist, Value) -> Result<(), MemberError>;
/// Reads a static member (global state, no instance).
pub type StaticGetter = fn() -> Result<Value, MemberError>;
/// Writes a static member.
pub type StaticSetter = fn(Value) -> Result<(), MemberError>;
/// Builds a default instance for reconstruction.
pub type Constructor = fn() -> ObjRef;

/// How a type's graph role is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Identity-carrying node (`Rc` handle, structural member payload).
    Reference,
    /// Value-typed struct: copy semantics, decoded via write-back.
    Value,
    /// Enumeration: encoded as its underlying 32-bit value.
    Enum,
}

/// Which members of a type are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Everything eligible: all members except callback, raw-handle, and
    /// constant kinds.
    All,
    /// Only members explicitly marked for persistence.
    OptIn,
}

/// Whether a member is backed by a data field or an accessor pair.
/// Fields and properties are written as separate wire groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrigin {
    Field,
    Property,
}

/// Eligibility classification of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Ordinary data, included under [`Inclusion::All`].
    Plain,
    /// Explicitly marked, included under both policies.
    Marked,
    /// Delegate/callback-typed: never persisted.
    Callback,
    /// Raw unmanaged handle: never persisted.
    RawHandle,
    /// Compile-time constant: never persisted.
    Constant,
}

impl MemberKind {
    fn included(self, policy: Inclusion) -> bool {
        match policy {
            Inclusion::OptIn => self == MemberKind::Marked,
            Inclusion::All => matches!(self, MemberKind::Plain | MemberKind::Marked),
        }
    }
}

/// A named, typed, gettable/settable instance slot on a persisted type.
pub struct MemberSchema {
    /// Stable wire name; must not change across versions of the program.
    pub name: &'static str,
    /// Declared type, recorded for null values (runtime types are observed
    /// per value otherwise).
    pub ty: TypeDesc,
    pub origin: MemberOrigin,
    pub kind: MemberKind,
    pub get: Getter,
    pub set: Setter,
}

impl MemberSchema {
    pub fn field(name: &'static str, ty: TypeDesc, get: Getter, set: Setter) -> Self {
        Self {
            name,
            ty,
            origin: MemberOrigin::Field,
            kind: MemberKind::Plain,
            get,
            set,
        }
    }

    pub fn property(name: &'static str, ty: TypeDesc, get: Getter, set: Setter) -> Self {
        Self {
            origin: MemberOrigin::Property,
            ..Self::field(name, ty, get, set)
        }
    }

    /// Mark for inclusion under the opt-in policy.
    pub fn marked(mut self) -> Self {
        self.kind = MemberKind::Marked;
        self
    }

    /// Classify as callback-typed (never persisted).
    pub fn callback(mut self) -> Self {
        self.kind = MemberKind::Callback;
        self
    }

    /// Classify as a raw unmanaged handle (never persisted).
    pub fn raw_handle(mut self) -> Self {
        self.kind = MemberKind::RawHandle;
        self
    }

    /// Classify as a compile-time constant (never persisted).
    pub fn constant(mut self) -> Self {
        self.kind = MemberKind::Constant;
        self
    }
}

/// A named static slot whose value travels with the type descriptor the
/// first time the type appears in a stream.
pub struct StaticMemberSchema {
    pub name: &'static str,
    pub ty: TypeDesc,
    pub origin: MemberOrigin,
    pub kind: MemberKind,
    pub get: StaticGetter,
    pub set: StaticSetter,
}

impl StaticMemberSchema {
    pub fn field(name: &'static str, ty: TypeDesc, get: StaticGetter, set: StaticSetter) -> Self {
        Self {
            name,
            ty,
            origin: MemberOrigin::Field,
            kind: MemberKind::Plain,
            get,
            set,
        }
    }

    pub fn property(
        name: &'static str,
        ty: TypeDesc,
        get: StaticGetter,
        set: StaticSetter,
    ) -> Self {
        Self {
            origin: MemberOrigin::Property,
            ..Self::field(name, ty, get, set)
        }
    }

    pub fn marked(mut self) -> Self {
        self.kind = MemberKind::Marked;
        self
    }
}

/// The registered persistence shape of one type.
pub struct TypeSchema {
    pub name: &'static str,
    pub kind: SchemaKind,
    /// Base schema name; members are merged up the chain, each level
    /// filtered by its own policy.
    pub base: Option<&'static str>,
    pub policy: Inclusion,
    /// Zero-argument constructor. Absence is not an error: decoding such a
    /// type logs and substitutes null (documented degradation).
    pub construct: Option<Constructor>,
    pub members: Vec<MemberSchema>,
    pub statics: Vec<StaticMemberSchema>,
}

impl TypeSchema {
    fn new(name: &'static str, kind: SchemaKind) -> Self {
        Self {
            name,
            kind,
            base: None,
            policy: Inclusion::All,
            construct: None,
            members: Vec::new(),
            statics: Vec::new(),
        }
    }

    /// An identity-carrying reference type.
    pub fn reference(name: &'static str) -> Self {
        Self::new(name, SchemaKind::Reference)
    }

    /// A value-typed struct (copy semantics).
    pub fn value(name: &'static str) -> Self {
        Self::new(name, SchemaKind::Value)
    }

    /// An enumeration (underlying 32-bit encoding).
    pub fn enumeration(name: &'static str) -> Self {
        Self::new(name, SchemaKind::Enum)
    }

    pub fn extends(mut self, base: &'static str) -> Self {
        self.base = Some(base);
        self
    }

    /// Switch to the explicit allow-list policy.
    pub fn opt_in(mut self) -> Self {
        self.policy = Inclusion::OptIn;
        self
    }

    pub fn constructor(mut self, construct: Constructor) -> Self {
        self.construct = Some(construct);
        self
    }

    pub fn member(mut self, member: MemberSchema) -> Self {
        self.members.push(member);
        self
    }

    pub fn static_member(mut self, member: StaticMemberSchema) -> Self {
        self.statics.push(member);
        self
    }

    /// Included static members declared on this type (statics are not
    /// inherited), in the given wire group.
    pub fn included_statics(&self, origin: MemberOrigin) -> Vec<&StaticMemberSchema> {
        self.statics
            .iter()
            .filter(|m| m.origin == origin && m.kind.included(self.policy))
            .collect()
    }

    /// A static member declared on this type, by wire name.
    pub fn find_static(&self, name: &str) -> Option<&StaticMemberSchema> {
        self.statics.iter().find(|m| m.name == name)
    }
}

/// All registered type schemas, looked up by stable name.
#[derive(Default)]
pub struct SchemaRegistry {
    types: HashMap<&'static str, TypeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, schema: TypeSchema) -> Result<(), RegistryError> {
        let name = schema.name;
        if self.types.insert(name, schema).is_some() {
            return Err(RegistryError::DuplicateSchema(name));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TypeSchema> {
        self.types.get(name)
    }

    /// Check every base chain resolves and is acyclic. Run once at engine
    /// construction so schema mistakes surface before any stream work.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for schema in self.types.values() {
            let mut seen = vec![schema.name];
            let mut current = schema;
            while let Some(base) = current.base {
                if seen.contains(&base) {
                    return Err(RegistryError::BaseCycle(schema.name));
                }
                seen.push(base);
                current = self
                    .types
                    .get(base)
                    .ok_or(RegistryError::UnknownBase {
                        ty: current.name,
                        base,
                    })?;
            }
        }
        Ok(())
    }

    /// Resolve an instance member by wire name, walking up the base chain.
    pub fn find_member<'a>(
        &'a self,
        schema: &'a TypeSchema,
        name: &str,
    ) -> Option<&'a MemberSchema> {
        let mut current = Some(schema);
        while let Some(s) = current {
            if let Some(m) = s.members.iter().find(|m| m.name == name) {
                return Some(m);
            }
            current = s.base.and_then(|b| self.types.get(b));
        }
        None
    }

    /// The persisted instance members of a type in the given wire group:
    /// derived-declared members first, then up the base chain, each level
    /// filtered by its own inclusion policy.
    pub fn included_members<'a>(
        &'a self,
        schema: &'a TypeSchema,
        origin: MemberOrigin,
    ) -> Vec<&'a MemberSchema> {
        let mut out = Vec::new();
        let mut current = Some(schema);
        while let Some(s) = current {
            out.extend(
                s.members
                    .iter()
                    .filter(|m| m.origin == origin && m.kind.included(s.policy)),
            );
            current = s.base.and_then(|b| self.types.get(b));
        }
        out
    }
}
