//! # graphpack
//!
//! Compact binary persistence for arbitrary object graphs: cyclic,
//! polymorphic, with shared identity preserved exactly.
//!
//! ## Core Types
//!
//! - [`Engine`] — Registries plus the `serialize` / `deserialize` entry points
//! - [`Value`] — The dynamically typed value universe accessors speak
//! - [`Persist`] / [`ObjRef`] — The trait and shared handle for graph nodes
//! - [`TypeDesc`] — Recursive runtime type descriptions, interned per stream
//!
//! ## Schemas
//!
//! - [`TypeSchema`] / [`MemberSchema`] — Statically declared persistence shape
//! - [`SchemaRegistry`] — All registered types, validated at engine build
//! - [`Inclusion`] — Persist-everything-eligible vs. explicit allow-list
//!
//! ## Codecs
//!
//! - [`Codec`] / [`CodecRegistry`] — Pluggable payloads keyed by wire shape
//! - [`ListCodec`] / [`MapCodec`] / [`MemberCodec`] — The built-in set
//! - [`AssetCodec`] / [`AssetResolver`] — Path-addressed external resources
//!
//! See `DESIGN.md` in this crate for architecture decisions and goals.

mod codec;
mod engine;
mod error;
mod object;
mod primitive;
mod schema;
mod session;
pub mod stream;
mod types;
mod value;
mod walker;

pub use codec::{AssetCodec, AssetResolver, Codec, CodecRegistry, ListCodec, MapCodec, MemberCodec};
pub use engine::Engine;
pub use error::{DeserializeError, MemberError, RegistryError, SerializeError};
pub use object::{
    concrete, concrete_mut, downcast_mut, downcast_ref, obj, same_object, ObjRef, Persist,
};
pub use schema::{
    Constructor, Getter, Inclusion, MemberKind, MemberOrigin, MemberSchema, SchemaKind,
    SchemaRegistry, Setter, StaticGetter, StaticMemberSchema, StaticSetter, TypeSchema,
};
pub use session::{Callback, RegistrationTable, Session, SettleQueue};
pub use types::{TypeDesc, ANY, LIST, MAP, MEMBER, STR, TYPE};
pub use value::{ListRef, MapRef, Value};
pub use walker::{resolve_kind, DecodeCx, EncodeCx, Kind};
