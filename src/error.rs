//! Error types for graph serialization and deserialization.
//!
//! Errors are split by direction ([`SerializeError`] / [`DeserializeError`])
//! plus [`RegistryError`] for engine-construction failures and
//! [`MemberError`] for schema accessor failures. The format carries no
//! redundancy, so decode errors are fatal at the point of the offending
//! object rather than deferred to the end of the stream.

use thiserror::Error;

/// Errors that can occur while encoding an object graph.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The caller passed a null root; this is a contract violation, not data.
    #[error("cannot serialize a null root")]
    NullRoot,
    /// An object's runtime type has no registered schema.
    #[error("no schema registered for type '{0}'")]
    UnknownType(String),
    /// A container or opaque type reached the structural path with no codec.
    #[error("no codec registered for shape '{0}'")]
    MissingCodec(String),
    /// A value reached the fixed-width codec that is not a fixed-width primitive.
    #[error("value of kind '{0}' is not a fixed-width primitive")]
    NotPrimitive(&'static str),
    /// A codec was handed a value of the wrong shape.
    #[error("codec '{shape}' cannot encode a value of kind '{kind}'")]
    CodecMismatch {
        shape: String,
        kind: &'static str,
    },
    /// A member getter failed.
    #[error("failed to read member '{member}' of '{ty}': {source}")]
    Member {
        ty: String,
        member: &'static str,
        source: MemberError,
    },
    /// The asset resolver could not produce a path for an asset instance.
    #[error("asset of type '{0}' has no locatable path")]
    AssetNotLocated(String),
}

/// Errors that can occur while decoding an object graph.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// The stream ended mid-value (truncated or corrupt input).
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// A reference tag byte outside the known set.
    #[error("unknown reference tag {0:#04x}")]
    BadTag(u8),
    /// A back-reference to an id that was never defined.
    #[error("back-reference to unknown id {0}")]
    UnknownReference(u32),
    /// A registered-reference id missing from the registration table.
    #[error("id {0} is not present in the registration table")]
    UnknownRegistration(u32),
    /// A type name that does not resolve in the running program. Fatal:
    /// later identity resolution depends on it.
    #[error("type '{0}' is not registered in the running program")]
    UnknownType(String),
    /// A member handle whose target no longer exists.
    #[error("member '{member}' does not exist on type '{ty}'")]
    UnknownMember { ty: String, member: String },
    /// A string payload that is not valid UTF-8.
    #[error("invalid UTF-8 in string payload")]
    InvalidString,
    /// Structurally impossible wire data (bad bool, bad char, duplicate id).
    #[error("corrupt stream: {0}")]
    Corrupt(String),
    /// The asset resolver could not reconstruct an asset from its path.
    #[error("asset path '{0}' could not be resolved")]
    AssetNotFound(String),
    /// The root value never settled (an unresolvable forward reference,
    /// e.g. a map that contains itself as a key).
    #[error("root value never settled")]
    UnsettledRoot,
}

/// Errors raised while building the schema and codec registries. These
/// surface at engine construction time, before any stream is touched.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate schema for type '{0}'")]
    DuplicateSchema(&'static str),
    #[error("duplicate codec for shape '{0}'")]
    DuplicateCodec(String),
    #[error("schema '{ty}' extends unknown base '{base}'")]
    UnknownBase {
        ty: &'static str,
        base: &'static str,
    },
    #[error("schema '{0}' participates in an inheritance cycle")]
    BaseCycle(&'static str),
}

/// Failure inside a schema accessor (getter or setter).
///
/// Accessors are caller-supplied; the engine reports getter failures as
/// [`SerializeError::Member`] and logs setter failures during deferred
/// patching (a patch callback has no error channel).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct MemberError(pub String);

impl MemberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Convenience for the common "wrong value kind" setter failure.
    pub fn expected(expected: &str, got: &'static str) -> Self {
        Self(format!("expected {expected}, got {got}"))
    }

    /// Convenience for a failed downcast to the concrete schema type.
    pub fn wrong_instance(ty: &str) -> Self {
        Self(format!("instance is not a '{ty}'"))
    }
}
