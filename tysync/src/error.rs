//! Validation failures raised by the importers and the reference backend.
//!
//! All of these are fatal for the current run. They travel inside
//! `anyhow::Error` with per-type context attached; use [`find_validation`]
//! to get the typed error back.

/// A definition or expression that cannot be imported as given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {which} enum size {size} (expected 1..=8)")]
    EnumSize { which: &'static str, size: u64 },

    #[error("union member `{member}` has non-zero offset {offset}")]
    UnionMemberOffset { member: String, offset: u64 },

    #[error("member `{member}` at offset {offset} lies outside struct of size {size}")]
    MemberOutOfBounds {
        member: String,
        offset: u64,
        size: u64,
    },

    #[error("size mismatch for `{name}`: laid out {actual} bytes, declared {expected}")]
    SizeMismatch {
        name: String,
        actual: u64,
        expected: u64,
    },

    #[error("member `{member}` embeds `{ty}` by value before its layout is known")]
    IncompleteMember { member: String, ty: String },

    #[error("size of member `{member}` overflows")]
    SizeOverflow { member: String },

    #[error("unknown type `{0}`")]
    UnresolvedType(String),

    #[error("malformed type expression {expr}: {reason}")]
    MalformedExpr { expr: String, reason: String },

    #[error("invalid type name `{0}`")]
    InvalidName(String),
}

/// Find the [`ValidationError`] anywhere in an error's context chain.
pub fn find_validation(err: &anyhow::Error) -> Option<&ValidationError> {
    err.chain().find_map(|e| e.downcast_ref::<ValidationError>())
}
