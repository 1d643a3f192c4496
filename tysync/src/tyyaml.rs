//! Type-YAML interpreter: [`TypeExpr`] → backend type handle.
//!
//! The expression is read left to right: the first node is the base type,
//! every following node applies a suffix operator to the type built so far.
//! Quoted base tokens name other registered types; those are handed to the
//! caller's resolver (which imports them) before the backend is asked for
//! their handle.

use anyhow::Result;
use tracing::trace;

use crate::error::ValidationError;
use crate::model::{BaseType, TyNode, TypeExpr};

/// Host capability for building type handles.
pub trait TypeBackend {
    /// Opaque handle to a host type.
    type Type: Clone;

    fn base(&mut self, base: BaseType) -> Result<Self::Type>;

    fn pointer(&mut self, pointee: Self::Type) -> Result<Self::Type>;

    fn array(&mut self, element: Self::Type, len: u64) -> Result<Self::Type>;

    /// The subroutine type `ret(args...)` itself, not a pointer to it.
    fn subroutine(&mut self, ret: Self::Type, args: Vec<Self::Type>) -> Result<Self::Type>;

    /// Map an identifier from the expression to the host's name for it.
    /// `None` if the host cannot represent the name.
    fn name(&mut self, ident: &str) -> Result<Option<String>>;

    /// Handle of an already existing named type (at least a placeholder).
    fn named(&mut self, name: &str) -> Result<Self::Type>;
}

/// Interpret `expr` against `backend`. `resolve` is called with every named
/// type before its handle is requested.
pub fn interpret<B, R>(backend: &mut B, resolve: &mut R, expr: &TypeExpr) -> Result<B::Type>
where
    B: TypeBackend + ?Sized,
    R: FnMut(&mut B, &str) -> Result<()>,
{
    let nodes = &expr.0;
    let Some(first) = nodes.first() else {
        return Err(malformed(expr, "empty expression"));
    };
    let mut ty = interpret_base(backend, resolve, expr, first)?;

    let mut i = 1;
    while i < nodes.len() {
        match &nodes[i] {
            TyNode::Token(t) if t == "*" => {
                ty = backend.pointer(ty)?;
                i += 1;
            }
            TyNode::List(items) => {
                let [TyNode::Int(len)] = items.as_slice() else {
                    return Err(malformed(expr, "array suffix must be `[n]`"));
                };
                ty = backend.array(ty, *len)?;
                i += 1;
            }
            TyNode::Token(t) if t == "()" => {
                let Some(TyNode::List(arg_nodes)) = nodes.get(i + 1) else {
                    return Err(malformed(expr, "`()` must be followed by an argument list"));
                };
                let mut args = Vec::with_capacity(arg_nodes.len());
                for arg in arg_nodes {
                    let TyNode::List(arg) = arg else {
                        return Err(malformed(expr, "subroutine argument is not a type expression"));
                    };
                    args.push(interpret(backend, resolve, &TypeExpr(arg.clone()))?);
                }
                ty = backend.subroutine(ty, args)?;
                i += 2;
            }
            TyNode::Token(t) if t == "(ptmf)" => {
                let class = match nodes.get(i + 1) {
                    Some(TyNode::List(items)) => match items.as_slice() {
                        [TyNode::Token(class)] => unquote(class),
                        _ => None,
                    },
                    _ => None,
                };
                let Some(class) = class else {
                    return Err(malformed(expr, "`(ptmf)` must be followed by a quoted class name"));
                };
                if !matches!(nodes.get(i + 2), Some(TyNode::List(_))) {
                    return Err(malformed(expr, "`(ptmf)` is missing its argument list"));
                }
                trace!(class, "pointer to member function");
                ty = interpret_named(backend, resolve, &format!("{class}_ptmf"))?;
                i += 3;
            }
            other => {
                return Err(malformed(expr, &format!("unknown type operator `{other}`")));
            }
        }
    }
    Ok(ty)
}

fn interpret_base<B, R>(
    backend: &mut B,
    resolve: &mut R,
    expr: &TypeExpr,
    node: &TyNode,
) -> Result<B::Type>
where
    B: TypeBackend + ?Sized,
    R: FnMut(&mut B, &str) -> Result<()>,
{
    let TyNode::Token(token) = node else {
        return Err(malformed(expr, "base type must be a token"));
    };
    if let Some(ident) = unquote(token) {
        return interpret_named(backend, resolve, ident);
    }
    match BaseType::from_token(token) {
        Some(base) => backend.base(base),
        None => Err(malformed(
            expr,
            &format!("unknown base type `{token}` (named types must be quoted)"),
        )),
    }
}

fn interpret_named<B, R>(backend: &mut B, resolve: &mut R, ident: &str) -> Result<B::Type>
where
    B: TypeBackend + ?Sized,
    R: FnMut(&mut B, &str) -> Result<()>,
{
    let Some(name) = backend.name(ident)? else {
        return Err(ValidationError::InvalidName(ident.to_string()).into());
    };
    // Must exist (at least as a placeholder) before we reference it.
    resolve(backend, &name)?;
    backend.named(&name)
}

fn unquote(token: &str) -> Option<&str> {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|t| !t.is_empty())
}

fn malformed(expr: &TypeExpr, reason: &str) -> anyhow::Error {
    ValidationError::MalformedExpr {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
