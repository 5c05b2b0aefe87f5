//! Host terms and conversions
//!
//! The host runtime is dynamically typed. Arguments arrive as [`Term`]s and
//! results leave as [`Term`]s; [`FromTerm`] and [`ToTerm`] convert between
//! those and the typed bridge API. Handle terms carry the reference-counted
//! handles themselves, so dropping the last term that holds one is what
//! runs its release hook.

use std::fmt;

use crate::error::{BridgeError, BridgeResult, Status};
use crate::gate::LoadStatus;
use crate::instrumenter::Instrumenter;
use crate::trace::{SpanHandle, Trace};

/// Atoms the bridge produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Atom {
    /// `ok`
    Ok,
    /// `error`
    Error,
    /// `loaded`
    Loaded,
    /// `already_loaded`
    AlreadyLoaded,
    /// `true`
    True,
    /// `false`
    False,
}

impl Atom {
    /// Host spelling of the atom
    pub fn as_str(self) -> &'static str {
        match self {
            Atom::Ok => "ok",
            Atom::Error => "error",
            Atom::Loaded => "loaded",
            Atom::AlreadyLoaded => "already_loaded",
            Atom::True => "true",
            Atom::False => "false",
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host value
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// An atom
    Atom(Atom),
    /// An integer of any size the bridge can be handed
    Integer(i128),
    /// A byte string
    Binary(Vec<u8>),
    /// A proper list
    List(Vec<Term>),
    /// A tuple
    Tuple(Vec<Term>),
    /// Instrumenter resource
    Instrumenter(Instrumenter),
    /// Trace resource
    Trace(Trace),
}

impl Term {
    /// `ok`
    pub const OK: Term = Term::Atom(Atom::Ok);
    /// `error`
    pub const ERROR: Term = Term::Atom(Atom::Error);

    /// A binary term
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Term {
        Term::Binary(bytes.into())
    }

    /// A list of binaries
    pub fn binaries<I, B>(items: I) -> Term
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        Term::List(items.into_iter().map(Term::binary).collect())
    }

    /// Name of the term's type, as used in argument errors
    pub fn kind(&self) -> &'static str {
        match self {
            Term::Atom(_) => "atom",
            Term::Integer(_) => "integer",
            Term::Binary(_) => "binary",
            Term::List(_) => "list",
            Term::Tuple(_) => "tuple",
            Term::Instrumenter(_) => "instrumenter",
            Term::Trace(_) => "trace",
        }
    }
}

impl From<Atom> for Term {
    fn from(atom: Atom) -> Self {
        Term::Atom(atom)
    }
}

// ============================================================================
// Conversion Traits
// ============================================================================

/// A term did not have the shape a conversion needed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {got}")]
pub struct TypeMismatch {
    /// What the conversion accepts
    pub expected: &'static str,
    /// What it was given
    pub got: String,
}

impl TypeMismatch {
    fn new(expected: &'static str, term: &Term) -> Self {
        let got = match term {
            Term::Integer(n) => format!("integer {}", n),
            other => other.kind().to_string(),
        };
        TypeMismatch { expected, got }
    }
}

/// Convert from a borrowed term.
///
/// Binaries are borrowed, not copied; they only need to outlive the call.
pub trait FromTerm<'a>: Sized {
    /// Convert, or report what was expected
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch>;
}

/// Convert into a term
pub trait ToTerm {
    /// Convert to a Term
    fn to_term(self) -> Term;
}

impl<'a> FromTerm<'a> for &'a [u8] {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::Binary(bytes) => Ok(bytes),
            other => Err(TypeMismatch::new("binary", other)),
        }
    }
}

impl<'a> FromTerm<'a> for Vec<&'a [u8]> {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::List(items) => items
                .iter()
                .map(|item| match item {
                    Term::Binary(bytes) => Ok(bytes.as_slice()),
                    other => Err(TypeMismatch::new("list of binaries", other)),
                })
                .collect(),
            other => Err(TypeMismatch::new("list of binaries", other)),
        }
    }
}

impl<'a> FromTerm<'a> for u64 {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::Integer(n) => u64::try_from(*n).map_err(|_| TypeMismatch::new("u64", term)),
            other => Err(TypeMismatch::new("u64", other)),
        }
    }
}

impl<'a> FromTerm<'a> for u32 {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::Integer(n) => u32::try_from(*n).map_err(|_| TypeMismatch::new("u32", term)),
            other => Err(TypeMismatch::new("u32", other)),
        }
    }
}

impl<'a> FromTerm<'a> for SpanHandle {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        u32::from_term(term)
            .map(SpanHandle::from_raw)
            .map_err(|_| TypeMismatch::new("span handle", term))
    }
}

impl<'a> FromTerm<'a> for &'a Instrumenter {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::Instrumenter(inst) => Ok(inst),
            other => Err(TypeMismatch::new("instrumenter", other)),
        }
    }
}

impl<'a> FromTerm<'a> for &'a Trace {
    fn from_term(term: &'a Term) -> Result<Self, TypeMismatch> {
        match term {
            Term::Trace(trace) => Ok(trace),
            other => Err(TypeMismatch::new("trace", other)),
        }
    }
}

impl ToTerm for Status {
    fn to_term(self) -> Term {
        match self {
            Status::Ok => Term::OK,
            Status::Error => Term::ERROR,
        }
    }
}

impl ToTerm for bool {
    fn to_term(self) -> Term {
        Term::Atom(if self { Atom::True } else { Atom::False })
    }
}

impl ToTerm for u64 {
    fn to_term(self) -> Term {
        Term::Integer(self.into())
    }
}

impl ToTerm for SpanHandle {
    fn to_term(self) -> Term {
        Term::Integer(self.get().into())
    }
}

impl ToTerm for Vec<u8> {
    fn to_term(self) -> Term {
        Term::Binary(self)
    }
}

impl ToTerm for Instrumenter {
    fn to_term(self) -> Term {
        Term::Instrumenter(self)
    }
}

impl ToTerm for Trace {
    fn to_term(self) -> Term {
        Term::Trace(self)
    }
}

impl ToTerm for LoadStatus {
    fn to_term(self) -> Term {
        let status = match self {
            LoadStatus::Loaded => Atom::Loaded,
            LoadStatus::AlreadyLoaded => Atom::AlreadyLoaded,
        };
        Term::Tuple(vec![Term::OK, Term::Atom(status)])
    }
}

// ============================================================================
// Positional Arguments
// ============================================================================

/// Positional arguments of one call.
///
/// Decoding failures name the argument's position, so a host error reads
/// `Argument error: argument 1: expected u64, got integer -1`.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    terms: &'a [Term],
}

impl<'a> Args<'a> {
    /// Wrap a call's arguments
    pub fn new(terms: &'a [Term]) -> Self {
        Args { terms }
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if there are no arguments
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Decode argument `index`
    pub fn get<T: FromTerm<'a>>(&self, index: usize) -> BridgeResult<T> {
        let term = self
            .terms
            .get(index)
            .ok_or_else(|| BridgeError::bad_arg(index, "missing"))?;
        T::from_term(term).map_err(|mismatch| BridgeError::bad_arg(index, mismatch))
    }
}
