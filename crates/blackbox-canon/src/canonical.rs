//! The `Canonicalize` capability and the depth/cycle-tracking walker.
//!
//! Every type that can appear in a signed payload describes itself as a
//! `Value` by implementing `Canonicalize`. Implementations never recurse
//! directly: they hand children back to the `Canonicalizer`, which counts
//! depth and remembers which shared (`Arc`) allocations are on the current
//! path. A value that reaches itself again fails with
//! `CanonicalError::Cyclic`; one that nests too deeply fails with
//! `CanonicalError::RecursionLimit`. Neither case ever produces output.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use blackbox_contracts::{error::CanonicalError, value::Value};

/// Nesting depth at which canonicalization gives up.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// A type that can describe itself as a canonical `Value`.
///
/// Composite types should use [`Canonicalizer::object`] so their encoding
/// carries a stable, qualified type name:
///
/// ```rust,ignore
/// impl Canonicalize for Waypoint {
///     fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
///         Ok(cx
///             .object("mission.Waypoint")
///             .field("latitude", &self.latitude)?
///             .field("longitude", &self.longitude)?
///             .finish())
///     }
/// }
/// ```
pub trait Canonicalize {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError>;
}

/// Walks a value graph, enforcing the depth limit and detecting cycles.
#[derive(Debug)]
pub struct Canonicalizer {
    max_depth: usize,
    depth: usize,
    /// Addresses of the shared allocations currently being visited.
    path: Vec<usize>,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            depth: 0,
            path: Vec::new(),
        }
    }

    /// Canonicalize `value` one level below the current position.
    pub fn nested<T: Canonicalize + ?Sized>(&mut self, value: &T) -> Result<Value, CanonicalError> {
        if self.depth >= self.max_depth {
            return Err(CanonicalError::RecursionLimit {
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        let result = value.canonicalize(self);
        self.depth -= 1;
        result
    }

    /// Canonicalize the target of a shared pointer at address `ptr`.
    ///
    /// Fails with `Cyclic` if the same allocation is already being visited
    /// further up the path. Siblings that share an allocation are fine.
    pub fn shared<T: Canonicalize + ?Sized>(
        &mut self,
        ptr: *const (),
        type_name: &str,
        value: &T,
    ) -> Result<Value, CanonicalError> {
        let addr = ptr as usize;
        if self.path.contains(&addr) {
            return Err(CanonicalError::Cyclic {
                type_name: type_name.to_string(),
            });
        }
        self.path.push(addr);
        let result = self.nested(value);
        self.path.pop();
        result
    }

    /// Start describing a composite object tagged with `type_name`.
    pub fn object(&mut self, type_name: impl Into<String>) -> ObjectBuilder<'_> {
        ObjectBuilder {
            cx: self,
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the fields of a composite object.
pub struct ObjectBuilder<'a> {
    cx: &'a mut Canonicalizer,
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl ObjectBuilder<'_> {
    pub fn field<T: Canonicalize + ?Sized>(
        mut self,
        name: &str,
        value: &T,
    ) -> Result<Self, CanonicalError> {
        let value = self.cx.nested(value)?;
        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    /// Add `name` only when `value` is `Some`.
    pub fn optional_field<T: Canonicalize>(
        self,
        name: &str,
        value: Option<&T>,
    ) -> Result<Self, CanonicalError> {
        match value {
            Some(value) => self.field(name, value),
            None => Ok(self),
        }
    }

    pub fn finish(self) -> Value {
        Value::Object {
            type_name: self.type_name,
            fields: self.fields,
        }
    }
}

/// A byte blob, encoded distinctly from text and from a list of integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bytes(pub Vec<u8>);

// ── Value ─────────────────────────────────────────────────────────────────────

impl Canonicalize for Value {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        let value = match self {
            Value::List(items) => Value::List(nested_all(cx, items)?),
            Value::Set(items) => Value::Set(nested_all(cx, items)?),
            Value::Map(map) => Value::Map(nested_map(cx, map.iter())?),
            Value::Object { type_name, fields } => Value::Object {
                type_name: type_name.clone(),
                fields: nested_map(cx, fields.iter())?,
            },
            scalar => scalar.clone(),
        };
        Ok(value)
    }
}

fn nested_all<'a, T, I>(cx: &mut Canonicalizer, items: I) -> Result<Vec<Value>, CanonicalError>
where
    T: Canonicalize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items.into_iter().map(|item| cx.nested(item)).collect()
}

fn nested_map<'a, K, T, I>(
    cx: &mut Canonicalizer,
    entries: I,
) -> Result<BTreeMap<String, Value>, CanonicalError>
where
    K: AsRef<str> + 'a,
    T: Canonicalize + 'a,
    I: IntoIterator<Item = (&'a K, &'a T)>,
{
    entries
        .into_iter()
        .map(|(k, v)| cx.nested(v).map(|v| (k.as_ref().to_string(), v)))
        .collect()
}

// ── Scalars ───────────────────────────────────────────────────────────────────

macro_rules! canonical_via_from {
    ($($ty:ty => $conv:expr),* $(,)?) => {
        $(
            impl Canonicalize for $ty {
                fn canonicalize(&self, _cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
                    let conv: fn(&$ty) -> Value = $conv;
                    Ok(conv(self))
                }
            }
        )*
    };
}

canonical_via_from! {
    bool => |b| Value::Bool(*b),
    i8 => |n| Value::Int(i64::from(*n)),
    i16 => |n| Value::Int(i64::from(*n)),
    i32 => |n| Value::Int(i64::from(*n)),
    i64 => |n| Value::Int(*n),
    u8 => |n| Value::Int(i64::from(*n)),
    u16 => |n| Value::Int(i64::from(*n)),
    u32 => |n| Value::Int(i64::from(*n)),
    u64 => |n| Value::from(*n),
    usize => |n| Value::from(*n as u64),
    f32 => |n| Value::Float(f64::from(*n)),
    f64 => |n| Value::Float(*n),
    str => |s| Value::String(s.to_string()),
    String => |s| Value::String(s.clone()),
    Bytes => |b| Value::Bytes(b.0.clone()),
    NaiveDate => |d| Value::Date(*d),
    NaiveTime => |t| Value::Time(*t),
    Duration => |d| Value::Duration(*d),
}

impl Canonicalize for () {
    fn canonicalize(&self, _cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::Null)
    }
}

/// Any timezone is normalized to UTC so the encoding is locale-independent.
impl<Tz: TimeZone> Canonicalize for DateTime<Tz> {
    fn canonicalize(&self, _cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::DateTime(self.with_timezone(&Utc)))
    }
}

impl Canonicalize for serde_json::Value {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Value::from(self.clone()).canonicalize(cx)
    }
}

// ── Containers ────────────────────────────────────────────────────────────────

impl<T: Canonicalize> Canonicalize for Option<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        match self {
            Some(value) => value.canonicalize(cx),
            None => Ok(Value::Null),
        }
    }
}

impl<T: Canonicalize> Canonicalize for [T] {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::List(nested_all(cx, self)?))
    }
}

impl<T: Canonicalize> Canonicalize for Vec<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        self.as_slice().canonicalize(cx)
    }
}

impl<T: Canonicalize> Canonicalize for BTreeSet<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::Set(nested_all(cx, self)?))
    }
}

impl<T: Canonicalize, S: BuildHasher> Canonicalize for HashSet<T, S> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::Set(nested_all(cx, self)?))
    }
}

impl<T: Canonicalize> Canonicalize for BTreeMap<String, T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::Map(nested_map(cx, self)?))
    }
}

impl<T: Canonicalize, S: BuildHasher> Canonicalize for HashMap<String, T, S> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        Ok(Value::Map(nested_map(cx, self)?))
    }
}

// ── Pointers and locks ────────────────────────────────────────────────────────

impl<T: Canonicalize + ?Sized> Canonicalize for &T {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        (**self).canonicalize(cx)
    }
}

impl<T: Canonicalize + ?Sized> Canonicalize for Box<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        (**self).canonicalize(cx)
    }
}

/// Shared pointers are the only way to build a cycle, so they are tracked.
impl<T: Canonicalize + ?Sized> Canonicalize for Arc<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        cx.shared(
            Arc::as_ptr(self).cast::<()>(),
            std::any::type_name::<T>(),
            &**self,
        )
    }
}

impl<T: Canonicalize + ?Sized> Canonicalize for RwLock<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        let guard = self.read().map_err(|_| CanonicalError::LockPoisoned {
            type_name: std::any::type_name::<T>().to_string(),
        })?;
        guard.canonicalize(cx)
    }
}

impl<T: Canonicalize + ?Sized> Canonicalize for Mutex<T> {
    fn canonicalize(&self, cx: &mut Canonicalizer) -> Result<Value, CanonicalError> {
        let guard = self.lock().map_err(|_| CanonicalError::LockPoisoned {
            type_name: std::any::type_name::<T>().to_string(),
        })?;
        guard.canonicalize(cx)
    }
}
