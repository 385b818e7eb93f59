//! # Handler descriptors.
//!
//! A [`HandlerDescriptor`] is the static shape of one marked handler: its name,
//! kind filter, [`Priority`], and declared parameter list. Descriptors are derived
//! once per listener type from its [`HandlerTable`](crate::HandlerTable) and
//! never change afterwards.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

use crate::events::EventKind;

/// Invocation priority of a handler within its listener.
///
/// Lower [`level`](Priority::level) runs earlier. Handlers that declare no
/// priority are treated as [`Priority::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Highest,
    High,
    #[default]
    Normal,
    Low,
    Lowest,
}

impl Priority {
    /// Numeric level: `Highest = 0` … `Lowest = 4`.
    #[inline]
    pub const fn level(self) -> u8 {
        match self {
            Priority::Highest => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
            Priority::Lowest => 4,
        }
    }
}

/// One declared handler parameter, identified by its static type.
#[derive(Clone, Copy)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
}

impl ParamType {
    /// Describes a parameter of type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type identity of the parameter.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Type name of the parameter (for diagnostics).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if the parameter is exactly `T`.
    #[inline]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParamType {}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker that turns a declared entry into a handler.
///
/// Entries without a marker are ignored by dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandlerMarker {
    /// Kind filter.
    pub target: EventKind,
    /// Declared priority (`None` → [`Priority::Normal`]).
    pub priority: Option<Priority>,
}

impl HandlerMarker {
    /// Marker with an explicit kind filter and no declared priority.
    #[inline]
    pub const fn new(target: EventKind) -> Self {
        Self {
            target,
            priority: None,
        }
    }

    /// Marker that infers the event from the payload type alone.
    #[inline]
    pub const fn by_type() -> Self {
        Self::new(EventKind::None)
    }

    /// Sets the declared priority.
    #[inline]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Static description of one marked handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    name: Cow<'static, str>,
    target: EventKind,
    priority: Priority,
    params: Vec<ParamType>,
}

impl HandlerDescriptor {
    /// Builds a descriptor from a marker and the declared parameters.
    pub fn new(name: impl Into<Cow<'static, str>>, marker: HandlerMarker, params: Vec<ParamType>) -> Self {
        Self {
            name: name.into(),
            target: marker.target,
            priority: marker.priority.unwrap_or_default(),
            params,
        }
    }

    /// Declared handler name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind filter.
    #[inline]
    pub fn target(&self) -> EventKind {
        self.target
    }

    /// Effective priority.
    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Declared parameters.
    #[inline]
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Number of declared parameters.
    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared payload type; only meaningful when `arity() == 1`.
    #[inline]
    pub fn payload(&self) -> Option<ParamType> {
        match self.params.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}
