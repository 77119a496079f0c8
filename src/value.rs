//! Purpose: Define the type-erased value held by a `Polytype`.
//! Exports: `PolyValue`.
//! Role: Object-safe seam between serde encoding and runtime type checks.
//! Invariants: Every `Serialize + Debug + Send + Sync + 'static` type is a `PolyValue`.
//! Invariants: Downcasts go through `dyn PolyValue`, never through `Box<dyn PolyValue>`.

use std::any::Any;
use std::fmt::Debug;

use serde::Serialize;

/// A value a [`Polytype`](crate::Polytype) can hold.
///
/// Implemented automatically; serialization is the value's own serde encoding.
pub trait PolyValue: erased_serde::Serialize + Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Rust type name of the concrete value, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T> PolyValue for T
where
    T: Serialize + Any + Debug + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

erased_serde::serialize_trait_object!(PolyValue);

impl dyn PolyValue + '_ {
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl dyn PolyValue {
    /// Recovers the concrete value. On a mismatch the value comes back as
    /// `Box<dyn Any>`, as with `Box::<dyn Any>::downcast`; check with
    /// [`is`](Self::is) first to keep the `PolyValue` box.
    pub fn downcast<T: Any>(self: Box<Self>) -> Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast::<T>()
    }
}
