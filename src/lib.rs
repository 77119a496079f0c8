//! Purpose: Polymorphic JSON values resolved through a discriminator field.
//! Exports: `Polytype`, `PolytypeSeed`, `TypeRegistry`, `Factory`, `PolyValue`, `Error`.
//! Role: Library crate; callers register factories at startup, then decode.
//! Invariants: Registration mistakes panic; decode-time failures are `Result` errors.
//! Invariants: Registries passed explicitly carry no hidden state; the process-wide
//! registry is opt-in through `registry::register` and `Polytype::decode`.
pub mod core;
pub(crate) mod json;
pub mod polytype;
pub mod registry;
pub mod value;

pub use crate::core::error::{Error, ErrorKind};
pub use crate::polytype::{Polytype, PolytypeSeed};
pub use crate::registry::{DEFAULT_DISCRIMINATOR_KEY, Factory, TypeRegistry};
pub use crate::value::PolyValue;
