//! Purpose: Hold one JSON value whose concrete type is chosen by a discriminator field.
//! Exports: `Polytype`, `PolytypeSeed`.
//! Role: Bridge between serde/serde_json and the factory registry.
//! Invariants: Decode either replaces the held value entirely or leaves it untouched.
//! Invariants: Encode adds no framing; the held value emits its own discriminator.
//! Invariants: Payload bytes are parsed once; the tree serves both resolution and decode.
//! Notes: Decode-time errors are returned to the caller and never logged here.

use std::any::Any;
use std::sync::Arc;

use serde::de::{self, DeserializeSeed, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::json::parse;
use crate::registry::{self, Factory, TypeRegistry};
use crate::value::PolyValue;

/// A container for a value whose type is resolved from the payload at decode time.
///
/// [`decode`](Self::decode) and the [`Deserialize`] impl use the process-wide
/// registry; [`decode_with`](Self::decode_with) and [`PolytypeSeed`] take an
/// explicit [`TypeRegistry`].
///
/// ```
/// use polytype::{Polytype, TypeRegistry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Default, Serialize, Deserialize)]
/// struct Circle {
///     #[serde(rename = "Type")]
///     kind: String,
///     radius: f64,
/// }
///
/// let mut registry = TypeRegistry::new();
/// registry.register_default::<Circle>("circle");
///
/// let shape = Polytype::from_slice_with(&registry, br#"{"Type":"circle","radius":2.5}"#).unwrap();
/// assert_eq!(shape.downcast_ref::<Circle>().map(|c| c.radius), Some(2.5));
/// ```
#[derive(Debug, Default)]
pub struct Polytype {
    value: Option<Box<dyn PolyValue>>,
}

impl Polytype {
    /// Wraps `value`. A `Box<dyn PolyValue>` is stored as is, not boxed again.
    pub fn new<T: PolyValue>(value: T) -> Self {
        Self {
            value: boxed_value(value),
        }
    }

    pub fn empty() -> Self {
        Self { value: None }
    }

    /// Wraps an already boxed value without boxing it again.
    pub fn from_boxed(value: Box<dyn PolyValue>) -> Self {
        Self { value: Some(value) }
    }

    pub fn from_slice(input: &[u8]) -> Result<Self, Error> {
        let mut poly = Self::empty();
        poly.decode(input)?;
        Ok(poly)
    }

    pub fn from_slice_with(registry: &TypeRegistry, input: &[u8]) -> Result<Self, Error> {
        let mut poly = Self::empty();
        poly.decode_with(registry, input)?;
        Ok(poly)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&dyn PolyValue> {
        self.value.as_deref()
    }

    pub fn value_mut(&mut self) -> Option<&mut (dyn PolyValue + 'static)> {
        self.value.as_deref_mut()
    }

    pub fn set<T: PolyValue>(&mut self, value: T) {
        self.value = boxed_value(value);
    }

    pub fn take(&mut self) -> Option<Box<dyn PolyValue>> {
        self.value.take()
    }

    pub fn type_name(&self) -> Option<&'static str> {
        self.value().map(|value| value.type_name())
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value().is_some_and(|value| value.is::<T>())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value()?.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value_mut()?.downcast_mut::<T>()
    }

    /// Consumes the container, returning the held value if it is a `T`.
    pub fn into_inner<T: Any>(self) -> Result<T, Self> {
        match self.value {
            Some(value) if value.is::<T>() => value
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| Self::empty()),
            value => Err(Self { value }),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(encode_error)
    }

    pub fn encode_to_string(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(encode_error)
    }

    /// Decodes `input` against the process-wide registry.
    pub fn decode(&mut self, input: &[u8]) -> Result<(), Error> {
        let payload = parse_payload(input)?;
        self.decode_value(payload)
    }

    pub fn decode_with(&mut self, registry: &TypeRegistry, input: &[u8]) -> Result<(), Error> {
        let payload = parse_payload(input)?;
        self.decode_value_with(registry, payload)
    }

    /// Decodes an already parsed tree against the process-wide registry.
    pub fn decode_value(&mut self, payload: Value) -> Result<(), Error> {
        // Resolve under the read lock, decode after releasing it.
        let factory = registry::with_global(|registry| resolve(registry, &payload))?;
        self.fill(&factory, payload)
    }

    pub fn decode_value_with(
        &mut self,
        registry: &TypeRegistry,
        payload: Value,
    ) -> Result<(), Error> {
        let factory = resolve(registry, &payload)?;
        self.fill(&factory, payload)
    }

    fn fill(&mut self, factory: &Factory, payload: Value) -> Result<(), Error> {
        let value = factory.decode(payload).map_err(|err| {
            Error::new(ErrorKind::Decode)
                .with_message("payload does not match the registered type")
                .with_discriminator(factory.name())
                .with_source(err)
        })?;
        tracing::trace!(
            discriminator = %factory.name(),
            type_name = factory.type_name(),
            "decoded polytype value"
        );
        self.value = Some(value);
        Ok(())
    }
}

impl From<Box<dyn PolyValue>> for Polytype {
    fn from(value: Box<dyn PolyValue>) -> Self {
        Self::from_boxed(value)
    }
}

// Unwraps an already erased box so the concrete type stays visible to downcasts.
fn boxed_value<T: PolyValue>(value: T) -> Option<Box<dyn PolyValue>> {
    let mut slot = Some(value);
    let erased: &mut dyn Any = &mut slot;
    match erased.downcast_mut::<Option<Box<dyn PolyValue>>>() {
        Some(boxed) => boxed.take(),
        None => slot.map(|value| Box::new(value) as Box<dyn PolyValue>),
    }
}

fn encode_error(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Encode)
        .with_message("held value failed to serialize")
        .with_source(err)
}

fn parse_payload(input: &[u8]) -> Result<Value, Error> {
    parse::from_slice(input).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message(parse::hint_for_error(&err, "polytype.decode"))
            .with_source(err)
    })
}

fn resolve(registry: &TypeRegistry, payload: &Value) -> Result<Arc<Factory>, Error> {
    let name = read_discriminator(payload, registry.discriminator_key())?;
    registry.lookup(name).ok_or_else(|| {
        Error::new(ErrorKind::UnsupportedType)
            .with_message(format!("type \"{name}\" is not supported"))
            .with_discriminator(name)
    })
}

fn read_discriminator<'a>(payload: &'a Value, key: &str) -> Result<&'a str, Error> {
    let fields = match payload {
        Value::Object(fields) => fields,
        Value::Null => return Err(missing_discriminator(key)),
        other => {
            return Err(Error::new(ErrorKind::Parse).with_message(format!(
                "expected a JSON object, found {}",
                json_kind(other)
            )));
        }
    };
    match fields.get(key) {
        None | Some(Value::Null) => Err(missing_discriminator(key)),
        Some(Value::String(name)) if name.is_empty() => Err(missing_discriminator(key)),
        Some(Value::String(name)) => Ok(name),
        Some(other) => Err(Error::new(ErrorKind::Parse).with_message(format!(
            "field \"{key}\" must be a string, found {}",
            json_kind(other)
        ))),
    }
}

fn missing_discriminator(key: &str) -> Error {
    Error::new(ErrorKind::MissingDiscriminator)
        .with_message(format!("field \"{key}\" must be specified"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Serialize for Polytype {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value() {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for Polytype {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Value::deserialize(deserializer)?;
        let mut poly = Polytype::empty();
        poly.decode_value(payload)
            .map_err(<D::Error as de::Error>::custom)?;
        Ok(poly)
    }
}

/// Decodes a [`Polytype`] through any serde deserializer using an explicit registry.
#[derive(Clone, Copy, Debug)]
pub struct PolytypeSeed<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> PolytypeSeed<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }
}

impl<'de> DeserializeSeed<'de> for PolytypeSeed<'_> {
    type Value = Polytype;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Polytype, D::Error> {
        let payload = Value::deserialize(deserializer)?;
        let mut poly = Polytype::empty();
        poly.decode_value_with(self.registry, payload)
            .map_err(<D::Error as de::Error>::custom)?;
        Ok(poly)
    }
}
