//! Purpose: Map discriminator strings to factories for concrete value types.
//! Exports: `TypeRegistry`, `Factory`, `DEFAULT_DISCRIMINATOR_KEY`, process-wide helpers.
//! Role: Lookup table consulted by `Polytype` decoding; filled once at startup.
//! Invariants: Discriminators are unique and non-empty; violations panic at registration.
//! Invariants: The process-wide lock is never held while a payload decodes.
//! Notes: Lookups hand out `Arc<Factory>` so decoding runs outside any lock.

use std::any::type_name;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::value::PolyValue;

pub const DEFAULT_DISCRIMINATOR_KEY: &str = "Type";

type ConstructFn = dyn Fn() -> Box<dyn PolyValue> + Send + Sync;
type DecodeFn = dyn Fn(Value) -> Result<Box<dyn PolyValue>, serde_json::Error> + Send + Sync;

/// A registered constructor for one concrete type.
///
/// The factory is the type witness for its discriminator: decoding produces a
/// fresh `T` from the whole payload through `T`'s own `Deserialize`, so serde
/// attributes (aliases, enums, defaults) behave exactly as in plain serde.
pub struct Factory {
    name: String,
    type_name: &'static str,
    construct: Box<ConstructFn>,
    decode: Box<DecodeFn>,
}

impl Factory {
    fn new<T, F>(name: String, factory: F) -> Self
    where
        T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name,
            type_name: type_name::<T>(),
            construct: Box::new(move || Box::new(factory()) as Box<dyn PolyValue>),
            decode: Box::new(
                |payload: Value| -> Result<Box<dyn PolyValue>, serde_json::Error> {
                    let value: T = serde_json::from_value(payload)?;
                    Ok(Box::new(value))
                },
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Invokes the factory and returns the fresh, empty instance.
    pub fn construct(&self) -> Box<dyn PolyValue> {
        (self.construct)()
    }

    pub(crate) fn decode(&self, payload: Value) -> Result<Box<dyn PolyValue>, serde_json::Error> {
        (self.decode)(payload)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

enum RegisterError {
    EmptyName,
    Duplicate(String),
}

#[track_caller]
fn fail_registration(err: RegisterError) -> ! {
    match err {
        RegisterError::EmptyName => panic!("polytype: discriminator must not be empty"),
        RegisterError::Duplicate(name) => {
            panic!("polytype: type \"{name}\" has already been registered")
        }
    }
}

/// Table from discriminator to [`Factory`].
///
/// Registration takes `&mut self`; once filled, a shared `&TypeRegistry` serves
/// any number of concurrent decodes.
pub struct TypeRegistry {
    discriminator_key: String,
    factories: HashMap<String, Arc<Factory>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Empty registry reading the discriminator from [`DEFAULT_DISCRIMINATOR_KEY`].
    pub fn new() -> Self {
        Self {
            discriminator_key: DEFAULT_DISCRIMINATOR_KEY.to_string(),
            factories: HashMap::new(),
        }
    }

    /// Empty registry reading the discriminator from `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is empty.
    #[track_caller]
    pub fn with_discriminator_key(key: impl Into<String>) -> Self {
        let key = key.into();
        assert!(!key.is_empty(), "polytype: discriminator key must not be empty");
        Self {
            discriminator_key: key,
            factories: HashMap::new(),
        }
    }

    pub fn discriminator_key(&self) -> &str {
        &self.discriminator_key
    }

    /// Associates `name` with a factory producing fresh instances of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or already registered. Both are configuration
    /// mistakes, not input errors.
    #[track_caller]
    pub fn register<T, F>(&mut self, name: impl Into<String>, factory: F)
    where
        T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        if let Err(err) = self.insert(name.into(), factory) {
            fail_registration(err);
        }
    }

    /// Registers `T` with `T::default` as its factory.
    #[track_caller]
    pub fn register_default<T>(&mut self, name: impl Into<String>)
    where
        T: Default + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        self.register(name, T::default);
    }

    fn insert<T, F>(&mut self, name: String, factory: F) -> Result<(), RegisterError>
    where
        T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        match self.factories.entry(name) {
            Entry::Occupied(entry) => Err(RegisterError::Duplicate(entry.key().clone())),
            Entry::Vacant(entry) => {
                let factory = Factory::new(entry.key().clone(), factory);
                tracing::debug!(
                    discriminator = %factory.name(),
                    type_name = factory.type_name(),
                    "registered polytype factory"
                );
                entry.insert(Arc::new(factory));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Factory>> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered discriminators in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("discriminator_key", &self.discriminator_key)
            .field("names", &self.names())
            .finish()
    }
}

// Process-wide registry. Register during startup; lookups may run from any thread.
static GLOBAL: LazyLock<RwLock<TypeRegistry>> = LazyLock::new(|| RwLock::new(TypeRegistry::new()));

fn read_global() -> RwLockReadGuard<'static, TypeRegistry> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_global() -> RwLockWriteGuard<'static, TypeRegistry> {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner)
}

/// Registers `name` in the process-wide registry.
///
/// # Panics
///
/// Panics if `name` is empty or already registered. The panic is raised after
/// the registry lock is released.
#[track_caller]
pub fn register<T, F>(name: impl Into<String>, factory: F)
where
    T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let name = name.into();
    let outcome = write_global().insert(name, factory);
    if let Err(err) = outcome {
        fail_registration(err);
    }
}

#[track_caller]
pub fn register_default<T>(name: impl Into<String>)
where
    T: Default + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    register(name, T::default);
}

pub fn lookup(name: &str) -> Option<Arc<Factory>> {
    read_global().lookup(name)
}

pub fn contains(name: &str) -> bool {
    read_global().contains(name)
}

pub fn names() -> Vec<String> {
    read_global().names().into_iter().map(str::to_string).collect()
}

/// Runs `f` against the process-wide registry under its read lock.
pub(crate) fn with_global<R>(f: impl FnOnce(&TypeRegistry) -> R) -> R {
    f(&read_global())
}
