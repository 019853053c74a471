//! Registry of deployed functions.
//!
//! The registry maps function names to [`DeployedFunction`]s: the descriptor
//! callers see plus the resolved callable the dispatcher invokes. Entries
//! are immutable once inserted; re-deploying a name swaps the whole entry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use url::Url;

use emulator_core::Callable;

use crate::trigger::Trigger;

/// The registry's record for one deployed function.
///
/// An endpoint is present if and only if the trigger is [`Trigger::Http`];
/// the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    name: String,
    source_path: PathBuf,
    trigger: Trigger,
    endpoint: Option<Url>,
}

impl FunctionDescriptor {
    /// Descriptor for an HTTP-triggered function served at `endpoint`.
    pub fn http(name: impl Into<String>, source_path: impl Into<PathBuf>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            trigger: Trigger::Http,
            endpoint: Some(endpoint),
        }
    }

    /// Descriptor for an event-driven function, or `None` if `trigger` is HTTP.
    pub fn background(
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        trigger: Trigger,
    ) -> Option<Self> {
        if trigger.is_http() {
            return None;
        }
        Some(Self {
            name: name.into(),
            source_path: source_path.into(),
            trigger,
            endpoint: None,
        })
    }

    /// Unique function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module the function was resolved from.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// How the function is triggered.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Synthesized URL of an HTTP function.
    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }
}

impl Serialize for FunctionDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FunctionDescriptor", 4)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("path", &self.source_path.display().to_string())?;
        state.serialize_field("type", self.trigger.type_name())?;
        state.serialize_field("url", &self.endpoint.as_ref().map(Url::as_str))?;
        state.end()
    }
}

/// A descriptor paired with the callable it was resolved to.
#[derive(Debug)]
pub struct DeployedFunction {
    /// What callers see.
    pub descriptor: FunctionDescriptor,
    /// What the dispatcher invokes.
    pub callable: Arc<dyn Callable>,
}

/// In-memory store of deployed functions, keyed by name.
///
/// Writers (`put`, `remove`, `clear`) are exclusive with each other and
/// with readers, so a listing never observes a half-applied update.
#[derive(Debug, Default)]
pub struct Registry {
    functions: RwLock<HashMap<String, Arc<DeployedFunction>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `function.descriptor.name()`.
    ///
    /// Returns the replaced entry, if any.
    pub fn put(&self, function: DeployedFunction) -> Option<Arc<DeployedFunction>> {
        let name = function.descriptor.name().to_string();
        self.functions.write().insert(name, Arc::new(function))
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<Arc<DeployedFunction>> {
        self.functions.read().get(name).cloned()
    }

    /// Remove a function. Returns `true` if it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.functions.write().remove(name).is_some()
    }

    /// Snapshot of every descriptor, ordered by name.
    pub fn list(&self) -> BTreeMap<String, FunctionDescriptor> {
        self.functions
            .read()
            .iter()
            .map(|(name, function)| (name.clone(), function.descriptor.clone()))
            .collect()
    }

    /// Remove everything. Returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut functions = self.functions.write();
        let count = functions.len();
        functions.clear();
        count
    }

    /// Number of deployed functions.
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Whether nothing is deployed.
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}
