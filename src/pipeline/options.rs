//! Typed per-task options.
//!
//! A task declares its options and their defaults through
//! [`Task::options`](super::task::Task::options); the map is turned into an
//! [`OptionStore`] carried by the configurator and moved into the container
//! at build. After that, options are only reachable through the store's
//! typed interface: from the outside via
//! [`Pipeline::options`](super::builder::Pipeline::options), and from the
//! task itself through the reference its `run` step receives.

use crate::mutex::Mutex;
use smol_str::SmolStr;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use thiserror::Error;

struct OptionValue {
    value: Box<dyn Any + Send + Sync>,
    ty_name: disqualified::ShortName<'static>,
}

impl Debug for OptionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.ty_name)
    }
}

/// An error from a typed option access.
#[derive(Debug, Error)]
pub enum OptionError {
    #[error("no option named {0:?}")]
    UnknownOption(SmolStr),
    #[error("option {key:?} holds a {stored}, not a {requested}")]
    TypeMismatch {
        key: SmolStr,
        stored: disqualified::ShortName<'static>,
        requested: disqualified::ShortName<'static>,
    },
}

impl crate::utils::LogErr for OptionError {
    fn log_err(&self) {
        tracing::error!("{self}");
    }
}

/// The declared options of a task, with their default values.
#[derive(Debug, Default)]
pub struct OptionsMap {
    entries: HashMap<SmolStr, OptionValue>,
}

impl OptionsMap {
    pub fn new() -> Self {
        Self::default()
    }
    /// Declare an option with its default value.
    pub fn with<V: Send + Sync + 'static>(mut self, key: impl Into<SmolStr>, value: V) -> Self {
        self.entries.insert(
            key.into(),
            OptionValue {
                value: Box::new(value),
                ty_name: disqualified::ShortName::of::<V>(),
            },
        );
        self
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Thread-safe storage for a task's options.
///
/// The set of keys and their types are fixed by the declaring
/// [`OptionsMap`]; [`set`](Self::set) only replaces values of the declared
/// type.
#[derive(Debug)]
pub struct OptionStore {
    entries: Mutex<HashMap<SmolStr, OptionValue>>,
}

impl OptionStore {
    pub(crate) fn from_map(map: OptionsMap) -> Self {
        Self {
            entries: Mutex::new(map.entries),
        }
    }

    /// Read a copy of an option's current value.
    pub fn get<V: Clone + Send + Sync + 'static>(&self, key: &str) -> Result<V, OptionError> {
        let entries = self.entries.lock().unwrap();
        let entry = entries
            .get(key)
            .ok_or_else(|| OptionError::UnknownOption(key.into()))?;
        entry
            .value
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| OptionError::TypeMismatch {
                key: key.into(),
                stored: entry.ty_name,
                requested: disqualified::ShortName::of::<V>(),
            })
    }

    /// Replace an option's value; the type must match the declaration.
    pub fn set<V: Send + Sync + 'static>(&self, key: &str, value: V) -> Result<(), OptionError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| OptionError::UnknownOption(key.into()))?;
        if !entry.value.as_ref().is::<V>() {
            return Err(OptionError::TypeMismatch {
                key: key.into(),
                stored: entry.ty_name,
                requested: disqualified::ShortName::of::<V>(),
            });
        }
        entry.value = Box::new(value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }
}
