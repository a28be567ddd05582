use std::collections::BTreeMap;

use crate::error::Error;

/// Environment that loaders write into and stores read from.
///
/// Both kinds accept the same names and values, so code tested against a
/// memory target behaves the same against the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    backing: Backing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backing {
    /// Reads and writes `std::env`. Writing is not thread-safe.
    Process,
    Memory(BTreeMap<String, String>),
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::memory()
    }
}

impl TargetEnv {
    /// Target the environment of the running process.
    ///
    /// # Safety
    ///
    /// While a loader or store holding this target can write, no other thread
    /// may touch the process environment.
    pub unsafe fn process() -> Self {
        Self {
            backing: Backing::Process,
        }
    }

    /// Create an empty in-memory target.
    pub fn memory() -> Self {
        Self::from_memory(BTreeMap::new())
    }

    /// Create an in-memory target from an existing map.
    pub fn from_memory(map: BTreeMap<String, String>) -> Self {
        Self {
            backing: Backing::Memory(map),
        }
    }

    /// Create an in-memory copy of the current process environment.
    ///
    /// Non-UTF-8 names and values are converted lossily.
    pub fn snapshot() -> Self {
        let map = std::env::vars_os()
            .map(|(key, value)| {
                (
                    key.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self::from_memory(map)
    }

    pub fn is_process(&self) -> bool {
        matches!(self.backing, Backing::Process)
    }

    pub fn as_memory(&self) -> Option<&BTreeMap<String, String>> {
        match &self.backing {
            Backing::Memory(map) => Some(map),
            Backing::Process => None,
        }
    }

    pub fn as_memory_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        match &mut self.backing {
            Backing::Memory(map) => Some(map),
            Backing::Process => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match &self.backing {
            Backing::Process => is_settable_name(key) && std::env::var_os(key).is_some(),
            Backing::Memory(map) => map.contains_key(key),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<String> {
        match &self.backing {
            Backing::Process if is_settable_name(key) => {
                std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
            }
            Backing::Process => None,
            Backing::Memory(map) => map.get(key).cloned(),
        }
    }

    /// Write one variable. Nothing is written if [`check_var`] rejects it.
    pub(crate) fn set_var(&mut self, key: &str, value: &str) -> Result<(), Error> {
        check_var(key, value)?;
        match &mut self.backing {
            // SAFETY: thread exclusivity is upheld by the caller of
            // `TargetEnv::process`; the name and value were checked above.
            Backing::Process => unsafe { std::env::set_var(key, value) },
            Backing::Memory(map) => {
                map.insert(key.to_owned(), value.to_owned());
            }
        }
        Ok(())
    }
}

/// Reject what `std::env::set_var` would panic on.
pub(crate) fn check_var(key: &str, value: &str) -> Result<(), Error> {
    let reason = if key.is_empty() {
        "name is empty"
    } else if key.contains('=') {
        "name contains `=`"
    } else if key.contains('\0') {
        "name contains NUL"
    } else if value.contains('\0') {
        "value contains NUL"
    } else {
        return Ok(());
    };

    Err(Error::InvalidVariable {
        key: key.to_owned(),
        reason,
    })
}

fn is_settable_name(key: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0'])
}
