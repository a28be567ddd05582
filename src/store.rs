use std::collections::HashMap;
use std::num::IntErrorKind;

use tracing::debug;

use crate::env::TargetEnv;
use crate::error::Error;
use crate::model::{ConversionMode, Value, ValueKind};
use crate::parser::trim_quotes;

/// Cached state of one environment variable.
///
/// Created the first time a key is looked up through [`EnvStore::key`] and
/// kept for the lifetime of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvVar {
    key: String,
    value: String,
    default: Option<Value>,
    is_defined: bool,
}

impl EnvVar {
    fn lookup(key: &str, target: &TargetEnv) -> Self {
        let found = target.get_var(key);
        Self {
            key: key.to_owned(),
            is_defined: found.is_some(),
            value: found.unwrap_or_default(),
            default: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The cached raw value; empty when the key is undefined.
    pub fn raw(&self) -> &str {
        &self.value
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_defined(&self) -> bool {
        self.is_defined
    }
}

/// Typed, cached access to an environment.
///
/// Each key is read from the target environment once, on first access. Later
/// changes to the target made outside of [`Key::update`] are not observed.
///
/// ```
/// use genv::EnvStore;
///
/// let mut store = EnvStore::memory();
/// assert!(store.key("DEBUG").default(true).bool().unwrap());
///
/// store.key("DEBUG").update(false).unwrap();
/// assert!(!store.key("DEBUG").bool().unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnvStore {
    vars: HashMap<String, EnvVar>,
    target: TargetEnv,
    conversion_mode: ConversionMode,
}

impl EnvStore {
    pub fn new(target: TargetEnv) -> Self {
        Self {
            vars: HashMap::new(),
            target,
            conversion_mode: ConversionMode::Lenient,
        }
    }

    /// Create a store over an empty in-memory environment.
    pub fn memory() -> Self {
        Self::new(TargetEnv::memory())
    }

    /// Create a store over the process environment.
    ///
    /// # Safety
    ///
    /// [`Key::update`] writes to the process environment; see
    /// [`TargetEnv::process`].
    pub unsafe fn process() -> Self {
        Self::new(unsafe { TargetEnv::process() })
    }

    pub fn with_conversion_mode(mut self, conversion_mode: ConversionMode) -> Self {
        self.conversion_mode = conversion_mode;
        self
    }

    pub fn conversion_mode(&self) -> ConversionMode {
        self.conversion_mode
    }

    /// Return the handle for `name`, reading the target environment only if
    /// the key has not been seen before.
    pub fn key(&mut self, name: &str) -> Key<'_> {
        let Self {
            vars,
            target,
            conversion_mode,
        } = self;

        let var = vars.entry(name.to_owned()).or_insert_with(|| {
            let var = EnvVar::lookup(name, &*target);
            debug!(key = name, defined = var.is_defined, "cached environment lookup");
            var
        });

        Key {
            var,
            target,
            conversion_mode: *conversion_mode,
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnvVar> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn target_env(&self) -> &TargetEnv {
        &self.target
    }

    pub fn into_target(self) -> TargetEnv {
        self.target
    }
}

/// Handle to one cached variable, returned by [`EnvStore::key`].
#[derive(Debug)]
pub struct Key<'a> {
    var: &'a mut EnvVar,
    target: &'a mut TargetEnv,
    conversion_mode: ConversionMode,
}

impl Key<'_> {
    /// Attach a fallback used while the key is undefined.
    pub fn default(self, value: impl Into<Value>) -> Self {
        self.var.default = Some(value.into());
        self
    }

    /// Store `value` in its canonical string form and write it through to the
    /// target environment. The key counts as defined from now on.
    ///
    /// Fails with [`Error::InvalidVariable`] when the name or value cannot be
    /// stored; the cached entry and the target are then left unchanged.
    pub fn update(&mut self, value: impl Into<Value>) -> Result<(), Error> {
        let value = value.into().to_string();
        self.target.set_var(&self.var.key, &value)?;
        self.var.value = value;
        self.var.is_defined = true;
        Ok(())
    }

    pub fn var(&self) -> &EnvVar {
        self.var
    }

    pub fn is_defined(&self) -> bool {
        self.var.is_defined
    }

    pub fn bool(&self) -> Result<bool, Error> {
        if !self.var.is_defined {
            return match self.var.default {
                Some(Value::Bool(value)) => Ok(value),
                _ => Err(self.mismatch(ValueKind::Bool)),
            };
        }

        match parse_bool(&self.var.value) {
            Some(value) => Ok(value),
            None => self.fallback(ValueKind::Bool, false),
        }
    }

    pub fn float(&self) -> Result<f64, Error> {
        if !self.var.is_defined {
            return match self.var.default {
                Some(Value::Float(value)) => Ok(value),
                _ => Err(self.mismatch(ValueKind::Float)),
            };
        }

        match self.var.value.parse::<f64>() {
            Ok(value) => Ok(value),
            Err(_) => self.fallback(ValueKind::Float, 0.0),
        }
    }

    /// Read a base-10 integer. Out-of-range values clamp to the `i32` range.
    pub fn int(&self) -> Result<i64, Error> {
        if !self.var.is_defined {
            return match self.var.default {
                Some(Value::Int(value)) => Ok(value),
                _ => Err(self.mismatch(ValueKind::Int)),
            };
        }

        match self.var.value.parse::<i32>() {
            Ok(value) => Ok(i64::from(value)),
            Err(err) => {
                let clamped = match err.kind() {
                    IntErrorKind::PosOverflow => i32::MAX,
                    IntErrorKind::NegOverflow => i32::MIN,
                    _ => 0,
                };
                self.fallback(ValueKind::Int, i64::from(clamped))
            }
        }
    }

    /// Read the value with one layer of matching quotes removed.
    pub fn string(&self) -> Result<String, Error> {
        if !self.var.is_defined {
            return match &self.var.default {
                Some(Value::Str(value)) => Ok(trim_quotes(value).to_owned()),
                _ => Err(self.mismatch(ValueKind::Str)),
            };
        }

        Ok(trim_quotes(&self.var.value).to_owned())
    }

    fn mismatch(&self, requested: ValueKind) -> Error {
        Error::TypeMismatch {
            key: self.var.key.clone(),
            requested,
            default: self.var.default.as_ref().map(Value::kind),
        }
    }

    fn fallback<T>(&self, kind: ValueKind, value: T) -> Result<T, Error> {
        match self.conversion_mode {
            ConversionMode::Lenient => Ok(value),
            ConversionMode::Strict => Err(Error::Conversion {
                key: self.var.key.clone(),
                kind,
                value: self.var.value.clone(),
            }),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store_with(vars: &[(&str, &str)]) -> EnvStore {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        EnvStore::new(TargetEnv::from_memory(map))
    }

    #[test]
    fn undefined_key_returns_matching_default() {
        let mut store = EnvStore::memory();

        assert_eq!(store.key("UNDEF_VAR").default("UPV").string().unwrap(), "UPV");
        assert_eq!(store.key("UNDEF_VAR").default(11.332).float().unwrap(), 11.332);
        assert!(!store.key("UNDEF_VAR").default(false).bool().unwrap());
        assert_eq!(store.key("UNDEF_VAR").default(1234).int().unwrap(), 1234);
        assert!(!store.key("UNDEF_VAR").is_defined());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn string_default_is_quote_trimmed() {
        let mut store = EnvStore::memory();

        assert_eq!(store.key("A").default("'quoted'").string().unwrap(), "quoted");
        assert_eq!(store.key("B").default("\"half'").string().unwrap(), "\"half'");
    }

    #[test]
    fn undefined_key_without_default_is_a_type_mismatch() {
        let mut store = EnvStore::memory();

        let err = store.key("MISSING").bool().expect_err("expected mismatch");
        match err {
            Error::TypeMismatch {
                key,
                requested,
                default,
            } => {
                assert_eq!(key, "MISSING");
                assert_eq!(requested, ValueKind::Bool);
                assert_eq!(default, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_default_kind_is_reported() {
        let mut store = EnvStore::memory();

        let err = store
            .key("PORT")
            .default("8080")
            .int()
            .expect_err("expected mismatch");
        assert!(matches!(
            err,
            Error::TypeMismatch {
                requested: ValueKind::Int,
                default: Some(ValueKind::Str),
                ..
            }
        ));
    }

    #[test]
    fn defined_key_ignores_default() {
        let mut store = store_with(&[("DEF_VAR", "TR")]);

        let key = store.key("DEF_VAR").default("fallback");
        assert!(key.is_defined());
        assert_eq!(key.string().unwrap(), "TR");
    }

    #[test]
    fn defined_values_parse_per_type() {
        let mut store = store_with(&[
            ("B", "True"),
            ("F", "1.23"),
            ("I", "-42"),
            ("S", "'127.0.0.1'"),
        ]);

        assert!(store.key("B").bool().unwrap());
        assert_eq!(store.key("F").float().unwrap(), 1.23);
        assert_eq!(store.key("I").int().unwrap(), -42);
        assert_eq!(store.key("S").string().unwrap(), "127.0.0.1");
    }

    #[test]
    fn parse_failures_yield_zero_values() {
        let mut store = store_with(&[("X", "not-a-number")]);

        assert!(!store.key("X").bool().unwrap());
        assert_eq!(store.key("X").float().unwrap(), 0.0);
        assert_eq!(store.key("X").int().unwrap(), 0);
    }

    #[test]
    fn strict_mode_reports_conversion_failures() {
        let mut store =
            store_with(&[("X", "yes"), ("Y", "3")]).with_conversion_mode(ConversionMode::Strict);

        let err = store.key("X").bool().expect_err("expected conversion error");
        match err {
            Error::Conversion { key, kind, value } => {
                assert_eq!(key, "X");
                assert_eq!(kind, ValueKind::Bool);
                assert_eq!(value, "yes");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.key("Y").int().unwrap(), 3);
    }

    #[test]
    fn integers_clamp_to_i32_range() {
        let mut store = store_with(&[
            ("BIG", "99999999999"),
            ("SMALL", "-99999999999"),
            ("PLUS", "+7"),
        ]);

        assert_eq!(store.key("BIG").int().unwrap(), i64::from(i32::MAX));
        assert_eq!(store.key("SMALL").int().unwrap(), i64::from(i32::MIN));
        assert_eq!(store.key("PLUS").int().unwrap(), 7);
    }

    #[test]
    fn update_marks_defined_and_writes_through() {
        let mut store = EnvStore::memory();

        store.key("K").default(true).update(false).unwrap();
        assert!(!store.key("K").bool().unwrap());
        assert_eq!(store.target_env().get_var("K").as_deref(), Some("false"));

        store.key("K").update(11.332).unwrap();
        assert_eq!(store.key("K").float().unwrap(), 11.332);

        store.key("K").update(1234).unwrap();
        assert_eq!(store.key("K").int().unwrap(), 1234);

        store.key("K").update("UPV").unwrap();
        assert_eq!(store.key("K").string().unwrap(), "UPV");
        assert_eq!(store.get("K").map(EnvVar::raw), Some("UPV"));
    }

    #[test]
    fn rejected_update_leaves_key_undefined() {
        let mut store = EnvStore::memory();

        for name in ["", "A=B", "A\0B"] {
            let err = store.key(name).update("x").expect_err("expected rejection");
            assert!(matches!(err, Error::InvalidVariable { .. }), "{name:?}");
            assert!(!store.key(name).is_defined(), "{name:?}");
        }

        let err = store
            .key("NUL_VALUE")
            .default("kept")
            .update("a\0b")
            .expect_err("expected rejection");
        assert!(matches!(
            err,
            Error::InvalidVariable {
                reason: "value contains NUL",
                ..
            }
        ));
        assert!(!store.key("NUL_VALUE").is_defined());
        assert_eq!(store.key("NUL_VALUE").string().unwrap(), "kept");
        assert!(store.target_env().as_memory().expect("memory target").is_empty());
    }

    #[test]
    fn infinite_floats_survive_update() {
        let mut store = EnvStore::memory();

        store.key("INF").update(f64::INFINITY).unwrap();
        assert_eq!(store.target_env().get_var("INF").as_deref(), Some("+Inf"));
        assert_eq!(store.key("INF").float().unwrap(), f64::INFINITY);

        store.key("NEG").update(f64::NEG_INFINITY).unwrap();
        assert_eq!(store.key("NEG").var().raw(), "-Inf");
        assert_eq!(store.key("NEG").float().unwrap(), f64::NEG_INFINITY);

        store.key("NAN").update(f64::NAN).unwrap();
        assert_eq!(store.key("NAN").var().raw(), "NaN");
        assert!(store.key("NAN").float().unwrap().is_nan());
    }

    #[test]
    fn lookups_are_cached() {
        let mut store = store_with(&[("K", "first")]);
        assert_eq!(store.key("K").string().unwrap(), "first");

        store
            .target
            .as_memory_mut()
            .expect("memory target")
            .insert("K".to_owned(), "second".to_owned());
        assert_eq!(store.key("K").string().unwrap(), "first");
        assert_eq!(store.len(), 1);

        let mut fresh = EnvStore::new(store.into_target());
        assert_eq!(fresh.key("K").string().unwrap(), "second");
    }

    #[test]
    fn cache_does_not_resync_with_target() {
        let mut store = EnvStore::memory();
        assert!(!store.key("LATE").is_defined());

        store.target.set_var("LATE", "now").unwrap();
        assert!(!store.key("LATE").is_defined());
        assert_eq!(store.key("LATE").var().raw(), "");
    }

    #[test]
    fn parse_bool_accepts_short_and_cased_literals() {
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool("tRUE"), None);
    }
}
