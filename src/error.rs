use thiserror::Error;

use crate::model::ValueKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    /// The key is undefined and no default of the requested kind was set.
    #[error("{}", type_mismatch_message(.key, .requested, .default))]
    TypeMismatch {
        key: String,
        requested: ValueKind,
        default: Option<ValueKind>,
    },

    /// The raw value could not be converted. Only reported in strict mode.
    #[error("cannot read `{key}` as {kind}: invalid value {value:?}")]
    Conversion {
        key: String,
        kind: ValueKind,
        value: String,
    },

    /// The name or value cannot be stored in an environment: the name is
    /// empty or contains `=` or NUL, or the value contains NUL.
    #[error("cannot set `{}`: {reason}", .key.escape_debug())]
    InvalidVariable { key: String, reason: &'static str },
}

fn type_mismatch_message(
    key: &str,
    requested: &ValueKind,
    default: &Option<ValueKind>,
) -> String {
    match default {
        Some(found) => {
            format!("`{key}` is not defined and its {found} default cannot be read as {requested}")
        }
        None => format!("`{key}` is not defined and has no default"),
    }
}
