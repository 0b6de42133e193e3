use thiserror::Error;

/// Errors raised while reading or writing a [`crate::DynMap`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypesError {
    /// A dotted-path write found a non-map value sitting at an intermediate
    /// path segment, e.g. `put_dotted("a.b", v)` when `a` already holds a
    /// string.
    #[error("cannot descend into \"{key}\": an existing non-map value occupies this path segment")]
    NotAMap { key: String },

    /// The value at a key could not be converted to the requested type.
    #[error("value at \"{key}\" is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}
