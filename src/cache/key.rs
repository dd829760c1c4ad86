//! Deterministic cache key derivation.
//!
//! A key is `operation + ":" + parts.join("_")`. Absent parameters render as the literal token
//! `null`, so `None` and `Some("")` never collide. Backslashes and underscores inside a rendered
//! value are escaped with a backslash; values free of both characters render unchanged, which
//! keeps keys for ordinary identifiers identical to the unescaped format used by older writers.

use std::fmt::{self, Display, Write as _};

/// Separator placed between rendered parameters.
pub const SEPARATOR: char = '_';

/// Token rendered for an absent parameter.
pub const NULL_TOKEN: &str = "null";

/// Derive the cache key for `operation` applied to an ordered parameter list.
pub fn generate(operation: &str, params: &[Option<&dyn Display>]) -> String {
    let mut key = String::with_capacity(operation.len() + 1 + params.len() * 8);
    key.push_str(operation);
    key.push(':');

    for (index, param) in params.iter().enumerate() {
        if index > 0 {
            key.push(SEPARATOR);
        }
        match param {
            None => key.push_str(NULL_TOKEN),
            Some(value) => push_escaped(&mut key, *value),
        }
    }

    key
}

fn push_escaped(key: &mut String, value: &dyn Display) {
    let mut rendered = String::new();
    // Writing into a String cannot fail.
    let _ = write!(rendered, "{value}");
    for ch in rendered.chars() {
        if ch == '\\' || ch == SEPARATOR {
            key.push('\\');
        }
        key.push(ch);
    }
}

/// Parameter accepted by [`cache_key!`](crate::cache_key).
///
/// Plain values are always present; `Option` values render `null` when `None`.
pub trait KeyPart {
    /// Borrow the displayable value, or `None` for an absent parameter.
    fn as_part(&self) -> Option<&dyn Display>;
}

impl<T: Display> KeyPart for Option<T> {
    fn as_part(&self) -> Option<&dyn Display> {
        self.as_ref().map(|value| value as &dyn Display)
    }
}

macro_rules! present_key_part {
    ($($ty:ty),* $(,)?) => {
        $(
            impl KeyPart for $ty {
                fn as_part(&self) -> Option<&dyn Display> {
                    Some(self)
                }
            }
        )*
    };
}

present_key_part!(
    String, bool, char, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64,
    crate::search::SearchMode,
);

impl KeyPart for &str {
    fn as_part(&self) -> Option<&dyn Display> {
        Some(self)
    }
}

impl KeyPart for &String {
    fn as_part(&self) -> Option<&dyn Display> {
        Some(*self)
    }
}

/// Build a cache key from an operation name and a mix of plain and optional parameters.
///
/// ```
/// use rustycache::cache_key;
///
/// let missing: Option<&str> = None;
/// assert_eq!(cache_key!("search", "rust", 10_usize, missing), "search:rust_10_null");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($operation:expr $(, $param:expr)* $(,)?) => {{
        // Borrowed parts are not `Send`; drop them before yielding the key.
        let key = $crate::cache::key::generate(
            $operation,
            &[$($crate::cache::key::KeyPart::as_part(&$param)),*],
        );
        key
    }};
}

/// Owned cache key wrapper for call sites that pass keys around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key; see [`generate`].
    pub fn new(operation: &str, params: &[Option<&dyn Display>]) -> Self {
        Self(generate(operation, params))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Operation prefix (the text before the first `:`).
    pub fn operation(&self) -> &str {
        self.0.split_once(':').map_or(&self.0, |(operation, _)| operation)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
