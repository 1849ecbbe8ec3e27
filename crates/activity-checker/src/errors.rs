pub trait CodedError: std::error::Error {
    fn code(&self) -> &str;
}

/// Implements `Debug` for an error type as its `Display` rendering, so
/// the bracketed [`CodedError`] code baked into the display string also
/// shows up in logs that use `{:?}` formatting.
#[macro_export]
macro_rules! impl_coded_debug {
    ($name:ident) => {
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{self}")
            }
        }
    };
}

pub use crate::impl_coded_debug;
