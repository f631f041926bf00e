//! CLI command implementations.

pub(crate) mod platform;
pub(crate) mod serve;

pub(crate) use platform::PlatformArgs;
pub(crate) use serve::ServeArgs;
