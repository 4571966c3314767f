mod errors;
pub mod settings;

pub(crate) use errors::json_kind;
pub use errors::{EncodeError, EntityError, SettingsError, TraceError};
pub use settings::*;
