//! Evaluation records and their nested feedback and metric entries.
//!
//! Every entity converts to and from a plain JSON [`Dictionary`]. Mandatory keys
//! missing on the way back in fail with [`EntityError::MissingKey`](crate::EntityError::MissingKey).

pub mod dictionary;
pub mod evaluation;
pub mod feedback;
pub mod metric;

pub use dictionary::Dictionary;
pub use evaluation::*;
pub use feedback::*;
pub use metric::*;
