//! Core record types, validation, and error taxonomy for the log processor.

pub mod category;
pub mod error;
pub mod limits;
pub mod records;
pub mod validation;

pub use category::Category;
pub use error::{Error, ErrorKind, Result};
pub use records::*;
