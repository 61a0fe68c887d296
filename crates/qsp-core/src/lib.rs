pub mod error;
pub mod types;
pub mod value;

pub use error::{describe_error, ErrorKind, ErrorRecord, QspError};
pub use types::*;
pub use value::*;
