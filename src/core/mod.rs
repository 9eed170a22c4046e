pub mod error;
pub mod types;
pub mod value;

pub use error::{MapperError, Result};
pub use types::{Key, Params, Tuple};
pub use value::{DataType, Value, ValueKind};
