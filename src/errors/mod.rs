mod types;

pub use types::{ExprError, ExprErrorKind, PoxideError, TransportError};

pub type Result<T> = std::result::Result<T, PoxideError>;
