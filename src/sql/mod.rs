//! SQL trust boundary: candidate cleanup and the read-only validator.

pub mod cleanup;
pub mod validator;

pub use cleanup::clean;
pub use validator::{AcceptedSql, OperationKind, SqlValidator, ValidationVerdict, FORBIDDEN};
