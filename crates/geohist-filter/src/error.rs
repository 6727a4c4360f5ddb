use geohist_codes::CodeError;
use geohist_entity::GeometryError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// Compiling a tag predicate could not resolve its strings.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Geometry for a geometry predicate could not be built (strict mode).
    #[error("geometry predicate could not be evaluated: {0}")]
    Geometry(#[from] GeometryError),

    #[error("range {min}..{max} is empty or not finite")]
    InvalidRange { min: f64, max: f64 },
}

pub type FilterResult<T> = Result<T, FilterError>;
