pub mod pagination;
pub mod validation;

pub use pagination::{PageParamError, PageParams};
pub use validation::{format_timestamp, ValidationError};
