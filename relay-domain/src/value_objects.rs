// Domain value objects
pub mod color;
pub mod event_type;
pub mod field_value;

pub use color::*;
pub use event_type::*;
pub use field_value::*;
