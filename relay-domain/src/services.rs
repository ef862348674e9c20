pub mod matcher;
pub mod memory_history;

pub use matcher::*;
pub use memory_history::*;
