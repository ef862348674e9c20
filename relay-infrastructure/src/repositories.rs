pub mod file_history;
pub mod filter_files;

pub use file_history::*;
pub use filter_files::*;
