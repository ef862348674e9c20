// Domain entities
pub mod envelope;
pub mod event;
pub mod filter;
pub mod history_record;
pub mod runtime_config;
pub mod server;

pub use envelope::*;
pub use event::*;
pub use filter::*;
pub use history_record::*;
pub use runtime_config::*;
pub use server::*;
