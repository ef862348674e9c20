// Repository and Service Port Traits (Interfaces)
// Define what the domain needs from infrastructure

pub mod history;
pub mod services;

pub use history::*;
pub use services::*;
