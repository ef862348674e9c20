pub mod webhook_commands;

pub use webhook_commands::{handle_delivery, DeliveryOutcome};
