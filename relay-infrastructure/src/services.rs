pub mod discord_target;
pub mod text_template;

pub use discord_target::*;
pub use text_template::*;
