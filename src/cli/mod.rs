pub mod commands;
pub mod ui;
pub mod util;

pub use util::{CommandContext, read_history, read_input, read_optional};
