//! Daily time budgets for websites. A native messaging host charges the active browser tab's
//! domain against its budget, blocks it once the budget is spent and starts over at midnight.
//! The cli inspects and edits the same state from a terminal.

pub mod background;
pub mod cli;
pub mod config;
pub mod host;
pub mod utils;
