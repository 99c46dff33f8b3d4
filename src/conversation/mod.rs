pub mod chat_loop;
pub mod history;

pub use chat_loop::{ChatLoop, LoopExit};
pub use history::{History, HistoryLimit, Message, Role};
