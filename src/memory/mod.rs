//! 记忆层：运行历史（只追加）与规划前的上下文裁剪

pub mod history;
pub mod trimmer;

pub use history::{ActionCall, ActionResult, HistoryStore, Turn, TurnKind};
pub use trimmer::{trim, truncate_output, ContextTrimmer, TRUNCATION_MARKER};
