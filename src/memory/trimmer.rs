//! 上下文裁剪：每次规划前作用于历史快照的纯函数
//!
//! 1. 截断所有超过 `max_output_chars` 的工具输出（无论是否发生轮数裁剪）；
//! 2. 轮数超过 `max_turns` 时保留第 0 条目标与最近 `max_turns - 1` 条。

use crate::core::AgentError;
use crate::memory::Turn;

/// 截断标记
pub const TRUNCATION_MARKER: &str = "… [truncated]";

/// 已校验的裁剪参数（`max_turns >= 1`、`max_output_chars >= 1`）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextTrimmer {
    max_turns: usize,
    max_output_chars: usize,
}

impl ContextTrimmer {
    pub fn new(max_turns: usize, max_output_chars: usize) -> Result<Self, AgentError> {
        if max_turns < 1 {
            return Err(AgentError::ConfigError(format!(
                "max_turns must be >= 1, got {}",
                max_turns
            )));
        }
        if max_output_chars < 1 {
            return Err(AgentError::ConfigError(format!(
                "max_output_chars must be >= 1, got {}",
                max_output_chars
            )));
        }
        Ok(Self {
            max_turns,
            max_output_chars,
        })
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn max_output_chars(&self) -> usize {
        self.max_output_chars
    }

    pub fn trim(&self, history: &[Turn]) -> Vec<Turn> {
        trim(history, self.max_turns, self.max_output_chars)
    }
}

/// 裁剪历史视图。调用方保证 `max_turns >= 1`（由 [`ContextTrimmer::new`] 校验）。
pub fn trim(history: &[Turn], max_turns: usize, max_output_chars: usize) -> Vec<Turn> {
    let truncated: Vec<Turn> = history
        .iter()
        .map(|turn| match turn {
            Turn::Result { results } => Turn::Result {
                results: results
                    .iter()
                    .map(|r| {
                        let mut r = r.clone();
                        r.output = truncate_output(&r.output, max_output_chars);
                        r
                    })
                    .collect(),
            },
            other => other.clone(),
        })
        .collect();

    if truncated.len() <= max_turns {
        return truncated;
    }

    let keep_tail = max_turns.saturating_sub(1);
    let mut view = Vec::with_capacity(keep_tail + 1);
    view.push(truncated[0].clone());
    view.extend_from_slice(&truncated[truncated.len() - keep_tail..]);
    view
}

/// 按字符截断并追加标记；保留前 max_chars 个字符，所以重复截断结果不变
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.chars().count() <= max_chars {
        return output.to_string();
    }
    let head: String = output.chars().take(max_chars).collect();
    format!("{}{}", head, TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ActionCall, ActionResult};

    fn history_with(n_cycles: usize, output: &str) -> Vec<Turn> {
        let mut h = vec![Turn::human("goal")];
        for i in 0..n_cycles {
            h.push(Turn::plan(vec![ActionCall::new(format!("step_{}", i))]));
            h.push(Turn::result(vec![ActionResult::success(
                format!("step_{}", i),
                output,
            )]));
        }
        h
    }

    #[test]
    fn test_long_output_truncated_with_marker() {
        let long = "x".repeat(5000);
        let h = history_with(1, &long);
        let view = trim(&h, 10, 2000);
        let Turn::Result { results } = &view[2] else {
            panic!("expected result turn");
        };
        let out = &results[0].output;
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.chars().count() <= 2000 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_truncation_applies_without_turn_trimming() {
        let h = history_with(1, &"y".repeat(50));
        let view = trim(&h, 100, 10);
        assert_eq!(view.len(), h.len());
        let Turn::Result { results } = &view[2] else {
            panic!("expected result turn");
        };
        assert_eq!(results[0].output, format!("{}{}", "y".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn test_goal_retained_and_tail_kept() {
        let h = history_with(5, "ok");
        assert_eq!(h.len(), 11);
        let view = trim(&h, 4, 100);
        assert_eq!(view.len(), 4);
        assert_eq!(view[0], h[0]);
        assert_eq!(&view[1..], &h[8..]);
    }

    #[test]
    fn test_max_turns_one_keeps_only_goal() {
        let h = history_with(3, "ok");
        let view = trim(&h, 1, 100);
        assert_eq!(view, vec![h[0].clone()]);
    }

    #[test]
    fn test_trim_is_idempotent() {
        let h = history_with(6, &"z".repeat(300));
        for (n, c) in [(1, 1), (3, 50), (4, 299), (20, 300), (5, 10_000)] {
            let once = trim(&h, n, c);
            let twice = trim(&once, n, c);
            assert_eq!(once, twice, "n={} c={}", n, c);
        }
    }

    #[test]
    fn test_output_ending_with_marker_still_truncated() {
        let crafted = format!("{}{}", "a".repeat(8), TRUNCATION_MARKER);
        let out = truncate_output(&crafted, 5);
        assert_eq!(out, format!("aaaaa{}", TRUNCATION_MARKER));
        assert_eq!(truncate_output(&out, 5), out);
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let out = truncate_output("日志日志日志", 2);
        assert_eq!(out, format!("日志{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_trimmer_rejects_zero_limits() {
        assert!(matches!(
            ContextTrimmer::new(0, 100),
            Err(AgentError::ConfigError(_))
        ));
        assert!(ContextTrimmer::new(1, 0).is_err());
        assert!(ContextTrimmer::new(1, 1).is_ok());
    }
}
