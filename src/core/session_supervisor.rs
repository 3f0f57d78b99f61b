//! 会话监管：持有根 CancellationToken
//!
//! Ctrl+C 时取消根 token；每次运行拿一个子 token，单独取消某次运行不影响其他运行。

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 触发取消（用户 Ctrl+C）
    pub fn cancel(&self) {
        tracing::info!("cancellation requested");
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单次运行）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}
