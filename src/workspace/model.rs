use crate::session::dto::{LogEntry, TaskStatusDto};
use crate::session::ApiError;
use serde::{Deserialize, Serialize};

/// 一次因子运行的生命周期状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    /// Starting/Running 期间禁止再次发起运行
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Starting | RunState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunErrorKind {
    Transport, // 网络/HTTP/解析（瞬态，轮询继续）
    Domain,    // 后端业务错误（向用户呈现，不自动重试）
    Internal,  // 本地程序错误
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl RunError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Transport,
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Domain,
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Internal,
            message: msg.into(),
            retryable: false,
        }
    }
}

impl From<ApiError> for RunError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Backend { .. } => RunError::domain(err.to_string()),
            ApiError::Network(_) | ApiError::Http(_) => RunError::transport(err.to_string()),
            ApiError::Decode(_) => RunError::internal(err.to_string()),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// 控制器内部状态的一份只读快照，供界面与测试使用
#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub state: RunState,
    pub task_id: Option<String>,
    pub last_status: Option<TaskStatusDto>,
    pub logs: Vec<LogEntry>,
    pub last_log_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_predicate_covers_all_branches() {
        let mut st = TaskStatusDto::default();
        assert!(!st.is_terminal());

        st.process_status = Some(42);
        assert!(!st.is_terminal());

        st.process_status = Some(100);
        assert!(st.is_terminal());
        assert!(!st.is_failed());

        let failed = TaskStatusDto {
            process_status: Some(30),
            error_message: Some("数据缺失".to_string()),
            ..Default::default()
        };
        assert!(failed.is_terminal());
        assert!(failed.is_failed());

        let with_result = TaskStatusDto {
            process_status: Some(99),
            result: Some("done".to_string()),
            ..Default::default()
        };
        assert!(with_result.is_terminal());
        assert!(!with_result.is_failed());
    }

    #[test]
    fn api_error_maps_to_run_error_kind() {
        let e = RunError::from(ApiError::Network("timeout".to_string()));
        assert_eq!(e.kind, RunErrorKind::Transport);
        assert!(e.retryable);

        let e = RunError::from(ApiError::Backend {
            code: "500".to_string(),
            message: "因子不存在".to_string(),
        });
        assert_eq!(e.kind, RunErrorKind::Domain);
        assert!(!e.retryable);
    }
}
