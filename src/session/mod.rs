pub mod dto;
pub mod http_api;
pub mod urls;

pub use http_api::HttpFactorApi;

use async_trait::async_trait;
use serde_json::Value;

use dto::{
    ChartData, FactorDto, FactorListData, FactorListQuery, FactorStatusData, FactorUpsert,
    RunStarted, TaskLogsData, TaskStatusDto,
};

/// 传输层错误：网络、HTTP 状态、解析、后端业务码，全部收敛到这里，
/// 上层只面对 Result，不接触 reqwest 类型。
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected http status: {0}")]
    Http(u16),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("backend error [{code}]: {message}")]
    Backend { code: String, message: String },
}

/// Panda 后端的数据访问口，每个接口一个方法。
///
/// HTTP 实现见 [`HttpFactorApi`]，离线/测试实现见 `mock::MockFactorApi`，
/// 上层代码一律通过 `Arc<dyn FactorApi>` 使用，不感知具体后端。
#[async_trait]
pub trait FactorApi: Send + Sync {
    async fn user_factor_list(&self, query: &FactorListQuery) -> Result<FactorListData, ApiError>;

    async fn query_factor(&self, factor_id: &str) -> Result<FactorDto, ApiError>;

    async fn create_factor(&self, payload: &FactorUpsert) -> Result<String, ApiError>;

    async fn update_factor(&self, factor_id: &str, payload: &FactorUpsert)
        -> Result<String, ApiError>;

    async fn delete_factor(&self, factor_id: &str) -> Result<(), ApiError>;

    async fn query_factor_status(&self, factor_id: &str) -> Result<FactorStatusData, ApiError>;

    async fn run_factor(&self, factor_id: &str) -> Result<RunStarted, ApiError>;

    async fn query_task_status(&self, task_id: &str) -> Result<TaskStatusDto, ApiError>;

    /// 取 `last_log_id` 游标之后的增量日志，空游标表示从头开始
    async fn task_logs(&self, task_id: &str, last_log_id: &str) -> Result<TaskLogsData, ApiError>;

    async fn factor_analysis_data(&self, task_id: &str) -> Result<Vec<Value>, ApiError>;

    async fn group_return_analysis(&self, task_id: &str) -> Result<Vec<Value>, ApiError>;

    async fn return_chart(&self, task_id: &str) -> Result<ChartData, ApiError>;

    async fn ic_sequence_chart(&self, task_id: &str) -> Result<ChartData, ApiError>;

    async fn rank_ic_sequence_chart(&self, task_id: &str) -> Result<ChartData, ApiError>;

    async fn last_date_top_factor(&self, task_id: &str) -> Result<Vec<Value>, ApiError>;
}
