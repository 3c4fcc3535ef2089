use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::dto::{
    AnalysisData, ApiEnvelope, ChartData, FactorDto, FactorIdData, FactorListData,
    FactorListQuery, FactorStatusData, FactorUpsert, GroupReturnData, IcChartData,
    RankIcChartData, ReturnChartData, RunStarted, TaskLogsData, TaskStatusDto, TopFactorData,
};
use super::urls::{self, build_url};
use super::{ApiError, FactorApi};

/// Panda 后端的 HTTP 实现
///
/// 单个 reqwest Client 复用连接；所有响应经 [`ApiEnvelope`] 解包，
/// 任何失败形态（网络、非 2xx、坏报文、业务码）都归一成 [`ApiError`]。
pub struct HttpFactorApi {
    client: Client,
    base_url: String,
}

impl HttpFactorApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("rustpanda/0.1")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
        }
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = build_url(&self.base_url, path, params);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::unwrap_envelope(resp).await
    }

    async fn post_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        let url = build_url(&self.base_url, path, params);
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::unwrap_envelope(resp).await
    }

    /// 解包统一响应：先读 text 再解析，坏报文不会越过这一层
    async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let envelope: ApiEnvelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(e) => {
                // 非 2xx 且无法解析时按 HTTP 状态归类
                if !status.is_success() {
                    return Err(ApiError::Http(status.as_u16()));
                }
                return Err(ApiError::Decode(format!("{}: {}", e, truncate(&text))));
            }
        };

        if envelope.code != "200" {
            return Err(ApiError::Backend {
                code: envelope.code,
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("http {}", status.as_u16())),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Http(status.as_u16()));
        }

        serde_json::from_value(envelope.data.unwrap_or(Value::Null))
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    if s.chars().count() <= MAX {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl FactorApi for HttpFactorApi {
    async fn user_factor_list(&self, query: &FactorListQuery) -> Result<FactorListData, ApiError> {
        self.get_data(
            urls::PATH_USER_FACTOR_LIST,
            &[
                ("user_id", query.user_id.clone()),
                ("page", query.page.to_string()),
                ("page_size", query.page_size.to_string()),
                ("sort_field", query.sort_field.clone()),
                ("sort_order", query.sort_order.clone()),
            ],
        )
        .await
    }

    async fn query_factor(&self, factor_id: &str) -> Result<FactorDto, ApiError> {
        self.get_data(
            urls::PATH_QUERY_FACTOR,
            &[("factor_id", factor_id.to_string())],
        )
        .await
    }

    async fn create_factor(&self, payload: &FactorUpsert) -> Result<String, ApiError> {
        let data: FactorIdData = self
            .post_data(urls::PATH_CREATE_FACTOR, &[], payload)
            .await?;
        data.factor_id
            .ok_or_else(|| ApiError::Decode("create_factor returned no factor_id".to_string()))
    }

    async fn update_factor(
        &self,
        factor_id: &str,
        payload: &FactorUpsert,
    ) -> Result<String, ApiError> {
        let data: FactorIdData = self
            .post_data(
                urls::PATH_UPDATE_FACTOR,
                &[("factor_id", factor_id.to_string())],
                payload,
            )
            .await?;
        Ok(data.factor_id.unwrap_or_else(|| factor_id.to_string()))
    }

    async fn delete_factor(&self, factor_id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .get_data(
                urls::PATH_DELETE_FACTOR,
                &[("factor_id", factor_id.to_string())],
            )
            .await?;
        Ok(())
    }

    async fn query_factor_status(&self, factor_id: &str) -> Result<FactorStatusData, ApiError> {
        self.get_data(
            urls::PATH_QUERY_FACTOR_STATUS,
            &[("factor_id", factor_id.to_string())],
        )
        .await
    }

    async fn run_factor(&self, factor_id: &str) -> Result<RunStarted, ApiError> {
        let started: RunStarted = self
            .get_data(
                urls::PATH_RUN_FACTOR,
                &[("factor_id", factor_id.to_string())],
            )
            .await?;
        info!("run_factor({}) -> {:?}", factor_id, started.task_id);
        Ok(started)
    }

    async fn query_task_status(&self, task_id: &str) -> Result<TaskStatusDto, ApiError> {
        self.get_data(
            urls::PATH_QUERY_TASK_STATUS,
            &[("task_id", task_id.to_string())],
        )
        .await
    }

    async fn task_logs(&self, task_id: &str, last_log_id: &str) -> Result<TaskLogsData, ApiError> {
        self.get_data(
            urls::PATH_TASK_LOGS,
            &[
                ("task_id", task_id.to_string()),
                ("log_id", last_log_id.to_string()),
            ],
        )
        .await
    }

    async fn factor_analysis_data(&self, task_id: &str) -> Result<Vec<Value>, ApiError> {
        let data: AnalysisData = self
            .get_data(
                urls::PATH_FACTOR_ANALYSIS_DATA,
                &[("task_id", task_id.to_string())],
            )
            .await?;
        Ok(data.factor_data_analysis)
    }

    async fn group_return_analysis(&self, task_id: &str) -> Result<Vec<Value>, ApiError> {
        let data: GroupReturnData = self
            .get_data(
                urls::PATH_GROUP_RETURN_ANALYSIS,
                &[("task_id", task_id.to_string())],
            )
            .await?;
        Ok(data.group_return_analysis)
    }

    async fn return_chart(&self, task_id: &str) -> Result<ChartData, ApiError> {
        let data: ReturnChartData = self
            .get_data(urls::PATH_RETURN_CHART, &[("task_id", task_id.to_string())])
            .await?;
        Ok(data.return_chart)
    }

    async fn ic_sequence_chart(&self, task_id: &str) -> Result<ChartData, ApiError> {
        let data: IcChartData = self
            .get_data(
                urls::PATH_IC_SEQUENCE_CHART,
                &[("task_id", task_id.to_string())],
            )
            .await?;
        Ok(data.ic_seq_chart)
    }

    async fn rank_ic_sequence_chart(&self, task_id: &str) -> Result<ChartData, ApiError> {
        let data: RankIcChartData = self
            .get_data(
                urls::PATH_RANK_IC_SEQUENCE_CHART,
                &[("task_id", task_id.to_string())],
            )
            .await?;
        Ok(data.rank_ic_seq_chart)
    }

    async fn last_date_top_factor(&self, task_id: &str) -> Result<Vec<Value>, ApiError> {
        let data: TopFactorData = self
            .get_data(
                urls::PATH_LAST_DATE_TOP_FACTOR,
                &[("task_id", task_id.to_string())],
            )
            .await?;
        Ok(data.last_date_top_factor)
    }
}
