//! 报告聚合器的部分失败语义：失败槽位保留旧值，整体永不报错。

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use rustpanda::session::dto::{
    ChartData, ChartSeries, FactorDto, FactorListData, FactorListQuery, FactorStatusData,
    FactorUpsert, RunStarted, TaskLogsData, TaskStatusDto,
};
use rustpanda::session::{ApiError, FactorApi};
use rustpanda::workspace::{ReportAggregator, ReportBundle};

fn fail<T>() -> Result<T, ApiError> {
    Err(ApiError::Network("connection reset".to_string()))
}

fn chart(title: &str) -> ChartData {
    ChartData {
        title: Some(title.to_string()),
        x: Vec::new(),
        y: vec![ChartSeries {
            name: Some("series".to_string()),
            data: vec![1.0, 2.0],
        }],
    }
}

/// 六路里两路（核心指标、收益曲线）固定失败，其余成功
struct HalfBrokenApi;

#[async_trait]
impl FactorApi for HalfBrokenApi {
    async fn user_factor_list(&self, _q: &FactorListQuery) -> Result<FactorListData, ApiError> {
        fail()
    }

    async fn query_factor(&self, _id: &str) -> Result<FactorDto, ApiError> {
        fail()
    }

    async fn create_factor(&self, _p: &FactorUpsert) -> Result<String, ApiError> {
        fail()
    }

    async fn update_factor(&self, _id: &str, _p: &FactorUpsert) -> Result<String, ApiError> {
        fail()
    }

    async fn delete_factor(&self, _id: &str) -> Result<(), ApiError> {
        fail()
    }

    async fn query_factor_status(&self, _id: &str) -> Result<FactorStatusData, ApiError> {
        fail()
    }

    async fn run_factor(&self, _id: &str) -> Result<RunStarted, ApiError> {
        fail()
    }

    async fn query_task_status(&self, _t: &str) -> Result<TaskStatusDto, ApiError> {
        fail()
    }

    async fn task_logs(&self, _t: &str, _c: &str) -> Result<TaskLogsData, ApiError> {
        fail()
    }

    async fn factor_analysis_data(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        fail()
    }

    async fn group_return_analysis(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        Ok(vec![json!({"分组": "第1组", "年化收益率": "4.2%"})])
    }

    async fn return_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        fail()
    }

    async fn ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        Ok(chart("IC 序列(新)"))
    }

    async fn rank_ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        Ok(chart("Rank IC 序列(新)"))
    }

    async fn last_date_top_factor(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        Ok(vec![json!({"symbol": "600519", "因子值": "2.31"})])
    }
}

/// 六路全部失败
struct FullyBrokenApi;

#[async_trait]
impl FactorApi for FullyBrokenApi {
    async fn user_factor_list(&self, _q: &FactorListQuery) -> Result<FactorListData, ApiError> {
        fail()
    }

    async fn query_factor(&self, _id: &str) -> Result<FactorDto, ApiError> {
        fail()
    }

    async fn create_factor(&self, _p: &FactorUpsert) -> Result<String, ApiError> {
        fail()
    }

    async fn update_factor(&self, _id: &str, _p: &FactorUpsert) -> Result<String, ApiError> {
        fail()
    }

    async fn delete_factor(&self, _id: &str) -> Result<(), ApiError> {
        fail()
    }

    async fn query_factor_status(&self, _id: &str) -> Result<FactorStatusData, ApiError> {
        fail()
    }

    async fn run_factor(&self, _id: &str) -> Result<RunStarted, ApiError> {
        fail()
    }

    async fn query_task_status(&self, _t: &str) -> Result<TaskStatusDto, ApiError> {
        fail()
    }

    async fn task_logs(&self, _t: &str, _c: &str) -> Result<TaskLogsData, ApiError> {
        fail()
    }

    async fn factor_analysis_data(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        fail()
    }

    async fn group_return_analysis(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        fail()
    }

    async fn return_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        fail()
    }

    async fn ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        fail()
    }

    async fn rank_ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        fail()
    }

    async fn last_date_top_factor(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        fail()
    }
}

#[tokio::test]
async fn partial_failure_keeps_previous_slots() {
    let aggregator = ReportAggregator::new(Arc::new(HalfBrokenApi));
    let mut bundle = ReportBundle::sample();
    let analysis_before = bundle.analysis.clone();
    let return_chart_before = bundle.return_chart.clone();

    let updated = aggregator.fetch_into("task_0001", &mut bundle).await;

    assert_eq!(updated, 4, "六路里四路成功");
    // 失败的两路保留样例旧值
    assert_eq!(bundle.analysis, analysis_before);
    assert_eq!(bundle.return_chart, return_chart_before);
    // 成功的槽位已替换
    assert_eq!(bundle.group_returns.len(), 1);
    assert_eq!(bundle.top_factors.len(), 1);
    assert_eq!(bundle.ic_chart.title.as_deref(), Some("IC 序列(新)"));
    assert_eq!(
        bundle.rank_ic_chart.title.as_deref(),
        Some("Rank IC 序列(新)")
    );
}

#[tokio::test]
async fn total_failure_still_renders_sample() {
    let aggregator = ReportAggregator::new(Arc::new(FullyBrokenApi));
    let mut bundle = ReportBundle::sample();

    let updated = aggregator.fetch_into("task_0001", &mut bundle).await;

    assert_eq!(updated, 0);
    // 全部失败也不是空报告：样例内容原样保留
    assert!(!bundle.analysis.is_empty());
    assert_eq!(bundle.return_chart.title.as_deref(), Some("收益率曲线"));
}
