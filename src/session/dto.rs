use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 统一响应包装：`{code, message, data}`，code != "200" 视为业务错误
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiEnvelope {
    pub code: String,
    pub message: Option<String>,
    pub data: Option<Value>,
}

/// 因子回测参数
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FactorParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub adjustment_cycle: Option<i32>,
    pub stock_pool: Option<String>,
    pub factor_direction: Option<bool>,
    pub group_number: Option<i32>,
    pub include_st: Option<bool>,
    pub extreme_value_processing: Option<String>,
}

/// 因子全量信息（列表与详情共用一个结构，后端字段可能缺省）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FactorDto {
    pub factor_id: String,
    pub name: Option<String>,
    pub factor_name: Option<String>,
    pub factor_type: Option<String>,
    pub user_id: Option<String>,
    pub code: Option<String>,
    pub code_type: Option<String>,
    pub tags: Option<String>,
    pub describe: Option<String>,
    /// 0 未运行 / 1 运行中 / 2 运行成功 / 3 运行失败
    pub status: Option<i32>,
    pub params: Option<FactorParams>,
    pub return_ratio: Option<String>,
    pub sharpe_ratio: Option<f64>,
    pub maximum_drawdown: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// 分页列表响应
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FactorListData {
    #[serde(default)]
    pub data: Vec<FactorDto>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub total_pages: u64,
}

/// 列表查询参数
#[derive(Debug, Clone)]
pub struct FactorListQuery {
    pub user_id: String,
    pub page: u64,
    pub page_size: u64,
    pub sort_field: String,
    pub sort_order: String,
}

impl Default for FactorListQuery {
    fn default() -> Self {
        Self {
            user_id: "0".to_string(),
            page: 1,
            page_size: 7,
            sort_field: "created_at".to_string(),
            sort_order: "desc".to_string(),
        }
    }
}

/// 创建/更新因子的请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorUpsert {
    pub name: Option<String>,
    pub factor_name: Option<String>,
    pub factor_type: Option<String>,
    pub code: Option<String>,
    pub code_type: Option<String>,
    pub tags: Option<String>,
    pub describe: Option<String>,
    pub params: Option<FactorParams>,
}

/// 创建/更新因子的响应
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FactorIdData {
    pub factor_id: Option<String>,
}

/// `/query_factor_status` 响应：因子当前关联的任务
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FactorStatusData {
    pub task_id: Option<String>,
    pub status: Option<i32>,
}

/// `/run_factor` 响应
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunStarted {
    pub task_id: Option<String>,
}

/// `/query_task_status` 响应
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TaskStatusDto {
    /// 0-100 的整数进度
    pub process_status: Option<i64>,
    pub error_message: Option<String>,
    pub result: Option<String>,
    pub last_log_message: Option<String>,
}

impl TaskStatusDto {
    /// 终止判定：进度 100、错误信息或结果任一出现即为终态
    pub fn is_terminal(&self) -> bool {
        self.process_status == Some(100) || self.error_message.is_some() || self.result.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.error_message.is_some()
    }

    pub fn progress(&self) -> i64 {
        self.process_status.unwrap_or(0).clamp(0, 100)
    }
}

/// 单条运行日志（兼容 time/timestamp、level/loglevel 两套字段名）
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LogEntry {
    #[serde(alias = "timestamp")]
    pub time: Option<String>,
    #[serde(alias = "loglevel")]
    pub level: Option<String>,
    pub message: Option<String>,
}

impl LogEntry {
    pub fn new(
        time: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            time: Some(time.into()),
            level: Some(level.into()),
            message: Some(message.into()),
        }
    }
}

/// `/task_logs` 响应：游标之后的增量日志
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TaskLogsData {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    pub last_log_id: Option<String>,
}

/// 图表横轴（标签序列）
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ChartLabels {
    pub name: Option<String>,
    #[serde(default)]
    pub data: Vec<String>,
}

/// 图表纵轴（数值序列）
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ChartSeries {
    pub name: Option<String>,
    #[serde(default)]
    pub data: Vec<f64>,
}

/// 后端图表载荷：`{title, x: [...], y: [...]}`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ChartData {
    pub title: Option<String>,
    #[serde(default)]
    pub x: Vec<ChartLabels>,
    #[serde(default)]
    pub y: Vec<ChartSeries>,
}

// 报告类接口的外层包装：字段名各不相同，内层才是有效载荷

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalysisData {
    #[serde(default)]
    pub factor_data_analysis: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GroupReturnData {
    #[serde(default)]
    pub group_return_analysis: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TopFactorData {
    #[serde(default)]
    pub last_date_top_factor: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReturnChartData {
    #[serde(default)]
    pub return_chart: ChartData,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IcChartData {
    #[serde(default)]
    pub ic_seq_chart: ChartData,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RankIcChartData {
    #[serde(default)]
    pub rank_ic_seq_chart: ChartData,
}
