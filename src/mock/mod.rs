use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::session::dto::{
    ChartData, ChartLabels, ChartSeries, FactorDto, FactorListData, FactorListQuery,
    FactorParams, FactorStatusData, FactorUpsert, LogEntry, RunStarted, TaskLogsData,
    TaskStatusDto,
};
use crate::session::{ApiError, FactorApi};

/// 进度推进步长：每次状态查询前进一格，四次查询到达 100
const PROGRESS_STEP: i64 = 25;

/// 内存版后端，实现与 HTTP 后端完全相同的 [`FactorApi`] 契约
///
/// 由组合根显式构造注入（PANDA_USE_MOCK=true），测试直接持有实例；
/// 不存在任何进程级全局状态。日志按游标增量下发。
pub struct MockFactorApi {
    state: Mutex<MockState>,
}

struct MockState {
    factors: Vec<FactorDto>,
    tasks: HashMap<String, MockTask>,
    /// factor_id -> 当前任务 id，新运行直接替换，无排队
    active: HashMap<String, String>,
    next_task: u64,
    next_factor: u64,
}

struct MockTask {
    factor_id: String,
    progress: i64,
    logs: Vec<LogEntry>,
    result: Option<String>,
}

impl MockFactorApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                factors: Vec::new(),
                tasks: HashMap::new(),
                active: HashMap::new(),
                next_task: 0,
                next_factor: 0,
            }),
        }
    }

    /// 预置一批演示因子（数量足够翻页）
    pub fn with_sample_data() -> Self {
        let api = Self::new();
        {
            let mut state = api.state.try_lock().expect("fresh mock state");
            for i in 0..12u64 {
                state.factors.push(sample_factor(i));
            }
            state.next_factor = 12;
        }
        api
    }

    pub async fn factor_count(&self) -> usize {
        self.state.lock().await.factors.len()
    }
}

impl Default for MockFactorApi {
    fn default() -> Self {
        Self::new()
    }
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn sample_factor(i: u64) -> FactorDto {
    let names = [
        ("价值动量因子", "value_momentum", "价值,动量", "rank(close / open)"),
        ("成长质量因子", "growth_quality", "成长,质量", "rank(roe / pe)"),
        ("流动性反转因子", "liquidity_reversal", "流动性,反转", "rank(-volume)"),
        ("波动率因子", "volatility", "风险,波动", "rank(std(returns, 20))"),
    ];
    let (name, factor_name, tags, code) = names[(i as usize) % names.len()];
    FactorDto {
        factor_id: format!("factor_{}", 1001 + i),
        name: Some(format!("{} #{}", name, i + 1)),
        factor_name: Some(format!("{}_{}", factor_name, i + 1)),
        factor_type: Some("stock".to_string()),
        user_id: Some("demo_user".to_string()),
        code: Some(code.to_string()),
        code_type: Some(if i % 2 == 0 { "formula" } else { "python" }.to_string()),
        tags: Some(tags.to_string()),
        describe: Some(format!("演示因子 {}", i + 1)),
        status: Some(0),
        params: Some(FactorParams {
            start_date: Some("2023-01-01".to_string()),
            end_date: Some("2025-01-01".to_string()),
            adjustment_cycle: Some(5),
            stock_pool: Some("沪深300".to_string()),
            factor_direction: Some(true),
            group_number: Some(5),
            include_st: Some(false),
            extreme_value_processing: Some("中位数".to_string()),
        }),
        return_ratio: Some(format!("{:.1}%", 8.0 + (i as f64) * 0.7)),
        sharpe_ratio: Some(0.9 + (i as f64) * 0.05),
        maximum_drawdown: Some(format!("-{:.1}%", 4.0 + (i as f64) * 0.3)),
        created_at: Some(format!("2024-04-{:02} 10:00", i + 1)),
        updated_at: Some(format!("2024-06-{:02} 09:30", i + 1)),
    }
}

fn progress_log(progress: i64) -> LogEntry {
    let (level, message) = match progress {
        25 => ("INFO", "拉取行情数据完成"),
        50 => ("DEBUG", "完成因子数据清洗，准备计算分组收益"),
        75 => ("INFO", "计算因子暴露完成"),
        _ => ("INFO", "因子分析完成，正在写入结果"),
    };
    LogEntry::new(now_stamp(), level, message)
}

fn not_found(factor_id: &str) -> ApiError {
    ApiError::Backend {
        code: "500".to_string(),
        message: format!("因子不存在: {}", factor_id),
    }
}

fn mock_chart(title: &str, series: &[(&str, [f64; 5])]) -> ChartData {
    ChartData {
        title: Some(title.to_string()),
        x: vec![ChartLabels {
            name: Some("日期".to_string()),
            data: vec![
                "2024-01".to_string(),
                "2024-02".to_string(),
                "2024-03".to_string(),
                "2024-04".to_string(),
                "2024-05".to_string(),
            ],
        }],
        y: series
            .iter()
            .map(|(name, data)| ChartSeries {
                name: Some(name.to_string()),
                data: data.to_vec(),
            })
            .collect(),
    }
}

#[async_trait]
impl FactorApi for MockFactorApi {
    async fn user_factor_list(&self, query: &FactorListQuery) -> Result<FactorListData, ApiError> {
        let state = self.state.lock().await;
        let mut factors: Vec<FactorDto> = state.factors.clone();

        let descending = query.sort_order.eq_ignore_ascii_case("desc");
        factors.sort_by(|a, b| {
            let ord = match query.sort_field.as_str() {
                "updated_at" => a.updated_at.cmp(&b.updated_at),
                "name" => a.name.cmp(&b.name),
                "sharpe_ratio" => a
                    .sharpe_ratio
                    .partial_cmp(&b.sharpe_ratio)
                    .unwrap_or(std::cmp::Ordering::Equal),
                _ => a.created_at.cmp(&b.created_at),
            };
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let page = query.page.max(1);
        let page_size = query.page_size.max(1);
        let total = factors.len() as u64;
        let total_pages = ((total + page_size - 1) / page_size).max(1);
        let start = ((page - 1) * page_size) as usize;
        let data: Vec<FactorDto> = factors.into_iter().skip(start).take(page_size as usize).collect();

        Ok(FactorListData {
            data,
            total,
            page,
            total_pages,
        })
    }

    async fn query_factor(&self, factor_id: &str) -> Result<FactorDto, ApiError> {
        let state = self.state.lock().await;
        state
            .factors
            .iter()
            .find(|f| f.factor_id == factor_id)
            .cloned()
            .ok_or_else(|| not_found(factor_id))
    }

    async fn create_factor(&self, payload: &FactorUpsert) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        state.next_factor += 1;
        let factor_id = format!("factor_{}", 1001 + state.next_factor);
        let factor = FactorDto {
            factor_id: factor_id.clone(),
            name: payload.name.clone(),
            factor_name: payload.factor_name.clone(),
            factor_type: payload.factor_type.clone().or(Some("stock".to_string())),
            user_id: Some("demo_user".to_string()),
            code: payload.code.clone(),
            code_type: payload.code_type.clone().or(Some("formula".to_string())),
            tags: payload.tags.clone(),
            describe: payload.describe.clone(),
            status: Some(0),
            params: payload.params.clone(),
            return_ratio: Some("0.0%".to_string()),
            sharpe_ratio: Some(0.0),
            maximum_drawdown: Some("0.0%".to_string()),
            created_at: Some(now_stamp()),
            updated_at: Some(now_stamp()),
        };
        state.factors.insert(0, factor);
        Ok(factor_id)
    }

    async fn update_factor(
        &self,
        factor_id: &str,
        payload: &FactorUpsert,
    ) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        let factor = state
            .factors
            .iter_mut()
            .find(|f| f.factor_id == factor_id)
            .ok_or_else(|| not_found(factor_id))?;
        if payload.name.is_some() {
            factor.name = payload.name.clone();
        }
        if payload.factor_name.is_some() {
            factor.factor_name = payload.factor_name.clone();
        }
        if payload.code.is_some() {
            factor.code = payload.code.clone();
        }
        if payload.code_type.is_some() {
            factor.code_type = payload.code_type.clone();
        }
        if payload.tags.is_some() {
            factor.tags = payload.tags.clone();
        }
        if payload.describe.is_some() {
            factor.describe = payload.describe.clone();
        }
        if payload.params.is_some() {
            factor.params = payload.params.clone();
        }
        factor.updated_at = Some(now_stamp());
        Ok(factor_id.to_string())
    }

    async fn delete_factor(&self, factor_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        let before = state.factors.len();
        state.factors.retain(|f| f.factor_id != factor_id);
        if state.factors.len() == before {
            return Err(not_found(factor_id));
        }
        state.active.remove(factor_id);
        Ok(())
    }

    async fn query_factor_status(&self, factor_id: &str) -> Result<FactorStatusData, ApiError> {
        let state = self.state.lock().await;
        let factor = state
            .factors
            .iter()
            .find(|f| f.factor_id == factor_id)
            .ok_or_else(|| not_found(factor_id))?;
        Ok(FactorStatusData {
            task_id: state.active.get(factor_id).cloned(),
            status: factor.status,
        })
    }

    async fn run_factor(&self, factor_id: &str) -> Result<RunStarted, ApiError> {
        let mut state = self.state.lock().await;
        if !state.factors.iter().any(|f| f.factor_id == factor_id) {
            return Err(not_found(factor_id));
        }
        state.next_task += 1;
        let task_id = format!("task_{:04}", state.next_task);
        state.tasks.insert(
            task_id.clone(),
            MockTask {
                factor_id: factor_id.to_string(),
                progress: 0,
                logs: vec![LogEntry::new(
                    now_stamp(),
                    "INFO",
                    "运行任务已创建，开始加载因子数据",
                )],
                result: None,
            },
        );
        state.active.insert(factor_id.to_string(), task_id.clone());
        if let Some(factor) = state.factors.iter_mut().find(|f| f.factor_id == factor_id) {
            factor.status = Some(1);
        }
        Ok(RunStarted {
            task_id: Some(task_id),
        })
    }

    /// 每次查询推进一格进度并补一条日志，到 100 产生 result 并回写因子状态
    async fn query_task_status(&self, task_id: &str) -> Result<TaskStatusDto, ApiError> {
        let mut state = self.state.lock().await;
        let task = state.tasks.get_mut(task_id).ok_or_else(|| ApiError::Backend {
            code: "500".to_string(),
            message: format!("任务不存在: {}", task_id),
        })?;

        if task.progress < 100 {
            task.progress = (task.progress + PROGRESS_STEP).min(100);
            task.logs.push(progress_log(task.progress));
            if task.progress >= 100 {
                task.result = Some("回测结果已生成".to_string());
            }
        }

        let status = TaskStatusDto {
            process_status: Some(task.progress),
            error_message: None,
            result: task.result.clone(),
            last_log_message: task.logs.last().and_then(|l| l.message.clone()),
        };
        let done = task.progress >= 100;
        let factor_id = task.factor_id.clone();
        if done {
            if let Some(factor) = state.factors.iter_mut().find(|f| f.factor_id == factor_id) {
                factor.status = Some(2);
            }
        }
        Ok(status)
    }

    async fn task_logs(&self, task_id: &str, last_log_id: &str) -> Result<TaskLogsData, ApiError> {
        let state = self.state.lock().await;
        let task = state.tasks.get(task_id).ok_or_else(|| ApiError::Backend {
            code: "500".to_string(),
            message: format!("任务不存在: {}", task_id),
        })?;
        let cursor: usize = last_log_id.parse().unwrap_or(0).min(task.logs.len());
        Ok(TaskLogsData {
            logs: task.logs[cursor..].to_vec(),
            last_log_id: Some(task.logs.len().to_string()),
        })
    }

    async fn factor_analysis_data(&self, _task_id: &str) -> Result<Vec<Value>, ApiError> {
        Ok(vec![
            json!({"指标": "年化收益率", "数值": "21.4%"}),
            json!({"指标": "最大回撤", "数值": "-5.4%"}),
            json!({"指标": "夏普比率", "数值": "1.32"}),
            json!({"指标": "IC均值", "数值": "0.052"}),
            json!({"指标": "IR", "数值": "0.43"}),
        ])
    }

    async fn group_return_analysis(&self, _task_id: &str) -> Result<Vec<Value>, ApiError> {
        Ok((1..=5)
            .map(|g| {
                json!({
                    "分组": format!("第{}组", g),
                    "年化收益率": format!("{:.1}%", 3.0 + (g as f64) * 1.5),
                    "最大回撤": format!("-{:.1}%", 8.0 - (g as f64) * 0.6),
                })
            })
            .collect())
    }

    async fn return_chart(&self, _task_id: &str) -> Result<ChartData, ApiError> {
        Ok(mock_chart(
            "收益率曲线",
            &[
                ("多空组合", [1.00, 1.04, 1.02, 1.09, 1.15]),
                ("基准", [1.00, 1.01, 0.99, 1.03, 1.05]),
            ],
        ))
    }

    async fn ic_sequence_chart(&self, _task_id: &str) -> Result<ChartData, ApiError> {
        Ok(mock_chart(
            "IC 序列",
            &[
                ("IC", [0.02, 0.03, -0.01, 0.04, 0.05]),
                ("累计IC", [0.02, 0.05, 0.04, 0.08, 0.13]),
            ],
        ))
    }

    async fn rank_ic_sequence_chart(&self, _task_id: &str) -> Result<ChartData, ApiError> {
        Ok(mock_chart(
            "Rank IC 序列",
            &[
                ("RankIC", [0.03, 0.02, 0.00, 0.05, 0.04]),
                ("累计RankIC", [0.03, 0.05, 0.05, 0.10, 0.14]),
            ],
        ))
    }

    async fn last_date_top_factor(&self, _task_id: &str) -> Result<Vec<Value>, ApiError> {
        Ok(vec![
            json!({"date": "2024-09-18", "symbol": "600519", "因子值": "2.31"}),
            json!({"date": "2024-09-18", "symbol": "000001", "因子值": "2.12"}),
            json!({"date": "2024-09-18", "symbol": "300750", "因子值": "1.98"}),
        ])
    }
}
