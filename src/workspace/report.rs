use crate::session::dto::{ChartData, ChartLabels, ChartSeries};
use crate::session::FactorApi;
use log::warn;
use serde_json::{json, Value};
use std::sync::Arc;

/// 因子报告聚合结果：六路查询各占一个槽位
///
/// 槽位之间相互独立，任何一路失败都只保留该槽位的旧值，
/// 报告整体永远可渲染。
#[derive(Debug, Clone, Default)]
pub struct ReportBundle {
    /// 核心分析指标（后端给什么列就渲染什么列）
    pub analysis: Vec<Value>,
    /// 分组收益分析表
    pub group_returns: Vec<Value>,
    /// 最新一期因子暴露 Top 表
    pub top_factors: Vec<Value>,
    pub return_chart: ChartData,
    pub ic_chart: ChartData,
    pub rank_ic_chart: ChartData,
}

impl ReportBundle {
    /// 占位样例：报告尚未拉取或全部失败时界面仍有内容可看
    pub fn sample() -> Self {
        let dates = vec![
            "2024-01".to_string(),
            "2024-02".to_string(),
            "2024-03".to_string(),
        ];
        Self {
            analysis: vec![
                json!({"指标": "年化收益率", "数值": "27.62%"}),
                json!({"指标": "最大回撤", "数值": "6.16%"}),
                json!({"指标": "夏普比率", "数值": "1.606"}),
                json!({"指标": "IC均值", "数值": "0.059"}),
            ],
            group_returns: vec![json!({
                "分组": "Top组",
                "年化收益率": "29.1%",
                "最大回撤": "6.3%",
                "换手率": "23.1%",
                "夏普比率": "1.52",
                "信息比率": "0.91"
            })],
            top_factors: vec![
                json!({"date": "2024-09-18", "symbol": "600519", "因子值": "2.31"}),
                json!({"date": "2024-09-18", "symbol": "000001", "因子值": "2.12"}),
            ],
            return_chart: ChartData {
                title: Some("收益率曲线".to_string()),
                x: vec![ChartLabels {
                    name: Some("日期".to_string()),
                    data: dates.clone(),
                }],
                y: vec![
                    ChartSeries {
                        name: Some("多空组合".to_string()),
                        data: vec![1.2, 1.6, 1.9],
                    },
                    ChartSeries {
                        name: Some("基准".to_string()),
                        data: vec![1.0, 1.1, 1.3],
                    },
                ],
            },
            ic_chart: sample_ic_chart("IC 序列", &dates),
            rank_ic_chart: sample_ic_chart("Rank IC 序列", &dates),
        }
    }
}

fn sample_ic_chart(title: &str, dates: &[String]) -> ChartData {
    ChartData {
        title: Some(title.to_string()),
        x: vec![ChartLabels {
            name: Some("日期".to_string()),
            data: dates.to_vec(),
        }],
        y: vec![
            ChartSeries {
                name: Some("IC".to_string()),
                data: vec![0.05, 0.08, 0.03],
            },
            ChartSeries {
                name: Some("累计IC".to_string()),
                data: vec![0.05, 0.13, 0.16],
            },
        ],
    }
}

/// 报告聚合器：六路查询并发发出，全部落地后合并
pub struct ReportAggregator {
    api: Arc<dyn FactorApi>,
}

impl ReportAggregator {
    pub fn new(api: Arc<dyn FactorApi>) -> Self {
        Self { api }
    }

    /// 拉取报告并就地合并进 bundle，返回本次刷新成功的槽位数。
    /// 单槽失败只记一条日志，永不升级为整体失败。
    pub async fn fetch_into(&self, task_id: &str, bundle: &mut ReportBundle) -> usize {
        let (analysis, groups, tops, ret_chart, ic_chart, rank_ic_chart) = futures::join!(
            self.api.factor_analysis_data(task_id),
            self.api.group_return_analysis(task_id),
            self.api.last_date_top_factor(task_id),
            self.api.return_chart(task_id),
            self.api.ic_sequence_chart(task_id),
            self.api.rank_ic_sequence_chart(task_id),
        );

        let mut updated = 0;
        match analysis {
            Ok(rows) => {
                bundle.analysis = rows;
                updated += 1;
            }
            Err(e) => warn!("核心指标拉取失败 [{}]: {}", task_id, e),
        }
        match groups {
            Ok(rows) => {
                bundle.group_returns = rows;
                updated += 1;
            }
            Err(e) => warn!("分组收益拉取失败 [{}]: {}", task_id, e),
        }
        match tops {
            Ok(rows) => {
                bundle.top_factors = rows;
                updated += 1;
            }
            Err(e) => warn!("因子暴露拉取失败 [{}]: {}", task_id, e),
        }
        match ret_chart {
            Ok(chart) => {
                bundle.return_chart = chart;
                updated += 1;
            }
            Err(e) => warn!("收益曲线拉取失败 [{}]: {}", task_id, e),
        }
        match ic_chart {
            Ok(chart) => {
                bundle.ic_chart = chart;
                updated += 1;
            }
            Err(e) => warn!("IC 序列拉取失败 [{}]: {}", task_id, e),
        }
        match rank_ic_chart {
            Ok(chart) => {
                bundle.rank_ic_chart = chart;
                updated += 1;
            }
            Err(e) => warn!("Rank IC 序列拉取失败 [{}]: {}", task_id, e),
        }
        updated
    }
}
