use crate::session::dto::{ChartData, ChartSeries, TaskStatusDto};
use crate::workspace::RunState;
use ratatui::style::Color;
use serde_json::Value;

/// 因子状态码 -> 标签与颜色
pub fn status_meta(status: i32) -> (&'static str, Color) {
    match status {
        1 => ("运行中", Color::Blue),
        2 => ("运行成功", Color::Green),
        3 => ("运行失败", Color::Red),
        _ => ("未运行", Color::DarkGray),
    }
}

pub fn run_state_label(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "空闲",
        RunState::Starting => "启动中",
        RunState::Running => "运行中",
        RunState::Succeeded => "运行成功",
        RunState::Failed => "运行失败",
    }
}

pub fn level_color(level: &str) -> Color {
    match level.to_ascii_uppercase().as_str() {
        "ERROR" => Color::Red,
        "WARN" | "WARNING" => Color::Yellow,
        "DEBUG" => Color::DarkGray,
        _ => Color::Blue,
    }
}

/// 进度比例（0.0 - 1.0），缺省按 0 处理
pub fn progress_ratio(status: Option<&TaskStatusDto>) -> f64 {
    status.map(|s| s.progress()).unwrap_or(0) as f64 / 100.0
}

pub fn progress_text(status: Option<&TaskStatusDto>) -> String {
    format!("{}%", status.map(|s| s.progress()).unwrap_or(0))
}

pub fn format_sharpe(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "-".to_string(),
    }
}

/// 数值序列预览：最多展示前 6 个点
pub fn series_preview(series: &ChartSeries) -> String {
    let name = series.name.as_deref().unwrap_or("series");
    let shown: Vec<String> = series.data.iter().take(6).map(|v| format!("{:.2}", v)).collect();
    if series.data.len() > 6 {
        format!("{}: {} ... 共{}点", name, shown.join(", "), series.data.len())
    } else {
        format!("{}: {}", name, shown.join(", "))
    }
}

pub fn chart_title(chart: &ChartData) -> &str {
    chart.title.as_deref().unwrap_or("图表")
}

/// 后端表格行是松散 JSON 对象，按 "列: 值" 平铺成一行文本
pub fn row_preview(row: &Value) -> String {
    match row {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}: {}", k, s),
                other => format!("{}: {}", k, other),
            })
            .collect::<Vec<String>>()
            .join("  "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_meta_maps_all_codes() {
        assert_eq!(status_meta(0).0, "未运行");
        assert_eq!(status_meta(1).0, "运行中");
        assert_eq!(status_meta(2).0, "运行成功");
        assert_eq!(status_meta(3).0, "运行失败");
        // 未知状态码按未运行展示
        assert_eq!(status_meta(42).0, "未运行");
    }

    #[test]
    fn progress_clamps_out_of_range() {
        let st = TaskStatusDto {
            process_status: Some(250),
            ..Default::default()
        };
        assert_eq!(progress_text(Some(&st)), "100%");
        assert_eq!(progress_text(None), "0%");
        assert!((progress_ratio(Some(&st)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn row_preview_flattens_object() {
        let row = json!({"指标": "夏普比率", "数值": "1.52"});
        let text = row_preview(&row);
        assert!(text.contains("指标: 夏普比率"));
        assert!(text.contains("数值: 1.52"));
    }

    #[test]
    fn series_preview_truncates_long_series() {
        let series = ChartSeries {
            name: Some("IC".to_string()),
            data: vec![0.1; 10],
        };
        let text = series_preview(&series);
        assert!(text.contains("共10点"));
    }

    #[test]
    fn sharpe_handles_missing_and_nan() {
        assert_eq!(format_sharpe(Some(1.234)), "1.23");
        assert_eq!(format_sharpe(None), "-");
        assert_eq!(format_sharpe(Some(f64::NAN)), "-");
    }
}
