pub mod format;

use crate::app_state::{App, FocusArea, InputMode, ViewMode};
use self::format::{
    chart_title, format_sharpe, level_color, progress_ratio, progress_text, row_preview,
    run_state_label, series_preview, status_meta,
};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &mut App) {
    // 创建布局
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Length(3), // 顶部标题栏
            Constraint::Min(0),    // 中间内容区域
            Constraint::Min(8),    // 底部命令/日志区域
        ])
        .split(f.size());

    render_top_bar(f, chunks[0]);

    let middle_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(0)])
        .split(chunks[1]);

    render_left_menu(f, middle_chunks[0], app);
    render_main_view(f, middle_chunks[1], app);
    render_bottom_bar(f, chunks[2], app);
}

fn render_top_bar(f: &mut Frame, area: Rect) {
    let title = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan));

    let title_text = Line::from(vec![
        Span::styled(
            " Panda 因子控制台 ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" - Terminal TUI"),
    ]);

    let paragraph = Paragraph::new(title_text)
        .block(title)
        .alignment(ratatui::layout::Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_left_menu(f: &mut Frame, area: Rect, app: &App) {
    let menu_items: Vec<ListItem> = vec!["因子列表", "因子工作区", "运行日志", "因子报告"]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let is_selected = i == app.menu_selected_index;
            let is_active = matches!(
                (i, &app.view_mode),
                (0, ViewMode::FactorList)
                    | (1, ViewMode::Workspace)
                    | (2, ViewMode::RunLog)
                    | (3, ViewMode::Report)
            );
            let mut style = Style::default();
            if is_active {
                style = style.fg(Color::Cyan);
            }
            if is_selected && app.focus_area == FocusArea::Menu {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }
            ListItem::new(Line::from(Span::styled(format!(" {}", text), style)))
        })
        .collect();

    let border_style = if app.focus_area == FocusArea::Menu {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let menu = List::new(menu_items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(" 菜单 "),
    );
    f.render_widget(menu, area);
}

fn render_main_view(f: &mut Frame, area: Rect, app: &mut App) {
    match app.view_mode {
        ViewMode::FactorList => render_factor_list(f, area, app),
        ViewMode::Workspace => render_workspace(f, area, app),
        ViewMode::RunLog => render_run_log(f, area, app),
        ViewMode::Report => render_report(f, area, app),
    }
}

fn render_factor_list(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .factors
        .iter()
        .map(|factor| {
            let (label, color) = status_meta(factor.status);
            ListItem::new(Line::from(vec![
                Span::styled(format!("[{}] ", label), Style::default().fg(color)),
                Span::raw(factor.name.clone()),
                Span::styled(
                    format!(
                        "  收益 {}  夏普 {}  {}",
                        factor.return_ratio,
                        format_sharpe(factor.sharpe_ratio),
                        factor.factor_id
                    ),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let border_style = if app.focus_area == FocusArea::MainView {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let title = format!(
        " 因子列表 (第{}/{}页 共{}条) [n/p 翻页, r 运行, Enter 打开] ",
        app.list_page, app.list_total_pages, app.list_total
    );
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    f.render_stateful_widget(list, area, &mut app.factor_list_state);
}

fn render_workspace(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // 因子信息
            Constraint::Length(3), // 进度条
            Constraint::Min(6),    // 最近日志
        ])
        .split(area);

    let mut lines: Vec<Line> = Vec::new();
    match &app.selected_detail {
        Some(factor) => {
            let status = factor.status.unwrap_or(0);
            let (label, color) = status_meta(status);
            lines.push(Line::from(vec![
                Span::styled(
                    factor.name.clone().unwrap_or_else(|| "未命名因子".to_string()),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::styled(format!("[{}]", label), Style::default().fg(color)),
            ]));
            lines.push(Line::from(format!("因子ID: {}", factor.factor_id)));
            if let Some(code_type) = &factor.code_type {
                lines.push(Line::from(format!("代码类型: {}", code_type)));
            }
            if let Some(tags) = &factor.tags {
                lines.push(Line::from(format!("标签: {}", tags)));
            }
            if let Some(describe) = &factor.describe {
                lines.push(Line::from(format!("描述: {}", describe)));
            }
            if let Some(params) = &factor.params {
                lines.push(Line::from(format!(
                    "回测区间: {} ~ {}",
                    params.start_date.as_deref().unwrap_or("-"),
                    params.end_date.as_deref().unwrap_or("-")
                )));
                lines.push(Line::from(format!(
                    "调仓周期: {}天  股票池: {}  分组: {}  极值处理: {}",
                    params.adjustment_cycle.unwrap_or(5),
                    params.stock_pool.as_deref().unwrap_or("-"),
                    params.group_number.unwrap_or(5),
                    params.extreme_value_processing.as_deref().unwrap_or("-")
                )));
                lines.push(Line::from(format!(
                    "因子方向: {}  包含ST: {}",
                    if params.factor_direction.unwrap_or(true) {
                        "正向"
                    } else {
                        "负向"
                    },
                    if params.include_st.unwrap_or(false) {
                        "是"
                    } else {
                        "否"
                    }
                )));
            }
            if let Some(code) = &factor.code {
                lines.push(Line::from(""));
                for code_line in code.lines() {
                    lines.push(Line::from(Span::styled(
                        code_line.to_string(),
                        Style::default().fg(Color::Gray),
                    )));
                }
            }
        }
        None => {
            lines.push(Line::from("尚未打开因子，在列表中按 Enter 进入工作区"));
        }
    }

    let info = Paragraph::new(lines)
        .scroll((app.detail_scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" 因子工作区 [r 运行, l 刷新日志, g 拉取报告] "),
        );
    f.render_widget(info, chunks[0]);

    let task_label = match &app.task_id {
        Some(id) => format!(
            " {} | 任务 {} | {} ",
            run_state_label(app.run_state),
            id,
            app.task_status
                .as_ref()
                .and_then(|s| s.last_log_message.clone())
                .unwrap_or_else(|| "暂无日志".to_string())
        ),
        None => format!(" {} | 待运行 ", run_state_label(app.run_state)),
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(task_label))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(progress_ratio(app.task_status.as_ref()))
        .label(progress_text(app.task_status.as_ref()));
    f.render_widget(gauge, chunks[1]);

    let tail: Vec<ListItem> = app
        .console_logs
        .iter()
        .rev()
        .take(chunks[2].height.saturating_sub(2) as usize)
        .rev()
        .map(log_line)
        .collect();
    let logs = List::new(tail).block(Block::default().borders(Borders::ALL).title(" Console "));
    f.render_widget(logs, chunks[2]);
}

fn log_line(log: &crate::session::dto::LogEntry) -> ListItem<'static> {
    let level = log.level.clone().unwrap_or_else(|| "INFO".to_string());
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("[{}] ", log.time.as_deref().unwrap_or("-")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{:5} ", level), Style::default().fg(level_color(&level))),
        Span::raw(log.message.clone().unwrap_or_default()),
    ]))
}

fn render_run_log(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = if app.console_logs.is_empty() {
        vec![ListItem::new(Line::from("暂无日志"))]
    } else {
        app.console_logs.iter().map(log_line).collect()
    };
    let title = match &app.task_id {
        Some(id) => format!(" 运行日志 [{}] (l 手动刷新) ", id),
        None => " 运行日志 (l 手动刷新) ".to_string(),
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, area);
}

fn render_report(f: &mut Frame, area: Rect, app: &App) {
    let report = &app.report;
    let mut lines: Vec<Line> = Vec::new();

    lines.push(section_title("核心指标"));
    for row in &report.analysis {
        lines.push(Line::from(row_preview(row)));
    }

    lines.push(Line::from(""));
    lines.push(section_title("分组收益分析"));
    for row in &report.group_returns {
        lines.push(Line::from(row_preview(row)));
    }

    lines.push(Line::from(""));
    lines.push(section_title("最新因子暴露"));
    for row in &report.top_factors {
        lines.push(Line::from(row_preview(row)));
    }

    for chart in [&report.return_chart, &report.ic_chart, &report.rank_ic_chart] {
        lines.push(Line::from(""));
        lines.push(section_title(chart_title(chart)));
        if let Some(x) = chart.x.first() {
            lines.push(Line::from(Span::styled(
                format!(
                    "{}: {}",
                    x.name.as_deref().unwrap_or("X"),
                    x.data.join(", ")
                ),
                Style::default().fg(Color::DarkGray),
            )));
        }
        for series in &chart.y {
            lines.push(Line::from(series_preview(series)));
        }
    }

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" 因子报告 [g 重新拉取] "),
    );
    f.render_widget(paragraph, area);
}

fn section_title(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ))
}

fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    // 命令输入行
    let input_line = if app.input_mode == InputMode::Command {
        let hint = app.get_completion_hint().unwrap_or_default();
        Line::from(vec![
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(app.command_input.clone()),
            Span::styled(hint, Style::default().fg(Color::DarkGray)),
        ])
    } else {
        Line::from(Span::styled(
            "按 / 输入命令 (help 查看全部)，q 退出",
            Style::default().fg(Color::DarkGray),
        ))
    };
    let input = Paragraph::new(input_line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" 命令 "),
    );
    f.render_widget(input, chunks[0]);

    // 消息日志：展示最近几条
    let visible = chunks[1].height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .log_messages
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|m| ListItem::new(Line::from(m.clone())))
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" 消息 "));
    f.render_widget(list, chunks[1]);
}
