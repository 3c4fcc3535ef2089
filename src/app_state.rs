use crate::commands::AppCommand;
use crate::session::dto::{FactorDto, LogEntry, TaskStatusDto};
use crate::workspace::{ReportBundle, RunState};
use crossterm::event::KeyCode;
use ratatui::widgets::ListState;
use std::str::FromStr;
use tokio::sync::mpsc;

#[derive(PartialEq, Debug, Clone)]
pub enum ViewMode {
    FactorList,
    Workspace,
    RunLog,
    Report,
}

#[derive(PartialEq, Debug, Clone)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FocusArea {
    Menu,     // 焦点在左侧菜单
    MainView, // 焦点在主视图
}

/// 因子列表行（由 FactorDto 压缩而来）
#[derive(Debug, Clone)]
pub struct FactorSummary {
    pub factor_id: String,
    pub name: String,
    pub status: i32,
    pub return_ratio: String,
    pub sharpe_ratio: Option<f64>,
    pub updated_at: String,
}

impl From<&FactorDto> for FactorSummary {
    fn from(f: &FactorDto) -> Self {
        Self {
            factor_id: f.factor_id.clone(),
            name: f
                .name
                .clone()
                .or_else(|| f.factor_name.clone())
                .unwrap_or_else(|| "未命名因子".to_string()),
            status: f.status.unwrap_or(0),
            return_ratio: f.return_ratio.clone().unwrap_or_else(|| "-".to_string()),
            sharpe_ratio: f.sharpe_ratio,
            updated_at: f.updated_at.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    Factors {
        list: Vec<FactorSummary>,
        total: u64,
        page: u64,
        total_pages: u64,
    },
    Detail(FactorDto),
    RunState(RunState),
    TaskStatus(TaskStatusDto),
    /// 新追加的一批增量日志
    TaskLogs(Vec<LogEntry>),
    /// 当前任务切换（新任务的日志流从头开始）
    TaskChanged(Option<String>),
    Report(ReportBundle),
}

pub struct App {
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub focus_area: FocusArea,
    pub menu_selected_index: usize,
    pub factors: Vec<FactorSummary>,
    pub list_total: u64,
    pub list_page: u64,
    pub list_total_pages: u64,
    pub selected_index: usize,
    pub factor_list_state: ListState,
    pub selected_detail: Option<FactorDto>,
    pub run_state: RunState,
    pub task_id: Option<String>,
    pub task_status: Option<TaskStatusDto>,
    pub console_logs: Vec<LogEntry>,
    pub report: ReportBundle,
    pub detail_scroll: u16,
    pub command_input: String,
    pub command_cursor: usize,
    pub command_history: Vec<String>,
    pub command_history_index: Option<usize>,
    pub log_messages: Vec<String>,
    pub cmd_tx: mpsc::UnboundedSender<AppCommand>,
    pub evt_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl App {
    pub fn new(
        session_info: Vec<String>,
        cmd_tx: mpsc::UnboundedSender<AppCommand>,
        evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> App {
        let mut log_messages = vec!["应用已启动".to_string()];
        log_messages.extend(session_info);

        App {
            view_mode: ViewMode::FactorList,
            input_mode: InputMode::Normal,
            focus_area: FocusArea::Menu,
            menu_selected_index: 0,
            factors: Vec::new(),
            list_total: 0,
            list_page: 1,
            list_total_pages: 1,
            selected_index: 0,
            factor_list_state: {
                let mut s = ListState::default();
                s.select(Some(0));
                s
            },
            selected_detail: None,
            run_state: RunState::Idle,
            task_id: None,
            task_status: None,
            console_logs: Vec::new(),
            report: ReportBundle::sample(),
            detail_scroll: 0,
            command_input: String::new(),
            command_cursor: 0,
            command_history: Vec::new(),
            command_history_index: None,
            log_messages,
            cmd_tx,
            evt_rx: Some(evt_rx),
        }
    }

    pub fn add_log(&mut self, msg: String) {
        self.log_messages.push(msg);
    }

    /// 后台事件统一落地到界面状态
    pub fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(msg) | AppEvent::Message(msg) | AppEvent::Error(msg) => {
                self.log_messages.push(msg);
            }
            AppEvent::Factors {
                list,
                total,
                page,
                total_pages,
            } => {
                self.factors = list;
                self.list_total = total;
                self.list_page = page;
                self.list_total_pages = total_pages;
                self.clamp_selection();
            }
            AppEvent::Detail(dto) => {
                self.detail_scroll = 0;
                self.selected_detail = Some(dto);
            }
            AppEvent::RunState(state) => {
                self.run_state = state;
                // 详情页的状态标签跟着运行状态走
                if let Some(detail) = self.selected_detail.as_mut() {
                    detail.status = Some(match state {
                        RunState::Idle => detail.status.unwrap_or(0),
                        RunState::Starting | RunState::Running => 1,
                        RunState::Succeeded => 2,
                        RunState::Failed => 3,
                    });
                }
            }
            AppEvent::TaskStatus(status) => {
                self.task_status = Some(status);
            }
            AppEvent::TaskLogs(mut batch) => {
                self.console_logs.append(&mut batch);
            }
            AppEvent::TaskChanged(task_id) => {
                self.task_id = task_id;
                self.task_status = None;
                self.console_logs.clear();
            }
            AppEvent::Report(bundle) => {
                self.report = bundle;
            }
        }
    }

    /// 获取当前命令的补全建议
    pub fn get_completion_hint(&self) -> Option<String> {
        let commands = vec![
            "list", "open", "run", "stop", "logs", "report", "sort", "new", "rename", "delete",
            "help", "quit",
        ];
        let input = self.command_input.trim();

        if input.is_empty() {
            return None;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.len() == 1 {
            for cmd in commands {
                if cmd.starts_with(parts[0]) && cmd != parts[0] {
                    return Some(cmd[parts[0].len()..].to_string());
                }
            }
        }
        None
    }

    pub fn clamp_selection(&mut self) {
        if self.selected_index >= self.factors.len() {
            self.selected_index = self.factors.len().saturating_sub(1);
        }
        self.factor_list_state.select(Some(self.selected_index));
    }

    pub fn selected_factor_id(&self) -> Option<String> {
        self.factors
            .get(self.selected_index)
            .map(|f| f.factor_id.clone())
    }

    /// 打开当前选中的因子工作区
    pub fn open_selected(&mut self) {
        if let Some(factor_id) = self.selected_factor_id() {
            self.detail_scroll = 0;
            let _ = self.cmd_tx.send(AppCommand::Open { factor_id });
        }
    }

    fn request_page(&mut self, page: u64) {
        let _ = self.cmd_tx.send(AppCommand::List { page: Some(page) });
    }

    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Command {
            match key {
                KeyCode::Enter => {
                    let cmd_owned = self.command_input.trim().to_string();
                    self.command_input.clear();
                    self.command_cursor = 0;
                    self.input_mode = InputMode::Normal;
                    if cmd_owned.is_empty() {
                        return false;
                    }

                    if let Ok(app_cmd) = AppCommand::from_str(&cmd_owned) {
                        if matches!(app_cmd, AppCommand::Quit) {
                            let _ = self.cmd_tx.send(app_cmd);
                            self.command_history.push(cmd_owned);
                            return true;
                        }
                        let _ = self.cmd_tx.send(app_cmd);
                    } else {
                        let _ = self.cmd_tx.send(AppCommand::Unknown(cmd_owned.clone()));
                    }
                    self.command_history.push(cmd_owned);
                    self.command_history_index = None;
                    return false;
                }
                KeyCode::Esc => {
                    self.command_input.clear();
                    self.command_cursor = 0;
                    self.input_mode = InputMode::Normal;
                    return false;
                }
                KeyCode::Tab => {
                    if let Some(hint) = self.get_completion_hint() {
                        let insert = format!("{} ", hint);
                        self.command_input.insert_str(self.command_cursor, &insert);
                        self.command_cursor += insert.len();
                    }
                    return false;
                }
                KeyCode::Up => {
                    if self.command_history.is_empty() {
                        return false;
                    }
                    let next = match self.command_history_index {
                        None => self.command_history.len().saturating_sub(1),
                        Some(i) => i.saturating_sub(1),
                    };
                    self.command_history_index = Some(next);
                    if let Some(cmd) = self.command_history.get(next) {
                        self.command_input = cmd.clone();
                        self.command_cursor = self.command_input.len();
                    }
                    return false;
                }
                KeyCode::Down => {
                    if self.command_history.is_empty() {
                        return false;
                    }
                    let next = match self.command_history_index {
                        None => return false,
                        Some(i) => {
                            let n = i + 1;
                            if n >= self.command_history.len() {
                                self.command_history_index = None;
                                self.command_input.clear();
                                self.command_cursor = 0;
                                return false;
                            }
                            n
                        }
                    };
                    self.command_history_index = Some(next);
                    if let Some(cmd) = self.command_history.get(next) {
                        self.command_input = cmd.clone();
                        self.command_cursor = self.command_input.len();
                    }
                    return false;
                }
                KeyCode::Backspace => {
                    if self.command_cursor > 0 && !self.command_input.is_empty() {
                        let idx = self.command_cursor - 1;
                        self.command_input.remove(idx);
                        self.command_cursor = self.command_cursor.saturating_sub(1);
                    }
                    return false;
                }
                KeyCode::Delete => {
                    if self.command_cursor < self.command_input.len() {
                        self.command_input.remove(self.command_cursor);
                    }
                    return false;
                }
                KeyCode::Left => {
                    if self.command_cursor > 0 {
                        self.command_cursor -= 1;
                    }
                    return false;
                }
                KeyCode::Right => {
                    if self.command_cursor < self.command_input.len() {
                        self.command_cursor += 1;
                    }
                    return false;
                }
                KeyCode::Home => {
                    self.command_cursor = 0;
                    return false;
                }
                KeyCode::End => {
                    self.command_cursor = self.command_input.len();
                    return false;
                }
                KeyCode::Char(c) => {
                    self.command_input.insert(self.command_cursor, c);
                    self.command_cursor += 1;
                    return false;
                }
                _ => return false,
            }
        }

        // 正常模式下的按键处理
        match key {
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Command;
                self.command_input.clear();
                self.command_cursor = 0;
                false
            }
            KeyCode::Char('q') => {
                true // 退出应用
            }
            KeyCode::Left => {
                self.focus_area = FocusArea::Menu;
                false
            }
            KeyCode::Right => {
                self.focus_area = FocusArea::MainView;
                false
            }
            KeyCode::Up => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index > 0 {
                        self.menu_selected_index -= 1;
                    }
                } else if self.view_mode == ViewMode::Workspace {
                    self.detail_scroll = self.detail_scroll.saturating_sub(1);
                } else if self.selected_index > 0 {
                    self.selected_index -= 1;
                    self.factor_list_state.select(Some(self.selected_index));
                }
                false
            }
            KeyCode::Down => {
                if self.focus_area == FocusArea::Menu {
                    let menu_items_count = 4;
                    if self.menu_selected_index < menu_items_count - 1 {
                        self.menu_selected_index += 1;
                    }
                } else if self.view_mode == ViewMode::Workspace {
                    self.detail_scroll = self.detail_scroll.saturating_add(1);
                } else if self.selected_index < self.factors.len().saturating_sub(1) {
                    self.selected_index += 1;
                    self.factor_list_state.select(Some(self.selected_index));
                }
                false
            }
            KeyCode::Enter => {
                if self.focus_area == FocusArea::Menu {
                    match self.menu_selected_index {
                        0 => self.view_mode = ViewMode::FactorList,
                        1 => {
                            self.view_mode = ViewMode::Workspace;
                            if self.selected_detail.is_none() {
                                self.open_selected();
                            }
                        }
                        2 => self.view_mode = ViewMode::RunLog,
                        3 => self.view_mode = ViewMode::Report,
                        _ => {}
                    }
                    self.focus_area = FocusArea::MainView;
                } else if self.view_mode == ViewMode::FactorList && !self.factors.is_empty() {
                    self.view_mode = ViewMode::Workspace;
                    self.menu_selected_index = 1;
                    self.open_selected();
                }
                false
            }
            KeyCode::Char('r') => {
                // 运行：工作区内运行当前因子，列表里运行选中因子
                let factor_id = match self.view_mode {
                    ViewMode::FactorList => self.selected_factor_id(),
                    _ => self.selected_detail.as_ref().map(|f| f.factor_id.clone()),
                };
                if let Some(factor_id) = factor_id {
                    let _ = self.cmd_tx.send(AppCommand::Run {
                        factor_id: Some(factor_id),
                    });
                }
                false
            }
            KeyCode::Char('l') => {
                let _ = self.cmd_tx.send(AppCommand::Logs);
                false
            }
            KeyCode::Char('g') => {
                let _ = self.cmd_tx.send(AppCommand::Report);
                false
            }
            KeyCode::Char('n') => {
                if self.view_mode == ViewMode::FactorList && self.list_page < self.list_total_pages
                {
                    self.request_page(self.list_page + 1);
                }
                false
            }
            KeyCode::Char('p') => {
                if self.view_mode == ViewMode::FactorList && self.list_page > 1 {
                    self.request_page(self.list_page - 1);
                }
                false
            }
            KeyCode::Char('x') => {
                if self.view_mode != ViewMode::FactorList {
                    self.view_mode = ViewMode::FactorList;
                    self.menu_selected_index = 0;
                }
                false
            }
            _ => false,
        }
    }
}
