use anyhow::Context;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use rustpanda::app_service::refresh_factor_list;
use rustpanda::app_state::{App, AppEvent};
use rustpanda::commands::AppCommand;
use rustpanda::mock::MockFactorApi;
use rustpanda::session::dto::{FactorListQuery, FactorUpsert};
use rustpanda::session::{urls, FactorApi, HttpFactorApi};
use rustpanda::ui::draw;
use rustpanda::workspace::{ReportAggregator, ReportBundle, RunController};

/// 启动配置，全部来自环境变量（.env 优先）
struct Config {
    api_base: String,
    user_id: String,
    use_mock: bool,
    poll_interval: Duration,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let api_base = std::env::var("PANDA_API_BASE")
            .unwrap_or_else(|_| urls::DEFAULT_API_BASE.to_string());
        if api_base.trim().is_empty() {
            anyhow::bail!("PANDA_API_BASE 不能为空");
        }
        let user_id = std::env::var("PANDA_USER_ID").unwrap_or_else(|_| "0".to_string());
        let use_mock = std::env::var("PANDA_USE_MOCK")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let poll_interval = match std::env::var("PANDA_POLL_INTERVAL_SECS") {
            Ok(v) => {
                let secs = v.parse::<u64>().with_context(|| {
                    format!("PANDA_POLL_INTERVAL_SECS 不是合法秒数: {}", v)
                })?;
                Duration::from_secs(secs.max(1))
            }
            Err(_) => Duration::from_secs(5),
        };
        Ok(Self {
            api_base,
            user_id,
            use_mock,
            poll_interval,
        })
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> io::Result<()> {
    // 日志写文件，终端留给 TUI
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustpanda", log::LevelFilter::Info)
        .init();

    let mut session_info = Vec::new();
    if dotenv::dotenv().is_ok() {
        session_info.push("✓ 已加载 .env 文件".to_string());
    } else {
        session_info.push("⚠ 未找到 .env 文件，使用系统环境变量".to_string());
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("配置读取失败: {}", e);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("配置读取失败: {}", e),
            ));
        }
    };
    session_info.push(format!("API 地址: {}", config.api_base));
    session_info.push(format!("用户: {}", config.user_id));
    session_info.push(format!(
        "轮询间隔: {}秒",
        config.poll_interval.as_secs()
    ));

    let api: Arc<dyn FactorApi> = if config.use_mock {
        session_info.push("✓ 使用内存 Mock 后端 (PANDA_USE_MOCK)".to_string());
        Arc::new(MockFactorApi::with_sample_data())
    } else {
        Arc::new(HttpFactorApi::new(config.api_base.clone()))
    };

    // 创建核心 Channel
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    // 启动单后台任务模型 (Actor)
    {
        let api = api.clone();
        let evt_tx = evt_tx.clone();
        let user_id = config.user_id.clone();
        let poll_interval = config.poll_interval;
        tokio::spawn(async move {
            run_backend(api, evt_tx, cmd_rx, user_id, poll_interval).await;
        });
    }

    // TUI 初始化
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session_info, cmd_tx, evt_rx);

    // 主循环
    let rx = app.evt_rx.take().unwrap();
    let res = run_app_loop(&mut terminal, &mut app, rx).await;

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// 后台命令处理：持有 API、当前工作区控制器与报告聚合器
async fn run_backend(
    api: Arc<dyn FactorApi>,
    evt_tx: mpsc::UnboundedSender<AppEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<AppCommand>,
    user_id: String,
    poll_interval: Duration,
) {
    let list_query = Arc::new(tokio::sync::Mutex::new(FactorListQuery {
        user_id,
        ..Default::default()
    }));

    // 周期性刷新因子列表
    {
        let api = api.clone();
        let tx = evt_tx.clone();
        let query = list_query.clone();
        tokio::spawn(async move {
            loop {
                let q = query.lock().await.clone();
                refresh_factor_list(&api, &q, &tx).await;
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    let aggregator = ReportAggregator::new(api.clone());
    let mut report = ReportBundle::sample();
    let mut controller: Option<Arc<RunController>> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            AppCommand::List { page } => {
                let q = {
                    let mut q = list_query.lock().await;
                    if let Some(page) = page {
                        q.page = page.max(1);
                    }
                    q.clone()
                };
                refresh_factor_list(&api, &q, &evt_tx).await;
            }
            AppCommand::Sort { field, order } => {
                let q = {
                    let mut q = list_query.lock().await;
                    q.sort_field = field;
                    q.sort_order = order;
                    q.page = 1;
                    q.clone()
                };
                refresh_factor_list(&api, &q, &evt_tx).await;
            }
            AppCommand::Open { factor_id } => {
                // 旧工作区先销毁，轮询立即停止
                if let Some(old) = controller.take() {
                    old.shutdown();
                }
                let _ = evt_tx.send(AppEvent::TaskChanged(None));

                match api.query_factor(&factor_id).await {
                    Ok(detail) => {
                        let _ = evt_tx.send(AppEvent::Detail(detail));
                    }
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Error(format!("查询因子失败: {}", e)));
                        continue;
                    }
                }

                let ctl = Arc::new(RunController::new(
                    factor_id.clone(),
                    api.clone(),
                    evt_tx.clone(),
                    poll_interval,
                ));
                // 因子已有运行中的任务则接管轮询
                match api.query_factor_status(&factor_id).await {
                    Ok(status) => {
                        if let (Some(task_id), Some(1)) = (status.task_id, status.status) {
                            if !task_id.is_empty() {
                                ctl.adopt_task(task_id).await;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Log(format!("查询运行状态失败: {}", e)));
                    }
                }
                controller = Some(ctl);
            }
            AppCommand::Run { factor_id } => {
                let target = factor_id
                    .or_else(|| controller.as_ref().map(|c| c.factor_id().to_string()));
                let Some(target) = target else {
                    let _ = evt_tx.send(AppEvent::Error(
                        "未指定因子，先 open 或使用 run <factor_id>".to_string(),
                    ));
                    continue;
                };
                let reusable = controller
                    .as_ref()
                    .filter(|c| c.factor_id() == target)
                    .cloned();
                let ctl = match reusable {
                    Some(c) => c,
                    None => {
                        if let Some(old) = controller.take() {
                            old.shutdown();
                        }
                        let c = Arc::new(RunController::new(
                            target.clone(),
                            api.clone(),
                            evt_tx.clone(),
                            poll_interval,
                        ));
                        controller = Some(c.clone());
                        c
                    }
                };
                // 启动失败已经通过事件上报，这里不再二次处理
                let _ = ctl.start_run().await;
            }
            AppCommand::Stop => {
                if let Some(old) = controller.take() {
                    old.shutdown();
                    let _ = evt_tx.send(AppEvent::Message("已停止轮询并关闭工作区".to_string()));
                } else {
                    let _ = evt_tx.send(AppEvent::Message("当前没有打开的工作区".to_string()));
                }
            }
            AppCommand::Logs => {
                if let Some(ctl) = &controller {
                    ctl.refresh_logs().await;
                } else {
                    let _ = evt_tx.send(AppEvent::Message("暂无运行任务".to_string()));
                }
            }
            AppCommand::Report => {
                let task_id = match &controller {
                    Some(ctl) => ctl.snapshot().await.task_id,
                    None => None,
                };
                match task_id {
                    Some(task_id) => {
                        let updated = aggregator.fetch_into(&task_id, &mut report).await;
                        let _ = evt_tx.send(AppEvent::Report(report.clone()));
                        let _ = evt_tx.send(AppEvent::Message(format!(
                            "报告已刷新 ({}/6 项成功)",
                            updated
                        )));
                    }
                    None => {
                        let _ = evt_tx.send(AppEvent::Error(
                            "暂无任务，先运行因子再拉取报告".to_string(),
                        ));
                    }
                }
            }
            AppCommand::Create { name } => {
                let payload = FactorUpsert {
                    name: Some(name.clone()),
                    factor_name: Some(name),
                    code_type: Some("formula".to_string()),
                    code: Some("rank(close / open)".to_string()),
                    ..Default::default()
                };
                match api.create_factor(&payload).await {
                    Ok(factor_id) => {
                        let _ = evt_tx
                            .send(AppEvent::Message(format!("已创建因子 [{}]", factor_id)));
                        let q = list_query.lock().await.clone();
                        refresh_factor_list(&api, &q, &evt_tx).await;
                    }
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Error(format!("创建因子失败: {}", e)));
                    }
                }
            }
            AppCommand::Rename { factor_id, name } => {
                let payload = FactorUpsert {
                    name: Some(name),
                    ..Default::default()
                };
                match api.update_factor(&factor_id, &payload).await {
                    Ok(_) => {
                        let _ = evt_tx.send(AppEvent::Message(format!(
                            "已更新因子 [{}]",
                            factor_id
                        )));
                        let q = list_query.lock().await.clone();
                        refresh_factor_list(&api, &q, &evt_tx).await;
                    }
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Error(format!("更新因子失败: {}", e)));
                    }
                }
            }
            AppCommand::Delete { factor_id } => {
                match api.delete_factor(&factor_id).await {
                    Ok(()) => {
                        let _ = evt_tx
                            .send(AppEvent::Message(format!("已删除因子 [{}]", factor_id)));
                        let q = list_query.lock().await.clone();
                        refresh_factor_list(&api, &q, &evt_tx).await;
                    }
                    Err(e) => {
                        let _ = evt_tx.send(AppEvent::Error(format!("删除因子失败: {}", e)));
                    }
                }
            }
            AppCommand::Help => {
                let _ = evt_tx.send(AppEvent::Message(
                    "可用命令: list [page] | sort <field> [asc|desc] | open <id> | run [id] | stop | logs | report | new <name> | rename <id> <name> | delete <id> | quit"
                        .to_string(),
                ));
            }
            AppCommand::Quit => {
                if let Some(old) = controller.take() {
                    old.shutdown();
                }
                let _ = evt_tx.send(AppEvent::Message("收到退出命令".to_string()));
            }
            AppCommand::Unknown(msg) => {
                let _ = evt_tx.send(AppEvent::Error(msg));
            }
        }
    }

    // 命令通道关闭（界面退出），收尾
    if let Some(old) = controller.take() {
        old.shutdown();
    }
}

async fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        while let Ok(event) = evt_rx.try_recv() {
            app.apply_event(event);
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.handle_key_event(key.code) {
                        return Ok(());
                    }
                }
            }
        }
    }
}
