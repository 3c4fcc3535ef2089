//! 运行控制器的时序行为：终态停轮询、游标单调、重复启动防抖、
//! 销毁后丢弃在途响应。后端用脚本化的 FactorApi 假实现，
//! 时钟用 tokio 的 paused time 控制。

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};

use rustpanda::app_state::AppEvent;
use rustpanda::session::dto::{
    ChartData, FactorDto, FactorListData, FactorListQuery, FactorStatusData, FactorUpsert,
    LogEntry, RunStarted, TaskLogsData, TaskStatusDto,
};
use rustpanda::session::{ApiError, FactorApi};
use rustpanda::workspace::{RunController, RunErrorKind, RunState};

/// 脚本化后端：状态与日志按队列出队，队列耗尽后给默认值
#[derive(Default)]
struct ScriptedApi {
    run_calls: AtomicUsize,
    status_calls: AtomicUsize,
    /// None 表示该次状态查询返回传输错误
    statuses: Mutex<VecDeque<Option<TaskStatusDto>>>,
    log_batches: Mutex<VecDeque<TaskLogsData>>,
    /// 每次 task_logs 收到的游标，用于断言增量拉取
    seen_cursors: Mutex<Vec<String>>,
    run_gate: Option<Arc<Notify>>,
    status_gate: Option<Arc<Notify>>,
    run_fails: AtomicBool,
}

impl ScriptedApi {
    fn with_statuses(statuses: Vec<Option<TaskStatusDto>>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            ..Default::default()
        }
    }

    fn with_log_batches(batches: Vec<TaskLogsData>) -> Self {
        Self {
            log_batches: Mutex::new(batches.into()),
            ..Default::default()
        }
    }

    fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }
}

fn st(progress: i64) -> Option<TaskStatusDto> {
    Some(TaskStatusDto {
        process_status: Some(progress),
        ..Default::default()
    })
}

fn batch(messages: &[&str], cursor: Option<&str>) -> TaskLogsData {
    TaskLogsData {
        logs: messages
            .iter()
            .map(|m| LogEntry::new("10:00:00", "INFO", *m))
            .collect(),
        last_log_id: cursor.map(|c| c.to_string()),
    }
}

fn unscripted<T>() -> Result<T, ApiError> {
    Err(ApiError::Backend {
        code: "500".to_string(),
        message: "not scripted".to_string(),
    })
}

#[async_trait]
impl FactorApi for ScriptedApi {
    async fn user_factor_list(&self, _q: &FactorListQuery) -> Result<FactorListData, ApiError> {
        unscripted()
    }

    async fn query_factor(&self, _id: &str) -> Result<FactorDto, ApiError> {
        unscripted()
    }

    async fn create_factor(&self, _p: &FactorUpsert) -> Result<String, ApiError> {
        unscripted()
    }

    async fn update_factor(&self, _id: &str, _p: &FactorUpsert) -> Result<String, ApiError> {
        unscripted()
    }

    async fn delete_factor(&self, _id: &str) -> Result<(), ApiError> {
        unscripted()
    }

    async fn query_factor_status(&self, _id: &str) -> Result<FactorStatusData, ApiError> {
        unscripted()
    }

    async fn run_factor(&self, _factor_id: &str) -> Result<RunStarted, ApiError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.run_gate {
            gate.notified().await;
        }
        if self.run_fails.load(Ordering::SeqCst) {
            return Err(ApiError::Http(502));
        }
        Ok(RunStarted {
            task_id: Some("task_0001".to_string()),
        })
    }

    async fn query_task_status(&self, _task_id: &str) -> Result<TaskStatusDto, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.status_gate {
            gate.notified().await;
        }
        match self.statuses.lock().await.pop_front() {
            Some(Some(status)) => Ok(status),
            Some(None) => Err(ApiError::Network("connection refused".to_string())),
            None => Ok(TaskStatusDto {
                process_status: Some(10),
                ..Default::default()
            }),
        }
    }

    async fn task_logs(&self, _task_id: &str, last_log_id: &str) -> Result<TaskLogsData, ApiError> {
        self.seen_cursors.lock().await.push(last_log_id.to_string());
        Ok(self
            .log_batches
            .lock()
            .await
            .pop_front()
            .unwrap_or_default())
    }

    async fn factor_analysis_data(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        unscripted()
    }

    async fn group_return_analysis(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        unscripted()
    }

    async fn return_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        unscripted()
    }

    async fn ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        unscripted()
    }

    async fn rank_ic_sequence_chart(&self, _t: &str) -> Result<ChartData, ApiError> {
        unscripted()
    }

    async fn last_date_top_factor(&self, _t: &str) -> Result<Vec<Value>, ApiError> {
        unscripted()
    }
}

fn controller(api: Arc<ScriptedApi>) -> (Arc<RunController>, mpsc::UnboundedReceiver<AppEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let api: Arc<dyn FactorApi> = api;
    let ctl = Arc::new(RunController::new(
        "factor_1001",
        api,
        tx,
        Duration::from_secs(5),
    ));
    (ctl, rx)
}

#[tokio::test(start_paused = true)]
async fn poll_loop_stops_after_terminal_status() {
    // 42 -> 100：第二次状态查询命中终态，循环必须停止
    let api = Arc::new(ScriptedApi::with_statuses(vec![st(42), st(100)]));
    let (ctl, _rx) = controller(api.clone());

    ctl.start_run().await.unwrap();
    ctl.wait_until_stopped().await;

    assert_eq!(api.status_calls(), 2, "恰好两次状态查询后停止");
    let snap = ctl.snapshot().await;
    assert_eq!(snap.state, RunState::Succeeded);

    // 终态之后再过很久也不该有新的轮询
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn error_message_means_failed() {
    let api = Arc::new(ScriptedApi::with_statuses(vec![Some(TaskStatusDto {
        process_status: Some(30),
        error_message: Some("数据缺失".to_string()),
        ..Default::default()
    })]));
    let (ctl, _rx) = controller(api.clone());

    ctl.start_run().await.unwrap();
    ctl.wait_until_stopped().await;

    let snap = ctl.snapshot().await;
    assert_eq!(snap.state, RunState::Failed);
    assert_eq!(api.status_calls(), 1);
}

#[tokio::test]
async fn log_cursor_is_monotonic_and_incremental() {
    let api = Arc::new(ScriptedApi::with_log_batches(vec![
        batch(&["第一批"], Some("3")),
        batch(&[], None),
        batch(&["第二批"], Some("5")),
    ]));
    let (ctl, _rx) = controller(api.clone());

    ctl.begin_task("task_0001".to_string()).await;
    for _ in 0..3 {
        let done = ctl.poll_once().await;
        assert!(!done, "非终态轮询不应停止");
    }

    let snap = ctl.snapshot().await;
    assert_eq!(snap.last_log_id, "5");
    assert_eq!(snap.logs.len(), 2);
    // 无游标的响应不回退游标：第三次请求仍带 "3"
    assert_eq!(
        *api.seen_cursors.lock().await,
        vec!["".to_string(), "3".to_string(), "3".to_string()]
    );
}

#[tokio::test]
async fn duplicate_start_is_noop() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedApi {
        run_gate: Some(gate.clone()),
        ..Default::default()
    });
    let (ctl, _rx) = controller(api.clone());

    // 第一次 start 卡在 run_factor 上（Starting 状态）
    let first = {
        let ctl = ctl.clone();
        tokio::spawn(async move { ctl.start_run().await })
    };
    tokio::task::yield_now().await;

    // Starting 期间的第二次 start 是空操作，不产生第二次任务创建
    ctl.start_run().await.unwrap();
    assert_eq!(api.run_calls(), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert_eq!(api.run_calls(), 1);

    let snap = ctl.snapshot().await;
    assert_eq!(snap.task_id.as_deref(), Some("task_0001"));
    ctl.shutdown();
}

#[tokio::test]
async fn teardown_discards_inflight_response() {
    let gate = Arc::new(Notify::new());
    let api = Arc::new(ScriptedApi {
        status_gate: Some(gate.clone()),
        statuses: Mutex::new(vec![st(77)].into()),
        ..Default::default()
    });
    let (ctl, _rx) = controller(api.clone());

    ctl.begin_task("task_0001".to_string()).await;
    let snap_before = ctl.snapshot().await;

    // 轮询卡在状态查询上，此时销毁控制器，再放行响应
    let poll = {
        let ctl = ctl.clone();
        tokio::spawn(async move { ctl.poll_once().await })
    };
    tokio::task::yield_now().await;
    ctl.shutdown();
    gate.notify_one();
    poll.await.unwrap();

    // 迟到的响应不允许改状态
    let snap_after = ctl.snapshot().await;
    assert!(snap_after.last_status.is_none());
    assert!(snap_after.logs.is_empty());
    assert_eq!(snap_after.state, snap_before.state);
}

#[tokio::test]
async fn transient_poll_failure_keeps_polling() {
    let api = Arc::new(ScriptedApi::with_statuses(vec![None, st(50), st(100)]));
    let (ctl, _rx) = controller(api.clone());

    ctl.begin_task("task_0001".to_string()).await;
    assert!(!ctl.poll_once().await, "传输失败按瞬态处理，不停止");
    assert!(!ctl.poll_once().await);
    assert!(ctl.poll_once().await, "成功响应命中终态才停止");
    assert_eq!(api.status_calls(), 3);
    assert_eq!(ctl.snapshot().await.state, RunState::Succeeded);
}

#[tokio::test]
async fn failed_start_returns_to_idle() {
    let api = Arc::new(ScriptedApi::default());
    api.run_fails.store(true, Ordering::SeqCst);
    let (ctl, _rx) = controller(api.clone());

    let err = ctl.start_run().await.unwrap_err();
    assert_eq!(err.kind, RunErrorKind::Transport);
    assert_eq!(ctl.snapshot().await.state, RunState::Idle);

    // 回到 Idle 后允许再次尝试（不会被防抖挡住）
    api.run_fails.store(false, Ordering::SeqCst);
    ctl.start_run().await.unwrap();
    assert_eq!(api.run_calls(), 2);
    ctl.shutdown();
}

#[tokio::test]
async fn new_task_resets_logs_and_cursor() {
    let api = Arc::new(ScriptedApi::with_log_batches(vec![batch(
        &["旧任务日志"],
        Some("3"),
    )]));
    let (ctl, mut rx) = controller(api.clone());

    ctl.begin_task("task_0001".to_string()).await;
    ctl.poll_once().await;
    let snap = ctl.snapshot().await;
    assert_eq!(snap.logs.len(), 1);
    assert_eq!(snap.last_log_id, "3");

    // 换任务：日志与游标清零，新任务的流从头开始
    ctl.begin_task("task_0002".to_string()).await;
    let snap = ctl.snapshot().await;
    assert_eq!(snap.task_id.as_deref(), Some("task_0002"));
    assert!(snap.logs.is_empty());
    assert_eq!(snap.last_log_id, "");
    ctl.shutdown();

    // 界面侧也能看到任务切换事件
    let mut saw_switch = false;
    while let Ok(evt) = rx.try_recv() {
        if matches!(&evt, AppEvent::TaskChanged(Some(id)) if id == "task_0002") {
            saw_switch = true;
        }
    }
    assert!(saw_switch);
}

#[tokio::test]
async fn manual_refresh_uses_current_cursor() {
    let api = Arc::new(ScriptedApi::with_log_batches(vec![
        batch(&["a"], Some("2")),
        batch(&["b"], Some("4")),
    ]));
    let (ctl, _rx) = controller(api.clone());

    ctl.begin_task("task_0001".to_string()).await;
    ctl.refresh_logs().await;
    ctl.refresh_logs().await;

    let snap = ctl.snapshot().await;
    assert_eq!(snap.logs.len(), 2);
    assert_eq!(snap.last_log_id, "4");
    assert_eq!(
        *api.seen_cursors.lock().await,
        vec!["".to_string(), "2".to_string()]
    );
}
