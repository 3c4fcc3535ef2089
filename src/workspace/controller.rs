use crate::app_state::AppEvent;
use crate::session::dto::TaskLogsData;
use crate::session::FactorApi;
use crate::workspace::model::{RunError, RunSnapshot, RunState};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// 单个因子工作区的运行控制器
///
/// 生命周期：Idle → Starting → Running → Succeeded/Failed。
/// 进入 Running 后由一个后台任务按固定节拍轮询任务状态与增量日志，
/// 命中终态即停止；工作区销毁时调用 [`RunController::shutdown`]，
/// 在途响应到达后会被直接丢弃，不再触碰状态。
pub struct RunController {
    factor_id: String,
    api: Arc<dyn FactorApi>,
    evt_tx: mpsc::UnboundedSender<AppEvent>,
    poll_interval: Duration,
    inner: Arc<Mutex<RunSession>>,
    cancelled: Arc<AtomicBool>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

/// 控制器独占的会话状态：日志序列与游标只有这里会写
#[derive(Default)]
struct RunSession {
    state: RunState,
    task_id: Option<String>,
    last_status: Option<crate::session::dto::TaskStatusDto>,
    logs: Vec<crate::session::dto::LogEntry>,
    last_log_id: String,
}

impl RunController {
    pub fn new(
        factor_id: impl Into<String>,
        api: Arc<dyn FactorApi>,
        evt_tx: mpsc::UnboundedSender<AppEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            factor_id: factor_id.into(),
            api,
            evt_tx,
            poll_interval,
            inner: Arc::new(Mutex::new(RunSession::default())),
            cancelled: Arc::new(AtomicBool::new(false)),
            poll_task: StdMutex::new(None),
        }
    }

    pub fn factor_id(&self) -> &str {
        &self.factor_id
    }

    /// 发起一次运行
    ///
    /// Starting/Running 期间的重复调用是空操作，请求不会到达后端；
    /// 启动失败回到 Idle 并上报错误，不自动重试。
    pub async fn start_run(&self) -> Result<(), RunError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut s = self.inner.lock().await;
            if s.state.is_active() {
                let _ = self.evt_tx.send(AppEvent::Message(format!(
                    "因子 {} 已在运行中，忽略重复的运行请求",
                    self.factor_id
                )));
                return Ok(());
            }
            s.state = RunState::Starting;
        }
        self.send_state(RunState::Starting).await;

        match self.api.run_factor(&self.factor_id).await {
            Ok(started) => {
                if self.cancelled.load(Ordering::SeqCst) {
                    return Ok(());
                }
                let task_id = match started.task_id {
                    Some(id) if !id.is_empty() => id,
                    _ => {
                        let err = RunError::domain("run_factor 未返回 task_id");
                        self.back_to_idle(&err).await;
                        return Err(err);
                    }
                };
                info!("▶ 运行任务已创建 [{}]: {}", task_id, self.factor_id);
                let _ = self
                    .evt_tx
                    .send(AppEvent::Message(format!("任务已启动 [{}]", task_id)));
                self.begin_task(task_id).await;
                self.spawn_poll_loop();
                Ok(())
            }
            Err(e) => {
                let err = RunError::from(e);
                self.back_to_idle(&err).await;
                Err(err)
            }
        }
    }

    /// 接管一个已在后端运行的任务（打开工作区时因子状态里带了 task_id）
    pub async fn adopt_task(&self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        let _ = self
            .evt_tx
            .send(AppEvent::Message(format!("接管运行中的任务 [{}]", task_id)));
        self.begin_task(task_id).await;
        self.spawn_poll_loop();
    }

    /// 进入 Running：换任务时日志与游标清零，新任务的日志流从头开始
    pub async fn begin_task(&self, task_id: String) {
        let applied = self
            .apply(|s| {
                s.task_id = Some(task_id.clone());
                s.state = RunState::Running;
                s.last_status = None;
                s.logs.clear();
                s.last_log_id.clear();
            })
            .await;
        if applied {
            let _ = self.evt_tx.send(AppEvent::TaskChanged(Some(task_id)));
            self.send_state(RunState::Running).await;
        }
    }

    /// 启动轮询后台任务，旧的定时任务先显式清掉，不跨运行周期堆积
    pub fn spawn_poll_loop(&self) {
        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
        let api = self.api.clone();
        let inner = self.inner.clone();
        let cancelled = self.cancelled.clone();
        let evt_tx = self.evt_tx.clone();
        let period = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // 慢响应时顺延下一拍，保证同一时刻只有一个在途轮询
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if poll_tick(&api, &inner, &cancelled, &evt_tx).await {
                    break;
                }
            }
        });
        *self.poll_task.lock().unwrap() = Some(handle);
    }

    /// 执行一拍轮询（状态 + 增量日志），返回是否已到终态
    pub async fn poll_once(&self) -> bool {
        poll_tick(&self.api, &self.inner, &self.cancelled, &self.evt_tx).await
    }

    /// 手动刷新日志：在定时节拍之外补一次拉取，不影响定时器
    pub async fn refresh_logs(&self) {
        let (task_id, cursor) = {
            let s = self.inner.lock().await;
            match &s.task_id {
                Some(id) => (id.clone(), s.last_log_id.clone()),
                None => {
                    let _ = self
                        .evt_tx
                        .send(AppEvent::Message("暂无运行任务，无日志可刷新".to_string()));
                    return;
                }
            }
        };
        match self.api.task_logs(&task_id, &cursor).await {
            Ok(batch) => {
                merge_logs(&self.inner, &self.cancelled, &self.evt_tx, &task_id, batch).await;
            }
            Err(e) => {
                let _ = self
                    .evt_tx
                    .send(AppEvent::Error(format!("刷新日志失败: {}", e)));
            }
        }
    }

    /// 销毁控制器：取消标记 + 中止轮询任务。
    /// 之后到达的任何响应都会被丢弃，状态不再变化。
    pub fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// 等待轮询任务退出（终态或被中止）
    pub async fn wait_until_stopped(&self) {
        let handle = self.poll_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let s = self.inner.lock().await;
        RunSnapshot {
            state: s.state,
            task_id: s.task_id.clone(),
            last_status: s.last_status.clone(),
            logs: s.logs.clone(),
            last_log_id: s.last_log_id.clone(),
        }
    }

    /// 所有状态写入的统一入口：销毁后一律拒绝
    async fn apply<F: FnOnce(&mut RunSession)>(&self, f: F) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let mut s = self.inner.lock().await;
        f(&mut s);
        true
    }

    async fn back_to_idle(&self, err: &RunError) {
        self.apply(|s| s.state = RunState::Idle).await;
        self.send_state(RunState::Idle).await;
        let _ = self
            .evt_tx
            .send(AppEvent::Error(format!("启动运行失败: {}", err)));
    }

    async fn send_state(&self, state: RunState) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.evt_tx.send(AppEvent::RunState(state));
    }
}

/// 一拍轮询。终态（或任务已不在 Running）返回 true，轮询循环随即退出。
///
/// 拉取失败按瞬态处理：上报但不停止轮询，只有一次成功的状态响应
/// 命中终止条件才会结束循环。
async fn poll_tick(
    api: &Arc<dyn FactorApi>,
    inner: &Arc<Mutex<RunSession>>,
    cancelled: &Arc<AtomicBool>,
    evt_tx: &mpsc::UnboundedSender<AppEvent>,
) -> bool {
    let task_id = {
        let s = inner.lock().await;
        match (&s.state, &s.task_id) {
            (RunState::Running, Some(id)) => id.clone(),
            _ => return true,
        }
    };

    let mut terminal: Option<RunState> = None;
    let mut terminal_error: Option<String> = None;

    match api.query_task_status(&task_id).await {
        Ok(status) => {
            // 响应落地前先查销毁标记，迟到的响应不允许改状态
            if cancelled.load(Ordering::SeqCst) {
                return true;
            }
            let mut s = inner.lock().await;
            if s.task_id.as_deref() == Some(task_id.as_str()) {
                s.last_status = Some(status.clone());
                if status.is_terminal() {
                    let next = if status.is_failed() {
                        RunState::Failed
                    } else {
                        RunState::Succeeded
                    };
                    s.state = next;
                    terminal = Some(next);
                    terminal_error = status.error_message.clone();
                }
                drop(s);
                let _ = evt_tx.send(AppEvent::TaskStatus(status));
            }
        }
        Err(e) => {
            warn!("轮询任务状态失败 [{}]: {}", task_id, e);
            let _ = evt_tx.send(AppEvent::Log(format!("⚠ 任务状态拉取失败: {}", e)));
        }
    }

    // 终态当拍仍拉一次日志，避免漏掉收尾输出
    let cursor = { inner.lock().await.last_log_id.clone() };
    match api.task_logs(&task_id, &cursor).await {
        Ok(batch) => {
            merge_logs(inner, cancelled, evt_tx, &task_id, batch).await;
        }
        Err(e) => {
            warn!("轮询任务日志失败 [{}]: {}", task_id, e);
            let _ = evt_tx.send(AppEvent::Log(format!("⚠ 任务日志拉取失败: {}", e)));
        }
    }

    match terminal {
        Some(RunState::Succeeded) => {
            info!("✓ 任务运行成功 [{}]", task_id);
            let _ = evt_tx.send(AppEvent::RunState(RunState::Succeeded));
            let _ = evt_tx.send(AppEvent::Message(format!("✓ 任务运行成功 [{}]", task_id)));
            true
        }
        Some(RunState::Failed) => {
            let msg = terminal_error.unwrap_or_else(|| "未知错误".to_string());
            warn!("✗ 任务运行失败 [{}]: {}", task_id, msg);
            let _ = evt_tx.send(AppEvent::RunState(RunState::Failed));
            let _ = evt_tx.send(AppEvent::Error(format!("✗ 任务运行失败: {}", msg)));
            true
        }
        _ => terminal.is_some(),
    }
}

/// 合并一批增量日志：追加保持到达顺序，游标只前进不回退
async fn merge_logs(
    inner: &Arc<Mutex<RunSession>>,
    cancelled: &Arc<AtomicBool>,
    evt_tx: &mpsc::UnboundedSender<AppEvent>,
    task_id: &str,
    batch: TaskLogsData,
) {
    if cancelled.load(Ordering::SeqCst) {
        return;
    }
    let mut s = inner.lock().await;
    // 任务已切换则整批丢弃，避免旧任务日志混入新流
    if s.task_id.as_deref() != Some(task_id) {
        return;
    }
    if !batch.logs.is_empty() {
        s.logs.extend(batch.logs.iter().cloned());
    }
    if let Some(next) = batch.last_log_id {
        advance_cursor(&mut s.last_log_id, &next);
    }
    drop(s);
    if !batch.logs.is_empty() {
        let _ = evt_tx.send(AppEvent::TaskLogs(batch.logs));
    }
}

/// 游标单调性：两端都是数字时比大小，否则非空即覆盖
fn advance_cursor(current: &mut String, next: &str) {
    if next.is_empty() {
        return;
    }
    if let (Ok(cur), Ok(nxt)) = (current.parse::<u64>(), next.parse::<u64>()) {
        if nxt <= cur {
            return;
        }
    }
    *current = next.to_string();
}

#[cfg(test)]
mod tests {
    use super::advance_cursor;

    #[test]
    fn cursor_never_regresses() {
        let mut cur = String::new();
        advance_cursor(&mut cur, "3");
        assert_eq!(cur, "3");
        advance_cursor(&mut cur, "");
        assert_eq!(cur, "3");
        advance_cursor(&mut cur, "2");
        assert_eq!(cur, "3");
        advance_cursor(&mut cur, "5");
        assert_eq!(cur, "5");
    }

    #[test]
    fn cursor_accepts_opaque_ids() {
        let mut cur = "log-a".to_string();
        advance_cursor(&mut cur, "log-b");
        assert_eq!(cur, "log-b");
    }
}
