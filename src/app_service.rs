use crate::app_state::{AppEvent, FactorSummary};
use crate::session::dto::FactorListQuery;
use crate::session::FactorApi;
use log::warn;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 拉取一页因子列表并推给界面
///
/// 周期刷新里反复调用；失败只记日志，下一轮再试，不打扰界面。
pub async fn refresh_factor_list(
    api: &Arc<dyn FactorApi>,
    query: &FactorListQuery,
    tx: &mpsc::UnboundedSender<AppEvent>,
) {
    match api.user_factor_list(query).await {
        Ok(page) => {
            let list: Vec<FactorSummary> = page.data.iter().map(FactorSummary::from).collect();
            let _ = tx.send(AppEvent::Factors {
                list,
                total: page.total,
                page: page.page,
                total_pages: page.total_pages,
            });
        }
        Err(e) => {
            warn!("刷新因子列表失败: {}", e);
        }
    }
}
