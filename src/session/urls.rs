/// Panda 后端 API 默认地址（可通过 PANDA_API_BASE 覆盖）
pub const DEFAULT_API_BASE: &str = "http://localhost:8111/api/v1";

/// 因子相关接口
pub const PATH_USER_FACTOR_LIST: &str = "/user_factor_list";
pub const PATH_QUERY_FACTOR: &str = "/query_factor";
pub const PATH_CREATE_FACTOR: &str = "/create_factor";
pub const PATH_UPDATE_FACTOR: &str = "/update_factor";
pub const PATH_DELETE_FACTOR: &str = "/delete_factor";
pub const PATH_QUERY_FACTOR_STATUS: &str = "/query_factor_status";
pub const PATH_RUN_FACTOR: &str = "/run_factor";

/// 任务相关接口
pub const PATH_QUERY_TASK_STATUS: &str = "/query_task_status";
pub const PATH_TASK_LOGS: &str = "/task_logs";

/// 报告相关接口
pub const PATH_FACTOR_ANALYSIS_DATA: &str = "/query_factor_analysis_data";
pub const PATH_GROUP_RETURN_ANALYSIS: &str = "/query_group_return_analysis";
pub const PATH_RETURN_CHART: &str = "/query_return_chart";
pub const PATH_IC_SEQUENCE_CHART: &str = "/query_ic_sequence_chart";
pub const PATH_RANK_IC_SEQUENCE_CHART: &str = "/query_rank_ic_sequence_chart";
pub const PATH_LAST_DATE_TOP_FACTOR: &str = "/query_last_date_top_factor";

/// 拼接查询串，空值参数直接跳过
pub fn build_url(base: &str, path: &str, params: &[(&str, String)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    if query.is_empty() {
        format!("{}{}", base, path)
    } else {
        format!("{}{}?{}", base, path, query.join("&"))
    }
}
