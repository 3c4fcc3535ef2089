use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AppCommand {
    List {
        page: Option<u64>,
    },
    Sort {
        field: String,
        order: String,
    },
    Open {
        factor_id: String,
    },
    /// 不带 id 时运行当前工作区的因子
    Run {
        factor_id: Option<String>,
    },
    /// 停止当前工作区的轮询（销毁控制器）
    Stop,
    /// 手动刷新一次日志
    Logs,
    /// 拉取报告（六路查询）
    Report,
    Create {
        name: String,
    },
    Rename {
        factor_id: String,
        name: String,
    },
    Delete {
        factor_id: String,
    },
    Help,
    Quit,
    Unknown(String),
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "list" | "ls" => {
                let page = parts.get(1).and_then(|s| s.parse::<u64>().ok());
                Ok(AppCommand::List { page })
            }
            "sort" => {
                if let Some(field) = parts.get(1) {
                    let order = parts
                        .get(2)
                        .map(|s| s.to_ascii_lowercase())
                        .filter(|s| s == "asc" || s == "desc")
                        .unwrap_or_else(|| "desc".to_string());
                    Ok(AppCommand::Sort {
                        field: field.to_string(),
                        order,
                    })
                } else {
                    Ok(AppCommand::Unknown(
                        "用法: sort <created_at|updated_at|name|sharpe_ratio> [asc|desc]"
                            .to_string(),
                    ))
                }
            }
            "open" => {
                if let Some(id) = parts.get(1) {
                    Ok(AppCommand::Open {
                        factor_id: id.to_string(),
                    })
                } else {
                    Ok(AppCommand::Unknown("用法: open <factor_id>".to_string()))
                }
            }
            "run" => Ok(AppCommand::Run {
                factor_id: parts.get(1).map(|s| s.to_string()),
            }),
            "stop" => Ok(AppCommand::Stop),
            "logs" => Ok(AppCommand::Logs),
            "report" => Ok(AppCommand::Report),
            "new" => {
                let name = parts[1..].join(" ");
                if name.is_empty() {
                    Ok(AppCommand::Unknown("用法: new <name>".to_string()))
                } else {
                    Ok(AppCommand::Create { name })
                }
            }
            "rename" => {
                if parts.len() >= 3 {
                    Ok(AppCommand::Rename {
                        factor_id: parts[1].to_string(),
                        name: parts[2..].join(" "),
                    })
                } else {
                    Ok(AppCommand::Unknown(
                        "用法: rename <factor_id> <name>".to_string(),
                    ))
                }
            }
            "delete" => {
                if let Some(id) = parts.get(1) {
                    Ok(AppCommand::Delete {
                        factor_id: id.to_string(),
                    })
                } else {
                    Ok(AppCommand::Unknown("用法: delete <factor_id>".to_string()))
                }
            }
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_commands() {
        assert!(matches!(
            AppCommand::from_str("list 2"),
            Ok(AppCommand::List { page: Some(2) })
        ));
        assert!(matches!(
            AppCommand::from_str("run factor_1001"),
            Ok(AppCommand::Run { factor_id: Some(id) }) if id == "factor_1001"
        ));
        assert!(matches!(
            AppCommand::from_str("sort sharpe_ratio asc"),
            Ok(AppCommand::Sort { field, order }) if field == "sharpe_ratio" && order == "asc"
        ));
        assert!(matches!(AppCommand::from_str("q"), Ok(AppCommand::Quit)));
    }

    #[test]
    fn bad_usage_becomes_unknown() {
        assert!(matches!(
            AppCommand::from_str("open"),
            Ok(AppCommand::Unknown(_))
        ));
        assert!(matches!(
            AppCommand::from_str("rename factor_1001"),
            Ok(AppCommand::Unknown(_))
        ));
    }
}
