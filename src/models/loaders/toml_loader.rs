use crate::models::Credential;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 账号清单文件
///
/// ```toml
/// [[accounts]]
/// username = "BE23CS060"
/// password = "******"
/// ```
#[derive(Debug, Deserialize)]
struct AccountList {
    #[serde(default)]
    accounts: Vec<Credential>,
}

/// 从 TOML 文件加载待抓取的账号
pub async fn load_accounts(path: &Path) -> Result<Vec<Credential>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取账号文件: {}", path.display()))?;

    parse_accounts(&content).with_context(|| format!("无法解析账号文件: {}", path.display()))
}

/// 解析账号清单，跳过学号为空的条目
pub fn parse_accounts(content: &str) -> Result<Vec<Credential>> {
    let list: AccountList = toml::from_str(content)?;

    let mut accounts = Vec::with_capacity(list.accounts.len());
    for account in list.accounts {
        if account.username.trim().is_empty() {
            tracing::warn!("跳过学号为空的账号条目");
            continue;
        }
        accounts.push(account);
    }

    tracing::info!("成功加载 {} 个账号", accounts.len());
    Ok(accounts)
}
