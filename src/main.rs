use std::path::PathBuf;

use anyhow::{bail, Result};
use attendance_scraper::utils::logging;
use attendance_scraper::{App, Config, JobKey};

const USAGE: &str = "用法: attendance_scraper [config.toml] [status <学号>]";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    // 第一个参数不是子命令时视为配置文件
    let config_path = if args.first().is_some_and(|first| first != "status") {
        Some(PathBuf::from(args.remove(0)))
    } else {
        None
    };

    // 加载配置
    let config = Config::load(config_path.as_deref())?;

    // 初始化日志
    logging::init(config.verbose_logging);

    match args.as_slice() {
        [] => {
            let app = App::initialize(config).await?;
            app.run().await?;
        }
        [command, key] if command == "status" => {
            let app = App::initialize(config).await?;
            let report = app.show_student(&JobKey::new(key.as_str())).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
