//! 证件批量提取命令行
//!
//! ```bash
//! doc-extract cnic_front.png cnic_back.png
//! doc-extract ./scans --concurrency 8 --json
//! doc-extract ./scans --config uploader.toml --check
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use doc_extract_uploader::app::{format_reports, App, RunOptions};
use doc_extract_uploader::utils::logging;
use doc_extract_uploader::Config;

/// 把证件图片批量提交到提取后端，并输出每个文件的结果
#[derive(Parser)]
#[command(name = "doc-extract", version, about)]
struct Cli {
    /// 文件或目录
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 后端地址（覆盖配置）
    #[arg(long)]
    backend: Option<String>,

    /// 最大并发上传数（覆盖配置）
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,

    /// 提交前检查后端健康状态
    #[arg(long)]
    check: bool,

    /// 以 JSON 输出结果
    #[arg(long)]
    json: bool,

    /// 显示详细日志
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend_base_url = backend;
    }
    if let Some(concurrency) = cli.concurrency {
        config.max_concurrent_uploads = concurrency;
    }
    config.verbose_logging |= cli.verbose;
    config.validate()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let options = RunOptions {
        paths: cli.paths,
        check_backend: cli.check,
    };

    // 初始化并运行应用
    let outcome = App::initialize(config, options)?.run().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome.reports)?);
    } else {
        print!("{}", format_reports(&outcome.reports));
    }

    if outcome.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
