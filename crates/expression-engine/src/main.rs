//! 表达式评估命令行
//!
//! 从文件或标准输入逐行读取 JSON 事件（NDJSON），对每个事件评估同一个表达式，
//! 输出 true / false / error，最后输出缓存统计。

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use expression_engine::{EngineError, ExpressionEngine};
use filter_shared::config::AppConfig;
use filter_shared::observability;
use tracing::{info, warn};

const SERVICE_NAME: &str = "filter-eval";

#[derive(Debug, Parser)]
#[command(name = "filter-eval", version, about = "对 NDJSON 事件评估布尔表达式")]
struct Args {
    /// 要评估的表达式
    #[arg(short, long)]
    expr: String,

    /// 输入文件，缺省读取标准输入
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 配置目录，缺省取 CONFIG_DIR 环境变量或 ./config
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Summary {
    matched: u64,
    unmatched: u64,
    failed: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config_dir {
        Some(dir) => AppConfig::load_from(dir, SERVICE_NAME),
        None => AppConfig::load(SERVICE_NAME),
    }
    .unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
    observability::init(&obs_config)?;

    let engine = ExpressionEngine::new(config.engine.clone()).context("创建表达式引擎失败")?;
    info!(expression = %args.expr, "开始评估");

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("无法打开输入文件 {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut summary = Summary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("读取输入失败")?;
        if line.trim().is_empty() {
            continue;
        }

        match engine.evaluate(&args.expr, line) {
            Ok(true) => {
                summary.matched += 1;
                writeln!(out, "true")?;
            }
            Ok(false) => {
                summary.unmatched += 1;
                writeln!(out, "false")?;
            }
            Err(e) => {
                summary.failed += 1;
                report(line_no + 1, &e);
                writeln!(out, "error: {}", e)?;
                // 表达式本身有问题时后续事件不会成功
                if matches!(
                    e,
                    EngineError::Compile { .. } | EngineError::ProgramConstruction { .. }
                ) {
                    break;
                }
            }
        }
    }

    let stats = engine.stats();
    writeln!(
        out,
        "summary: matched={} unmatched={} failed={}",
        summary.matched, summary.unmatched, summary.failed
    )?;
    writeln!(out, "cache: {}", serde_json::to_string(&stats)?)?;

    Ok(())
}

fn report(line: usize, error: &EngineError) {
    let metadata = error.metadata();
    if error.is_input_error() {
        warn!(line, code = error.code(), "跳过无效输入: {}", error);
    } else {
        warn!(line, ?metadata, "评估失败: {}", error);
    }
}
