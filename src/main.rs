// ==========================================
// KML 批量导入 - 命令行入口
// ==========================================
// 用法: kml-gis-import <INPUT_DIR> [--db PATH] [--schema NAME] [--srid N]
//                      [--report PATH] [--config FILE] [--json-logs]
// 退出码: 0 = 批次完成（含部分失败），1 = 致命错误（无汇总）
// ==========================================

use anyhow::{bail, Context};
use clap::Parser;
use kml_gis_import::config::{ImportConfig, LogFormat};
use kml_gis_import::{
    db, logging, render_summary_text, ImportError, JsonReportSink, KmlBatchImporter, KmlImporter,
    ReportSink,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "kml-gis-import", version, about = "KML 批量导入空间数据库")]
struct Cli {
    /// 输入目录（递归扫描 .kml 文件）
    input_dir: PathBuf,

    /// 数据库文件路径
    #[arg(long)]
    db: Option<PathBuf>,

    /// 目标命名空间
    #[arg(long)]
    schema: Option<String>,

    /// 几何空间参考
    #[arg(long)]
    srid: Option<i32>,

    /// JSON 汇总报告输出路径
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    json_logs: bool,
}

fn build_config(cli: &Cli) -> anyhow::Result<ImportConfig> {
    let mut config = ImportConfig::load(cli.config.as_deref()).context("配置加载失败")?;

    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(schema) = &cli.schema {
        config.schema_name = schema.clone();
    }
    if let Some(srid) = cli.srid {
        config.srid = srid;
    }
    if let Some(report) = &cli.report {
        config.report_path = Some(report.clone());
    }
    if cli.json_logs {
        config.log_format = LogFormat::Json;
    }

    config.validate().context("配置校验失败")?;
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;
    logging::init(config.log_format);

    tracing::info!("==================================================");
    tracing::info!("{} v{}", kml_gis_import::APP_NAME, kml_gis_import::VERSION);
    tracing::info!("==================================================");

    if !cli.input_dir.is_dir() {
        bail!(ImportError::DirectoryNotFound(
            cli.input_dir.display().to_string()
        ));
    }

    tracing::info!(db = %config.db_path.display(), schema = %config.schema_name, "使用数据库");
    let conn = db::open_sqlite_connection(&config.db_path)
        .with_context(|| format!("无法打开数据库: {}", config.db_path.display()))?;

    let importer = KmlBatchImporter::new(db::shared(conn), &config);
    let summary = importer.import_batch(&cli.input_dir)?;

    println!("{}", render_summary_text(&summary));

    if let Some(path) = &config.report_path {
        JsonReportSink::new(path).write_summary(&summary)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "导入中止");
            eprintln!("错误: {:#}", e);
            ExitCode::from(1)
        }
    }
}
