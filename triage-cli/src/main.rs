mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_client::{ApiClient, FetchResult};
use triage_core::{AssessmentReport, FetchMeta};
use triage_vitals::{assess_records, assess_records_str};

use crate::config::{AppConfig, Overrides};

#[derive(Parser, Debug)]
#[command(
    name = "triage",
    about = "Tải dữ liệu bệnh nhân, chấm điểm nguy cơ và nộp danh sách cảnh báo."
)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Default)]
struct ConnectionArgs {
    /// Base URL của API (mặc định lấy từ TRIAGE_BASE_URL).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// API key (mặc định lấy từ TRIAGE_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,
    /// Số bản ghi mỗi trang, tối đa 20.
    #[arg(long, global = true)]
    page_size: Option<u32>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    max_retries: Option<u32>,
    #[arg(long, global = true)]
    max_pages: Option<u64>,
}

impl From<ConnectionArgs> for Overrides {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            base_url: args.base_url,
            api_key: args.api_key,
            page_size: args.page_size,
            timeout_secs: args.timeout_secs,
            max_retries: args.max_retries,
            max_pages: args.max_pages,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tải toàn bộ các trang và in `{patients, meta}`.
    Fetch {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Tải, chấm điểm và in báo cáo đầy đủ.
    Assess {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Chấm điểm một file JSON đã lưu, không cần mạng.
    Score {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Tải, chấm điểm rồi nộp danh sách cảnh báo nếu dữ liệu đầy đủ.
    Submit {
        /// Chỉ in nội dung sẽ nộp.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("triage=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Args {
        connection,
        command,
    } = Args::parse();

    match command {
        Command::Score { input } => score_file(&input),
        Command::Fetch { output } => {
            let (client, config) = connect(connection)?;
            let result = fetch(&client, &config).await?;
            emit(&serde_json::to_string_pretty(&result)?, output.as_deref())
        }
        Command::Assess { output } => {
            let (client, config) = connect(connection)?;
            let report = assess(&client, &config).await?;
            emit(&serde_json::to_string_pretty(&report)?, output.as_deref())
        }
        Command::Submit { dry_run } => {
            let (client, config) = connect(connection)?;
            submit(&client, &config, dry_run).await
        }
    }
}

fn connect(connection: ConnectionArgs) -> anyhow::Result<(ApiClient, AppConfig)> {
    let config = config::resolve(connection.into(), |key| std::env::var(key).ok())?;
    let client = ApiClient::new(config.base_url(), config.api_key(), config.transport())
        .context("Không khởi tạo được HTTP client")?;
    Ok((client, config))
}

async fn fetch(client: &ApiClient, config: &AppConfig) -> anyhow::Result<FetchResult> {
    tracing::info!(base_url = config.base_url(), "++ Fetching patients");
    client
        .fetch_all(config.fetch())
        .await
        .context("Không tải được danh sách bệnh nhân")
}

async fn assess(client: &ApiClient, config: &AppConfig) -> anyhow::Result<AssessmentReport> {
    let result = fetch(client, config).await?;
    let risks = assess_records(&result.patients);
    let report = AssessmentReport::new(result.meta, risks);
    log_summary(&report);
    Ok(report)
}

async fn submit(client: &ApiClient, config: &AppConfig, dry_run: bool) -> anyhow::Result<()> {
    let report = assess(client, config).await?;
    report
        .meta
        .ensure_complete()
        .context("Từ chối nộp: dữ liệu chưa đầy đủ")?;

    if dry_run {
        println!("{}", serde_json::to_string_pretty(report.alerts())?);
        return Ok(());
    }

    let answer = client
        .submit_assessment(report.alerts())
        .await
        .context("Nộp kết quả thất bại")?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

fn score_file(input: &Path) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(input)
        .with_context(|| format!("Không đọc được file {:?}", input))?;
    let risks = assess_records_str(&data)?;
    let report = AssessmentReport::new(FetchMeta::default(), risks);
    log_summary(&report);
    emit(&serde_json::to_string_pretty(&report)?, None)
}

fn log_summary(report: &AssessmentReport) {
    tracing::info!(
        patients = report.patients.len(),
        high_risk = report.alerts.high_risk_patients.len(),
        fever = report.alerts.fever_patients.len(),
        data_quality = report.alerts.data_quality_issues.len(),
        complete = report.meta.complete,
        "++ Assessment ready"
    );
}

fn emit(text: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Không ghi được file {:?}", path)),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
