use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rucase::config::{ConfigLoader, RucaseConfig};
use rucase::runner::{DependencyResolver, TestReporter};
use rucase::{CaseFilter, CaseLoader, Executor, RunSettings, TestCaseRecord, VariablePool};

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 执行用例文件
    Run(RunArgs),
    /// 解析依赖并打印每条用例的前置链，不发送请求
    Plan(PlanArgs),
}

impl Commands {
    pub fn verbose(&self) -> bool {
        match self {
            Commands::Run(args) => args.verbose,
            Commands::Plan(args) => args.verbose,
        }
    }
}

/// 用例筛选参数（可重复）
#[derive(Args, Debug, Default)]
pub struct SelectionArgs {
    /// 按模块筛选
    #[arg(short = 'm', long = "module")]
    pub modules: Vec<String>,

    /// 按标签筛选
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// 按优先级筛选
    #[arg(long = "priority")]
    pub priorities: Vec<String>,

    /// 按用例 ID 筛选
    #[arg(short = 'i', long = "id")]
    pub ids: Vec<String>,

    /// 按关键字筛选（ID、名称、描述、路径）
    #[arg(short = 'k', long)]
    pub keyword: Option<String>,
}

impl SelectionArgs {
    fn to_filter(&self) -> CaseFilter {
        CaseFilter {
            modules: self.modules.clone(),
            tags: self.tags.clone(),
            priorities: self.priorities.clone(),
            ids: self.ids.clone(),
            keyword: self.keyword.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// 用例文件（.json 或 .toml）
    pub file: PathBuf,

    /// 配置文件，默认查找 rucase.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 环境名称（对应 [environments.<name>]）
    #[arg(short, long)]
    pub env: Option<String>,

    /// 并发 worker 数，1 表示串行
    #[arg(short, long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// 瞬时故障的最大重试次数
    #[arg(long)]
    pub retries: Option<u32>,

    /// 覆盖 base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// 变量覆盖，可重复
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// 显示详细输出
    #[arg(short, long)]
    pub verbose: bool,

    /// 以 JSON 输出运行报告
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// 用例文件（.json 或 .toml）
    pub file: PathBuf,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_workers(s: &str) -> std::result::Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("workers must be a positive integer, got '{}'", s)),
    }
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    ConfigLoader::parse_cli_var(s).ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

/// 执行子命令，返回是否全部通过
pub async fn execute(command: Commands) -> Result<bool> {
    match command {
        Commands::Run(args) => run(args).await,
        Commands::Plan(args) => plan(args),
    }
}

fn load_cases(file: &Path, selection: &SelectionArgs) -> Result<Vec<TestCaseRecord>> {
    let records = CaseLoader::load_from_path(file)?;
    Ok(selection.to_filter().apply(records))
}

async fn run(args: RunArgs) -> Result<bool> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::find_and_load()?.unwrap_or_else(RucaseConfig::default),
    };
    let context = ConfigLoader::build_context(&config, args.env.as_deref(), &args.vars)?;

    let mut settings = RunSettings::from(&config.run);
    settings.base_url =
        ConfigLoader::resolve_base_url(&config, &context, args.base_url.as_deref());
    if let Some(workers) = args.workers {
        settings = settings.with_workers(workers);
    }
    if let Some(retries) = args.retries {
        settings.retry = settings.retry.with_max_retries(retries);
    }

    let records = load_cases(&args.file, &args.selection)?;
    let reporter = TestReporter::new(args.verbose);
    if !args.json {
        let enabled = records.iter().filter(|r| r.enabled).count();
        reporter.print_header(&args.file.display().to_string(), enabled);
    }

    let executor = Executor::with_http_client(settings)?;
    let report = executor
        .run(records, VariablePool::from_context(context))
        .await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        reporter.print_report(&report);
    }

    Ok(report.summary.is_success())
}

fn plan(args: PlanArgs) -> Result<bool> {
    let records = load_cases(&args.file, &args.selection)?;
    let plan = DependencyResolver::resolve(&records)?;
    TestReporter::new(args.verbose).print_plan(&plan);
    Ok(true)
}
