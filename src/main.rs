mod cli;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use colored::Colorize;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志系统
    rucase::logger::init_logger(cli.command.verbose());

    // 0: 全部通过；1: 存在失败或出错的用例；2: 配置、加载或依赖解析错误
    match cli::execute(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "错误:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}
