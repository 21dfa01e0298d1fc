use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

use crate::runner::planner::ExecutionPlan;
use crate::runner::types::{CaseStatus, ExecutionResult, RunReport, RunSummary};

pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印测试开始
    pub fn print_header(&self, file_path: &str, total: usize) {
        println!(
            "\nRunning {} test cases from {}...\n",
            total,
            file_path.bold()
        );
    }

    /// 打印单个用例结果
    pub fn print_result(&self, result: &ExecutionResult) {
        let symbol = match result.status {
            CaseStatus::Passed => "✓".green(),
            CaseStatus::Failed => "✗".red(),
            CaseStatus::Error => "!".red().bold(),
            CaseStatus::Skipped => "⊘".dimmed(),
            _ => "?".yellow(),
        };

        let name_part = match &result.name {
            Some(name) => format!(" {} -", name),
            None => String::new(),
        };
        let url = result.url.as_deref().unwrap_or("-");

        if result.status == CaseStatus::Skipped {
            println!(
                " {} [{}]{} {} {} {}",
                symbol,
                result.case_id,
                name_part,
                result.method.cyan(),
                url,
                "(skipped)".dimmed()
            );
        } else {
            let retries = if result.retries > 0 {
                format!(", {} retries", result.retries)
            } else {
                String::new()
            };
            println!(
                " {} [{}]{} {} {} ({}ms{})",
                symbol,
                result.case_id,
                name_part,
                result.method.cyan(),
                url,
                result.duration.as_millis(),
                retries
            );
        }

        if let Some(failure) = &result.failure {
            let label = match result.status {
                CaseStatus::Skipped => "Reason".dimmed(),
                _ => "Error".red().bold(),
            };
            println!("   {}: {}", label, failure);
        }

        // 显示断言结果：verbose 时全部显示，否则只显示失败的断言
        let shown: Vec<_> = result
            .assertions
            .iter()
            .filter(|a| self.verbose || !a.passed)
            .collect();
        if !shown.is_empty() {
            println!("   Assertions:");
            for assertion in shown {
                if assertion.passed {
                    println!("     {} {}", "✓".green(), assertion.raw);
                } else {
                    println!("     {} {}", "✗".red(), assertion.raw);
                    if let Some(msg) = &assertion.message {
                        println!("       {}", msg.red());
                    }
                }
            }
        }

        if self.verbose && !result.extracted.is_empty() {
            println!("   Extracted:");
            for (name, value) in &result.extracted {
                println!("     {} = {}", name.cyan(), value);
            }
        }

        for e in &result.extraction_errors {
            println!("   {}: {}", "Warning".yellow(), e);
        }
    }

    /// 打印完整报告：逐条结果、结果表格、摘要
    pub fn print_report(&self, report: &RunReport) {
        for result in &report.results {
            self.print_result(result);
        }
        println!();
        println!("{}", results_table(&report.results));
        self.print_summary(&report.summary);
    }

    /// 打印测试摘要
    pub fn print_summary(&self, summary: &RunSummary) {
        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        println!(
            "  {}: {} passed, {} failed, {} errors, {} skipped, {} total",
            "Cases".bold(),
            summary.passed.to_string().green(),
            summary.failed.to_string().red(),
            summary.errors.to_string().red(),
            summary.skipped.to_string().dimmed(),
            summary.total
        );

        // 显示断言统计
        if summary.total_assertions > 0 {
            if summary.failed_assertions == 0 {
                println!(
                    "  {}: {} passed, {} total",
                    "Assertions".bold(),
                    summary.passed_assertions.to_string().green(),
                    summary.total_assertions
                );
            } else {
                println!(
                    "  {}: {} passed, {} failed, {} total",
                    "Assertions".bold(),
                    summary.passed_assertions.to_string().green(),
                    summary.failed_assertions.to_string().red(),
                    summary.total_assertions
                );
            }
        }

        println!(
            "  {}: {:.3}s",
            "Duration".bold(),
            summary.duration.as_secs_f64()
        );
        println!();
    }

    /// 打印每条用例的前置链（不执行）
    pub fn print_plan(&self, plan: &ExecutionPlan) {
        println!("{}", plan_table(plan));
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

fn status_color(status: CaseStatus) -> Color {
    match status {
        CaseStatus::Passed => Color::Green,
        CaseStatus::Failed | CaseStatus::Error => Color::Red,
        _ => Color::DarkGrey,
    }
}

/// 结果表格
pub fn results_table(results: &[ExecutionResult]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Case", "Method", "URL", "HTTP", "Status", "Retries", "Duration",
    ]);

    for result in results {
        table.add_row(vec![
            Cell::new(&result.case_id),
            Cell::new(&result.method),
            Cell::new(result.url.as_deref().unwrap_or("-")).add_attribute(Attribute::Dim),
            Cell::new(
                result
                    .http_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(result.status).fg(status_color(result.status)),
            Cell::new(result.retries),
            Cell::new(format!("{}ms", result.duration.as_millis())),
        ]);
    }

    table
}

/// 执行计划表格
pub fn plan_table(plan: &ExecutionPlan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Case", "Prerequisite chain", "Note"]);

    for (index, id) in plan.order().iter().enumerate() {
        let chain = plan.chain(id);
        let chain = if chain.is_empty() {
            "-".to_string()
        } else {
            chain.join(" → ")
        };
        let note = match plan.unresolved(id) {
            Some(unresolved) => {
                Cell::new(format!("unresolved: {}", unresolved)).fg(Color::Yellow)
            }
            None => Cell::new(""),
        };
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(id),
            Cell::new(chain),
            note,
        ]);
    }

    table
}
