use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use warrant_common::observability::{LogConfig, init_logging};
use warrant_common::{Query, QueryConfig};
use warrant_config::{AppConfig, WarrantConfigLoader};
use warrant_query::{QueryOrchestrator, QueryReport};

mod wiring;

#[derive(Parser)]
#[command(
    name = "warrant-bot",
    version,
    about = "Warrant listing lookups from chat-style commands"
)]
struct Cli {
    /// YAML config file; skipped when absent. `WARRANT_*` variables still apply.
    #[arg(long, short, default_value = "warrant.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Answer one message and exit, e.g. `ask 快查 6669`.
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Answer one message per stdin line until EOF or Ctrl-C.
    Repl,
    /// Scan one underlying code and print every record.
    Scan {
        code: String,
        /// Unfiltered scan of every page instead of the quick scan.
        #[arg(short, long)]
        normal: bool,
        /// Print the typed report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg: AppConfig = WarrantConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()?;

    let log_path = init_logging(LogConfig {
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: cfg.logging.format,
        ..LogConfig::default()
    })?;
    info!(config = %cli.config.display(), log = %log_path.display(), "warrant-bot starting");

    let orchestrator = wiring::build_orchestrator(&cfg)?;

    match cli.mode {
        Mode::Ask { text } => {
            print_reply(&orchestrator.handle(&text.join(" ")).await);
            Ok(())
        }
        Mode::Repl => repl(&orchestrator).await,
        Mode::Scan { code, normal, json } => {
            scan(&orchestrator, &cfg.query, &code, normal, json).await
        }
    }
}

fn print_reply(chunks: &[String]) {
    for chunk in chunks {
        println!("{chunk}\n");
    }
}

async fn repl(orchestrator: &QueryOrchestrator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                print_reply(&orchestrator.handle(&line).await);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

async fn scan(
    orchestrator: &QueryOrchestrator,
    cfg: &QueryConfig,
    code: &str,
    normal: bool,
    json: bool,
) -> Result<()> {
    let query = if normal {
        Query::full(code, cfg)?
    } else {
        Query::quick(code, cfg)?
    };

    let report = match orchestrator.run(&query).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, code, "scan failed");
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn print_table(report: &QueryReport) {
    let rule = "=".repeat(80);
    println!("{rule}");
    println!("權證名稱,代號,價格,價內外,剩餘天數,發行商");
    println!("{}", "-".repeat(80));
    for r in &report.records {
        println!(
            "{},{},{},{} {}%,{},{}",
            r.name(),
            r.code(),
            r.price(),
            r.moneyness_label(),
            r.moneyness_percent(),
            r.days_remaining(),
            r.broker()
        );
    }
    println!("{rule}");
    println!("總筆數: {}", report.records.len());
    println!("頁數: {}", report.pages_fetched);
    match report.failed_page {
        Some(page) => println!("失敗頁數: 第 {page} 頁"),
        None => println!("失敗頁數: 0"),
    }
    if report.skipped_rows > 0 {
        println!("略過列數: {}", report.skipped_rows);
    }
    println!("{rule}");
}
