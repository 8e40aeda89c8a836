mod browser;
mod config;
mod console;
mod coordinator;
mod errors;
mod llm_client;
mod models;
mod output;
mod prompt;
mod qualification;
mod retry;
mod seed;
mod site;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::browser::{Browser, ChromeBrowser};
use crate::config::{OutputLayout, Settings};
use crate::console::{ConsoleInput, PauseListener, PromptIo, Terminal};
use crate::coordinator::{Coordinator, RunSummary};
use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::output::checkpoint::{Checkpointer, RunControl};
use crate::output::housekeeping::{archive_directories, clear_directories};
use crate::prompt::{ask_yes_no, collect_run_configuration};
use crate::qualification::filters::FilterChain;
use crate::qualification::gateway::LlmGateway;
use crate::qualification::signature::DedupIndex;
use crate::site::RecruiterSite;
use crate::state::{RunPhase, RunState};

#[derive(Parser)]
#[command(name = "scout", version, about = "Recruiter-site candidate qualification")]
struct Cli {
    /// Directory holding data/, resumes/, zips/ and the session file
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Show the browser window during automated runs
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive qualification rounds (default)
    Run,
    /// Log in by hand and save the browser session for later runs
    Login,
    /// Write a dedup seed sheet from pasted candidate lines
    Seed {
        /// Text file with one candidate per line; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        filename: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?.with_workdir(cli.workdir.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &settings.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting scout v{}", env!("CARGO_PKG_VERSION"));

    let input = ConsoleInput::spawn();
    let mut terminal = Terminal::new(input.clone());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_rounds(&settings, &input, &mut terminal, cli.headed).await,
        Command::Login => login(&settings, &mut terminal).await,
        Command::Seed {
            input: path,
            category,
            filename,
        } => seed(&settings, &mut terminal, path, category, filename),
    }
}

async fn run_rounds(
    settings: &Settings,
    input: &ConsoleInput,
    terminal: &mut Terminal,
    headed: bool,
) -> Result<()> {
    loop {
        if !run_round(settings, input, terminal, headed).await? {
            info!("Cancelled by operator");
            return Ok(());
        }
        if !ask_yes_no(terminal, "开始新一轮?", false).unwrap_or(false) {
            info!("Done");
            return Ok(());
        }
    }
}

/// One round: housekeeping, prompts, then the automated run.
/// Returns false when the operator declined at confirmation.
async fn run_round(
    settings: &Settings,
    input: &ConsoleInput,
    terminal: &mut Terminal,
    headed: bool,
) -> Result<bool> {
    let layout = settings.layout();

    if ask_yes_no(terminal, "是否重新登录并保存会话?", false).context("input closed")? {
        login(settings, terminal).await?;
    }
    prepare_outputs(terminal, &layout)?;

    if !layout.session_file.exists() {
        return Err(AppError::Precondition(format!(
            "session file {} not found; run `scout login` first",
            layout.session_file.display()
        ))
        .into());
    }
    let api_key = settings
        .require_llm_api_key()
        .map_err(|e| AppError::Config(e.to_string()))?
        .to_string();

    let mut dedup = DedupIndex::new();
    dedup.load_from(&layout.data_dir);
    let state = Arc::new(RunState::new(dedup));

    state.set_phase(RunPhase::Configuring);
    let Some(config) = collect_run_configuration(terminal)? else {
        return Ok(false);
    };
    let checkpointer = Arc::new(Checkpointer::new(&layout.data_dir, &config));
    let control = RunControl::new(Arc::clone(&state), Arc::clone(&checkpointer));

    let browser = Arc::new(
        ChromeBrowser::launch(!headed)
            .await
            .map_err(|e| AppError::Browser(format!("{e:#}")))?,
    );
    let cookies = browser
        .load_session(&layout.session_file)
        .await
        .map_err(|e| AppError::Browser(format!("{e:#}")))?;
    info!("Loaded {cookies} session cookies");

    let llm = LlmClient::new(
        settings.llm_api_url.clone(),
        api_key,
        settings.llm_model.clone(),
    )?;
    info!("LLM client initialized (model: {})", llm.model());
    let gateway = LlmGateway::new(Arc::new(llm), settings.llm_model.clone());

    let site = RecruiterSite::new(Arc::clone(&browser), settings.search_url.clone());
    let coordinator = Coordinator::new(
        site,
        FilterChain::new(Arc::new(gateway)),
        config,
        layout.clone(),
        settings.source_label.clone(),
        Arc::clone(&state),
        checkpointer,
    );

    let listener = PauseListener::start(input.clone(), control.clone());
    let span = info_span!("run", run_id = %state.run_id());
    let result = async {
        let run = coordinator.run();
        tokio::pin!(run);
        let finished = tokio::select! {
            result = &mut run => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        match finished {
            Some(result) => result,
            None => {
                warn!("Interrupted; finishing the current candidate and saving");
                control.cancel();
                run.await
            }
        }
    }
    .instrument(span)
    .await;
    listener.stop();

    report(terminal, &result?);
    Ok(true)
}

fn report(terminal: &mut dyn PromptIo, summary: &RunSummary) {
    info!(
        run_id = %summary.run_id,
        qualified = summary.qualified,
        processed = summary.processed,
        cancelled = summary.cancelled,
        "Run finished"
    );
    terminal.say(&format!(
        "\n本轮完成{}: 合格 {} / 处理 {}",
        if summary.cancelled { " (已中断)" } else { "" },
        summary.qualified,
        summary.processed
    ));
    match &summary.sheet {
        Some(path) => terminal.say(&format!("表格: {}", path.display())),
        None => terminal.say("没有合格候选人，未生成表格"),
    }
    for bundle in &summary.bundles {
        terminal.say(&format!("压缩包: {}", bundle.display()));
    }
}

fn prepare_outputs(terminal: &mut dyn PromptIo, layout: &OutputLayout) -> Result<()> {
    let clear = ask_yes_no(
        terminal,
        "是否清空 data, resumes, zips 文件夹下的所有内容? (y=清空, n=归档)",
        false,
    )
    .context("input closed")?;
    let dirs = layout.output_dirs();
    if clear {
        clear_directories(&dirs)?;
    } else {
        let name = archive_directories(&dirs)?;
        info!("Previous outputs archived as {name}");
    }
    layout.ensure_directories()?;
    Ok(())
}

async fn login(settings: &Settings, terminal: &mut dyn PromptIo) -> Result<()> {
    let layout = settings.layout();
    std::fs::create_dir_all(&settings.workdir)?;

    let browser = ChromeBrowser::launch(false).await?;
    browser
        .navigate(browser.main_page(), &settings.search_url)
        .await?;
    terminal.say("请在浏览器中完成登录，然后按回车保存会话...");
    terminal
        .read_line()
        .context("input closed before login finished")?;

    let saved = browser.save_session(&layout.session_file).await?;
    info!("Saved {saved} cookies to {}", layout.session_file.display());
    Ok(())
}

fn seed(
    settings: &Settings,
    terminal: &mut dyn PromptIo,
    input: Option<PathBuf>,
    category: Option<String>,
    filename: Option<String>,
) -> Result<()> {
    let layout = settings.layout();
    prepare_outputs(terminal, &layout)?;

    let content = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            terminal.say("请输入候选人数据 (每行一个，格式: 姓名 公司 职位 电话 在职时间)，空行结束");
            let mut lines = Vec::new();
            while let Some(line) = terminal.read_line() {
                if line.trim().is_empty() {
                    break;
                }
                lines.push(line);
            }
            lines.join("\n")
        }
    };

    let candidates = seed::parse_content(&content);
    if candidates.is_empty() {
        return Err(AppError::Validation(
            "no candidate lines could be parsed (expected: 姓名 公司 职位 电话 在职时间)".to_string(),
        )
        .into());
    }
    terminal.say(&seed::preview(&candidates));
    if !ask_yes_no(terminal, "是否继续生成文件?", true).unwrap_or(false) {
        info!("Cancelled by operator");
        return Ok(());
    }

    let category = match category {
        Some(category) => Some(category),
        None => {
            terminal.say("请输入分类名称 (可选，直接回车跳过)");
            terminal.read_line()
        }
    }
    .map(|c| c.trim().to_string())
    .filter(|c| !c.is_empty());

    let mut filename = filename.unwrap_or_else(|| seed::seed_filename(category.as_deref()));
    let suffix = format!(".{}", output::workbook::EXTENSION);
    if !filename.ends_with(&suffix) {
        filename.push_str(&suffix);
    }
    let path = layout.data_dir.join(filename);

    let written = seed::write_seed_sheet(&path, &candidates, category.as_deref())?;
    terminal.say(&format!("已写入 {written} 条候选人数据: {}", path.display()));
    let counts = seed::category_counts(&candidates, category.as_deref());
    if counts.len() > 1 {
        for (category, count) in counts {
            terminal.say(&format!("  {category}: {count} 人"));
        }
    }
    Ok(())
}
