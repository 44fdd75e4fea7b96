//! rulemerge 命令行入口

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

use rulemerge::{
    CommitOutcome, ConfigManager, CustomConfigBuilder, GlobalConfig, RetryPolicy,
    RuleMergePipeline, RunOptions, SiteConfig,
};

#[derive(Debug, Parser)]
#[command(name = "rulemerge", version, about = "拉取、合并、去重分流规则并生成分类规则文件")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// JSON 配置文件，未给出的字段使用默认值
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// GitHub Pages 所有者
    #[arg(long, global = true)]
    owner: Option<String>,

    /// GitHub Pages 仓库名
    #[arg(long, global = true)]
    repo: Option<String>,

    /// owner/repo，--owner/--repo 优先
    #[arg(long, global = true, env = "GITHUB_REPOSITORY", hide_env_values = true)]
    github_repository: Option<String>,

    /// HTTP 超时（秒）
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// 失败后的额外重试次数，0 表示不重试
    #[arg(long, global = true)]
    retries: Option<u8>,

    /// GitHub 镜像前缀
    #[arg(long, global = true, conflicts_with = "no_mirror")]
    mirror: Option<String>,

    #[arg(long, global = true)]
    no_mirror: bool,

    /// 禁用 ETag 缓存
    #[arg(long, global = true)]
    no_cache: bool,

    /// -v: debug，-vv: trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 合并规则、补齐输出文件、更新 README（默认）
    Run {
        /// 完成后 git add/commit/push
        #[arg(long)]
        publish: bool,
        /// 不生成 README
        #[arg(long)]
        no_readme: bool,
    },
    /// 只确保五个发布文件存在
    Ensure,
    /// 只重新生成 README
    Readme,
    /// 只执行 git 发布
    Publish,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(false)
        .init();
}

/// 配置文件 → 命令行参数，逐层覆盖
fn build_config(args: &GlobalArgs) -> Result<GlobalConfig> {
    let base = match &args.config {
        Some(path) => GlobalConfig::from_json_file(path)
            .with_context(|| format!("读取配置文件失败：{}", path.display()))?,
        None => ConfigManager::get_default(),
    };
    let mut site = base.site.clone();
    let mut builder = CustomConfigBuilder::from_config(base);

    if let Some(dir) = &args.output_dir {
        builder = builder.output_dir(dir.clone());
    }
    if let Some(dir) = &args.cache_dir {
        builder = builder.cache_dir(dir.clone());
    }
    if let Some(timeout) = args.timeout {
        builder = builder.http_timeout(timeout);
    }
    if let Some(retries) = args.retries {
        builder = builder.retry(match retries {
            0 => RetryPolicy::Never,
            n => RetryPolicy::Times(n),
        });
    }
    if args.no_mirror {
        builder = builder.gh_proxy_url(None);
    } else if let Some(mirror) = &args.mirror {
        builder = builder.gh_proxy_url(Some(mirror.clone()));
    }
    if args.no_cache {
        builder = builder.use_cache(false);
    }

    if let Some(value) = args.github_repository.as_deref().filter(|v| !v.trim().is_empty()) {
        match SiteConfig::from_github_repository(value) {
            Ok(parsed) => site = parsed,
            Err(e) => warn!("忽略 GITHUB_REPOSITORY：{}", e),
        }
    }
    if let Some(owner) = &args.owner {
        site.owner = owner.clone();
    }
    if let Some(repo) = &args.repo {
        site.repo = repo.clone();
    }

    Ok(builder.site(site).build())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let config = build_config(&cli.global)?;
    let pipeline = RuleMergePipeline::new(config);

    match cli.command.unwrap_or(Command::Run {
        publish: false,
        no_readme: false,
    }) {
        Command::Run { publish, no_readme } => {
            let report = pipeline
                .run(RunOptions {
                    readme: !no_readme,
                    publish,
                })
                .await?;
            for category in &report.merge.categories {
                match &category.written {
                    Some(written) => info!(
                        "[{}] {} 条规则（来源 {} 成功 / {} 失败，跳过 {} 行，.txt 省略 {} 条）",
                        category.category,
                        category.rules,
                        category.sources_ok,
                        category.sources_failed,
                        category.skipped_lines,
                        written.omitted
                    ),
                    None => warn!("[{}] No valid rules, skipped", category.category),
                }
            }
            if let Some(CommitOutcome::NothingToCommit) = report.commit {
                info!("规则无变化，未产生新提交");
            }
        }
        Command::Ensure => {
            let created = pipeline.ensure_outputs().await?;
            info!("已确保输出文件存在，新建 {} 个", created.len());
        }
        Command::Readme => {
            pipeline.write_readme().await?;
        }
        Command::Publish => {
            pipeline.publish().await.context("git 发布失败")?;
        }
    }

    Ok(())
}
