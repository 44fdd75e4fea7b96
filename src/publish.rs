//! git 发布：add → commit（无变化时容忍失败）→ push

use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PublishConfig;
use crate::error::{RmResult, RuleMergeError};

/// 提交步骤结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// 提交失败（通常是没有变化），已忽略
    NothingToCommit,
}

pub struct GitPublisher {
    repo_dir: PathBuf,
    config: PublishConfig,
}

impl GitPublisher {
    pub fn new(repo_dir: impl Into<PathBuf>, config: PublishConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            config,
        }
    }

    async fn git(&self, args: &[&str]) -> RmResult<Output> {
        debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| RuleMergeError::PublishError(format!("无法执行 git：{}", e)))
    }

    async fn git_checked(&self, args: &[&str]) -> RmResult<Output> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(RuleMergeError::PublishError(format!(
                "git {} 失败：{}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    /// 暂存指定文件（相对仓库目录）
    pub async fn stage(&self, files: &[PathBuf]) -> RmResult<()> {
        let paths: Vec<String> = files
            .iter()
            .map(|p| relative_to(&self.repo_dir, p).display().to_string())
            .collect();
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.git_checked(&args).await?;
        Ok(())
    }

    /// 以固定机器人身份提交；失败只记录日志，不中断流程
    pub async fn commit(&self) -> RmResult<CommitOutcome> {
        let name = format!("user.name={}", self.config.author_name);
        let email = format!("user.email={}", self.config.author_email);
        let output = self
            .git(&[
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "commit",
                "-m",
                self.config.commit_message.as_str(),
            ])
            .await?;

        if output.status.success() {
            info!("已提交：{}", self.config.commit_message);
            Ok(CommitOutcome::Committed)
        } else {
            warn!(
                "No changes to commit（{}）",
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(CommitOutcome::NothingToCommit)
        }
    }

    pub async fn push(&self) -> RmResult<()> {
        let refspec = format!("HEAD:{}", self.config.branch);
        self.git_checked(&["push", self.config.remote.as_str(), refspec.as_str()])
            .await?;
        info!("已推送到 {}/{}", self.config.remote, self.config.branch);
        Ok(())
    }

    /// add → commit → push
    pub async fn publish(&self, files: &[PathBuf]) -> RmResult<CommitOutcome> {
        self.stage(files).await?;
        let outcome = self.commit().await?;
        self.push().await?;
        Ok(outcome)
    }
}

fn relative_to<'a>(base: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(base).unwrap_or(path)
}
