//! Rule executor: translates rule requests into iptables invocations
//!
//! Every operation is a single, self-contained tool invocation. A non-zero
//! exit is turned into an error `ExecutionResult` carrying the tool's
//! diagnostic; only a failure to start the tool at all is an `Err`.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::rules::{self, Chain, ExecutionResult, Rule};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the executor and the operating system
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;
}

/// Runs commands as real subprocesses
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub struct RuleExecutor {
    runner: Arc<dyn CommandRunner>,
    config: ExecutorConfig,
}

impl RuleExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    pub fn with_runner(config: ExecutorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, config }
    }

    /// Append a rule to its chain
    pub async fn add_rule(&self, rule: &Rule) -> Result<ExecutionResult, ExecutorError> {
        let output = self.iptables(rule.append_args()).await?;
        if !output.success {
            return Ok(self.failure(&self.config.iptables_bin, &rule.append_args(), &output));
        }
        info!("Rule added to {}: {:?}", rule.chain, rule.filter_args());
        Ok(ExecutionResult::success(format!("Rule added to {}", rule.chain)))
    }

    /// Delete the rule with exactly this signature
    pub async fn delete_rule(&self, rule: &Rule) -> Result<ExecutionResult, ExecutorError> {
        let output = self.iptables(rule.delete_args()).await?;
        if !output.success {
            return Ok(self.failure(&self.config.iptables_bin, &rule.delete_args(), &output));
        }
        info!("Rule deleted from {}: {:?}", rule.chain, rule.filter_args());
        Ok(ExecutionResult::success(format!("Rule deleted from {}", rule.chain)))
    }

    /// List rules with packet/byte counters, optionally for a single chain
    pub async fn list_rules(&self, chain: Option<Chain>) -> Result<ExecutionResult, ExecutorError> {
        let args = rules::list_args(chain);
        let output = self.iptables(args.clone()).await?;
        if !output.success {
            return Ok(self.failure(&self.config.iptables_bin, &args, &output));
        }
        let message = match chain {
            Some(chain) => format!("Listed rules for {chain}"),
            None => "Listed rules".to_string(),
        };
        Ok(ExecutionResult::listing(message, output.stdout))
    }

    /// Remove every rule from a chain
    pub async fn flush_chain(&self, chain: Chain) -> Result<ExecutionResult, ExecutorError> {
        let args = rules::flush_args(chain);
        let output = self.iptables(args.clone()).await?;
        if !output.success {
            return Ok(self.failure(&self.config.iptables_bin, &args, &output));
        }
        warn!("Chain {chain} flushed");
        Ok(ExecutionResult::success(format!("Chain {chain} flushed")))
    }

    /// Dump the live ruleset, writing it to `save_path` when one is configured
    pub async fn save_rules(&self) -> Result<ExecutionResult, ExecutorError> {
        let save_bin = self.config.save_bin.clone();
        let output = self.invoke(&save_bin, Vec::new()).await?;
        if !output.success {
            return Ok(self.failure(&save_bin, &[], &output));
        }

        let Some(path) = &self.config.save_path else {
            info!("Rules saved");
            return Ok(ExecutionResult::success("Rules saved"));
        };

        if let Err(e) = tokio::fs::write(path, output.stdout.as_bytes()).await {
            warn!("Failed to write rules to {}: {e}", path.display());
            return Ok(ExecutionResult::error(format!(
                "Failed to write rules to {}: {e}",
                path.display()
            )));
        }
        info!("Rules saved to {}", path.display());
        Ok(ExecutionResult::success(format!(
            "Rules saved to {}",
            path.display()
        )))
    }

    async fn iptables(&self, args: Vec<String>) -> Result<CommandOutput, ExecutorError> {
        let program = self.config.iptables_bin.clone();
        self.invoke(&program, args).await
    }

    async fn invoke(&self, program: &str, args: Vec<String>) -> Result<CommandOutput, ExecutorError> {
        let (program, argv) = self.elevate(program, args);
        debug!("exec: {program} {}", argv.join(" "));

        self.runner
            .run(&program, &argv)
            .await
            .map_err(|source| ExecutorError::Spawn { program, source })
    }

    fn elevate(&self, program: &str, args: Vec<String>) -> (String, Vec<String>) {
        if self.config.use_sudo {
            let mut argv = Vec::with_capacity(args.len() + 1);
            argv.push(program.to_string());
            argv.extend(args);
            ("sudo".to_string(), argv)
        } else {
            (program.to_string(), args)
        }
    }

    fn failure(&self, program: &str, args: &[String], output: &CommandOutput) -> ExecutionResult {
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            let code = output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let (program, argv) = self.elevate(program, args.to_vec());
            format!("{program} {} exited with status {code}", argv.join(" "))
        } else {
            stderr.to_string()
        };
        warn!("{program} failed: {message}");
        ExecutionResult::error(message)
    }
}
