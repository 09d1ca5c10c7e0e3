use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::Provider;

/// How the `cv.sections` subtree is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// One model call carrying the whole subtree. The default.
    Subtree,
    /// One model call per string leaf, shape reassembled around the replies.
    PerLeaf,
}

impl FromStr for RewriteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subtree" => Ok(RewriteStrategy::Subtree),
            "per-leaf" => Ok(RewriteStrategy::PerLeaf),
            other => Err(format!(
                "unrecognized rewrite strategy '{other}': use 'subtree' or 'per-leaf'"
            )),
        }
    }
}

/// Application configuration loaded from environment variables (and `.env`
/// if present). Required variables abort startup with a clear message before
/// anything is read or written.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_base_url: String,
    pub strategy: RewriteStrategy,
    /// Extra attempts allowed after the first failed decode of model output.
    pub retry_budget: u32,
    pub job_description_path: PathBuf,
    pub cv_path: PathBuf,
    pub queries_path: PathBuf,
    pub output_path: PathBuf,
    pub render_command: String,
    pub render_timeout: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let provider: Provider = require_env("AI_PROVIDER")?
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let api_key = optional_env("API_KEY");
        let ollama_model = optional_env("OLLAMA_MODEL");

        // Fail fast on provider/credential mismatches instead of at the first
        // gateway call.
        match provider {
            Provider::Ollama => {
                if ollama_model.is_none() {
                    anyhow::bail!("OLLAMA_MODEL must be set when AI_PROVIDER=ollama");
                }
            }
            Provider::OpenAi | Provider::Groq => {
                if api_key.is_none() {
                    anyhow::bail!("API_KEY must be set when AI_PROVIDER={provider}");
                }
            }
        }

        let strategy = optional_env("REWRITE_STRATEGY")
            .map(|s| s.parse::<RewriteStrategy>())
            .transpose()
            .map_err(|e| anyhow::anyhow!(e))?
            .unwrap_or(RewriteStrategy::Subtree);

        let retry_budget = optional_env("RETRY_BUDGET")
            .map(|s| s.parse::<u32>())
            .transpose()
            .context("RETRY_BUDGET must be a non-negative integer")?
            .unwrap_or(1);

        let render_timeout_secs = optional_env("RENDER_TIMEOUT_SECS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("RENDER_TIMEOUT_SECS must be a non-negative integer")?
            .unwrap_or(300);

        Ok(Config {
            provider,
            api_key,
            ollama_model,
            ollama_base_url: optional_env("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            strategy,
            retry_budget,
            job_description_path: path_env("JOB_DESCRIPTION_PATH", "data/job_description.txt"),
            cv_path: path_env("CV_PATH", "data/cv.yaml"),
            queries_path: path_env("QUERIES_PATH", "cv_queries.yaml"),
            output_path: path_env("OUTPUT_PATH", "data/cv_modified.yaml"),
            render_command: optional_env("RENDER_COMMAND")
                .unwrap_or_else(|| "rendercv".to_string()),
            render_timeout: Duration::from_secs(render_timeout_secs),
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn path_env(key: &str, default: &str) -> PathBuf {
    optional_env(key).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "subtree".parse::<RewriteStrategy>().unwrap(),
            RewriteStrategy::Subtree
        );
        assert_eq!(
            "per-leaf".parse::<RewriteStrategy>().unwrap(),
            RewriteStrategy::PerLeaf
        );
    }

    #[test]
    fn test_strategy_from_str_rejects_unknown() {
        let err = "wholesale".parse::<RewriteStrategy>().unwrap_err();
        assert!(err.contains("wholesale"));
    }
}
