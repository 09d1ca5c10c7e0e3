//! CV adaptation pipeline.
//!
//! Flow: load inputs → extract keywords from the job description → rewrite the
//! `cv.sections` subtree → splice → persist → hand off to the external
//! renderer.
//!
//! Keyword extraction is a single un-retried call: the keyword text has no
//! structural constraint, so any non-empty reply is usable. The section
//! rewrite is where decode failures and bounded retries live.

pub mod inputs;
pub mod retry;
pub mod rewrite;
pub mod sanitize;
pub mod transform;

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::Config;
use crate::errors::AppError;
use crate::llm_client::{GatewayError, TextGenerator};
use crate::progress::Spinner;
use crate::render;

use self::rewrite::build_rewriter;

/// Runs the full adaptation pipeline against the given gateway.
///
/// All inputs are loaded and validated before the first model call, so a
/// misconfigured run aborts before spending anything. The modified CV is only
/// written once the whole transform has succeeded; a render failure after
/// that is reported but does not undo the persisted document.
pub async fn run(config: &Config, gateway: &dyn TextGenerator) -> Result<(), AppError> {
    let job_description = inputs::load_job_description(&config.job_description_path)?;
    let mut cv = inputs::load_cv_document(&config.cv_path)?;
    let prompts = inputs::load_prompts(&config.queries_path)?;

    let sections = inputs::sections_subtree(&cv)?;
    let rewriter = build_rewriter(config.strategy, &prompts, config.retry_budget)?;

    info!("Processing the job description");
    let variables = HashMap::from([("job_description".to_string(), job_description)]);
    let keywords = gateway.generate(&prompts.analyze_jd, &variables).await?;
    if keywords.trim().is_empty() {
        return Err(AppError::Gateway(GatewayError::EmptyReply));
    }
    info!(
        "Keywords extracted from the job description:\n{}",
        keywords.trim()
    );

    info!("Rewriting the CV sections");
    let spinner = Spinner::start("Rewriting CV sections");
    let result = rewriter.rewrite(sections, gateway, &keywords).await;
    spinner.finish().await;
    let rewritten = result?;

    inputs::replace_sections(&mut cv, rewritten)?;
    inputs::persist_cv(&cv, &config.output_path)?;
    info!("Adapted CV written to {}", config.output_path.display());

    let spinner = Spinner::start("Rendering CV");
    let rendered = render::run_render(
        &config.render_command,
        &config.output_path,
        config.render_timeout,
    )
    .await;
    spinner.finish().await;
    if let Err(e) = rendered {
        error!("{e}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriteStrategy;
    use crate::llm_client::Provider;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    /// Answers the keyword-extraction call with fixed keywords and every
    /// rewrite call with a scripted reply.
    struct ScriptedGateway {
        rewrite_reply: String,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGateway {
        async fn generate(
            &self,
            _template: &str,
            variables: &HashMap<String, String>,
        ) -> Result<String, GatewayError> {
            if variables.contains_key("job_description") {
                Ok("rust, distributed systems".to_string())
            } else {
                Ok(self.rewrite_reply.clone())
            }
        }
    }

    fn write_fixtures(dir: &Path) {
        fs::write(dir.join("job_description.txt"), "We need a Rust engineer.").unwrap();
        fs::write(
            dir.join("cv.yaml"),
            concat!(
                "cv:\n",
                "  name: Jane Doe\n",
                "  sections:\n",
                "    summary: old text\n",
                "design:\n",
                "  theme: classic\n",
            ),
        )
        .unwrap();
        fs::write(
            dir.join("cv_queries.yaml"),
            concat!(
                "analyze_jd: \"Analyze {job_description}\"\n",
                "rewrite_sections: \"Rewrite {sections_text} with {keywords}\"\n",
                "rewrite_section: \"Rewrite {section_text} with {keywords}\"\n",
            ),
        )
        .unwrap();
    }

    fn test_config(dir: &Path, strategy: RewriteStrategy) -> Config {
        Config {
            provider: Provider::Ollama,
            api_key: None,
            ollama_model: Some("llama3".to_string()),
            ollama_base_url: "http://localhost:11434".to_string(),
            strategy,
            retry_budget: 1,
            job_description_path: dir.join("job_description.txt"),
            cv_path: dir.join("cv.yaml"),
            queries_path: dir.join("cv_queries.yaml"),
            output_path: dir.join("cv_modified.yaml"),
            render_command: "true".to_string(),
            render_timeout: Duration::from_secs(10),
            rust_log: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_rewrites_sections_and_preserves_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = test_config(dir.path(), RewriteStrategy::Subtree);
        let gateway = ScriptedGateway {
            rewrite_reply: r#"{"summary": "new text"}"#.to_string(),
        };

        run(&config, &gateway).await.unwrap();

        let written = inputs::load_cv_document(&config.output_path).unwrap();
        assert_eq!(
            written.get("cv").unwrap().get("sections").unwrap(),
            &serde_yaml::from_str::<serde_yaml::Value>("summary:\n  - new text").unwrap()
        );
        assert_eq!(
            written.get("cv").unwrap().get("name").unwrap().as_str(),
            Some("Jane Doe")
        );
        assert_eq!(
            written.get("design").unwrap().get("theme").unwrap().as_str(),
            Some("classic")
        );
    }

    #[tokio::test]
    async fn test_pipeline_per_leaf_strategy_keeps_leaf_shape() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = test_config(dir.path(), RewriteStrategy::PerLeaf);
        let gateway = ScriptedGateway {
            rewrite_reply: "emphasized text".to_string(),
        };

        run(&config, &gateway).await.unwrap();

        let written = inputs::load_cv_document(&config.output_path).unwrap();
        assert_eq!(
            written
                .get("cv")
                .unwrap()
                .get("sections")
                .unwrap()
                .get("summary")
                .unwrap()
                .as_str(),
            Some("emphasized text")
        );
    }

    #[tokio::test]
    async fn test_pipeline_aborts_without_output_when_decoding_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let config = test_config(dir.path(), RewriteStrategy::Subtree);
        let gateway = ScriptedGateway {
            rewrite_reply: "not json at all".to_string(),
        };

        let err = run(&config, &gateway).await.unwrap_err();
        assert!(matches!(err, AppError::DecodeExhausted { attempts: 2, .. }));
        assert!(!config.output_path.exists());
    }

    #[tokio::test]
    async fn test_pipeline_fails_before_model_calls_on_bad_cv() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        fs::write(dir.path().join("cv.yaml"), "cv:\n  name: Jane\n").unwrap();
        let config = test_config(dir.path(), RewriteStrategy::Subtree);
        let gateway = ScriptedGateway {
            rewrite_reply: String::new(),
        };

        let err = run(&config, &gateway).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(!config.output_path.exists());
    }
}
