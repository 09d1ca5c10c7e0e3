//! Section rewriting — pluggable, trait-based strategies over the gateway.
//!
//! Default: `SubtreeRewriter` (one model call carrying the whole `cv.sections`
//! subtree). Alternative: `LeafRewriter` (one call per string leaf, shape
//! reassembled around the replies). The strategy is selected at startup via
//! `REWRITE_STRATEGY` and carried as `Box<dyn SectionRewriter>`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::adapt::inputs::PromptSet;
use crate::adapt::retry::RetryController;
use crate::adapt::sanitize::{sanitize, sanitize_leaf, SanitizeFailure};
use crate::adapt::transform::transform;
use crate::config::RewriteStrategy;
use crate::errors::AppError;
use crate::llm_client::TextGenerator;

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Rewrites the `cv.sections` subtree against the extracted keywords and
/// returns the replacement value. Implementations own their retry policy.
#[async_trait]
pub trait SectionRewriter: Send + Sync {
    async fn rewrite(
        &self,
        sections: serde_yaml::Value,
        gateway: &dyn TextGenerator,
        keywords: &str,
    ) -> Result<serde_yaml::Value, AppError>;
}

impl std::fmt::Debug for dyn SectionRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SectionRewriter")
    }
}

/// Builds the configured strategy, failing fast if the prompt file lacks the
/// template the strategy needs.
pub fn build_rewriter(
    strategy: RewriteStrategy,
    prompts: &PromptSet,
    retry_budget: u32,
) -> Result<Box<dyn SectionRewriter>, AppError> {
    let template = prompts.rewrite_template(strategy)?.to_string();
    Ok(match strategy {
        RewriteStrategy::Subtree => Box::new(SubtreeRewriter {
            template,
            retry_budget,
        }),
        RewriteStrategy::PerLeaf => Box::new(LeafRewriter {
            template,
            retry_budget,
        }),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Retry-wrapped generation
// ────────────────────────────────────────────────────────────────────────────

/// Calls the gateway and decodes the reply, retrying under the controller's
/// budget. Gateway failures count against the budget exactly like decode
/// failures; configuration mistakes abort on the spot.
async fn generate_decoded<T>(
    gateway: &dyn TextGenerator,
    template: &str,
    variables: &HashMap<String, String>,
    budget: u32,
    decode: impl Fn(&str) -> Result<T, SanitizeFailure>,
) -> Result<T, AppError> {
    let mut controller = RetryController::new(budget);

    loop {
        let attempt = controller.attempts() + 1;

        let raw = match gateway.generate(template, variables).await {
            Ok(raw) => raw,
            Err(e) if e.is_config() => return Err(e.into()),
            Err(e) => {
                warn!("Model call failed on attempt {attempt}: {e}");
                if controller.record_failure(e.to_string()) {
                    continue;
                }
                return Err(controller.into_error());
            }
        };

        match decode(&raw) {
            Ok(value) => {
                controller.record_success();
                return Ok(value);
            }
            Err(failure) => {
                warn!(
                    "Could not decode model output on attempt {attempt}: {}",
                    failure.reason
                );
                if controller.record_failure(failure.raw) {
                    continue;
                }
                return Err(controller.into_error());
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Whole-subtree strategy
// ────────────────────────────────────────────────────────────────────────────

pub struct SubtreeRewriter {
    pub template: String,
    pub retry_budget: u32,
}

#[async_trait]
impl SectionRewriter for SubtreeRewriter {
    async fn rewrite(
        &self,
        sections: serde_yaml::Value,
        gateway: &dyn TextGenerator,
        keywords: &str,
    ) -> Result<serde_yaml::Value, AppError> {
        let sections_text = serde_json::to_string_pretty(&sections)
            .map_err(|e| anyhow::anyhow!("could not serialize cv.sections for the prompt: {e}"))?;

        let variables = HashMap::from([
            ("sections_text".to_string(), sections_text),
            ("keywords".to_string(), keywords.to_string()),
        ]);

        let replacement = generate_decoded(
            gateway,
            &self.template,
            &variables,
            self.retry_budget,
            sanitize,
        )
        .await?;

        Ok(serde_yaml::to_value(&replacement)?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-leaf strategy
// ────────────────────────────────────────────────────────────────────────────

pub struct LeafRewriter {
    pub template: String,
    pub retry_budget: u32,
}

#[async_trait]
impl SectionRewriter for LeafRewriter {
    async fn rewrite(
        &self,
        sections: serde_yaml::Value,
        gateway: &dyn TextGenerator,
        keywords: &str,
    ) -> Result<serde_yaml::Value, AppError> {
        // First traversal: collect string leaves in traversal order.
        let mut leaves = Vec::new();
        transform(sections.clone(), &mut |leaf| {
            leaves.push(leaf.to_string());
            Ok(leaf.to_string())
        })?;

        let total = leaves.len();
        info!("Rewriting {total} section leaves");

        let mut rewritten = VecDeque::with_capacity(total);
        for (index, leaf) in leaves.into_iter().enumerate() {
            let variables = HashMap::from([
                ("section_text".to_string(), leaf),
                ("keywords".to_string(), keywords.to_string()),
            ]);

            let text = generate_decoded(
                gateway,
                &self.template,
                &variables,
                self.retry_budget,
                sanitize_leaf,
            )
            .await?;

            debug!("Rewrote section leaf {}/{total}", index + 1);
            rewritten.push_back(text);
        }

        // Second traversal visits the same leaves in the same order, so the
        // replies substitute positionally.
        transform(sections, &mut |_| {
            rewritten
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("section tree changed between traversals").into())
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
