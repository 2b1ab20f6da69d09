//! Model name resolution
//!
//! Resolves `provider/model` or bare model names to a configured provider
//! using the per-provider include/exclude patterns.

use regex::Regex;
use weft_config::LlmConfig;

use crate::error::LlmError;

/// Resolved target for a model request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Provider name (key in config)
    pub provider_name: String,
    /// Model identifier sent to the provider
    pub model_id: String,
    /// Whether the caller named the provider (e.g. `claude/claude-sonnet-4-5`)
    pub explicit_provider: bool,
}

/// Compiled include/exclude filters of one provider
#[derive(Debug, Default)]
struct ModelFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ModelFilter {
    /// A model passes when it matches some include pattern (or none are set)
    /// and no exclude pattern
    fn allows(&self, model: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(model)) {
            return false;
        }
        !self.exclude.iter().any(|re| re.is_match(model))
    }
}

fn compile(provider: &str, patterns: &[String]) -> Result<Vec<Regex>, LlmError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|e| LlmError::Config(format!("invalid model pattern for provider '{provider}': {e}")))
        })
        .collect()
}

/// Model routing table, in configuration order
#[derive(Debug)]
pub struct ModelRouter {
    providers: Vec<(String, ModelFilter)>,
}

impl ModelRouter {
    /// Create a router from configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if a model pattern is not a valid regex.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let providers = config
            .providers
            .iter()
            .map(|(name, provider)| {
                let filter = ModelFilter {
                    include: compile(name, &provider.models.include)?,
                    exclude: compile(name, &provider.models.exclude)?,
                };
                Ok((name.clone(), filter))
            })
            .collect::<Result<_, LlmError>>()?;

        Ok(Self { providers })
    }

    /// Resolve a model name to a provider and model identifier
    ///
    /// Supports two formats:
    /// - `provider_name/model_name` selects the provider explicitly
    /// - `model_name` picks the first provider whose filters allow it
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ProviderNotFound` if an explicit provider name is unknown.
    /// Returns `LlmError::ModelNotFound` if no provider serves the model.
    pub fn resolve(&self, model: &str) -> Result<ResolvedModel, LlmError> {
        if let Some((provider_name, model_id)) = model.split_once('/') {
            let Some((_, filter)) = self.providers.iter().find(|(name, _)| name == provider_name) else {
                return Err(LlmError::ProviderNotFound {
                    provider: provider_name.to_owned(),
                });
            };

            if model_id.is_empty() || !filter.allows(model_id) {
                return Err(LlmError::ModelNotFound {
                    model: model.to_owned(),
                });
            }

            return Ok(ResolvedModel {
                provider_name: provider_name.to_owned(),
                model_id: model_id.to_owned(),
                explicit_provider: true,
            });
        }

        self.providers
            .iter()
            .find(|(_, filter)| filter.allows(model))
            .map(|(provider_name, _)| ResolvedModel {
                provider_name: provider_name.clone(),
                model_id: model.to_owned(),
                explicit_provider: false,
            })
            .ok_or_else(|| LlmError::ModelNotFound {
                model: model.to_owned(),
            })
    }

    /// Configured provider names, in order
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use weft_config::Config;

    use super::*;

    fn router() -> ModelRouter {
        let config = Config::parse(
            r#"
            [llm.providers.claude]
            type = "anthropic"
            models.include = ["^claude-"]

            [llm.providers.gemini]
            type = "google_ai"
            models.exclude = ["-exp$"]
            "#,
        )
        .unwrap();
        ModelRouter::new(&config.llm).unwrap()
    }

    #[test]
    fn explicit_provider_prefix() {
        let resolved = router().resolve("gemini/gemini-2.5-pro").unwrap();
        assert_eq!(resolved.provider_name, "gemini");
        assert_eq!(resolved.model_id, "gemini-2.5-pro");
        assert!(resolved.explicit_provider);
    }

    #[test]
    fn bare_model_uses_first_allowing_provider() {
        let router = router();
        assert_eq!(router.resolve("claude-sonnet-4-5").unwrap().provider_name, "claude");
        assert_eq!(router.resolve("gemini-2.5-flash").unwrap().provider_name, "gemini");
        assert!(!router.resolve("gemini-2.5-flash").unwrap().explicit_provider);
    }

    #[test]
    fn filters_reject_models() {
        let router = router();
        assert!(matches!(
            router.resolve("claude/gemini-2.5-pro"),
            Err(LlmError::ModelNotFound { .. })
        ));
        assert!(matches!(
            router.resolve("gemini-2.0-flash-exp"),
            Err(LlmError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn unknown_provider_prefix() {
        let err = router().resolve("openai/gpt-4o").unwrap_err();
        assert!(matches!(err, LlmError::ProviderNotFound { provider } if provider == "openai"));
    }

    #[test]
    fn provider_names_keep_config_order() {
        assert_eq!(router().provider_names().collect::<Vec<_>>(), ["claude", "gemini"]);
    }
}
