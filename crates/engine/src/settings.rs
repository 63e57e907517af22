//! Engine settings derived from the application config.

use crate::context::knowledge::RetrievalSettings;
use canopy_config::{AppConfig, ChatConfig};

/// Everything the engine needs to know about models and limits.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub temperature: f32,
    pub chat: ChatConfig,
    pub retrieval: RetrievalSettings,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            chat: config.chat.clone(),
            retrieval: RetrievalSettings::from(&config.knowledge),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config() {
        let settings = EngineSettings::default();
        assert_eq!(settings.model, "llama-3.1-8b-instant");
        assert_eq!(settings.chat.max_history_messages, 10);
        assert_eq!(settings.chat.summarize_every, 10);
        assert_eq!(settings.retrieval.max_results, 3);
    }
}
