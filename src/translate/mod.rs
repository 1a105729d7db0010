// Modular translation architecture
//
// A Translator turns one sentence of source text into the target language.
// Implementations are created through the factory so the orchestrator only
// ever sees the trait object.

pub mod google;

use async_trait::async_trait;

use crate::config::TranslateConfig;
use crate::error::Result;

/// Machine-translation collaborator. Implementations must return plain text
/// with HTML entities already decoded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: &str,
    ) -> Result<String>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create the default translator implementation (Google Translate v2)
    pub fn create_translator(config: TranslateConfig) -> Box<dyn Translator> {
        Box::new(google::GoogleTranslator::new(config))
    }
}
