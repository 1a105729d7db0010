use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::TranslateConfig;
use crate::error::{DubError, Result};

use super::Translator;

/// Google Translate v2 client. The service HTML-escapes its output, so the
/// translated text is entity-decoded before it is returned.
pub struct GoogleTranslator {
    client: Client,
    config: TranslateConfig,
}

#[derive(Debug, Serialize)]
struct TranslateRequest {
    q: String,
    target: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslationsData,
}

#[derive(Debug, Deserialize)]
struct TranslationsData {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl GoogleTranslator {
    pub fn new(config: TranslateConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("HTTP client creation should not fail");

        Self { client, config }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/language/translate/v2?key={}",
            self.config.endpoint, self.config.api_key
        );

        let request = TranslateRequest {
            q: text.to_string(),
            target: target_lang.to_string(),
            source: source_lang.to_string(),
        };

        debug!("Translating {} chars to {}", text.len(), target_lang);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DubError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DubError::Translation(format!(
                "Translate API error {}: {}",
                status, body
            )));
        }

        let translate_response: TranslateResponse = response
            .json()
            .await
            .map_err(|e| DubError::Translation(format!("Failed to parse response: {}", e)))?;

        let translated = translate_response
            .data
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| DubError::Translation("Empty translation received".to_string()))?
            .translated_text;

        Ok(decode_html_entities(&translated))
    }
}

/// Decode the HTML entities the translation service escapes its output with:
/// the five named entities plus decimal and hexadecimal numeric references.
pub fn decode_html_entities(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        output.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let Some(end) = rest.find(';') else {
            output.push_str(rest);
            return output;
        };

        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };

        match decoded {
            Some(ch) => {
                output.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                // Not a recognized entity; keep the ampersand literally.
                output.push('&');
                rest = &rest[1..];
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_named_entities() {
        assert_eq!(
            decode_html_entities("Tom &amp; Jerry &lt;3 &quot;cheese&quot;"),
            "Tom & Jerry <3 \"cheese\""
        );
        assert_eq!(decode_html_entities("l&apos;eau"), "l'eau");
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_html_entities("caf&#233;"), "café");
        assert_eq!(decode_html_entities("caf&#xE9;"), "café");
    }

    #[test]
    fn test_unknown_entity_left_as_is() {
        assert_eq!(decode_html_entities("a &nope; b"), "a &nope; b");
        assert_eq!(decode_html_entities("AT&T"), "AT&T");
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(decode_html_entities("no entities here"), "no entities here");
        assert_eq!(decode_html_entities(""), "");
    }

    #[test]
    fn test_response_parsing() {
        let response: TranslateResponse = serde_json::from_str(
            r#"{"data":{"translations":[{"translatedText":"Bonjour &amp; bienvenue"}]}}"#,
        )
        .unwrap();

        let text = &response.data.translations[0].translated_text;
        assert_eq!(decode_html_entities(text), "Bonjour & bienvenue");
    }
}
