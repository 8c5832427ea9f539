//! Classification seam and its OpenAI-backed implementation.
//!
//! The pipeline only depends on the [`Classifier`] trait: hand it the fixed
//! taxonomy and a batch of subjects, get back a structured
//! `{ results: [...] }` assignment or a typed error. [`OpenAiClassifier`]
//! implements the trait over the chat completions API with the same
//! retry/backoff discipline as the rest of our outbound HTTP.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::ClassifyConfig;
use crate::models::{ClassifyResponse, Subject};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Http(String),

    #[error("malformed classifier response: {0}")]
    Format(String),

    #[error("classifier configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ClassifyError {
    fn from(e: reqwest::Error) -> Self {
        ClassifyError::Http(e.to_string())
    }
}

/// Capability interface for batched interest classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        taxonomy: &[String],
        subjects: &[Subject],
    ) -> Result<ClassifyResponse, ClassifyError>;
}

const SYSTEM_PROMPT: &str = "You are an expert at analyzing social media accounts to determine \
interest categories. You must categorize accounts into the provided categories based on \
username, name, and bio text. Return results as a valid JSON object.";

/// Build the user prompt for one classification batch: the full category
/// list, each subject's descriptor, and the required response shape.
pub fn build_prompt(taxonomy: &[String], subjects: &[Subject]) -> String {
    let categories = taxonomy.join(", ");

    let mut prompt = format!(
        "I need you to analyze the following accounts and determine which interest \
categories they fall into.\n\n\
The available categories are: {categories}\n\n\
For each account, return:\n\
1. The account username\n\
2. The most likely interest category (must be one from the list provided)\n\
3. A confidence score (0.0-1.0) of how confident you are in this categorization\n\n\
Here are the accounts to analyze:\n"
    );

    for subject in subjects {
        prompt.push_str("\n---\n");
        prompt.push_str(&format!("Username: {}\n", subject.username));
        prompt.push_str(&format!("Name: {}\n", subject.full_name));
        prompt.push_str(&format!("Bio: {}\n", subject.bio));
    }

    prompt.push_str(
        "\nReturn your analysis in a valid JSON format as follows:\n\
{\n\
  \"results\": [\n\
    {\n\
      \"username\": \"username1\",\n\
      \"category\": \"Category\",\n\
      \"confidence\": 0.9\n\
    }\n\
  ]\n\
}\n\n\
Remember, use ONLY the categories provided in the list.",
    );

    prompt
}

/// Parse the model's message content into the response contract. Anything
/// that is not JSON with a `results` array is a format error, which the
/// caller treats as a whole-batch failure.
pub fn parse_response(content: &str) -> Result<ClassifyResponse, ClassifyError> {
    serde_json::from_str(content).map_err(|e| ClassifyError::Format(e.to_string()))
}

/// [`Classifier`] over the OpenAI chat completions API.
pub struct OpenAiClassifier {
    api_key: String,
    model: String,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiClassifier {
    /// Requires `OPENAI_API_KEY` in the environment.
    pub fn new(config: &ClassifyConfig) -> Result<Self, ClassifyError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClassifyError::Config("OPENAI_API_KEY not set".to_string()))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(
        &self,
        taxonomy: &[String],
        subjects: &[Subject],
    ) -> Result<ClassifyResponse, ClassifyError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(taxonomy, subjects) },
            ],
            "temperature": 0.2,
            "max_tokens": 2000,
            "response_format": { "type": "json_object" },
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let content = json
                            .pointer("/choices/0/message/content")
                            .and_then(|c| c.as_str())
                            .ok_or_else(|| {
                                ClassifyError::Format("missing message content".to_string())
                            })?;
                        return parse_response(content);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(ClassifyError::Http(format!(
                            "OpenAI API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(ClassifyError::Http(format!(
                        "OpenAI API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ClassifyError::Http("classification failed after retries".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(username: &str, name: &str, bio: &str) -> Subject {
        Subject {
            username: username.to_string(),
            full_name: name.to_string(),
            bio: bio.to_string(),
        }
    }

    #[test]
    fn prompt_lists_taxonomy_and_subjects() {
        let taxonomy = vec!["Music".to_string(), "Sports".to_string()];
        let subjects = vec![
            subject("fc_internazionale", "Inter", "Football club"),
            subject("synthwave_daily", "Synthwave Daily", ""),
        ];
        let prompt = build_prompt(&taxonomy, &subjects);

        assert!(prompt.contains("Music, Sports"));
        assert!(prompt.contains("Username: fc_internazionale"));
        assert!(prompt.contains("Username: synthwave_daily"));
        assert!(prompt.contains("ONLY the categories provided"));
    }

    #[test]
    fn parse_accepts_contract_shape() {
        let content = r#"{"results": [{"username": "a", "category": "Music", "confidence": 0.8}]}"#;
        let parsed = parse_response(content).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].category, "Music");
    }

    #[test]
    fn parse_rejects_missing_results_key() {
        let err = parse_response(r#"{"answers": []}"#).unwrap_err();
        assert!(matches!(err, ClassifyError::Format(_)));
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_response("Sure! Here are the categories:").unwrap_err();
        assert!(matches!(err, ClassifyError::Format(_)));
    }
}
