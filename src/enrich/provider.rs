//! Profile-scraping provider abstraction.
//!
//! The worker depends on [`ProfileScraper`], not on any vendor: the
//! production implementation launches a PhantomBuster LinkedIn scraper agent
//! and polls for its output, and tests substitute an in-memory stub.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::EnrichError;

const PB_API_BASE: &str = "https://api.phantombuster.com/api/v2";
const PB_POLL_INTERVAL_SECS: u64 = 5;
const PB_MAX_POLLS: u32 = 36;

/// Structured profile returned by a scraper.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub experience: Vec<ScrapedExperience>,
    #[serde(default)]
    pub education: Vec<ScrapedEducation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedExperience {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date_range: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedEducation {
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub date_range: Option<String>,
}

/// A provider that turns a raw LinkedIn URL into a structured profile.
#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn scrape(&self, linkedin_url: &str) -> Result<ScrapedProfile, EnrichError>;
}

/// PhantomBuster-backed scraper: launch the configured agent with the
/// profile URL, poll the container until it finishes, parse its result
/// object.
pub struct PhantomBusterScraper {
    http: reqwest::Client,
    api_key: String,
    agent_id: String,
}

impl PhantomBusterScraper {
    pub fn new(api_key: &str, agent_id: &str) -> Result<Self, EnrichError> {
        if api_key.trim().is_empty() {
            return Err(EnrichError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EnrichError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            agent_id: agent_id.to_string(),
        })
    }

    async fn launch(&self, linkedin_url: &str) -> Result<String, EnrichError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct LaunchResponse {
            container_id: String,
        }

        let body = serde_json::json!({
            "id": self.agent_id,
            "argument": { "profileUrl": linkedin_url },
        });

        let response = self
            .http
            .post(format!("{PB_API_BASE}/agents/launch"))
            .header("X-Phantombuster-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(EnrichError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EnrichError::Provider(format!("launch failed ({status}): {text}")));
        }

        let launch: LaunchResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Parse(e.to_string()))?;
        Ok(launch.container_id)
    }

    async fn fetch_output(&self, container_id: &str) -> Result<Option<String>, EnrichError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct OutputResponse {
            status: Option<String>,
            result_object: Option<String>,
        }

        let response = self
            .http
            .get(format!("{PB_API_BASE}/containers/fetch-output"))
            .query(&[("id", container_id)])
            .header("X-Phantombuster-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| EnrichError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EnrichError::Provider(format!("fetch-output failed ({status})")));
        }

        let output: OutputResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::Parse(e.to_string()))?;

        match output.status.as_deref() {
            Some("finished") => match output.result_object {
                Some(result) => Ok(Some(result)),
                None => Err(EnrichError::Provider("agent finished with no result".into())),
            },
            Some("error") => Err(EnrichError::Provider("agent run errored".into())),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ProfileScraper for PhantomBusterScraper {
    async fn scrape(&self, linkedin_url: &str) -> Result<ScrapedProfile, EnrichError> {
        log::info!("PhantomBuster: scraping {}", linkedin_url);
        let container_id = self.launch(linkedin_url).await?;

        for _ in 0..PB_MAX_POLLS {
            tokio::time::sleep(Duration::from_secs(PB_POLL_INTERVAL_SECS)).await;
            if let Some(result) = self.fetch_output(&container_id).await? {
                return parse_result_object(&result);
            }
        }

        Err(EnrichError::Provider(format!(
            "agent did not finish within {}s",
            PB_MAX_POLLS as u64 * PB_POLL_INTERVAL_SECS
        )))
    }
}

/// The result object is either a profile or a one-element array of one.
fn parse_result_object(raw: &str) -> Result<ScrapedProfile, EnrichError> {
    if let Ok(profile) = serde_json::from_str::<ScrapedProfile>(raw) {
        return Ok(profile);
    }
    let list: Vec<ScrapedProfile> =
        serde_json::from_str(raw).map_err(|e| EnrichError::Parse(e.to_string()))?;
    list.into_iter()
        .next()
        .ok_or_else(|| EnrichError::Parse("empty result array".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_object_single() {
        let profile = parse_result_object(
            r#"{"firstName":"Ada","lastName":"Lovelace","headline":"Engineer",
                "experience":[{"companyName":"Analytical Engines","title":"Engineer",
                               "dateRange":"May 2021 - Present"}]}"#,
        )
        .unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Ada"));
        assert_eq!(profile.experience.len(), 1);
        assert_eq!(
            profile.experience[0].company_name.as_deref(),
            Some("Analytical Engines")
        );
    }

    #[test]
    fn test_parse_result_object_array() {
        let profile =
            parse_result_object(r#"[{"firstName":"Ada","education":[{"schoolName":"Cambridge"}]}]"#)
                .unwrap();
        assert_eq!(profile.first_name.as_deref(), Some("Ada"));
        assert_eq!(profile.education[0].school_name.as_deref(), Some("Cambridge"));
    }

    #[test]
    fn test_parse_result_object_garbage() {
        assert!(parse_result_object("not json").is_err());
        assert!(parse_result_object("[]").is_err());
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(
            PhantomBusterScraper::new("", "agent-1"),
            Err(EnrichError::MissingApiKey)
        ));
    }
}
