//! Remote verse source backed by the AlQuran Cloud API.

use super::{Verse, VerseReference};
use crate::config::VerseSourceConfig;
use crate::error::{ReminderError, Result};
use crate::timer::now_epoch_millis;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Supplies verses. Implementations report every failure as
/// [`ReminderError::Network`]; callers fall back to the embedded list.
#[async_trait]
pub trait VerseSource: Send + Sync {
    /// Fetch a random verse.
    async fn fetch_random(&self) -> Result<Verse>;

    /// Fetch one specific verse.
    async fn fetch_by_reference(&self, reference: VerseReference) -> Result<Verse>;
}

/// `GET {base}/ayah/random` and `GET {base}/ayah/{ref}` client.
#[derive(Debug, Clone)]
pub struct AlQuranCloudSource {
    client: reqwest::Client,
    base_url: String,
    translation_edition: Option<String>,
    cache_bust: bool,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    data: ApiAyah,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAyah {
    number: u32,
    text: String,
    number_in_surah: u32,
    surah: ApiSurah,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSurah {
    name: String,
    #[serde(default)]
    english_name: Option<String>,
}

impl ApiAyah {
    fn into_verse(self) -> Result<Verse> {
        if self.text.trim().is_empty() || self.number == 0 || self.number_in_surah == 0 {
            return Err(ReminderError::Network(format!(
                "malformed verse payload (number={}, numberInSurah={})",
                self.number, self.number_in_surah
            )));
        }
        let book = self
            .surah
            .english_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.surah.name);
        Ok(Verse::new(self.text, book, self.number_in_surah, self.number))
    }
}

impl AlQuranCloudSource {
    /// Build a client from config.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &VerseSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("ayah-reminder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReminderError::Network(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            translation_edition: config
                .translation_edition
                .clone()
                .filter(|edition| !edition.trim().is_empty()),
            cache_bust: config.cache_bust,
        })
    }

    async fn get_ayah(&self, path: &str) -> Result<Verse> {
        let url = format!("{}/ayah/{path}", self.base_url);
        let mut request = self.client.get(&url);
        if self.cache_bust {
            request = request.query(&[("t", now_epoch_millis())]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ReminderError::Network(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ReminderError::Network(format!(
                "verse API returned {status} for {url}"
            )));
        }

        let envelope: ApiEnvelope = resp
            .json()
            .await
            .map_err(|e| ReminderError::Network(format!("cannot decode verse payload: {e}")))?;

        envelope.data.into_verse()
    }

    /// Attach the configured translation. Failure leaves the verse untouched.
    async fn with_translation(&self, verse: Verse) -> Verse {
        let Some(edition) = self.translation_edition.as_deref() else {
            return verse;
        };

        match self
            .get_ayah(&format!("{}/{edition}", verse.global_number))
            .await
        {
            Ok(translated) => verse.with_translation(translated.display_text),
            Err(e) => {
                warn!(
                    edition,
                    verse = %verse.id(),
                    "translation unavailable, showing original only: {e}"
                );
                verse
            }
        }
    }
}

#[async_trait]
impl VerseSource for AlQuranCloudSource {
    async fn fetch_random(&self) -> Result<Verse> {
        debug!("fetching random verse from {}", self.base_url);
        let verse = self.get_ayah("random").await?;
        debug!(verse = %verse.id(), "random verse fetched");
        Ok(self.with_translation(verse).await)
    }

    async fn fetch_by_reference(&self, reference: VerseReference) -> Result<Verse> {
        let segment = reference.to_path_segment();
        debug!(reference = %segment, "fetching verse by reference");
        let verse = self.get_ayah(&segment).await?;
        Ok(self.with_translation(verse).await)
    }
}
