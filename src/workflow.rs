//! Valuation workflows: the glue between the valuation API and the persisted
//! collections. A failed API call never leaves a partial write behind.

use futures::future::join_all;
use tracing::{debug, info};

use crate::activity::track_event;
use crate::app_state::AppState;
use crate::error::{ValidationError, WorkflowError};
use crate::portfolio::{PortfolioItem, PortfolioPatch};
use crate::valuation::{
    BatchValuationResult, DomainAvailability, DomainRecommendation, HistoricalDataPoint,
    Influencer, ValuationProvider,
};

/// Trims, lowercases and de-duplicates user input, keeping first-seen order.
pub fn normalize_domains<S: AsRef<str>>(input: &[S]) -> Result<Vec<String>, ValidationError> {
    let mut domains: Vec<String> = Vec::new();
    for raw in input {
        let domain = raw.as_ref().trim().trim_end_matches('.').to_lowercase();
        if domain.is_empty() {
            continue;
        }
        if !is_domain_name(&domain) {
            return Err(ValidationError::InvalidDomain(raw.as_ref().to_string()));
        }
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    if domains.is_empty() {
        return Err(ValidationError::NoDomains);
    }
    Ok(domains)
}

fn is_domain_name(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

pub struct Appraiser<P: ValuationProvider> {
    provider: P,
}

impl<P: ValuationProvider> Appraiser<P> {
    pub fn new(provider: P) -> Self {
        Appraiser { provider }
    }

    /// Values a batch of domains and records the result in the history.
    pub async fn appraise_batch<S: AsRef<str>>(
        &self,
        state: &mut AppState,
        input: &[S],
    ) -> Result<BatchValuationResult, WorkflowError> {
        let domains = normalize_domains(input)?;
        info!(count = domains.len(), "requesting batch valuation");
        let result = self.provider.batch_valuation(&domains).await?;
        state.history.add_batch(result.clone());
        Ok(result)
    }

    /// Saves the chosen valuations of a batch; all of them when `selected`
    /// is empty. Returns how many were new to the portfolio.
    pub fn save_selected(
        &self,
        state: &mut AppState,
        batch: &BatchValuationResult,
        selected: &[String],
    ) -> usize {
        let chosen: Vec<_> = batch
            .valuations
            .iter()
            .filter(|v| selected.is_empty() || selected.contains(&v.domain_name))
            .cloned()
            .collect();
        let added = state.portfolio.add_valuations(&chosen);
        track_event("save", "Portfolio", "Save Valuations", Some(added as f64));
        added
    }

    /// Returns the stored item, fetching a detailed valuation first if the
    /// domain is unknown or only has batch placeholders.
    pub async fn ensure_details(
        &self,
        state: &mut AppState,
        domain: &str,
    ) -> Result<PortfolioItem, WorkflowError> {
        let domain = normalize_domain(domain)?;
        if let Some(item) = state.portfolio.get(&domain) {
            if !item.needs_details() {
                debug!(domain = domain.as_str(), "details already cached");
                return Ok(item.clone());
            }
        }
        self.reappraise(state, &domain).await
    }

    /// Always fetches a fresh detailed valuation; resets the item's age.
    /// The result is stored under the requested name, whatever casing the
    /// API answers with.
    pub async fn reappraise(
        &self,
        state: &mut AppState,
        domain: &str,
    ) -> Result<PortfolioItem, WorkflowError> {
        let domain = normalize_domain(domain)?;
        let mut detailed = self.provider.detailed_valuation(&domain).await?;
        detailed.domain_name = domain;
        track_event("reappraise", "Portfolio", &detailed.domain_name, None);
        Ok(state.portfolio.upsert_detailed(detailed).clone())
    }

    /// Historical values for a domain. Cached on the portfolio item after the
    /// first fetch; domains not in the portfolio are fetched every time.
    pub async fn historical_data(
        &self,
        state: &mut AppState,
        domain: &str,
    ) -> Result<Vec<HistoricalDataPoint>, WorkflowError> {
        let domain = normalize_domain(domain)?;
        if let Some(cached) = state
            .portfolio
            .get(&domain)
            .and_then(|item| item.historical_data.clone())
        {
            debug!(domain = domain.as_str(), "historical data already cached");
            return Ok(cached);
        }
        let data = self.provider.historical_valuation(&domain).await?;
        state
            .portfolio
            .update(&domain, PortfolioPatch::historical_data(data.clone()))?;
        Ok(data)
    }

    /// Ensures details for the selected portfolio items, or for all of them
    /// when `selected` is empty, fetching the missing ones concurrently.
    /// Successful fetches are stored even if another fails.
    pub async fn detailed_items(
        &self,
        state: &mut AppState,
        selected: &[String],
    ) -> Result<Vec<PortfolioItem>, WorkflowError> {
        let wanted = if selected.is_empty() {
            Vec::new()
        } else {
            normalize_domains(selected)?
        };
        if let Some(domain) = wanted.iter().find(|d| state.portfolio.get(d).is_none()) {
            return Err(ValidationError::NotInPortfolio(domain.clone()).into());
        }
        let chosen = |domain: &str| wanted.is_empty() || wanted.iter().any(|w| w == domain);

        let missing: Vec<String> = state
            .portfolio
            .items()
            .iter()
            .filter(|item| item.needs_details() && chosen(item.domain_name.as_str()))
            .map(|item| item.domain_name.clone())
            .collect();

        let results = join_all(
            missing
                .iter()
                .map(|domain| self.provider.detailed_valuation(domain)),
        )
        .await;

        let mut first_error = None;
        for (domain, result) in missing.into_iter().zip(results) {
            match result {
                Ok(mut detailed) => {
                    detailed.domain_name = domain;
                    state.portfolio.upsert_detailed(detailed);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
        Ok(state
            .portfolio
            .items()
            .iter()
            .filter(|item| chosen(item.domain_name.as_str()))
            .cloned()
            .collect())
    }

    /// Detailed valuations of two or more saved domains, for side-by-side
    /// display.
    pub async fn compare(
        &self,
        state: &mut AppState,
        domains: &[String],
    ) -> Result<Vec<PortfolioItem>, WorkflowError> {
        let domains = normalize_domains(domains)?;
        if domains.len() < 2 {
            return Err(ValidationError::TooFewToCompare.into());
        }
        let items = self.detailed_items(state, &domains).await?;
        track_event("compare", "Portfolio", &domains.join(","), Some(items.len() as f64));
        Ok(items)
    }

    pub async fn explain_influencer(
        &self,
        state: &mut AppState,
        domain: &str,
        influencer: &str,
    ) -> Result<String, WorkflowError> {
        let influencer: Influencer = influencer.parse()?;
        let item = self.ensure_details(state, domain).await?;
        let value = influencer.value(&item.core_influencers);
        Ok(self
            .provider
            .influencer_explanation(&item.domain_name, influencer.name(), value)
            .await?)
    }

    pub async fn check_availability(&self, domain: &str) -> Result<DomainAvailability, WorkflowError> {
        let domain = normalize_domain(domain)?;
        Ok(self.provider.check_availability(&domain).await?)
    }

    /// Similar domains, priced relative to the stored value when there is one.
    pub async fn recommendations(
        &self,
        state: &AppState,
        domain: &str,
    ) -> Result<Vec<DomainRecommendation>, WorkflowError> {
        let domain = normalize_domain(domain)?;
        let value = state
            .portfolio
            .get(&domain)
            .map(|item| item.current_value)
            .unwrap_or(0.0);
        Ok(self.provider.recommendations(&domain, value).await?)
    }

    pub async fn trending(&self) -> Result<Vec<DomainRecommendation>, WorkflowError> {
        Ok(self.provider.trending().await?)
    }
}

/// Normalizes a single domain the same way as a batch.
pub fn normalize_domain(domain: &str) -> Result<String, ValidationError> {
    Ok(normalize_domains(&[domain])?.remove(0))
}
