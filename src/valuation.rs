//! Boundary to the external valuation API.
//!
//! The API is treated as an opaque asynchronous function. Request and
//! response schemas are owned by the endpoint; this module only carries the
//! result shapes through and rejects values that are out of range.

use std::str::FromStr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ProviderError, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub domain_name: String,
    pub estimated_value: f64,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValuationResult {
    pub valuations: Vec<Valuation>,
    pub methodology: String,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FutureProjections {
    pub three_month: f64,
    pub six_month: f64,
    pub twelve_month: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreInfluencers {
    pub keyword_value: String,
    pub search_volume: String,
    pub sales_history: String,
    pub market_trend: String,
}

/// One of the four named fields of [`CoreInfluencers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Influencer {
    KeywordValue,
    SearchVolume,
    SalesHistory,
    MarketTrend,
}

impl Influencer {
    pub fn name(self) -> &'static str {
        match self {
            Influencer::KeywordValue => "keywordValue",
            Influencer::SearchVolume => "searchVolume",
            Influencer::SalesHistory => "salesHistory",
            Influencer::MarketTrend => "marketTrend",
        }
    }

    pub fn value(self, influencers: &CoreInfluencers) -> &str {
        match self {
            Influencer::KeywordValue => &influencers.keyword_value,
            Influencer::SearchVolume => &influencers.search_volume,
            Influencer::SalesHistory => &influencers.sales_history,
            Influencer::MarketTrend => &influencers.market_trend,
        }
    }
}

impl FromStr for Influencer {
    type Err = ValidationError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "keywordValue" => Ok(Influencer::KeywordValue),
            "searchVolume" => Ok(Influencer::SearchVolume),
            "salesHistory" => Ok(Influencer::SalesHistory),
            "marketTrend" => Ok(Influencer::MarketTrend),
            other => Err(ValidationError::UnknownInfluencer(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthPotential {
    /// 0 (none) to 10 (exceptional).
    pub opportunity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedValuation {
    pub domain_name: String,
    pub current_value: f64,
    pub future_projections: FutureProjections,
    pub core_influencers: CoreInfluencers,
    pub growth_potential: GrowthPotential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDataPoint {
    pub month: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAvailability {
    pub available: bool,
    pub registrar: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecommendation {
    pub domain_name: String,
    pub estimated_value: f64,
    pub reason: String,
}

pub fn check_amount(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue(value))
    }
}

pub fn check_opportunity(opportunity: u8) -> Result<(), ValidationError> {
    if opportunity <= 10 {
        Ok(())
    } else {
        Err(ValidationError::OpportunityOutOfRange(opportunity))
    }
}

/// Rejects provider results carrying values no valuation can have.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for BatchValuationResult {
    fn validate(&self) -> Result<(), ValidationError> {
        self.valuations
            .iter()
            .try_for_each(|v| check_amount(v.estimated_value))
    }
}

impl Validate for DetailedValuation {
    fn validate(&self) -> Result<(), ValidationError> {
        check_amount(self.current_value)?;
        check_amount(self.future_projections.three_month)?;
        check_amount(self.future_projections.six_month)?;
        check_amount(self.future_projections.twelve_month)?;
        check_opportunity(self.growth_potential.opportunity)
    }
}

impl Validate for Vec<HistoricalDataPoint> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(|point| check_amount(point.value))
    }
}

impl Validate for Vec<DomainRecommendation> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(|r| check_amount(r.estimated_value))
    }
}

impl Validate for DomainAvailability {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.purchase_price {
            Some(price) => check_amount(price),
            None => Ok(()),
        }
    }
}

/// The external valuation API. One call, one result or one failure; no
/// retries happen behind this trait.
#[async_trait(?Send)]
pub trait ValuationProvider {
    async fn batch_valuation(
        &self,
        domains: &[String],
    ) -> Result<BatchValuationResult, ProviderError>;

    async fn detailed_valuation(&self, domain: &str) -> Result<DetailedValuation, ProviderError>;

    async fn historical_valuation(
        &self,
        domain: &str,
    ) -> Result<Vec<HistoricalDataPoint>, ProviderError>;

    async fn influencer_explanation(
        &self,
        domain: &str,
        influencer: &str,
        value: &str,
    ) -> Result<String, ProviderError>;

    async fn check_availability(&self, domain: &str) -> Result<DomainAvailability, ProviderError>;

    async fn recommendations(
        &self,
        domain: &str,
        value: f64,
    ) -> Result<Vec<DomainRecommendation>, ProviderError>;

    async fn trending(&self) -> Result<Vec<DomainRecommendation>, ProviderError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
enum ValuationRequest<'a> {
    BatchValuation {
        domains: &'a [String],
    },
    DetailedValuation {
        domain: &'a str,
    },
    HistoricalValuation {
        domain: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    InfluencerExplanation {
        domain: &'a str,
        influencer: &'a str,
        value: &'a str,
    },
    Availability {
        domain: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Recommendations {
        domain: &'a str,
        current_value: f64,
    },
    Trending,
}

#[derive(Debug, Deserialize)]
struct Explanation {
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct Recommendations {
    recommendations: Vec<DomainRecommendation>,
}

/// Talks to a JSON endpoint: every operation is a POST of a tagged request
/// object, answered with the JSON result shape.
pub struct HttpValuationProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpValuationProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: &ValuationRequest<'_>,
    ) -> Result<T, ProviderError> {
        debug!(endpoint = %self.endpoint, ?request, "calling valuation API");
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "valuation API request failed");
            return Err(ProviderError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn call_checked<T: DeserializeOwned + Validate>(
        &self,
        request: &ValuationRequest<'_>,
    ) -> Result<T, ProviderError> {
        let result: T = self.call(request).await?;
        result.validate()?;
        Ok(result)
    }
}

#[async_trait(?Send)]
impl ValuationProvider for HttpValuationProvider {
    async fn batch_valuation(
        &self,
        domains: &[String],
    ) -> Result<BatchValuationResult, ProviderError> {
        self.call_checked(&ValuationRequest::BatchValuation { domains })
            .await
    }

    async fn detailed_valuation(&self, domain: &str) -> Result<DetailedValuation, ProviderError> {
        self.call_checked(&ValuationRequest::DetailedValuation { domain })
            .await
    }

    async fn historical_valuation(
        &self,
        domain: &str,
    ) -> Result<Vec<HistoricalDataPoint>, ProviderError> {
        self.call_checked(&ValuationRequest::HistoricalValuation { domain })
            .await
    }

    async fn influencer_explanation(
        &self,
        domain: &str,
        influencer: &str,
        value: &str,
    ) -> Result<String, ProviderError> {
        let explanation: Explanation = self
            .call(&ValuationRequest::InfluencerExplanation {
                domain,
                influencer,
                value,
            })
            .await?;
        Ok(explanation.explanation)
    }

    async fn check_availability(&self, domain: &str) -> Result<DomainAvailability, ProviderError> {
        self.call_checked(&ValuationRequest::Availability { domain })
            .await
    }

    async fn recommendations(
        &self,
        domain: &str,
        value: f64,
    ) -> Result<Vec<DomainRecommendation>, ProviderError> {
        let result: Recommendations = self
            .call(&ValuationRequest::Recommendations {
                domain,
                current_value: value,
            })
            .await?;
        result.recommendations.validate()?;
        Ok(result.recommendations)
    }

    async fn trending(&self) -> Result<Vec<DomainRecommendation>, ProviderError> {
        let result: Recommendations = self.call(&ValuationRequest::Trending).await?;
        result.recommendations.validate()?;
        Ok(result.recommendations)
    }
}
