use std::rc::Rc;

use chrono::{Local, TimeZone};
use comfy_table::{
    presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement, Table,
};
use serde::{Deserialize, Serialize};

use crate::collection::{now_millis, CollectionStore, LoadOutcome, Record, HOUR_MS};
use crate::error::ValidationError;
use crate::storage::{BackingStore, PORTFOLIO_KEY};
use crate::subscribers::SubscriptionId;
use crate::valuation::{
    check_amount, check_opportunity, CoreInfluencers, DetailedValuation, FutureProjections,
    GrowthPotential, HistoricalDataPoint, Valuation,
};

pub const PORTFOLIO_RETENTION_MS: i64 = 24 * HOUR_MS;

/// A domain valuation the user saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    pub domain_name: String,
    pub current_value: f64,
    pub future_projections: FutureProjections,
    pub core_influencers: CoreInfluencers,
    pub growth_potential: GrowthPotential,
    /// Items stored without a timestamp count as expired on the next load.
    #[serde(default)]
    pub saved_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_data: Option<Vec<HistoricalDataPoint>>,
}

impl PortfolioItem {
    /// Item built from a batch valuation: details are placeholders until a
    /// detailed valuation is fetched.
    pub fn from_valuation(valuation: &Valuation, saved_at: i64) -> Self {
        PortfolioItem {
            domain_name: valuation.domain_name.clone(),
            current_value: valuation.estimated_value,
            future_projections: FutureProjections::default(),
            core_influencers: CoreInfluencers::default(),
            growth_potential: GrowthPotential::default(),
            saved_at,
            historical_data: None,
        }
    }

    pub fn from_detailed(valuation: DetailedValuation, saved_at: i64) -> Self {
        PortfolioItem {
            domain_name: valuation.domain_name,
            current_value: valuation.current_value,
            future_projections: valuation.future_projections,
            core_influencers: valuation.core_influencers,
            growth_potential: valuation.growth_potential,
            saved_at,
            historical_data: None,
        }
    }

    /// True while the projections are still the placeholders of a batch save.
    pub fn needs_details(&self) -> bool {
        self.future_projections.three_month == 0.0 && self.future_projections.six_month == 0.0
    }
}

impl Record for PortfolioItem {
    const STORAGE_KEY: &'static str = PORTFOLIO_KEY;
    const RETENTION_MS: i64 = PORTFOLIO_RETENTION_MS;

    fn key(&self) -> &str {
        &self.domain_name
    }

    fn anchor(&self) -> i64 {
        self.saved_at
    }
}

/// Fields to shallow-merge into an existing item. `None` leaves a field as
/// it is. `saved_at` is never touched by a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioPatch {
    pub current_value: Option<f64>,
    pub future_projections: Option<FutureProjections>,
    pub core_influencers: Option<CoreInfluencers>,
    pub growth_potential: Option<GrowthPotential>,
    pub historical_data: Option<Vec<HistoricalDataPoint>>,
}

impl PortfolioPatch {
    pub fn current_value(value: f64) -> Self {
        PortfolioPatch {
            current_value: Some(value),
            ..Default::default()
        }
    }

    pub fn historical_data(data: Vec<HistoricalDataPoint>) -> Self {
        PortfolioPatch {
            historical_data: Some(data),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(value) = self.current_value {
            check_amount(value)?;
        }
        if let Some(projections) = &self.future_projections {
            check_amount(projections.three_month)?;
            check_amount(projections.six_month)?;
            check_amount(projections.twelve_month)?;
        }
        if let Some(growth) = &self.growth_potential {
            check_opportunity(growth.opportunity)?;
        }
        Ok(())
    }

    fn apply(self, item: &mut PortfolioItem) {
        if let Some(value) = self.current_value {
            item.current_value = value;
        }
        if let Some(projections) = self.future_projections {
            item.future_projections = projections;
        }
        if let Some(influencers) = self.core_influencers {
            item.core_influencers = influencers;
        }
        if let Some(growth) = self.growth_potential {
            item.growth_potential = growth;
        }
        if let Some(data) = self.historical_data {
            item.historical_data = Some(data);
        }
    }
}

/// The user's saved valuations, keyed by domain name.
pub struct Portfolio {
    store: CollectionStore<PortfolioItem>,
}

impl Portfolio {
    pub fn load(backing: Rc<dyn BackingStore>) -> (Portfolio, LoadOutcome) {
        let (store, outcome) = CollectionStore::load(backing);
        (Portfolio { store }, outcome)
    }

    pub fn load_at(backing: Rc<dyn BackingStore>, now: i64) -> (Portfolio, LoadOutcome) {
        let (store, outcome) = CollectionStore::load_at(backing, now);
        (Portfolio { store }, outcome)
    }

    pub fn items(&self) -> &[PortfolioItem] {
        self.store.items()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, domain_name: &str) -> Option<&PortfolioItem> {
        self.store.get(domain_name)
    }

    pub fn write_failures(&self) -> usize {
        self.store.write_failures()
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&[PortfolioItem]) + 'static) -> SubscriptionId {
        self.store.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Saves batch valuations. Domains already in the portfolio are skipped,
    /// so their stored values are left untouched. Returns how many were added.
    pub fn add_valuations(&mut self, valuations: &[Valuation]) -> usize {
        let saved_at = now_millis();
        self.store.insert_unique(
            valuations
                .iter()
                .map(|valuation| PortfolioItem::from_valuation(valuation, saved_at)),
        )
    }

    /// Stores a full valuation, replacing any item for the same domain.
    pub fn upsert_detailed(&mut self, valuation: DetailedValuation) -> &PortfolioItem {
        self.upsert_item(PortfolioItem::from_detailed(valuation, now_millis()))
    }

    /// Replaces or appends `item` with `saved_at` reset to now. Cached
    /// historical data on the replaced item survives unless `item` brings
    /// its own.
    pub fn upsert_item(&mut self, mut item: PortfolioItem) -> &PortfolioItem {
        item.saved_at = now_millis();
        self.store.replace_or_push(item, |new, old| {
            if new.historical_data.is_none() {
                new.historical_data = old.historical_data;
            }
        })
    }

    /// Merges `patch` into the item for `domain_name`. Unknown domains are a
    /// no-op and return `Ok(false)`.
    pub fn update(
        &mut self,
        domain_name: &str,
        patch: PortfolioPatch,
    ) -> Result<bool, ValidationError> {
        patch.validate()?;
        Ok(self.store.modify(domain_name, |item| patch.apply(item)))
    }

    pub fn remove(&mut self, domain_name: &str) -> Option<PortfolioItem> {
        self.store.remove(domain_name)
    }

    pub fn get_total_value(&self) -> f64 {
        self.items().iter().map(|item| item.current_value).sum()
    }

    // Print the portfolio as a table
    pub fn print(&self, currency: &str) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(120);

        table.set_header(vec![
            Cell::new("Domain").add_attribute(Attribute::Bold),
            Cell::new(format!("Value ({currency})")).add_attribute(Attribute::Bold),
            Cell::new("3M").add_attribute(Attribute::Bold),
            Cell::new("6M").add_attribute(Attribute::Bold),
            Cell::new("12M").add_attribute(Attribute::Bold),
            Cell::new("Growth").add_attribute(Attribute::Bold),
            Cell::new("Saved").add_attribute(Attribute::Bold),
        ]);

        for item in self.items() {
            let projection_cell = |value: f64| {
                if item.needs_details() {
                    Cell::new("-").set_alignment(CellAlignment::Right)
                } else {
                    let color = if value >= item.current_value {
                        TColor::Green
                    } else {
                        TColor::Red
                    };
                    Cell::new(format!("{value:.2}"))
                        .set_alignment(CellAlignment::Right)
                        .fg(color)
                }
            };
            let opportunity = item.growth_potential.opportunity;
            let growth_color = match opportunity {
                0..=3 => TColor::DarkRed,
                4..=6 => TColor::DarkYellow,
                _ => TColor::DarkGreen,
            };

            table.add_row(vec![
                Cell::new(&item.domain_name),
                Cell::new(format!("{:.2}", item.current_value)).set_alignment(CellAlignment::Right),
                projection_cell(item.future_projections.three_month),
                projection_cell(item.future_projections.six_month),
                projection_cell(item.future_projections.twelve_month),
                if item.needs_details() {
                    Cell::new("-").set_alignment(CellAlignment::Right)
                } else {
                    Cell::new(format!("{opportunity}/10"))
                        .set_alignment(CellAlignment::Right)
                        .fg(growth_color)
                },
                Cell::new(format_time(item.saved_at)),
            ]);
        }

        table.add_row(vec![
            Cell::new("Total").add_attribute(Attribute::Bold),
            Cell::new(format!("{:.2}", self.get_total_value()))
                .set_alignment(CellAlignment::Right)
                .add_attribute(Attribute::Bold),
        ]);

        println!("{table}");
    }
}

pub fn format_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}
