//! Portfolio reports: CSV export and the side-by-side comparison table.

use std::io;

use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::portfolio::PortfolioItem;

#[derive(Serialize)]
struct ReportRow<'a> {
    #[serde(rename = "Domain Name")]
    domain_name: &'a str,
    #[serde(rename = "Current Value")]
    current_value: f64,
    #[serde(rename = "3-Month Est.")]
    three_month: f64,
    #[serde(rename = "6-Month Est.")]
    six_month: f64,
    #[serde(rename = "12-Month Est.")]
    twelve_month: f64,
    #[serde(rename = "Keyword Value")]
    keyword_value: &'a str,
    #[serde(rename = "Search Volume")]
    search_volume: &'a str,
    #[serde(rename = "Sales History")]
    sales_history: &'a str,
    #[serde(rename = "Market Trend")]
    market_trend: &'a str,
    #[serde(rename = "Growth Opportunity (0-10)")]
    opportunity: u8,
}

impl<'a> From<&'a PortfolioItem> for ReportRow<'a> {
    fn from(item: &'a PortfolioItem) -> Self {
        ReportRow {
            domain_name: &item.domain_name,
            current_value: item.current_value,
            three_month: item.future_projections.three_month,
            six_month: item.future_projections.six_month,
            twelve_month: item.future_projections.twelve_month,
            keyword_value: &item.core_influencers.keyword_value,
            search_volume: &item.core_influencers.search_volume,
            sales_history: &item.core_influencers.sales_history,
            market_trend: &item.core_influencers.market_trend,
            opportunity: item.growth_potential.opportunity,
        }
    }
}

/// Writes one CSV row per item, with a header row.
pub fn write_csv<W: io::Write>(items: &[PortfolioItem], writer: W) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for item in items {
        csv.serialize(ReportRow::from(item))?;
    }
    csv.flush()?;
    Ok(())
}

/// One column per domain, one row per metric.
pub fn comparison_table(items: &[PortfolioItem], currency: &str) -> Table {
    let mut table = Table::new();
    let mut header = vec![Cell::new("Metric").add_attribute(Attribute::Bold)];
    header.extend(
        items
            .iter()
            .map(|item| Cell::new(&item.domain_name).add_attribute(Attribute::Bold)),
    );
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(header);

    let money = |value: f64| {
        Cell::new(format!("{value:.0} {currency}")).set_alignment(CellAlignment::Right)
    };
    let rows: Vec<(&str, Vec<Cell>)> = vec![
        ("Current Value", items.iter().map(|i| money(i.current_value)).collect()),
        (
            "3-Month Est.",
            items.iter().map(|i| money(i.future_projections.three_month)).collect(),
        ),
        (
            "6-Month Est.",
            items.iter().map(|i| money(i.future_projections.six_month)).collect(),
        ),
        (
            "12-Month Est.",
            items.iter().map(|i| money(i.future_projections.twelve_month)).collect(),
        ),
        (
            "Keyword Value",
            items.iter().map(|i| Cell::new(&i.core_influencers.keyword_value)).collect(),
        ),
        (
            "Search Volume",
            items.iter().map(|i| Cell::new(&i.core_influencers.search_volume)).collect(),
        ),
        (
            "Sales History",
            items.iter().map(|i| Cell::new(&i.core_influencers.sales_history)).collect(),
        ),
        (
            "Market Trend",
            items.iter().map(|i| Cell::new(&i.core_influencers.market_trend)).collect(),
        ),
        (
            "Opportunity",
            items
                .iter()
                .map(|i| Cell::new(format!("{} / 10", i.growth_potential.opportunity)))
                .collect(),
        ),
    ];
    for (label, cells) in rows {
        let mut row = vec![Cell::new(label).add_attribute(Attribute::Bold)];
        row.extend(cells);
        table.add_row(row);
    }
    table
}
