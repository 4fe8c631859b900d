use std::fs::{write, File};
use std::rc::Rc;

use domain_appraiser::activity;
use domain_appraiser::app_state::AppState;
use domain_appraiser::config::{Config, APP_NAME, CONFIG_NAME};
use domain_appraiser::portfolio::{format_time, PortfolioItem, PortfolioPatch};
use domain_appraiser::report;
use domain_appraiser::storage::MemoryStore;
use domain_appraiser::valuation::{DomainRecommendation, HttpValuationProvider, ValuationProvider};
use domain_appraiser::workflow::{normalize_domain, Appraiser};

use clap::{arg, value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table};
use eyre::WrapErr;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Commands that read or change the saved portfolio.
const LOGIN_REQUIRED: &[&str] = &[
    "portfolio",
    "show",
    "edit",
    "reappraise",
    "trend",
    "explain",
    "remove",
    "export",
    "compare",
];

/// Saving from `appraise` needs a login too.
fn requires_login(name: &str, matches: &ArgMatches) -> bool {
    LOGIN_REQUIRED.contains(&name) || (name == "appraise" && matches.get_flag("save"))
}

fn domain_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(arg!(<DOMAIN> "Domain name"))
}

fn cli() -> Command {
    Command::new("domain-appraiser")
        .about("Appraise domain names and keep a portfolio of valuations")
        .arg_required_else_help(true)
        .arg(
            Arg::new("in-memory")
                .long("in-memory")
                .help("Keep everything in memory; nothing is read from or saved to the database")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(Command::new("login").about("Log in to use the portfolio"))
        .subcommand(Command::new("logout").about("Log out"))
        .subcommand(Command::new("status").about("Show login state and saved data"))
        .subcommand(
            Command::new("appraise")
                .about("Value one or more domains")
                .arg(arg!(<DOMAIN> ... "Domain names to appraise"))
                .arg(arg!(--save "Save every valuation to the portfolio")),
        )
        .subcommand(Command::new("portfolio").about("Show your saved valuations"))
        .subcommand(domain_command("show", "Show the detailed valuation of a domain"))
        .subcommand(
            domain_command("edit", "Change the current value of a saved domain").arg(
                arg!(--value <USD> "New current value")
                    .required(true)
                    .value_parser(value_parser!(f64)),
            ),
        )
        .subcommand(domain_command("reappraise", "Fetch a fresh detailed valuation"))
        .subcommand(domain_command("trend", "Show the historical value of a domain"))
        .subcommand(
            domain_command("explain", "Explain one of the core influencers of a valuation").arg(
                arg!(<INFLUENCER> "keywordValue, searchVolume, salesHistory or marketTrend"),
            ),
        )
        .subcommand(domain_command("remove", "Delete a domain from the portfolio"))
        .subcommand(Command::new("history").about("List the batch valuations of the last week"))
        .subcommand(domain_command("check", "Check whether a domain can be registered"))
        .subcommand(domain_command("recommend", "Suggest similar domains"))
        .subcommand(Command::new("trending").about("Show trending domains"))
        .subcommand(
            Command::new("export")
                .about("Write a detailed portfolio report as JSON or CSV")
                .arg(arg!([FILE] "Output file, stdout if omitted"))
                .arg(
                    arg!(-d --domain <DOMAIN> "Only export this saved domain; repeatable")
                        .action(ArgAction::Append),
                )
                .arg(arg!(--csv "Write CSV instead of JSON")),
        )
        .subcommand(
            Command::new("compare")
                .about("Compare the detailed valuations of saved domains side by side")
                .arg(arg!(<DOMAIN> ... "Two or more saved domains")),
        )
}

fn print_item(item: &PortfolioItem, currency: &str) {
    println!("{}", item.domain_name.bold());
    println!("  Current value:  {:.2} {currency}", item.current_value);
    let projections = &item.future_projections;
    println!(
        "  Projections:    3M {:.2} / 6M {:.2} / 12M {:.2}",
        projections.three_month, projections.six_month, projections.twelve_month
    );
    println!(
        "  Growth:         {}/10",
        item.growth_potential.opportunity
    );
    let influencers = &item.core_influencers;
    println!("  Keyword value:  {}", influencers.keyword_value);
    println!("  Search volume:  {}", influencers.search_volume);
    println!("  Sales history:  {}", influencers.sales_history);
    println!("  Market trend:   {}", influencers.market_trend);
    println!("  Saved:          {}", format_time(item.saved_at));
}

fn print_recommendations(recommendations: &[DomainRecommendation], currency: &str) {
    if recommendations.is_empty() {
        println!("No recommendations.");
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("Domain").add_attribute(Attribute::Bold),
            Cell::new(format!("Value ({currency})")).add_attribute(Attribute::Bold),
            Cell::new("Reason").add_attribute(Attribute::Bold),
        ]);
    for r in recommendations {
        table.add_row(vec![
            Cell::new(&r.domain_name),
            Cell::new(format!("{:.2}", r.estimated_value)).set_alignment(CellAlignment::Right),
            Cell::new(&r.reason),
        ]);
    }
    println!("{table}");
}

fn print_history(state: &AppState, currency: &str) {
    if state.history.is_empty() {
        println!("No valuations in the last 7 days.");
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120)
        .set_header(vec![
            Cell::new("When").add_attribute(Attribute::Bold),
            Cell::new("Domains").add_attribute(Attribute::Bold),
            Cell::new(format!("Total ({currency})")).add_attribute(Attribute::Bold),
        ]);
    for item in state.history.items() {
        let valuations = &item.batch_result.valuations;
        let domains: Vec<&str> = valuations.iter().map(|v| v.domain_name.as_str()).collect();
        let total: f64 = valuations.iter().map(|v| v.estimated_value).sum();
        table.add_row(vec![
            Cell::new(format_time(item.timestamp)),
            Cell::new(domains.join(", ")),
            Cell::new(format!("{total:.2}")).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
}

fn domain_arg(matches: &ArgMatches) -> eyre::Result<String> {
    let raw = matches
        .get_one::<String>("DOMAIN")
        .map(String::as_str)
        .unwrap_or_default();
    Ok(normalize_domain(raw)?)
}

fn domain_args(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

async fn run_command<P: ValuationProvider>(
    name: &str,
    matches: &ArgMatches,
    state: &mut AppState,
    appraiser: &Appraiser<P>,
    cfg: &Config,
) -> eyre::Result<()> {
    let currency = cfg.currency.as_str();

    if requires_login(name, matches) && !state.auth.is_logged_in() {
        eyre::bail!("Please log in first: domain-appraiser login");
    }

    match name {
        "login" => {
            state.auth.login();
            activity::track_event("login", "Auth", "Login", None);
            println!("{}", "Logged in.".green());
        }
        "logout" => {
            state.auth.logout();
            activity::track_event("logout", "Auth", "Logout", None);
            println!("Logged out.");
        }
        "status" => {
            let login = if state.auth.is_logged_in() {
                "logged in".green()
            } else {
                "logged out".yellow()
            };
            println!("You are {login}.");
            println!(
                "Portfolio: {} domain(s), {:.2} {currency}",
                state.portfolio.len(),
                state.portfolio.get_total_value()
            );
            println!("History:   {} batch valuation(s)", state.history.len());
        }
        "appraise" => {
            let domains = domain_args(matches, "DOMAIN");
            let save = matches.get_flag("save");

            let batch = appraiser
                .appraise_batch(state, domains.as_slice())
                .await
                .wrap_err("Failed to get valuations")?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_width(120)
                .set_header(vec![
                    Cell::new("Domain").add_attribute(Attribute::Bold),
                    Cell::new(format!("Value ({currency})")).add_attribute(Attribute::Bold),
                    Cell::new("Justification").add_attribute(Attribute::Bold),
                ]);
            for v in &batch.valuations {
                table.add_row(vec![
                    Cell::new(&v.domain_name),
                    Cell::new(format!("{:.2}", v.estimated_value))
                        .set_alignment(CellAlignment::Right),
                    Cell::new(&v.justification),
                ]);
            }
            println!("{table}");
            println!("{} {}", "Methodology:".bold(), batch.methodology);
            if !batch.resources.is_empty() {
                println!("{} {}", "Resources:".bold(), batch.resources.join(", "));
            }

            if save {
                let added = appraiser.save_selected(state, &batch, &[]);
                println!("{}", format!("{added} domain(s) saved to portfolio").green());
            }
        }
        "portfolio" => {
            if state.portfolio.is_empty() {
                println!("Your portfolio is empty. Saved valuations are kept for 24 hours.");
            } else {
                state.portfolio.print(currency);
            }
        }
        "show" => {
            let domain = domain_arg(matches)?;
            let item = appraiser
                .ensure_details(state, &domain)
                .await
                .wrap_err_with(|| format!("Failed to get detailed valuation for {domain}"))?;
            print_item(&item, currency);
            match appraiser.recommendations(state, &domain).await {
                Ok(recommendations) => print_recommendations(&recommendations, currency),
                Err(e) => eprintln!("{}", format!("Could not load recommendations: {e}").red()),
            }
        }
        "edit" => {
            let domain = domain_arg(matches)?;
            let value = *matches.get_one::<f64>("value").unwrap_or(&0.0);
            if state
                .portfolio
                .update(&domain, PortfolioPatch::current_value(value))?
            {
                activity::track_event("edit", "Portfolio", &domain, Some(value));
                println!("{}", format!("{domain} now valued at {value:.2} {currency}").green());
            } else {
                println!("{domain} is not in your portfolio.");
            }
        }
        "reappraise" => {
            let domain = domain_arg(matches)?;
            let item = appraiser
                .reappraise(state, &domain)
                .await
                .wrap_err_with(|| format!("Failed to re-appraise {domain}"))?;
            print_item(&item, currency);
        }
        "trend" => {
            let domain = domain_arg(matches)?;
            let data = appraiser
                .historical_data(state, &domain)
                .await
                .wrap_err_with(|| format!("Failed to get historical valuation for {domain}"))?;
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec![
                    Cell::new("Month").add_attribute(Attribute::Bold),
                    Cell::new(format!("Value ({currency})")).add_attribute(Attribute::Bold),
                ]);
            for point in &data {
                table.add_row(vec![
                    Cell::new(&point.month),
                    Cell::new(format!("{:.2}", point.value)).set_alignment(CellAlignment::Right),
                ]);
            }
            println!("{table}");
        }
        "explain" => {
            let domain = domain_arg(matches)?;
            let influencer = matches
                .get_one::<String>("INFLUENCER")
                .cloned()
                .unwrap_or_default();
            let text = appraiser
                .explain_influencer(state, &domain, &influencer)
                .await
                .wrap_err("Failed to get explanation")?;
            println!("{text}");
        }
        "remove" => {
            let domain = domain_arg(matches)?;
            match state.portfolio.remove(&domain) {
                Some(_) => {
                    activity::track_event("delete", "Portfolio", &domain, None);
                    println!("Removed {domain}.");
                }
                None => println!("{domain} is not in your portfolio."),
            }
        }
        "history" => print_history(state, currency),
        "check" => {
            let domain = domain_arg(matches)?;
            let availability = appraiser
                .check_availability(&domain)
                .await
                .wrap_err_with(|| format!("Failed to check availability of {domain}"))?;
            if availability.available {
                let registrar = availability.registrar.as_deref().unwrap_or("any registrar");
                let price = availability
                    .purchase_price
                    .map(|p| format!(" for {p:.2} {currency}"))
                    .unwrap_or_default();
                println!("{}", format!("{domain} is available at {registrar}{price}").green());
            } else {
                println!("{}", format!("{domain} is taken").red());
            }
        }
        "recommend" => {
            let domain = domain_arg(matches)?;
            let recommendations = appraiser
                .recommendations(state, &domain)
                .await
                .wrap_err("Failed to get domain recommendations")?;
            print_recommendations(&recommendations, currency);
        }
        "trending" => {
            let trending = appraiser
                .trending()
                .await
                .wrap_err("Failed to get trending domains")?;
            print_recommendations(&trending, currency);
        }
        "export" => {
            let selected = domain_args(matches, "domain");
            let items = appraiser
                .detailed_items(state, &selected)
                .await
                .wrap_err("An error occurred while fetching detailed data for the report")?;
            if items.is_empty() {
                println!("Your portfolio is empty, nothing to export.");
                return Ok(());
            }
            let file = matches.get_one::<String>("FILE");
            if matches.get_flag("csv") {
                match file {
                    Some(file) => {
                        let out = File::create(file)
                            .wrap_err_with(|| format!("Error writing file: {file}"))?;
                        report::write_csv(&items, out)?;
                    }
                    None => report::write_csv(&items, std::io::stdout().lock())?,
                }
            } else {
                let json = serde_json::to_string_pretty(&items)?;
                match file {
                    Some(file) => {
                        write(file, json).wrap_err_with(|| format!("Error writing file: {file}"))?;
                    }
                    None => println!("{json}"),
                }
            }
            if let Some(file) = file {
                activity::track_event("export", "Portfolio", file, Some(items.len() as f64));
                println!("Wrote {} domain(s) to {file}", items.len());
            }
        }
        "compare" => {
            let domains = domain_args(matches, "DOMAIN");
            let items = appraiser
                .compare(state, &domains)
                .await
                .wrap_err("An error occurred while preparing data for comparison")?;
            println!("{}", report::comparison_table(&items, currency));
        }
        _ => (),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load(APP_NAME, CONFIG_NAME)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let Some((name, sub_matches)) = matches.subcommand() else {
        return Ok(());
    };
    activity::track_command(name);

    if name == "config" {
        println!(
            "Your config file is located here: \n{}",
            confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?.display()
        );
        return Ok(());
    }

    let mut state = if sub_matches.get_flag("in-memory") {
        AppState::load(Rc::new(MemoryStore::new()))
    } else {
        AppState::open(&cfg.database_path)
            .wrap_err_with(|| format!("Error opening database at {}", cfg.database_path))?
    };
    state
        .portfolio
        .subscribe(|items| debug!(count = items.len(), "portfolio changed"));
    state
        .history
        .subscribe(|items| debug!(count = items.len(), "history changed"));

    let appraiser = Appraiser::new(HttpValuationProvider::new(
        cfg.api_endpoint.clone(),
        cfg.api_key(),
    ));
    let result = run_command(name, sub_matches, &mut state, &appraiser, &cfg).await;

    if state.has_unsaved_changes() {
        eprintln!(
            "{}",
            "Warning: some changes could not be saved to the database.".yellow()
        );
    }
    state.shutdown()?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli() {
        let matches = cli().get_matches_from(vec!["domain-appraiser", "appraise", "a.com", "b.io", "--save"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "appraise");
        let domains: Vec<&String> = sub.get_many::<String>("DOMAIN").unwrap().collect();
        assert_eq!(domains, vec!["a.com", "b.io"]);
        assert!(sub.get_flag("save"));
        assert!(!sub.get_flag("in-memory"));
    }

    #[test]
    fn test_cli_in_memory_is_global() {
        let matches = cli().get_matches_from(vec!["domain-appraiser", "status", "--in-memory"]);
        assert!(matches.subcommand_matches("status").unwrap().get_flag("in-memory"));
    }

    #[test]
    fn test_cli_edit_requires_value() {
        assert!(cli()
            .try_get_matches_from(vec!["domain-appraiser", "edit", "a.com"])
            .is_err());
        let matches = cli()
            .try_get_matches_from(vec!["domain-appraiser", "edit", "a.com", "--value", "1250.5"])
            .unwrap();
        let sub = matches.subcommand_matches("edit").unwrap();
        assert_eq!(sub.get_one::<f64>("value"), Some(&1250.5));
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    use domain_appraiser::valuation::Valuation;

    fn test_state(logged_in: bool) -> AppState {
        let mut state = AppState::load(Rc::new(MemoryStore::new()));
        if logged_in {
            state.auth.login();
        }
        state.portfolio.add_valuations(&[Valuation {
            domain_name: "a.com".to_string(),
            estimated_value: 100.0,
            justification: String::new(),
        }]);
        state
    }

    async fn run(args: &[&str], state: &mut AppState) -> eyre::Result<()> {
        let mut argv = vec!["domain-appraiser"];
        argv.extend_from_slice(args);
        let matches = cli().get_matches_from(argv);
        let (name, sub) = matches.subcommand().unwrap();
        // nothing listens here; commands that reach the API fail
        let appraiser = Appraiser::new(HttpValuationProvider::new("http://127.0.0.1:9/valuation", None));
        run_command(name, sub, state, &appraiser, &Config::default()).await
    }

    #[tokio::test]
    async fn test_portfolio_commands_need_login() {
        let mut state = test_state(false);
        let gated: &[&[&str]] = &[
            &["portfolio"],
            &["show", "a.com"],
            &["edit", "a.com", "--value", "5"],
            &["reappraise", "a.com"],
            &["trend", "a.com"],
            &["explain", "a.com", "marketTrend"],
            &["remove", "a.com"],
            &["export"],
            &["compare", "a.com", "b.com"],
            &["appraise", "b.com", "--save"],
        ];
        for args in gated {
            let err = run(args, &mut state).await.unwrap_err();
            assert!(err.to_string().contains("log in"), "{args:?}: {err}");
        }
        assert_eq!(state.portfolio.get("a.com").unwrap().current_value, 100.0);
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_login_unlocks_portfolio_commands() {
        let mut state = test_state(false);
        run(&["status"], &mut state).await.unwrap();
        run(&["login"], &mut state).await.unwrap();
        assert!(state.auth.is_logged_in());

        run(&["edit", "a.com", "--value", "5"], &mut state).await.unwrap();
        assert_eq!(state.portfolio.get("a.com").unwrap().current_value, 5.0);
        run(&["remove", "a.com"], &mut state).await.unwrap();
        assert!(state.portfolio.is_empty());

        run(&["logout"], &mut state).await.unwrap();
        assert!(run(&["portfolio"], &mut state).await.is_err());
    }

    #[test]
    fn test_appraise_without_save_is_open() {
        let matches = cli().get_matches_from(vec!["domain-appraiser", "appraise", "a.com"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert!(!requires_login(name, sub));
        let matches = cli().get_matches_from(vec!["domain-appraiser", "history"]);
        let (name, sub) = matches.subcommand().unwrap();
        assert!(!requires_login(name, sub));
    }

    #[tokio::test]
    async fn test_domain_arguments_are_normalized() {
        let mut state = test_state(true);
        run(&["edit", " A.COM. ", "--value", "7"], &mut state).await.unwrap();
        assert_eq!(state.portfolio.get("a.com").unwrap().current_value, 7.0);

        assert!(run(&["remove", "not a domain"], &mut state).await.is_err());
        assert_eq!(state.portfolio.len(), 1);
    }

    #[test]
    fn test_cli_export_selection() {
        let matches = cli().get_matches_from(vec![
            "domain-appraiser",
            "export",
            "report.csv",
            "--domain",
            "a.com",
            "-d",
            "b.io",
            "--csv",
        ]);
        let sub = matches.subcommand_matches("export").unwrap();
        assert_eq!(domain_args(sub, "domain"), vec!["a.com", "b.io"]);
        assert!(sub.get_flag("csv"));
        assert_eq!(sub.get_one::<String>("FILE").map(String::as_str), Some("report.csv"));
    }
}
