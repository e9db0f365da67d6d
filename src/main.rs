use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use utility_meter::config::{
    delete_password, ensure_initialized, get_password, load_config, save_config, set_password, AppConfig,
};
use utility_meter::logging::init_tracing;
use utility_meter::models::MeterUsage;
use utility_meter::pricing::breakdown;
use utility_meter::{AppError, Meter, UtilityClient};

#[derive(Debug, Parser)]
#[command(name = "utility-meter")]
#[command(about = "Daily electricity usage and cost from the utility customer portal")]
struct Cli {
    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    SetCredentials {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// List every meter on the account.
    Meters,
    /// Yesterday's usage and cost for every meter.
    Usage,
    /// Price a day's consumption with the configured rates, offline.
    Estimate {
        #[arg(long)]
        kwh: f64,
        #[arg(long)]
        date: String,
    },
}

fn parse_date(input: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Config(format!("Invalid date '{input}'. Use YYYY-MM-DD.")))
}

async fn logged_in_client(cfg: &AppConfig) -> Result<UtilityClient, AppError> {
    let username = cfg.require_username()?;
    let password = get_password(username)?;
    let client = UtilityClient::new(cfg.client_options())?;
    client.login(username, &password).await?;
    Ok(client)
}

fn usage_line(meter: &str, usage: Option<&MeterUsage>) -> String {
    match usage {
        Some(u) => format!("{meter}\t{}\t{:.2} kWh\t${:.2}", u.date, u.usage_kwh, u.cost),
        None => format!("{meter}\t-\tno reading yet"),
    }
}

fn meter_line(meter: &Meter) -> String {
    format!(
        "{}\taccount {}\tservice {}\t{}",
        meter.id, meter.account.account_number, meter.bill.service_id, meter.account.service_address
    )
}

fn estimate(kwh: f64, date: NaiveDate, cfg: &AppConfig, as_json: bool) -> Result<String, AppError> {
    if !kwh.is_finite() || kwh < 0.0 {
        return Err(AppError::Config(format!("kWh must be non-negative, got {kwh}.")));
    }
    let usage = MeterUsage::new(date, kwh);
    let cost = breakdown(&usage, &cfg.rates, &cfg.blocks);
    if as_json {
        return Ok(json!({
            "date": date.to_string(),
            "usage_kwh": kwh,
            "first_block_kwh": cost.first_block_kwh,
            "second_block_kwh": cost.second_block_kwh,
            "cost": cost.total,
        })
        .to_string());
    }
    Ok(format!(
        "{date}: {kwh:.2} kWh = ${:.4} (first block {:.2} kWh, second block {:.2} kWh)",
        cost.total, cost.first_block_kwh, cost.second_block_kwh
    ))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized utility-meter config.");
        }
        Commands::SetCredentials { username, password } => {
            ensure_initialized()?;
            let mut cfg = load_config()?;
            let username = username.trim().to_string();
            if username.is_empty() {
                return Err(AppError::Config("Username must not be empty.".into()));
            }
            set_password(&username, &password)?;
            if let Some(previous) = cfg.username.replace(username.clone()) {
                if previous != username {
                    delete_password(&previous)?;
                }
            }
            save_config(&cfg)?;
            println!("Credentials for '{username}' saved.");
        }
        Commands::Meters => {
            let cfg = load_config()?;
            let client = logged_in_client(&cfg).await?;
            let meters = client.get_meters().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&meters)?);
            } else {
                for meter in meters.values() {
                    println!("{}", meter_line(meter));
                }
            }
        }
        Commands::Usage => {
            let cfg = load_config()?;
            let client = logged_in_client(&cfg).await?;
            let latest = client.get_latest_usage().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&latest)?);
            } else {
                for (meter, usage) in &latest {
                    println!("{}", usage_line(meter, usage.as_ref()));
                }
            }
        }
        Commands::Estimate { kwh, date } => {
            let cfg = load_config()?;
            println!("{}", estimate(kwh, parse_date(&date)?, &cfg, cli.json)?);
        }
    }

    Ok(())
}
