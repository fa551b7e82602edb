use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dailytemp_core::{CancellationToken, Config, Coordinates, OpenWeatherApi};
use inquire::{CustomType, CustomUserError, Password, validator::Validation};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "dailytemp", version, about = "Daily average temperature CLI")]
pub struct Cli {
    /// OpenWeather API token; overrides the stored configuration.
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Samples per day; overrides the stored configuration.
    #[arg(long, global = true)]
    pub samples: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API token and sample count.
    Configure,

    /// Show the temperature at a single point in time.
    Temp {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// RFC 3339 timestamp or YYYY-MM-DD (UTC midnight); if absent, means "now".
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the average temperature over the day starting at `date`.
    Daily {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// YYYY-MM-DD (UTC midnight) or RFC 3339 timestamp.
        #[arg(long)]
        date: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match &self.command {
            Command::Configure => configure(),
            Command::Temp { lat, lon, at } => {
                let when = match at {
                    Some(s) => parse_when(s)?,
                    None => Utc::now(),
                };
                let location = Coordinates::new(*lat, *lon);
                let api = self.api()?;
                let cancel = cancel_on_ctrl_c();

                let temp = api.temp_at(&cancel, when, &location).await?;
                println!("Temperature at {location} on {when}: {temp:.1} °C");
                Ok(())
            }
            Command::Daily { lat, lon, date } => {
                let date = parse_when(date)?;
                let location = Coordinates::new(*lat, *lon);
                let api = self.api()?;
                let cancel = cancel_on_ctrl_c();

                let temp = api.daily_temp(&cancel, date, &location).await?;
                println!(
                    "Average temperature at {location} for {}: {temp:.1} °C ({} samples)",
                    date.date_naive(),
                    api.sample_count()
                );
                Ok(())
            }
        }
    }

    fn effective_config(&self, mut config: Config) -> Config {
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(samples) = self.samples {
            config.count_measurement = samples;
        }
        config
    }

    fn api(&self) -> anyhow::Result<OpenWeatherApi> {
        let config = self.effective_config(Config::load()?);
        OpenWeatherApi::from_config(&config).context("Invalid configuration")
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    config.token = Password::new("OpenWeather API token:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API token")?;

    config.count_measurement = CustomType::<usize>::new("Samples per day:")
        .with_default(config.count_measurement)
        .with_validator(|n: &usize| -> Result<Validation, CustomUserError> {
            if *n >= 1 {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("must be at least 1".into()))
            }
        })
        .prompt()
        .context("Failed to read sample count")?;

    config.validate()?;
    config.save()?;

    println!(
        "Configuration saved to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// Root cancellation scope, cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, cancelling outstanding requests");
            trigger.cancel();
        }
    });

    cancel
}

/// Accepts RFC 3339 (`2024-06-01T12:00:00Z`) or a bare date, read as UTC midnight.
fn parse_when(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date '{s}'. Expected YYYY-MM-DD or RFC 3339."))?;

    date.and_hms_opt(0, 0, 0)
        .map(|ndt| ndt.and_utc())
        .ok_or_else(|| anyhow!("Invalid date '{s}'"))
}
