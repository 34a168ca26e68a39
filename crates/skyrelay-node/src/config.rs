use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use skyrelay_feed::opensky::states_url;
use skyrelay_feed::{BoundingBox, Credentials, OpenSkyConfig};
use skyrelay_server::RelayConfig;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(clap::Parser, Debug)]
#[command(
    name = "skyrelay",
    version,
    about = "Rebroadcast OpenSky Network aircraft states as a BaseStation feed"
)]
pub struct Cli {
    /// OpenSky user name. Anonymous access when omitted.
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long, env = "OPENSKY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Root URL for OpenSky API calls
    #[arg(long)]
    pub root_url: Option<String>,
    /// Seconds between fetches for anonymous users
    #[arg(long, value_name = "SECS")]
    pub anon_interval: Option<u64>,
    /// Seconds between fetches for logged-in users
    #[arg(long, value_name = "SECS")]
    pub user_interval: Option<u64>,
    /// ICAO24 codes to fetch. Repeatable; each value may also be a list
    /// separated by '-', ',' or ';'.
    #[arg(long = "icao24", value_name = "HEX")]
    pub icao24: Vec<String>,
    #[arg(long, allow_negative_numbers = true)]
    pub lamin: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lamax: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lomin: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lomax: Option<f64>,
    /// Port to accept BaseStation clients on
    #[arg(long)]
    pub port: Option<u16>,
    /// Seconds between keep-alive re-broadcasts, 0 to switch off
    #[arg(long, value_name = "SECS")]
    pub tickle_secs: Option<u64>,
    /// File overwritten with the raw OpenSky JSON after every fetch
    #[arg(long)]
    pub json_file: Option<PathBuf>,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct OpenSkySection {
    pub root_url: String,
    pub anon_interval_secs: u64,
    pub user_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub icao24: Vec<String>,
    pub lamin: Option<f64>,
    pub lamax: Option<f64>,
    pub lomin: Option<f64>,
    pub lomax: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RelaySection {
    pub port: u16,
    pub tickle_secs: u64,
    pub json_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub opensky: OpenSkySection,
    pub relay: RelaySection,
    pub observability: ObservabilityConfig,
}

/// Everything the binary needs once configuration has been checked.
#[derive(Debug)]
pub struct Settings {
    pub opensky: OpenSkyConfig,
    pub relay: RelayConfig,
    pub listen: SocketAddr,
    pub observability: ObservabilityConfig,
}

/// Built-in defaults, then `--config`, then `SKYRELAY_*` variables, then
/// command-line flags.
pub fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));

    if let Some(ref config_path) = cli.config {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    let mut config: Config = figment
        .merge(Env::prefixed("SKYRELAY_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.apply_cli(cli);
    Ok(config)
}

impl Config {
    fn apply_cli(&mut self, cli: &Cli) {
        let os = &mut self.opensky;
        if let Some(ref v) = cli.user {
            os.user = Some(v.clone());
        }
        if let Some(ref v) = cli.password {
            os.password = Some(v.clone());
        }
        if let Some(ref v) = cli.root_url {
            os.root_url = v.clone();
        }
        if let Some(v) = cli.anon_interval {
            os.anon_interval_secs = v;
        }
        if let Some(v) = cli.user_interval {
            os.user_interval_secs = v;
        }
        if !cli.icao24.is_empty() {
            os.icao24 = cli.icao24.clone();
        }
        os.lamin = cli.lamin.or(os.lamin);
        os.lamax = cli.lamax.or(os.lamax);
        os.lomin = cli.lomin.or(os.lomin);
        os.lomax = cli.lomax.or(os.lomax);

        if let Some(v) = cli.port {
            self.relay.port = v;
        }
        if let Some(v) = cli.tickle_secs {
            self.relay.tickle_secs = v;
        }
        if let Some(ref v) = cli.json_file {
            self.relay.json_file = Some(v.clone());
        }
    }

    /// Validate and convert into runtime settings.
    pub fn resolve(self) -> anyhow::Result<Settings> {
        let Config { opensky: os, relay, observability } = self;

        if relay.port == 0 {
            bail!("port must be between 1 and 65535");
        }
        if os.anon_interval_secs == 0 || os.user_interval_secs == 0 {
            bail!("poll intervals must be at least one second");
        }
        if os.request_timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }

        let bounds = match (os.lamin, os.lomin, os.lamax, os.lomax) {
            (Some(lat_min), Some(lon_min), Some(lat_max), Some(lon_max)) => {
                Some(BoundingBox { lat_min, lon_min, lat_max, lon_max })
            }
            (None, None, None, None) => None,
            _ => bail!("a bounding box needs all of lamin, lamax, lomin and lomax"),
        };

        let credentials = os
            .user
            .filter(|u| !u.trim().is_empty())
            .map(|user| Credentials {
                user,
                password: os.password.unwrap_or_default(),
            });
        let poll_secs = if credentials.is_some() {
            os.user_interval_secs
        } else {
            os.anon_interval_secs
        };

        let opensky = OpenSkyConfig {
            root_url: os.root_url,
            credentials,
            icao24s: split_icao24s(&os.icao24),
            bounds,
            timeout: Duration::from_secs(os.request_timeout_secs),
            json_dump: relay.json_file,
        };
        states_url(&opensky).context("invalid OpenSky root URL")?;

        Ok(Settings {
            opensky,
            relay: RelayConfig {
                poll_interval: Duration::from_secs(poll_secs),
                tickle_interval: Duration::from_secs(relay.tickle_secs),
            },
            listen: SocketAddr::from(([0, 0, 0, 0], relay.port)),
            observability,
        })
    }
}

fn split_icao24s(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(['-', ',', ';']))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn describe_bounds(bounds: Option<BoundingBox>) -> String {
    match bounds {
        Some(b) => format!(
            "lamin {} lomin {} lamax {} lomax {}",
            b.lat_min, b.lon_min, b.lat_max, b.lon_max
        ),
        None => "none".to_string(),
    }
}
