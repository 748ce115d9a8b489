use clap::Parser;
use clap::builder::BoolishValueParser;

use bridge_engine::BridgeConfig;

#[derive(Debug, Parser)]
#[command(name = "bridge-server", about = "Message bus to HTTP metadata bridge")]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "BRIDGE_CONFIG")]
    pub config: String,

    /// Run without TLS. Overrides `dev_mode` in the config file.
    #[arg(
        long,
        env = "DEV_MODE",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub dev_mode: Option<bool>,

    /// POST every event to its topic's endpoint. `POST` turns forwarding on,
    /// `GET` turns it off. Overrides `delivery.enabled`.
    #[arg(
        long,
        env = "HTTP_METHOD_FETCH_METADATA",
        num_args = 0..=1,
        default_missing_value = "POST",
        value_parser = parse_fetch_method
    )]
    pub forward: Option<bool>,
}

fn parse_fetch_method(value: &str) -> Result<bool, String> {
    match value.to_ascii_uppercase().as_str() {
        "POST" | "TRUE" | "1" => Ok(true),
        "GET" | "FALSE" | "0" | "" => Ok(false),
        other => Err(format!("expected POST or GET, got '{other}'")),
    }
}

impl Cli {
    /// Apply command line / environment overrides on top of the file.
    pub fn apply(&self, config: &mut BridgeConfig) {
        if let Some(dev_mode) = self.dev_mode {
            config.dev_mode = dev_mode;
        }
        if let Some(forward) = self.forward {
            config.delivery.enabled = forward;
        }
    }
}
