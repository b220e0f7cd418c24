use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geo::GeoPoint;
use crate::model::ZoneConfig;

pub const DEFAULT_API_URL: &str = "https://opensky-network.org/api/states/all";
pub const DEFAULT_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";
pub const DEFAULT_ZONE_LAT: f64 = 39.9334;
pub const DEFAULT_ZONE_LON: f64 = 32.8597;
pub const DEFAULT_ZONE_RADIUS_M: f64 = 30_000.0;
pub const DEFAULT_BBOX_SCALE: f64 = 1.0;
pub const DEFAULT_REFRESH_MS: u64 = 15_000;
pub const MIN_REFRESH_MS: u64 = 200;
pub const DEFAULT_CONFIG_FILE: &str = "noflyzone.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub zone_lat: f64,
    pub zone_lon: f64,
    pub zone_radius_m: f64,
    pub api_url: String,
    pub token_url: String,
    pub bbox_scale: f64,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_ms: u64,
    pub once: bool,
    pub log_enabled: bool,
    pub log_level: String,
    pub log_file: String,
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_lat: DEFAULT_ZONE_LAT,
            zone_lon: DEFAULT_ZONE_LON,
            zone_radius_m: DEFAULT_ZONE_RADIUS_M,
            api_url: DEFAULT_API_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            bbox_scale: DEFAULT_BBOX_SCALE,
            client_id: String::new(),
            client_secret: String::new(),
            refresh_ms: DEFAULT_REFRESH_MS,
            once: false,
            log_enabled: true,
            log_level: "info".to_string(),
            log_file: String::new(),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    zone_lat: Option<f64>,
    zone_lon: Option<f64>,
    zone_radius_m: Option<f64>,
    api_url: Option<String>,
    token_url: Option<String>,
    bbox_scale: Option<f64>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_ms: Option<u64>,
    log_enabled: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
}

/// Immutable configuration snapshot handed to each poll cycle.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub zone: ZoneConfig,
    pub api_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zone: ZoneConfig {
                center: GeoPoint::new(config.zone_lat, config.zone_lon),
                radius_m: config.zone_radius_m,
                bbox_scale: config.bbox_scale.max(0.0),
            },
            api_url: config.api_url.trim().to_string(),
            token_url: config.token_url.trim().to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_interval: Duration::from_millis(config.refresh_ms.max(MIN_REFRESH_MS)),
        }
    }

    /// OAuth is used only when id, secret and token endpoint are all set.
    pub fn wants_bearer(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.token_url.is_empty()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("zone", &self.zone)
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &if self.client_secret.is_empty() { "" } else { "***" })
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

pub fn parse_args() -> Result<Option<Config>> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(None);
    }
    let env_vars: Vec<(String, String)> = env::vars()
        .filter(|(key, _)| key.starts_with("NOFLYZONE_"))
        .collect();
    build_config(&args, &env_vars).map(Some)
}

fn build_config(args: &[String], env_vars: &[(String, String)]) -> Result<Config> {
    let mut explicit_config: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--config needs a value"))?;
            explicit_config = Some(PathBuf::from(value));
        }
    }

    let env_config = lookup(env_vars, "NOFLYZONE_CONFIG").map(PathBuf::from);
    let config_path = explicit_config
        .clone()
        .or(env_config)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = Config::default();
    if config_path.exists() {
        if let Some(file_config) = load_file_config(&config_path)? {
            apply_file_config(&mut config, file_config);
        }
    } else if explicit_config.is_some() {
        return Err(anyhow!("Config file not found: {}", config_path.display()));
    }
    config.config_path = config_path;

    apply_env(&mut config, env_vars);
    apply_flags(&mut config, args)?;
    Ok(config)
}

fn lookup<'a>(env_vars: &'a [(String, String)], key: &str) -> Option<&'a str> {
    env_vars
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}

fn apply_env(config: &mut Config, env_vars: &[(String, String)]) {
    if let Some(value) = lookup(env_vars, "NOFLYZONE_ZONE_LAT") {
        if let Ok(val) = value.parse::<f64>() {
            config.zone_lat = val;
        }
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_ZONE_LON") {
        if let Ok(val) = value.parse::<f64>() {
            config.zone_lon = val;
        }
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_ZONE_RADIUS_M") {
        if let Ok(val) = value.parse::<f64>() {
            config.zone_radius_m = val;
        }
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_API_URL") {
        config.api_url = value.to_string();
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_TOKEN_URL") {
        config.token_url = value.to_string();
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_BBOX_SCALE") {
        if let Ok(val) = value.parse::<f64>() {
            config.bbox_scale = val.max(0.0);
        }
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_CLIENT_ID") {
        config.client_id = value.to_string();
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_CLIENT_SECRET") {
        config.client_secret = value.to_string();
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_REFRESH_MS") {
        if let Ok(val) = value.parse::<u64>() {
            config.refresh_ms = val.max(MIN_REFRESH_MS);
        }
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_LOG_ENABLED") {
        config.log_enabled = parse_bool(value);
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_LOG_LEVEL") {
        config.log_level = value.to_string();
    }
    if let Some(value) = lookup(env_vars, "NOFLYZONE_LOG_FILE") {
        config.log_file = value.to_string();
    }
}

fn apply_flags(config: &mut Config, args: &[String]) -> Result<()> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                next_value(&mut iter, "--config")?;
            }
            "--lat" => {
                config.zone_lat = next_value(&mut iter, "--lat")?.parse().context("--lat")?;
            }
            "--lon" => {
                config.zone_lon = next_value(&mut iter, "--lon")?.parse().context("--lon")?;
            }
            "--radius-m" => {
                config.zone_radius_m = next_value(&mut iter, "--radius-m")?.parse().context("--radius-m")?;
            }
            "--api-url" => {
                config.api_url = next_value(&mut iter, "--api-url")?.to_string();
            }
            "--token-url" => {
                config.token_url = next_value(&mut iter, "--token-url")?.to_string();
            }
            "--bbox-scale" => {
                let scale: f64 = next_value(&mut iter, "--bbox-scale")?.parse().context("--bbox-scale")?;
                config.bbox_scale = scale.max(0.0);
            }
            "--client-id" => {
                config.client_id = next_value(&mut iter, "--client-id")?.to_string();
            }
            "--client-secret" => {
                config.client_secret = next_value(&mut iter, "--client-secret")?.to_string();
            }
            "--refresh-ms" => {
                let ms: u64 = next_value(&mut iter, "--refresh-ms")?.parse().context("--refresh-ms")?;
                config.refresh_ms = ms.max(MIN_REFRESH_MS);
            }
            "--once" => {
                config.once = true;
            }
            "--log" => {
                config.log_enabled = true;
            }
            "--no-log" => {
                config.log_enabled = false;
            }
            "--log-level" => {
                config.log_level = next_value(&mut iter, "--log-level")?.to_string();
            }
            "--log-file" => {
                config.log_file = next_value(&mut iter, "--log-file")?.to_string();
            }
            other => return Err(anyhow!("Unknown argument: {other} (try --help)")),
        }
    }
    Ok(())
}

fn next_value<'a>(iter: &mut std::slice::Iter<'a, String>, name: &str) -> Result<&'a str> {
    iter.next()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{name} needs a value"))
}

fn load_file_config(path: &Path) -> Result<Option<FileConfig>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let parsed: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(Some(parsed))
}

fn apply_file_config(target: &mut Config, file: FileConfig) {
    if let Some(value) = file.zone_lat {
        target.zone_lat = value;
    }
    if let Some(value) = file.zone_lon {
        target.zone_lon = value;
    }
    if let Some(value) = file.zone_radius_m {
        target.zone_radius_m = value;
    }
    if let Some(value) = file.api_url {
        target.api_url = value;
    }
    if let Some(value) = file.token_url {
        target.token_url = value;
    }
    if let Some(value) = file.bbox_scale {
        target.bbox_scale = value.max(0.0);
    }
    if let Some(value) = file.client_id {
        target.client_id = value;
    }
    if let Some(value) = file.client_secret {
        target.client_secret = value;
    }
    if let Some(value) = file.refresh_ms {
        target.refresh_ms = value.max(MIN_REFRESH_MS);
    }
    if let Some(value) = file.log_enabled {
        target.log_enabled = value;
    }
    if let Some(value) = file.log_level {
        target.log_level = value;
    }
    if let Some(value) = file.log_file {
        target.log_file = value;
    }
}

fn print_help() {
    println!(
        "noflyzone {}\n\
\n\
Polls a flight-state API and reports aircraft entering a circular zone.\n\
\n\
USAGE:\n    noflyzone [OPTIONS]\n\
\n\
OPTIONS:\n\
    --config <path>          TOML config file (default: {DEFAULT_CONFIG_FILE}, env NOFLYZONE_CONFIG)\n\
    --lat <deg>              zone center latitude (default: {DEFAULT_ZONE_LAT})\n\
    --lon <deg>              zone center longitude (default: {DEFAULT_ZONE_LON})\n\
    --radius-m <m>           zone radius in meters (default: {DEFAULT_ZONE_RADIUS_M})\n\
    --api-url <url>          flight-state endpoint (default: {DEFAULT_API_URL})\n\
    --token-url <url>        OAuth token endpoint, empty disables OAuth\n\
    --bbox-scale <x>         radius multiplier for the provider bbox (default: {DEFAULT_BBOX_SCALE})\n\
    --client-id <id>         OAuth client id / Basic auth user\n\
    --client-secret <s>      OAuth client secret / Basic auth password\n\
    --refresh-ms <ms>        poll interval (default: {DEFAULT_REFRESH_MS}, min {MIN_REFRESH_MS})\n\
    --once                   run a single cycle and exit\n\
    --log | --no-log         enable or disable logging\n\
    --log-level <level>      tracing filter (default: info)\n\
    --log-file <path>        log file, empty logs to stderr\n\
    -h, --help               print this help\n\
\n\
Every option has a NOFLYZONE_* environment variable (e.g. NOFLYZONE_CLIENT_SECRET).",
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        dir.push(format!("noflyzone-config-test-{suffix}"));
        let _ = fs::create_dir_all(&dir);
        dir.push(name);
        dir
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_center_on_ankara() {
        let missing = temp_file("absent.toml");
        let env = vec![(
            "NOFLYZONE_CONFIG".to_string(),
            missing.display().to_string(),
        )];
        let cfg = build_config(&[], &env).unwrap();
        assert_eq!(cfg.zone_lat, DEFAULT_ZONE_LAT);
        assert_eq!(cfg.zone_lon, DEFAULT_ZONE_LON);
        assert_eq!(cfg.zone_radius_m, 30_000.0);
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.refresh_ms, 15_000);
        assert!(!cfg.once);
    }

    #[test]
    fn explicit_missing_config_is_error() {
        let missing = temp_file("nope.toml");
        let err = build_config(&args(&["--config", &missing.display().to_string()]), &[])
            .unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn load_file_config_parses_values() {
        let path = temp_file("config.toml");
        let content = r#"
zone_lat = 41.0
zone_lon = 29.0
zone_radius_m = 5000.0
api_url = "http://adsb.local/api/states/all"
token_url = ""
bbox_scale = 2.5
client_id = "abc"
client_secret = "xyz"
refresh_ms = 5000
log_enabled = false
log_level = "debug"
log_file = "noflyzone.log"
"#;
        fs::write(&path, content).unwrap();
        let cfg = load_file_config(&path).unwrap().unwrap();
        assert_eq!(cfg.zone_lat, Some(41.0));
        assert_eq!(cfg.zone_radius_m, Some(5000.0));
        assert_eq!(cfg.api_url.as_deref(), Some("http://adsb.local/api/states/all"));
        assert_eq!(cfg.token_url.as_deref(), Some(""));
        assert_eq!(cfg.bbox_scale, Some(2.5));
        assert_eq!(cfg.client_id.as_deref(), Some("abc"));
        assert_eq!(cfg.refresh_ms, Some(5000));
        assert_eq!(cfg.log_enabled, Some(false));
        assert_eq!(cfg.log_file.as_deref(), Some("noflyzone.log"));
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn apply_file_config_overrides_and_clamps() {
        let mut cfg = Config::default();
        let file = FileConfig {
            bbox_scale: Some(-3.0),
            refresh_ms: Some(10),
            client_secret: Some("s".to_string()),
            ..Default::default()
        };
        apply_file_config(&mut cfg, file);
        assert_eq!(cfg.bbox_scale, 0.0);
        assert_eq!(cfg.refresh_ms, MIN_REFRESH_MS);
        assert_eq!(cfg.client_secret, "s");
        assert_eq!(cfg.zone_lat, DEFAULT_ZONE_LAT);
    }

    #[test]
    fn env_then_flags_take_precedence() {
        let path = temp_file("layered.toml");
        fs::write(&path, "zone_radius_m = 1000.0\nclient_id = \"file\"\n").unwrap();
        let env = vec![
            ("NOFLYZONE_ZONE_RADIUS_M".to_string(), "2000".to_string()),
            ("NOFLYZONE_CLIENT_ID".to_string(), "env".to_string()),
            ("NOFLYZONE_LOG_ENABLED".to_string(), "0".to_string()),
        ];
        let cli = args(&[
            "--config",
            &path.display().to_string(),
            "--client-id",
            "cli",
            "--refresh-ms",
            "2500",
            "--once",
        ]);
        let cfg = build_config(&cli, &env).unwrap();
        assert_eq!(cfg.zone_radius_m, 2000.0);
        assert_eq!(cfg.client_id, "cli");
        assert_eq!(cfg.refresh_ms, 2500);
        assert!(cfg.once);
        assert!(!cfg.log_enabled);
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn flag_errors() {
        let missing = temp_file("absent2.toml");
        let env = vec![(
            "NOFLYZONE_CONFIG".to_string(),
            missing.display().to_string(),
        )];
        assert!(build_config(&args(&["--lat"]), &env).is_err());
        assert!(build_config(&args(&["--lat", "north"]), &env).is_err());
        assert!(build_config(&args(&["--bogus"]), &env).is_err());
    }

    #[test]
    fn settings_snapshot() {
        let mut cfg = Config::default();
        cfg.client_id = "id".to_string();
        cfg.client_secret = "secret".to_string();
        cfg.refresh_ms = 50;
        let settings = Settings::from_config(&cfg);
        assert!(settings.wants_bearer());
        assert_eq!(settings.refresh_interval, Duration::from_millis(MIN_REFRESH_MS));
        assert_eq!(settings.zone.center, GeoPoint::new(DEFAULT_ZONE_LAT, DEFAULT_ZONE_LON));
        assert!(!format!("{settings:?}").contains("secret\""));

        cfg.token_url.clear();
        assert!(!Settings::from_config(&cfg).wants_bearer());
    }
}
