use std::collections::BTreeMap;
use std::fs;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::color::ColorScheme;
use crate::opc::DEFAULT_SERVER;
use crate::params::{LightParameters, ParamOverride};

pub const SERVER_ENV: &str = "OPC_SERVER";
pub const DEFAULT_LAYOUT: &str = "layout/amcp-leds.json";

/// What the render loop does when a frame cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SendFailurePolicy {
    /// Stop the loop and return the transport error.
    #[default]
    FailFast,
    /// Log, reconnect before the next frame, and keep animating.
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub layout: PathBuf,
    /// `host:port`; `None` falls back to `$OPC_SERVER`, then the default.
    pub server: Option<String>,
    pub target_fps: u32,
    pub max_lightning: usize,
    pub show_fps: bool,
    pub channel: u8,
    pub on_send_error: SendFailurePolicy,
    pub color_scheme: ColorScheme,
    pub seed: Option<u64>,
    pub params: LightParameters,
    /// Parameters file watched and re-applied on change.
    pub params_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            layout: PathBuf::from(DEFAULT_LAYOUT),
            server: None,
            target_fps: 30,
            max_lightning: 10,
            show_fps: false,
            channel: 0,
            on_send_error: SendFailurePolicy::FailFast,
            color_scheme: ColorScheme::Temperature,
            seed: None,
            params: LightParameters::default(),
            params_file: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Self = parse_yaml(&contents, path)?;
        config.resolve_paths(path);
        Ok(config)
    }

    /// Resolve relative paths against the directory of the config file.
    fn resolve_paths(&mut self, config_path: &Path) {
        let base = config_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        if self.layout.is_relative() {
            self.layout = base.join(&self.layout);
        }
        if let Some(params_file) = self.params_file.as_mut() {
            if params_file.is_relative() {
                *params_file = base.join(&*params_file);
            }
        }
    }

    /// Layers for the live parameters: this config's `params:` under the
    /// params file, with `overrides` on top.
    pub fn param_layers(&self, overrides: Vec<ParamOverride>) -> ParamLayers {
        ParamLayers {
            base: self.params,
            overrides,
        }
    }

    /// The OPC endpoint: explicit setting, then `$OPC_SERVER`, then loopback.
    pub fn resolved_server(&self) -> String {
        self.server
            .clone()
            .or_else(|| std::env::var(SERVER_ENV).ok().filter(|value| !value.is_empty()))
            .unwrap_or_else(|| DEFAULT_SERVER.to_owned())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            bail!("target_fps must be > 0");
        }

        let server = self.resolved_server();
        let Some((host, port)) = server.rsplit_once(':') else {
            bail!("server '{server}' must be host:port");
        };
        if host.is_empty() {
            bail!("server '{server}' has an empty host");
        }
        port.parse::<u16>()
            .with_context(|| format!("server '{server}' has an invalid port"))?;

        if !self.layout.is_file() {
            bail!("layout file does not exist: {}", self.layout.display());
        }
        if let Some(params_file) = &self.params_file {
            if !params_file.is_file() {
                bail!("params_file does not exist: {}", params_file.display());
            }
        }
        Ok(())
    }

    /// Resolve the server address now, so a bad hostname fails at startup.
    pub fn check_server_resolves(&self) -> Result<()> {
        let server = self.resolved_server();
        let mut addrs = server
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve OPC server '{server}'"))?;
        if addrs.next().is_none() {
            bail!("OPC server '{server}' resolved to no addresses");
        }
        Ok(())
    }
}

/// Parameter precedence, lowest first: defaults, the config file's
/// `params:`, the params file, then `--set` overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamLayers {
    pub base: LightParameters,
    pub overrides: Vec<ParamOverride>,
}

impl ParamLayers {
    /// Build the live parameters. Called at startup and again on every
    /// params-file reload, so overrides survive hot reloads.
    pub fn resolve(&self, params_file: Option<&Path>) -> Result<LightParameters> {
        let mut params = match params_file {
            Some(path) => load_params_file(path, &self.base)?,
            None => self.base,
        };
        for param in &self.overrides {
            param.apply_to(&mut params)?;
        }
        Ok(params)
    }
}

/// Load a parameters file (bare `name: value` pairs) on top of `base`.
/// Names the file leaves out keep their value from `base`.
pub fn load_params_file(path: &Path, base: &LightParameters) -> Result<LightParameters> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read params file {}", path.display()))?;
    let mut params = *base;
    if contents.trim().is_empty() {
        return Ok(params);
    }
    let values: BTreeMap<String, f64> = parse_yaml(&contents, path)?;
    for (name, value) in values {
        params
            .set(&name, value)
            .with_context(|| format!("invalid params file {}", path.display()))?;
    }
    Ok(params)
}

fn parse_yaml<T: for<'de> Deserialize<'de>>(contents: &str, path: &Path) -> Result<T> {
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{load_params_file, ParamLayers, RunConfig, SendFailurePolicy};
    use crate::params::LightParameters;
    use crate::color::ColorScheme;
    use crate::params::ParamOverride;

    #[test]
    fn config_file_overrides_defaults_and_resolves_layout() {
        let dir = tempdir().expect("tempdir should create");
        fs::write(dir.path().join("leds.json"), "[{\"point\": [0, 0, 0]}]").expect("layout");
        let path = dir.path().join("amcp.yaml");
        fs::write(
            &path,
            r#"
layout: leds.json
server: "10.0.0.5:7890"
target_fps: 60
on_send_error: reconnect
color_scheme: gradient
params:
  rotation: 30
"#,
        )
        .expect("config should write");

        let config = RunConfig::load(&path).expect("config should load");
        assert_eq!(config.layout, dir.path().join("leds.json"));
        assert_eq!(config.target_fps, 60);
        assert_eq!(config.max_lightning, 10);
        assert_eq!(config.on_send_error, SendFailurePolicy::Reconnect);
        assert_eq!(config.color_scheme, ColorScheme::Gradient);
        assert_eq!(config.params.rotation, 30.0);
        assert_eq!(config.resolved_server(), "10.0.0.5:7890");
        config.validate().expect("config should validate");
    }

    #[test]
    fn unknown_keys_report_a_location() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("amcp.yaml");
        fs::write(&path, "target_fps: 30\nfps: 60\n").expect("config should write");
        let error = RunConfig::load(&path).expect_err("unknown key should fail");
        assert!(error.to_string().contains("line 2"), "{error:#}");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let dir = tempdir().expect("tempdir should create");
        let layout = dir.path().join("leds.json");
        fs::write(&layout, "[{\"point\": [0, 0, 0]}]").expect("layout");

        let mut config = RunConfig {
            layout: layout.clone(),
            server: Some("localhost:7890".to_owned()),
            ..RunConfig::default()
        };
        config.validate().expect("baseline should validate");

        config.target_fps = 0;
        assert!(config.validate().is_err());
        config.target_fps = 30;

        config.server = Some("localhost".to_owned());
        assert!(config.validate().is_err());
        config.server = Some("localhost:99999".to_owned());
        assert!(config.validate().is_err());
        config.server = Some("localhost:7890".to_owned());

        config.layout = dir.path().join("missing.json");
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_config_params() {
        let mut config = RunConfig::default();
        config.params.detail = 2.0;
        config.params.turbulence = 0.1;
        let layers = config.param_layers(vec![
            ParamOverride::parse("lightning_new=0.5").expect("parse"),
            ParamOverride::parse("detail=1.25").expect("parse"),
        ]);
        let params = layers.resolve(None).expect("resolve");
        assert_eq!(params.lightning_new, 0.5);
        assert_eq!(params.detail, 1.25);
        assert_eq!(params.turbulence, 0.1);
    }

    #[test]
    fn params_file_sits_between_config_and_overrides() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("params.yaml");
        fs::write(&path, "wind_speed: 0.75\nrotation: 45\n").expect("params should write");

        let layers = ParamLayers {
            base: LightParameters {
                turbulence: 0.1,
                rotation: 10.0,
                ..LightParameters::default()
            },
            overrides: vec![ParamOverride::parse("wind_speed=2").expect("parse")],
        };
        let params = layers.resolve(Some(&path)).expect("resolve");
        assert_eq!(params.turbulence, 0.1, "config value the file leaves alone");
        assert_eq!(params.rotation, 45.0, "file beats config");
        assert_eq!(params.wind_speed, 2.0, "--set beats file");

        // Same layers again after an edit: the override still wins.
        fs::write(&path, "wind_speed: 0.1\nrotation: 90\n").expect("params should rewrite");
        let params = layers.resolve(Some(&path)).expect("resolve");
        assert_eq!(params.rotation, 90.0);
        assert_eq!(params.wind_speed, 2.0);
    }

    #[test]
    fn params_file_rejects_unknown_names_and_allows_empty() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("params.yaml");
        fs::write(&path, "sparkle: 1\n").expect("params should write");
        let error = load_params_file(&path, &LightParameters::default()).expect_err("unknown");
        assert!(format!("{error:#}").contains("sparkle"), "{error:#}");

        fs::write(&path, "\n").expect("params should write");
        let base = LightParameters {
            brightness: 0.7,
            ..LightParameters::default()
        };
        assert_eq!(load_params_file(&path, &base).expect("empty file"), base);
    }
}
