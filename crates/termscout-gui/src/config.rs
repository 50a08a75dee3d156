use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use termscout_core::{BackendSettings, ConfigLoader};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub assets_dir: PathBuf,
    pub auth_token: Option<String>,
    pub config_dir: PathBuf,
    pub backend: BackendSettings,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "127.0.0.1:7860";
    const DEFAULT_ASSETS_DIR: &'static str = "crates/termscout-gui/web";

    pub fn from_env() -> Result<Self> {
        let listen_addr =
            env::var("GUI_LISTEN_ADDR").unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = parse_concurrency(env::var("GUI_MAX_CONCURRENCY").ok().as_deref())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let assets_dir = env::var("GUI_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_ASSETS_DIR));
        let assets_dir = if assets_dir.is_relative() {
            env::current_dir()
                .map(|cwd| cwd.join(&assets_dir))
                .unwrap_or(assets_dir)
        } else {
            assets_dir
        };

        let auth_token = env::var("GUI_AUTH_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let config_dir = ConfigLoader::resolve_dir(None);

        let backend =
            BackendSettings::from_env().context("invalid backend settings in environment")?;

        Ok(Self {
            listen_addr,
            max_concurrency,
            assets_dir,
            auth_token,
            config_dir,
            backend,
        })
    }
}

fn parse_concurrency(value: Option<&str>) -> Option<usize> {
    value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
