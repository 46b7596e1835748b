//! Config command handlers.

use anyhow::{Context, Result};
use tagstream_core::config;

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    config::Config::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

/// Prints the merged configuration followed by the URLs it resolves to.
pub fn show() -> Result<()> {
    let config = config::Config::load().context("load config")?;
    print!("{}", config.to_toml()?);
    println!();
    match config.events_url() {
        Ok(url) => println!("# events url: {url}"),
        Err(err) => println!("# events url: {err:#}"),
    }
    match config.socket_url() {
        Ok(url) => println!("# socket url: {url}"),
        Err(err) => println!("# socket url: {err:#}"),
    }
    Ok(())
}
