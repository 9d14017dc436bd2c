//! CLI argument parsing merged with an optional TOML config file.
//!
//! CLI flags always win over the file; the file fills in anything the CLI
//! left unset. There is no `clap` dependency in play here — just a small
//! hand-rolled flag scanner, in keeping with the rest of the ambient stack.

use std::fs;
use std::path::PathBuf;

use serde_derive::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 8388;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_hosts: Vec<String>,
    pub bind_port: u16,
    pub password: String,
    pub method: String,
    pub timeout_secs: u64,
    pub pid_file: Option<PathBuf>,
    pub verbose: bool,
}

/// The subset of `Config` that may come from a TOML file; every field is
/// optional so a file can set as little or as much as it likes.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server: Option<Vec<String>>,
    server_port: Option<u16>,
    password: Option<String>,
    method: Option<String>,
    timeout: Option<u64>,
    pid_file: Option<PathBuf>,
    verbose: Option<bool>,
}

/// Flags collected from `argv`, each still optional until merged with a file
/// and defaults.
#[derive(Debug, Default)]
struct CliArgs {
    servers: Vec<String>,
    port: Option<u16>,
    password: Option<String>,
    method: Option<String>,
    timeout: Option<u64>,
    pid_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
    verbose: bool,
}

impl Config {
    /// Parses `args` (expected to be `env::args().skip(1)`) and merges in an
    /// optional `-c` config file. CLI values always take precedence over the
    /// file; the file takes precedence over built-in defaults.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let cli = parse_cli(args)?;

        let file = match &cli.config_path {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let bind_hosts = if !cli.servers.is_empty() {
            cli.servers
        } else if let Some(hosts) = file.server {
            hosts
        } else {
            return Err(Error::Config("at least one -s HOST is required".to_string()));
        };

        let password = cli
            .password
            .or(file.password)
            .ok_or_else(|| Error::Config("-k PASSWORD is required".to_string()))?;

        let method = cli.method.or(file.method).unwrap_or_else(|| "table".to_string());
        let bind_port = cli.port.or(file.server_port).unwrap_or(DEFAULT_PORT);
        let timeout_secs = cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS);
        let pid_file = cli.pid_file.or(file.pid_file);
        let verbose = cli.verbose || file.verbose.unwrap_or(false);

        Ok(Config {
            bind_hosts,
            bind_port,
            password,
            method,
            timeout_secs,
            pid_file,
            verbose,
        })
    }
}

fn load_file(path: &PathBuf) -> Result<FileConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
    toml::from_str(&contents).map_err(|e| Error::Config(format!("parsing {}: {}", path.display(), e)))
}

fn parse_cli<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-s" => out.servers.push(take_value(&mut iter, "-s")?),
            "-p" => out.port = Some(parse_value(&mut iter, "-p")?),
            "-k" => out.password = Some(take_value(&mut iter, "-k")?),
            "-m" => out.method = Some(take_value(&mut iter, "-m")?),
            "-t" => out.timeout = Some(parse_value(&mut iter, "-t")?),
            "-f" => out.pid_file = Some(PathBuf::from(take_value(&mut iter, "-f")?)),
            "-c" => out.config_path = Some(PathBuf::from(take_value(&mut iter, "-c")?)),
            "-v" => out.verbose = true,
            other => return Err(Error::Config(format!("unrecognized flag: {}", other))),
        }
    }

    Ok(out)
}

fn take_value<I: Iterator<Item = String>>(iter: &mut I, flag: &str) -> Result<String> {
    iter.next().ok_or_else(|| Error::Config(format!("{} requires a value", flag)))
}

fn parse_value<I, T>(iter: &mut I, flag: &str) -> Result<T>
where
    I: Iterator<Item = String>,
    T: std::str::FromStr,
{
    let raw = take_value(iter, flag)?;
    raw.parse()
        .map_err(|_| Error::Config(format!("{} expects a number, got {:?}", flag, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn minimal_cli_parses() {
        let cfg = Config::from_args(args(&["-s", "0.0.0.0", "-p", "8388", "-k", "secret", "-m", "rc4"])).unwrap();
        assert_eq!(cfg.bind_hosts, vec!["0.0.0.0".to_string()]);
        assert_eq!(cfg.bind_port, 8388);
        assert_eq!(cfg.password, "secret");
        assert_eq!(cfg.method, "rc4");
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn repeated_s_flag_binds_multiple_hosts() {
        let cfg = Config::from_args(args(&["-s", "127.0.0.1", "-s", "::1", "-k", "x"])).unwrap();
        assert_eq!(cfg.bind_hosts, vec!["127.0.0.1".to_string(), "::1".to_string()]);
    }

    #[test]
    fn missing_password_is_a_config_error() {
        let err = Config::from_args(args(&["-s", "127.0.0.1"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_server_is_a_config_error() {
        let err = Config::from_args(args(&["-k", "x"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unrecognized_flag_is_rejected() {
        let err = Config::from_args(args(&["-s", "h", "-k", "x", "--bogus"])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn verbose_flag_is_recognized() {
        let cfg = Config::from_args(args(&["-s", "h", "-k", "x", "-v"])).unwrap();
        assert!(cfg.verbose);
    }

    #[test]
    fn defaults_fill_in_method_and_port() {
        let cfg = Config::from_args(args(&["-s", "h", "-k", "x"])).unwrap();
        assert_eq!(cfg.method, "table");
        assert_eq!(cfg.bind_port, DEFAULT_PORT);
    }
}
