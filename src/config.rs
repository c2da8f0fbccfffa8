use std::{net::IpAddr, num::NonZero, path::PathBuf};

use clap::{Parser, ValueEnum};
use humantime::Duration;

use crate::split_listener::DEFAULT_CLASSIFY_TIMEOUT;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum CibSource {
    /// Query the local CIB manager through cibadmin, polling it for changes.
    Cibadmin,
    /// Read the CIB from an XML file, watching it for changes.
    File,
}

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct ApplicationConfig {
    /// Address to listen for all client connections.
    #[arg(long, default_value = "::", value_name = "ADDRESS")]
    pub listen_address: IpAddr,

    /// Port to listen for both HTTPS and plain HTTP connections.
    /// Plain HTTP requests are redirected to HTTPS on the same port.
    #[arg(long, default_value_t = 17630, value_parser = validate_port, value_name = "PORT")]
    pub port: u16,

    /// File containing the server's certificate chain, in PEM format.
    #[arg(long, default_value_os = "harmonies.pem", value_name = "FILE")]
    pub cert: PathBuf,

    /// File containing the server's private key, in PEM format.
    #[arg(long, default_value_os = "harmonies.key", value_name = "FILE")]
    pub key: PathBuf,

    /// Page served at the root path and for any unknown path.
    #[arg(long, default_value_os = "html/index.html", value_name = "FILE")]
    pub index_file: PathBuf,

    /// Icon served at /favicon.ico.
    #[arg(long, default_value_os = "img/favicon.ico", value_name = "FILE")]
    pub favicon_file: PathBuf,

    /// Time to wait for a new connection's first bytes before dropping it.
    #[arg(long, default_value_t = DEFAULT_CLASSIFY_TIMEOUT.into(), value_name = "DURATION")]
    pub classify_timeout: Duration,

    /// Where to read the CIB from.
    #[arg(long, value_enum, default_value_t = CibSource::Cibadmin, value_name = "SOURCE")]
    pub cib_source: CibSource,

    /// Path to the cibadmin executable. Only used with --cib-source=cibadmin.
    #[arg(long, default_value_os = "/usr/sbin/cibadmin", value_name = "FILE")]
    pub cibadmin_path: PathBuf,

    /// XML file holding the CIB. Required with --cib-source=file.
    #[arg(long, value_name = "FILE")]
    pub cib_file: Option<PathBuf>,

    /// How often cibadmin is re-run to detect changes to the CIB.
    #[arg(long, default_value = "1s", value_name = "DURATION")]
    pub cib_poll_interval: Duration,

    /// Time until a single cibadmin invocation is canceled.
    #[arg(long, default_value = "10s", value_name = "DURATION")]
    pub cib_command_timeout: Duration,

    /// Time to wait before retrying after failing to reach the CIB.
    #[arg(long, default_value = "5s", value_name = "DURATION")]
    pub cib_retry_interval: Duration,

    /// How many consecutive times subscribing to CIB changes may fail before reconnecting.
    #[arg(long, default_value = "5", value_name = "ATTEMPTS")]
    pub cib_subscribe_attempts: NonZero<usize>,

    /// Path to the attrd_updater executable, used to validate session cookies.
    #[arg(long, default_value_os = "/usr/sbin/attrd_updater", value_name = "FILE")]
    pub attrd_updater_path: PathBuf,

    /// Path to the hawk_chkpwd executable, used to validate passwords.
    #[arg(long, default_value_os = "/usr/sbin/hawk_chkpwd", value_name = "FILE")]
    pub hawk_chkpwd_path: PathBuf,

    /// Time until an authentication check is canceled.
    /// Any timed out checks will not authorize the request.
    #[arg(long, default_value = "5s", value_name = "DURATION")]
    pub authentication_timeout: Duration,
}

fn validate_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Err(err) => Err(format!("{err}")),
        Ok(0) => Err("port cannot be zero".into()),
        Ok(port) => Ok(port),
    }
}
