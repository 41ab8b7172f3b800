use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{DaemonTarget, ProxyConfig, ZeroPortPolicy, DEFAULT_DOCKER_SOCKET};

#[derive(Parser, Debug)]
#[command(name = "vsock-helper", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Docker daemon socket proxy
    #[command(name = "docker-proxy", subcommand)]
    DockerProxy(DockerProxyCommand),
}

#[derive(Subcommand, Debug)]
pub enum DockerProxyCommand {
    /// Start proxying the docker daemon socket over vsock
    Start(StartArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Vsock port to listen on
    #[arg(long, env = "PORT", default_value_t = 0)]
    pub port: u32,

    /// Docker daemon control socket
    #[arg(long, env = "DOCKER_SOCKET", default_value = DEFAULT_DOCKER_SOCKET)]
    pub socket: PathBuf,

    /// Seconds to let open sessions finish on shutdown
    #[arg(long, env = "GRACE_PERIOD", default_value_t = 10)]
    pub grace_period: u64,

    /// Treat port 0 as "let the kernel pick" instead of an error
    #[arg(long, env = "ALLOW_EPHEMERAL_PORT")]
    pub allow_ephemeral_port: bool,

    /// Passed through untouched
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl From<StartArgs> for ProxyConfig {
    fn from(args: StartArgs) -> Self {
        let mut config = ProxyConfig::new(args.port);
        if args.allow_ephemeral_port {
            config.listen.zero_port = ZeroPortPolicy::Ephemeral;
        }
        config.target = DaemonTarget::new(args.socket);
        config.grace_period = Duration::from_secs(args.grace_period);
        config.extra_args = args.args;
        config
    }
}
