#[cfg(not(target_os = "linux"))]
compile_error!("vsock-helper needs the Linux vsock transport and a unix docker socket");

mod args;
mod config;
mod daemon;
mod dockerproxy;
mod error;
mod trsfr;

use std::process::ExitCode;

use clap::Parser;
use log::error;

use crate::args::{Cli, Command, DockerProxyCommand};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let res = match cli.command {
        Command::DockerProxy(DockerProxyCommand::Start(args)) => dockerproxy::start(args.into()),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("docker proxy failed to start: {}", e);
            ExitCode::FAILURE
        }
    }
}
