mod ceremony;
mod config;

use crate::ceremony::{Authenticate, Register};
use crate::config::Config;
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use pkc::settings::AppConfig;
use simple_logger::SimpleLogger;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Register and sign in with passkeys against a WebAuthn relying party")]
struct Opts {
    /// Log every ceremony step
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    sub_command: SubCommand,
}

#[derive(Subcommand)]
enum SubCommand {
    /// Create a passkey and register it with the relying party
    Register(Register),
    /// Sign in with a previously registered passkey
    Authenticate(Authenticate),
    Config(Config),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let opt: Opts = Opts::parse();
    let mut settings = AppConfig::read_config()?;

    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    let succeeded = match opt.sub_command {
        SubCommand::Register(val) => val.run(&settings).await?,
        SubCommand::Authenticate(val) => val.run(&settings).await?,
        SubCommand::Config(val) => {
            val.run(&mut settings)?;
            true
        }
    };

    match succeeded {
        true => Ok(ExitCode::SUCCESS),
        false => Ok(ExitCode::FAILURE),
    }
}
