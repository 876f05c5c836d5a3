use anyhow::Result;
use clap::Parser;

mod cli;
mod digest;
mod driver;
mod error;
mod logging;
mod packet;
mod port;
mod report;
mod session;
mod stats;
mod test_cmd;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    logging::init(args.quiet, args.verbose);
    match args.cmd {
        cli::Cmd::Test(opts) => test_cmd::run(opts),
    }
}
