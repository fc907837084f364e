//! The `sonara` binary.

use clap::Parser;
use sonara_cli::{CliArgs, SonaraCli};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let result = match SonaraCli::from_args("sonara", &args) {
        Ok(cli) => cli.run(args).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
