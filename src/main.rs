use clap::Parser;

use camlink_lib::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match camlink_lib::run(cli.sources).await {
        Ok(()) => 0,
        Err(err) => {
            log::error!("camlink failed: {err:?}");
            eprintln!("camlink: {err:#}");
            1
        }
    };
    // A pending stdin read would otherwise hold the runtime open.
    std::process::exit(code);
}
