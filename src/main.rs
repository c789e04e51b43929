use std::process;

use clap::Parser;

use chirp_store::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.run().await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
