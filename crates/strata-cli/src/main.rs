use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = strata_cli::Cli::parse();
    strata_cli::init_tracing(cli.verbose);
    if let Err(err) = strata_cli::run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
