use clap::Parser;
use signalbox::cli::{run, Cli};
use signalbox::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _guard = match logging::init(cli.verbose, cli.log_json, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}
