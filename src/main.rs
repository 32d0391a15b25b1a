// src/main.rs

use dagflow::dag::RunStatus;
use dagflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(RunStatus::Failed) => std::process::exit(1),
        Ok(_) => {}
        Err(err) => {
            eprintln!("dagflow error: {err:?}");
            std::process::exit(2);
        }
    }
}

async fn run_main() -> anyhow::Result<RunStatus> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    Ok(run(args).await?)
}
