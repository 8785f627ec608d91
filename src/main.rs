use clap::Parser;
use template_preview::{compile, serve, Cli, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so compile output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Compile(args) => {
            let output = compile(&args).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            if !output.is_success() {
                std::process::exit(1);
            }
        }
        Command::Serve(args) => serve(&args).await?,
    }

    Ok(())
}
