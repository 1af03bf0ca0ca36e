//! Entry-point for the `widget-submit` binary.
//!
//! Invoked by the HTTP front-end with the positional form fields and an
//! optional attachment path. Everything it reports back travels over the
//! process exit status and stderr.
use clap::Parser;
use widget_submit::Cli;
use widget_submit::run_main;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let cli = Cli::parse();
        run_main(cli).await?;
        Ok(())
    })
}
