use clap::Parser;
use config::Config;
use fdscan_cli::cli::{Cli, Command};
use fdscan_cli::run::{self, Verdict};
use std::process::ExitCode;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. `FDSCAN_LOG` can only set the log level per crate,
    // e.g. `FDSCAN_LOG=config=trace fdscan -v list`.
    let env_filter = EnvFilter::builder()
        .with_env_var("FDSCAN_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();

    // load config
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/fdscan/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.sort();
            candidates.insert(0, "/etc/fdscan/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    match &cli.command {
        Command::List { pid } => {
            output(&run::list(&config, *pid)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check(args) => match run::check(&config, args)? {
            Verdict::Clean => Ok(ExitCode::SUCCESS),
            Verdict::Leaked(message) => {
                output(&message);
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

#[allow(clippy::print_stdout)]
fn output(text: &str) {
    println!("{text}");
}
