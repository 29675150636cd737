use docker_proxy::{config::Config, runtime::run_standalone};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: docker-proxy [OPTIONS]

Options:
  -c, --config <path>  Path to a YAML config file
      --check          Load the configuration, print it and exit
  -h, --help           Print help

Environment:
  DOCKER_PROXY_*       Override individual settings (see README)
  PORT                 Bind 0.0.0.0:<PORT>
";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    config_path: Option<PathBuf>,
    check: bool,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => options.help = true,
            "--check" => options.check = true,
            "-c" | "--config" => {
                let value = args
                    .next()
                    .filter(|value| !value.starts_with('-'))
                    .ok_or_else(|| "missing value for --config".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            _ => match arg.strip_prefix("--config=") {
                Some("") => return Err("missing value for --config".to_string()),
                Some(value) => options.config_path = Some(PathBuf::from(value)),
                None => return Err(format!("unknown argument: {arg}")),
            },
        }
    }
    Ok(options)
}

fn load_config(options: &CliOptions) -> Result<Config, String> {
    match options.config_path.clone() {
        Some(path) => Config::from_env_with_config_file(path),
        None => Config::from_env(),
    }
}

#[tokio::main]
async fn main() {
    let options = match parse_cli_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if options.help {
        println!("{USAGE}");
        return;
    }

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    if options.check {
        println!("{config:#?}");
        return;
    }

    if let Err(err) = run_standalone(config).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
