use std::path::PathBuf;
use std::process;
use std::time::Duration;
use clap::{value_t, App, Arg, ArgMatches};
use tracing::error;
use tracing_subscriber::EnvFilter;
use rust_http_server::ServerConfig;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let matches = App::new("http-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A simple threaded web server")
        .arg(Arg::with_name("address")
            .short("a")
            .long("address")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .takes_value(true))
        .arg(Arg::with_name("port")
            .short("p")
            .long("port")
            .value_name("PORT_NUMBER")
            .default_value("8080")
            .takes_value(true))
        .arg(Arg::with_name("backlog")
            .long("backlog")
            .value_name("CONNECTIONS")
            .default_value("5")
            .takes_value(true))
        .arg(Arg::with_name("poll_interval")
            .long("poll-interval")
            .value_name("SECONDS")
            .default_value("0.5")
            .takes_value(true))
        .arg(Arg::with_name("timeout")
            .long("timeout")
            .value_name("SECONDS")
            .help("Close connections that send nothing for this long")
            .takes_value(true))
        .arg(Arg::with_name("root_directory")
            .value_name("ROOT_DIRECTORY")
            .default_value("."))
        .get_matches();

    let config = match config_from(&matches) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    // SIGINT ends the process right away; running workers are not drained.
    if let Err(e) = rust_http_server::run(&config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn config_from(matches: &ArgMatches) -> Result<ServerConfig, String> {
    let port = value_t!(matches, "port", u16).map_err(|_| "Invalid port number".to_string())?;
    let backlog = value_t!(matches, "backlog", i32).map_err(|_| "Invalid backlog".to_string())?;
    let poll_interval = seconds(matches, "poll_interval")?.ok_or("Invalid poll interval")?;
    let read_timeout = seconds(matches, "timeout")?;

    Ok(ServerConfig {
        address: matches.value_of("address").unwrap_or("0.0.0.0").to_string(),
        port,
        backlog,
        poll_interval,
        read_timeout,
        root: PathBuf::from(matches.value_of("root_directory").unwrap_or(".")),
    })
}

fn seconds(matches: &ArgMatches, name: &str) -> Result<Option<Duration>, String> {
    match matches.value_of(name) {
        None => Ok(None),
        Some(raw) => match raw.parse::<f64>() {
            Ok(secs) if secs > 0.0 && secs.is_finite() => Ok(Some(Duration::from_secs_f64(secs))),
            _ => Err(format!("Invalid number of seconds for --{}: {}", name.replace('_', "-"), raw)),
        },
    }
}
