#[macro_use]
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate nebula;
extern crate num_cpus;

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::process::exit;

use clap::{App, Arg, ArgMatches, SubCommand};

use nebula::{computer, space, tasks, universe};
use nebula::{SPACE_PORT, UNIVERSE_PORT, VERSION};

fn parse_listen_arg(key: &str, args: &ArgMatches, default_port: u16) -> SocketAddr {
    if !args.is_present(key) {
        return SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), default_port);
    }

    value_t!(args, key, SocketAddr).unwrap_or_else(|_| match value_t!(args, key, IpAddr) {
        Ok(ip) => SocketAddr::new(ip, default_port),
        _ => SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            value_t_or_exit!(args, key, u16),
        ),
    })
}

fn resolve_peer_arg(key: &str, args: &ArgMatches, default_port: u16) -> SocketAddr {
    let mut host = args.value_of(key).unwrap_or("localhost").to_string();
    if !host.contains(':') {
        host = format!("{}:{}", host, default_port);
    }
    match host.to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                error!("Cannot resolve address {:?}", host);
                exit(1);
            }
        },
        Err(_) => {
            error!("Cannot resolve address {:?}", host);
            exit(1);
        }
    }
}

fn run_universe(cmd_args: &ArgMatches) {
    let listen = parse_listen_arg("LISTEN_ADDRESS", cmd_args, UNIVERSE_PORT);
    let recovery = cmd_args.is_present("RECOVERY");

    info!("Starting Nebula {} universe", VERSION);
    info!("Listen address: {}", listen);

    if let Err(e) = universe::run(listen, recovery) {
        error!("{}", e);
        exit(1);
    }
}

fn run_space(cmd_args: &ArgMatches) {
    let universe_addr = resolve_peer_arg("UNIVERSE_HOST", cmd_args, UNIVERSE_PORT);
    let listen = parse_listen_arg("LISTEN_ADDRESS", cmd_args, SPACE_PORT);

    info!("Starting Nebula {} space", VERSION);
    info!("Universe address: {}", universe_addr);

    if let Err(e) = space::start(universe_addr, listen, tasks::standard_registry()) {
        error!("{}", e);
        exit(1);
    }

    wait_for_stdin();
    info!("Space stopped.");
    exit(-1);
}

fn run_computer(cmd_args: &ArgMatches) {
    let space_addr = resolve_peer_arg("SPACE_HOST", cmd_args, SPACE_PORT);
    let workers = if cmd_args.is_present("WORKERS") {
        value_t_or_exit!(cmd_args, "WORKERS", usize)
    } else {
        num_cpus::get()
    };

    info!("Starting Nebula {} computer", VERSION);

    if let Err(e) = computer::start(space_addr, workers, tasks::standard_registry()) {
        error!("{}", e);
        exit(1);
    }

    wait_for_stdin();
    info!("Computer stopped.");
    exit(-1);
}

/// Block the main thread until the user hits enter.
fn wait_for_stdin() {
    let mut buf = [0u8; 1];
    let _ = ::std::io::stdin().read(&mut buf);
}

fn init_log() {
    // Simple logger with INFO as the default level.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

fn main() {
    init_log();

    let args = App::new("Nebula")
        .version(VERSION)
        .about("Hierarchical task-execution fabric")
        .subcommand( // ---- UNIVERSE ----
            SubCommand::with_name("universe")
                .about("Nebula universe (root broker)")
                .arg(Arg::with_name("RECOVERY")
                    .help("Any value starts the universe in recovery mode from the fixed recovery file"))
                .arg(Arg::with_name("LISTEN_ADDRESS")
                    .short("l")
                    .long("listen")
                    .help("Listening port/address/address:port (default 0.0.0.0:7410)")
                    .takes_value(true)))
        .subcommand( // ---- SPACE ----
            SubCommand::with_name("space")
                .about("Nebula space (intermediate scheduler)")
                .arg(Arg::with_name("UNIVERSE_HOST")
                    .help("Universe host or host:port (default localhost)"))
                .arg(Arg::with_name("LISTEN_ADDRESS")
                    .short("l")
                    .long("listen")
                    .help("Listening port/address/address:port for computers (default 0.0.0.0:7411)")
                    .takes_value(true)))
        .subcommand( // ---- COMPUTER ----
            SubCommand::with_name("computer")
                .about("Nebula computer (worker process)")
                .arg(Arg::with_name("SPACE_HOST")
                    .help("Space host or host:port (default localhost)"))
                .arg(Arg::with_name("WORKERS")
                    .long("workers")
                    .value_name("N")
                    .help("Number of worker threads (default = number of cpus)")
                    .takes_value(true)))
        .get_matches();

    match args.subcommand() {
        ("universe", Some(cmd_args)) => run_universe(cmd_args),
        ("space", Some(cmd_args)) => run_space(cmd_args),
        ("computer", Some(cmd_args)) => run_computer(cmd_args),
        _ => {
            error!("No subcommand provided.");
            exit(1);
        }
    }
}
