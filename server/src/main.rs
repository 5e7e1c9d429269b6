use clap::{App, Arg};
use hxd::logging;
use hxd::{Config, Server};

pub fn main() {
    let matches = App::new("hxserverd")
        .version("0.1.0")
        .about("Runs the chat and file server.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the config file; defaults apply when omitted"),
        )
        .get_matches();

    let logger = logging::init();

    let config = match matches.value_of("CONFIG_FILE") {
        Some(path) => Config::load(path).expect("Error loading configuration file"),
        None => Config::default(),
    };

    let mut server = Server::new(config, &logger).expect("Server initialization failed");

    logging::info!(logger, "starting server");
    server.run().expect("Server terminated abnormally");
}
