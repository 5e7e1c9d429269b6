use clap::{App, Arg};
use hxd::Config;
use std::fs;

/// Emit a default configuration file to stand up a fresh server.
pub fn main() {
    let matches = App::new("gen_config")
        .about("Generates a default server configuration.")
        .arg(Arg::with_name("OUT_FILE").help("Destination path; stdout when omitted"))
        .get_matches();

    let toml = serdeconv::to_toml_string(&Config::default()).expect("Error serializing configuration");

    match matches.value_of("OUT_FILE") {
        Some(path) => fs::write(path, toml).expect("Error writing configuration file"),
        None => print!("{}", toml),
    }
}
