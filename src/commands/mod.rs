pub mod db;
pub mod files;

use clap::{Arg, ArgMatches, Command};
use color_eyre::eyre::Result;
use klad_connector::config::{ConnectorConfig, connection_uri_key, get_connection_uri};
use klad_connector::database::mask_password;

/// Register all application commands
pub fn register_commands(app: Command) -> Command {
    app.subcommand(Command::new("config").about("Show the resolved configuration"))
        .subcommand(db::register_commands(Command::new("db")))
        .subcommand(files::register_commands(Command::new("files")))
}

/// Handle all application commands
pub async fn handle_commands(matches: ArgMatches, config: &ConnectorConfig) -> Result<()> {
    match matches.subcommand() {
        Some(("config", _)) => show_config(config),
        Some(("db", db_matches)) => db::handle_command(db_matches, config).await,
        Some(("files", files_matches)) => files::handle_command(files_matches, config).await,
        _ => {
            println!("Please specify a subcommand. Use --help for more information.");
            Ok(())
        },
    }
}

/// Optional `--share` argument shared by the file commands
pub(crate) fn share_arg() -> Arg {
    Arg::new("share").long("share").short('s').help("Share to operate in").default_value("")
}

fn show_config(config: &ConnectorConfig) -> Result<()> {
    let profile = &config.database.profile;
    match get_connection_uri(profile) {
        Ok(uri) => println!("{} = {}", connection_uri_key(profile), mask_password(&uri)),
        Err(e) => println!("{}", e),
    }
    println!("storage root = {}", config.storage.root.display());
    println!("storage backend = {:?}", config.storage.backend);
    if let Some(share) = &config.storage.default_share {
        println!("default share = {}", share);
    }
    Ok(())
}
