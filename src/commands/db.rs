use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use color_eyre::eyre::{Result, eyre};
use klad_connector::config::ConnectorConfig;
use klad_connector::{PostgresClient, WriteMode};
use polars::prelude::{CsvReader, SerReader};
use std::path::PathBuf;
use tracing::info;

/// Register database subcommands
pub fn register_commands(app: Command) -> Command {
    app.about("Database commands")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("profile")
                .long("profile")
                .short('p')
                .global(true)
                .help("Connection profile, overrides the configured one"),
        )
        .subcommand(Command::new("ping").about("Check that the database answers"))
        .subcommand(
            Command::new("query")
                .about("Run a query and print the result as a table")
                .arg(Arg::new("sql").required(true).help("SQL to run")),
        )
        .subcommand(
            Command::new("load")
                .about("Load a CSV file into a table")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("CSV file with a header row"),
                )
                .arg(Arg::new("table").required(true).help("Destination table"))
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("append")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(WriteMode))
                        .help("append, replace or fail"),
                ),
        )
}

/// Handle database commands
pub async fn handle_command(matches: &ArgMatches, config: &ConnectorConfig) -> Result<()> {
    let mut db_config = config.database.clone();
    if let Some(profile) = matches.get_one::<String>("profile") {
        db_config.profile = profile.clone();
    }

    let client = PostgresClient::from_config(&db_config).await?;

    let outcome = match matches.subcommand() {
        Some(("ping", _)) => {
            client.check_connection().await?;
            println!("{} is reachable", client.connection_info());
            Ok(())
        },
        Some(("query", query_matches)) => {
            let sql = query_matches.get_one::<String>("sql").ok_or_else(|| eyre!("missing SQL"))?;
            let frame = client.read_sql(sql).await?;
            println!("{}", frame);
            Ok(())
        },
        Some(("load", load_matches)) => load_csv(&client, load_matches).await,
        _ => Err(eyre!("unknown database command")),
    };

    client.close().await;
    outcome
}

async fn load_csv(client: &PostgresClient, matches: &ArgMatches) -> Result<()> {
    let file = matches.get_one::<PathBuf>("file").ok_or_else(|| eyre!("missing file"))?;
    let table = matches.get_one::<String>("table").ok_or_else(|| eyre!("missing table"))?;
    let mode = matches.get_one::<WriteMode>("mode").copied().unwrap_or_default();

    let frame = CsvReader::from_path(file)?.has_header(true).finish()?;
    let written = client.to_sql(&frame, table, mode).await?;

    info!(table = %table, rows = written, "Loaded CSV");
    println!("Wrote {} rows to {}", written, table);
    Ok(())
}
