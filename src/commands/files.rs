use super::share_arg;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use color_eyre::eyre::{Result, eyre};
use klad_connector::DfsClient;
use klad_connector::config::ConnectorConfig;
use std::path::PathBuf;

/// Register file-store subcommands
pub fn register_commands(app: Command) -> Command {
    app.about("File store commands")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("upload")
                .about("Copy a local file into the store")
                .arg(Arg::new("local").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("remote").required(true).value_parser(value_parser!(PathBuf)))
                .arg(share_arg()),
        )
        .subcommand(
            Command::new("download")
                .about("Copy a file out of the store")
                .arg(Arg::new("remote").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("local").value_parser(value_parser!(PathBuf)))
                .arg(share_arg()),
        )
        .subcommand(
            Command::new("ls")
                .about("List a directory in the store")
                .arg(Arg::new("path").default_value("").value_parser(value_parser!(PathBuf)))
                .arg(share_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print entries as JSON"),
                ),
        )
        .subcommand(
            Command::new("mirror")
                .about("Recursively copy a store directory to a local directory")
                .arg(Arg::new("remote").required(true).value_parser(value_parser!(PathBuf)))
                .arg(Arg::new("local").required(true).value_parser(value_parser!(PathBuf)))
                .arg(share_arg()),
        )
}

/// Handle file-store commands
pub async fn handle_command(matches: &ArgMatches, config: &ConnectorConfig) -> Result<()> {
    let client = DfsClient::from_config(&config.storage).await?;

    match matches.subcommand() {
        Some(("upload", m)) => {
            let stored = client.write(share(m), path(m, "remote")?, path(m, "local")?).await?;
            println!("Uploaded to {}", stored.display());
        },
        Some(("download", m)) => {
            let remote = path(m, "remote")?;
            let written = match m.get_one::<PathBuf>("local") {
                Some(local) => client.read(share(m), remote, local).await?,
                None if share(m).is_empty() => client.download_file(remote, None).await?,
                None => {
                    let name = remote.file_name().ok_or_else(|| eyre!("remote path names no file"))?;
                    client.read(share(m), remote, name).await?
                },
            };
            println!("Downloaded to {}", written.display());
        },
        Some(("ls", m)) => {
            let entries = client.list_entries(share(m), path(m, "path")?).await?;
            if m.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            for entry in entries {
                let marker = if entry.is_dir { "/" } else { "" };
                println!("{:>12}  {}{}", entry.size, entry.name, marker);
            }
        },
        Some(("mirror", m)) => {
            let copied = client.read_folder(share(m), path(m, "remote")?, path(m, "local")?).await?;
            println!("Copied {} files", copied);
        },
        _ => return Err(eyre!("unknown files command")),
    }

    Ok(())
}

fn share(matches: &ArgMatches) -> &str {
    matches.get_one::<String>("share").map(String::as_str).unwrap_or("")
}

fn path<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    matches.get_one::<PathBuf>(name).ok_or_else(|| eyre!("missing argument {}", name))
}
