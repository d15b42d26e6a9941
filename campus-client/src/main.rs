//! SmartCampus command-line client.

use std::process::ExitCode;

use campus_client::documents;
use campus_client::{CampusClient, ClientConfig, ClientError, ClientResult, QueryResult};
use campus_core::{AvailabilityStatus, BroadcastAudience};
use futures_util::StreamExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "campus_client=info,warn";

const USAGE: &str = "\
usage: campus-client <command> [args]

commands:
  me                              show the signed-in user
  faculties                       list faculty with live availability
  faculty <id>                    show one faculty member and their schedule
  broadcasts                      list announcements
  appointments                    list your appointments
  login <email> <password>        sign in and store the token
  logout                          forget the stored token
  status <status> [note]          set your availability (faculty)
  broadcast <title> <message>     post an announcement to everyone
  watch-broadcasts                print broadcasts as they are created
  watch-faculties                 print the faculty list whenever it changes
  watch-notifications             print your notifications as they arrive";

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    match run(command, rest).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClientError::InvalidOperation(message)) if message.starts_with("usage") => {
            eprintln!("{}\n\n{}", message, USAGE);
            ExitCode::from(2)
        }
        Err(err) => {
            tracing::error!(error = %err, command = %command, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run(command: &str, args: &[String]) -> ClientResult<()> {
    let config = ClientConfig::load()?;
    let client = CampusClient::from_config(&config)?;

    match (command, args) {
        ("me", []) => print_result(client.query(documents::me()?).await?),
        ("faculties", []) => print_result(client.query(documents::faculties()?).await?),
        ("faculty", [id]) => print_result(client.query(documents::faculty(id)?).await?),
        ("broadcasts", []) => print_result(client.query(documents::broadcasts()?).await?),
        ("appointments", []) => {
            print_result(client.query(documents::my_appointments()?).await?)
        }
        ("login", [email, password]) => {
            let result = client.mutate(documents::login(email, password)?).await?;
            let token: Option<String> = result
                .data
                .as_ref()
                .and_then(|data| data["login"]["token"].as_str())
                .map(str::to_string);
            match token {
                Some(token) => {
                    client.sign_in(&token).await?;
                    tracing::info!(email = %email, "Signed in");
                    Ok(())
                }
                None => Err(ClientError::Graphql(result.errors)),
            }
        }
        ("logout", []) => {
            client.sign_out().await?;
            tracing::info!("Signed out");
            Ok(())
        }
        ("status", [status, note @ ..]) if note.len() <= 1 => {
            let status: AvailabilityStatus = status
                .parse()
                .map_err(|e| ClientError::InvalidOperation(format!("usage: {}", e)))?;
            let note = note.first().map(String::as_str);
            print_result(
                client
                    .mutate(documents::update_availability(status, note)?)
                    .await?,
            )
        }
        ("broadcast", [title, message]) => print_result(
            client
                .mutate(documents::create_broadcast(
                    title,
                    message,
                    BroadcastAudience::All,
                )?)
                .await?,
        ),
        ("watch-broadcasts", []) => {
            follow(client.subscribe(documents::broadcast_created()?)).await
        }
        ("watch-notifications", []) => {
            follow(client.subscribe(documents::notification_received()?)).await
        }
        ("watch-faculties", []) => {
            // Availability events land in the cache and re-emit the list.
            let events = client.subscribe(documents::availability_updated(None)?);
            tokio::spawn(events.for_each(|event| async move {
                if let Err(err) = event {
                    tracing::warn!(error = %err, "Availability subscription failed");
                }
            }));
            follow(client.watch_query(documents::faculties()?)).await
        }
        _ => Err(ClientError::InvalidOperation(format!(
            "usage: unknown command or arguments for '{}'",
            command
        ))),
    }
}

async fn follow(
    mut stream: futures_util::stream::BoxStream<'static, ClientResult<QueryResult>>,
) -> ClientResult<()> {
    while let Some(item) = stream.next().await {
        print_result(item?)?;
    }
    Ok(())
}

fn print_result(result: QueryResult) -> ClientResult<()> {
    for error in &result.errors {
        tracing::warn!(path = %error.path_string(), "{}", error.message);
    }
    if let Some(data) = &result.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}
