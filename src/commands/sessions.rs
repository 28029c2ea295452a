use crate::cli::{SessionsArgs, SessionsCommand};
use crate::commands::{api_client, report};
use crate::exit_codes;
use crate::output;
use pattern_client::api::{ApiClient, ApiError};
use pattern_client::capture::SessionPayload;
use pattern_client::config::ClientConfig;

pub async fn execute(args: SessionsArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: SessionsArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let _session = auth.subscribe();
    let api = api_client(&config, &auth)?;

    match args.command {
        SessionsCommand::List { json } => {
            let sessions = api.list_sessions().await?;
            if json {
                return Ok(output::print_json(&sessions, false));
            }

            if sessions.is_empty() {
                println!("No recorded sessions.");
            }
            for session in &sessions {
                println!("{:<38} {}", session.id, session.created_at);
            }
            Ok(exit_codes::SUCCESS)
        }
        SessionsCommand::Check { id, latest } => {
            let (label, result) = match id.filter(|_| !latest) {
                Some(id) => {
                    let result = api.fetch_replayable_session(&id).await;
                    (id, result)
                }
                None => ("latest".to_string(), fetch_latest(&api).await),
            };

            match result {
                Ok(session) => {
                    let snapshots = session.events.iter().filter(|e| e.is_full_snapshot()).count();
                    println!(
                        "Session {}: {} events, {} full snapshots, replayable",
                        label,
                        session.events.len(),
                        snapshots
                    );
                    Ok(exit_codes::SUCCESS)
                }
                Err(ApiError::NotReplayable { id, reason }) => {
                    eprintln!("Session {} cannot be replayed: {}", id, reason);
                    Ok(exit_codes::NOT_REPLAYABLE)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

async fn fetch_latest(api: &ApiClient) -> Result<SessionPayload, ApiError> {
    let session = api.latest_session().await?;
    session
        .ensure_replayable()
        .map_err(|e| ApiError::NotReplayable {
            id: "latest".to_string(),
            reason: e.to_string(),
        })?;
    Ok(session)
}
