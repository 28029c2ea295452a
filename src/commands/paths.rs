use crate::cli::PathsArgs;
use crate::commands::{api_client, report};
use crate::exit_codes;
use crate::output;
use pattern_client::config::ClientConfig;

pub async fn execute(args: PathsArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: PathsArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let api = api_client(&config, &auth)?;

    let flow = api.path_flow().await?;
    if args.json {
        return Ok(output::print_json(&flow, false));
    }

    let transitions = flow.transitions();
    if transitions.is_empty() {
        println!("No navigation recorded.");
        return Ok(exit_codes::SUCCESS);
    }

    for transition in transitions.iter().take(args.top) {
        println!(
            "{:>6}  {} -> {}",
            transition.count,
            transition.from.unwrap_or("(none)"),
            transition.to.unwrap_or("(none)")
        );
    }
    Ok(exit_codes::SUCCESS)
}
