use crate::cli::ProfileArgs;
use crate::commands::{api_client, report};
use crate::exit_codes;
use crate::output;
use pattern_client::config::ClientConfig;

pub async fn execute(args: ProfileArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: ProfileArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let _session = auth.subscribe();
    let api = api_client(&config, &auth)?;

    let Some(profile) = api.behavior_profile().await? else {
        println!("No behaviour profile yet. Upload logs for analysis to build one.");
        return Ok(exit_codes::SUCCESS);
    };

    if args.json {
        return Ok(output::print_json(&profile, false));
    }

    let weekdays: Vec<String> = profile.weekdays().iter().map(|d| d.to_string()).collect();
    println!("Average login hour:       {:.1}", profile.avg_login_hour);
    println!("Average files per day:    {:.1}", profile.avg_files_accessed);
    println!("Average session duration: {:.0}s", profile.avg_session_duration);
    println!("Common file types:        {}", profile.file_types().join(", "));
    println!("Frequent regions:         {}", profile.regions().join(", "));
    println!("Active weekdays:          {}", weekdays.join(", "));
    Ok(exit_codes::SUCCESS)
}
