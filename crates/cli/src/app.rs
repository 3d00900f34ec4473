use crate::cli::{Cli, Commands};
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;

/// Run one command. `Ok(true)` means the artifact verified.
pub fn run(cli: Cli) -> Result<bool> {
    let json = cli.json;

    let result = match cli.command {
        Commands::Identity {
            artifact,
            bundle,
            issuer,
            subject,
            trusted_root,
        } => crate::commands::verify_identity(
            artifact,
            bundle,
            issuer,
            subject,
            trusted_root,
            json,
        ),

        Commands::Key {
            artifact,
            bundle,
            key,
            trusted_root,
            tlog_threshold,
            timestamp_threshold,
        } => crate::commands::verify_key(
            artifact,
            bundle,
            key,
            trusted_root,
            tlog_threshold,
            timestamp_threshold,
            json,
        ),

        Commands::Fingerprint { key } => crate::commands::fingerprint(key, json).map(|()| true),
    };

    if let Err(e) = &result {
        if json {
            let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
            let payload = ErrorJson {
                ok: false,
                error: e.to_string(),
                causes,
            };
            println!("{}", serde_json::to_string(&payload)?);
        } else {
            eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(&e).red());

            for (i, cause) in e.chain().skip(1).enumerate() {
                if i == 0 {
                    eprintln!("\n    Caused by:");
                }
                eprintln!("      - {}", style(cause).red());
            }
            eprintln!();
        }
    }

    result
}
