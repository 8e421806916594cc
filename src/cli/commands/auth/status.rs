//! Authentication status display

use anyhow::Result;
use colored::*;

use super::AuthCommandHandler;

/// Display authentication status
pub async fn status_command(
    handler: &AuthCommandHandler,
    endpoint_id: Option<String>,
    output: &str,
) -> Result<()> {
    let reports = handler.state_reports(endpoint_id.as_deref()).await?;

    if output.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!();
    println!("  {}", "Atlas CLI Authentication Status".bright_blue().bold());
    println!("  {}", "═══════════════════════════════".bright_blue());

    if reports.is_empty() {
        println!();
        println!(
            "  {}",
            "⚠️  No endpoints with a supported authentication method are configured"
                .bright_yellow()
                .bold()
        );
        return Ok(());
    }

    for report in &reports {
        let marker = match report.state.as_str() {
            "ready" => "●".bright_green(),
            "session expired" => "●".bright_yellow(),
            "revoked" => "●".bright_red(),
            _ => "○".white(),
        };
        println!();
        println!(
            "  {} {}",
            marker,
            report
                .endpoint_id
                .clone()
                .unwrap_or_else(|| "(unnamed)".to_string())
                .bright_white()
                .bold(),
        );
        println!("    {}: {}", "Resource".dimmed(), report.resource_url.cyan());
        println!(
            "    {}: {}",
            "Grant".dimmed(),
            report.grant_type.bright_yellow()
        );
        println!("    {}: {}", "State".dimmed(), report.state.white());
        if let Some(preview) = &report.token_preview {
            println!("    {}: {}", "Token".dimmed(), preview.white());
        }
        if let Some(scope) = &report.scope {
            println!("    {}: {}", "Scope".dimmed(), scope.white());
        }
        if let Some(valid_until) = &report.valid_until {
            println!("    {}: {}", "Valid until".dimmed(), valid_until.white());
        }
    }
    println!();
    Ok(())
}
