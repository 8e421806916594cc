//! Authentication commands: login, status, revoke, token-exchange

pub mod status;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use dialoguer::Confirm;
use std::sync::Arc;

use crate::auth::adapters::{GrantAdapter, TokenExchangeAdapter};
use crate::auth::authenticator::Authenticator;
use crate::auth::events::{AuthEvent, AuthEventSink};
use crate::auth::factory::AdapterFactory;
use crate::auth::models::{AuthConfig, GrantType, ServiceEndpoint};
use crate::auth::session::SessionRecord;
use crate::auth::store::SessionStore as _;
use crate::config::Config;
use crate::http::TraceSpan;

#[derive(Args)]
pub struct AuthCommands {
    #[command(subcommand)]
    pub command: AuthSubcommands,
}

#[derive(Subcommand)]
pub enum AuthSubcommands {
    /// Log in to all service endpoints or one specific endpoint
    Login {
        /// Only authenticate the endpoint with this id
        #[arg(long)]
        endpoint_id: Option<String>,
        /// Only refresh existing sessions, never start a new login
        #[arg(long)]
        force_refresh: bool,
        /// Revoke existing sessions before authenticating
        #[arg(long)]
        revoke_existing: bool,
    },
    /// Check the status of all authenticators
    Status {
        /// Only report the endpoint with this id
        #[arg(long)]
        endpoint_id: Option<String>,
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        output: String,
    },
    /// Revoke the authorization to one or many endpoints
    Revoke {
        /// Only revoke the endpoint with this id
        #[arg(long)]
        endpoint_id: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Exchange an externally issued subject token for an access token
    TokenExchange {
        /// Token endpoint URL
        #[arg(long)]
        token_endpoint: String,
        /// Resource URL for the token exchange
        #[arg(long)]
        resource: String,
        /// Subject token to exchange (fetched from the cloud environment when omitted)
        #[arg(long)]
        subject_token: Option<String>,
        /// Audience for the minted identity token (defaults to the resource URL)
        #[arg(long)]
        audience: Option<String>,
        /// OAuth2 scope for the token exchange
        #[arg(long)]
        scope: Option<String>,
    },
}

pub async fn auth_command(args: AuthCommands) -> Result<()> {
    let handler = AuthCommandHandler::new();
    match args.command {
        AuthSubcommands::Login {
            endpoint_id,
            force_refresh,
            revoke_existing,
        } => handler.login(endpoint_id, force_refresh, revoke_existing).await,
        AuthSubcommands::Status {
            endpoint_id,
            output,
        } => status::status_command(&handler, endpoint_id, &output).await,
        AuthSubcommands::Revoke { endpoint_id, force } => handler.revoke(endpoint_id, force).await,
        AuthSubcommands::TokenExchange {
            token_endpoint,
            resource,
            subject_token,
            audience,
            scope,
        } => {
            handler
                .token_exchange(token_endpoint, resource, subject_token, audience, scope)
                .await
        }
    }
}

/// Renders authentication lifecycle events on the console.
struct ConsoleEventSink;

impl AuthEventSink for ConsoleEventSink {
    fn on_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::AuthBegin { endpoint_id, .. } => {
                println!(
                    "  {} Authenticating {}...",
                    "→".bright_blue(),
                    display_endpoint(endpoint_id).cyan(),
                );
            }
            AuthEvent::AuthEnd { endpoint_id, ok } => {
                if *ok {
                    println!(
                        "  {} Authenticated {}",
                        "✓".bright_green(),
                        display_endpoint(endpoint_id).cyan(),
                    );
                }
            }
            AuthEvent::RefreshOk { endpoint_id } => {
                println!(
                    "  {} Refreshed the session for {}",
                    "✓".bright_green(),
                    display_endpoint(endpoint_id).cyan(),
                );
            }
            AuthEvent::RefreshFailure { endpoint_id, reason } => {
                println!(
                    "  {} Could not refresh {}: {}",
                    "✗".bright_red(),
                    display_endpoint(endpoint_id).cyan(),
                    reason.dimmed(),
                );
            }
            AuthEvent::NoRefreshToken { endpoint_id } => {
                println!(
                    "  {} No refresh token for {}; re-authenticating",
                    "·".dimmed(),
                    display_endpoint(endpoint_id).cyan(),
                );
            }
            AuthEvent::RefreshSkipped { endpoint_id, reason } => {
                println!(
                    "  {} Skipped {}: {}",
                    "·".dimmed(),
                    display_endpoint(endpoint_id).cyan(),
                    reason.dimmed(),
                );
            }
            AuthEvent::SessionRevoked { endpoint_id } => {
                println!(
                    "  {} Revoked the session for {}",
                    "✓".bright_green(),
                    display_endpoint(endpoint_id).cyan(),
                );
            }
            AuthEvent::DeviceAuthorization {
                verification_uri,
                user_code,
                expires_in,
            } => {
                println!();
                println!(
                    "  {}",
                    "Complete the sign-in in your browser:".bright_white().bold()
                );
                println!("    {}", verification_uri.bright_blue().underline());
                println!(
                    "    Code: {}  (expires in {}s)",
                    user_code.bright_yellow().bold(),
                    expires_in,
                );
                println!();
            }
            _ => {}
        }
    }
}

fn display_endpoint(endpoint_id: &Option<String>) -> String {
    endpoint_id.clone().unwrap_or_else(|| "(unnamed)".to_string())
}

/// Token-exchange configurations need a subject token the interactive flow
/// cannot supply; `login` only attempts them when the caller names their
/// endpoint directly.
fn login_should_skip(grant_type: &GrantType, explicitly_targeted: bool) -> bool {
    *grant_type == GrantType::TokenExchange && !explicitly_targeted
}

pub(crate) struct AuthCommandHandler {
    config: &'static Config,
}

impl AuthCommandHandler {
    pub fn new() -> Self {
        Self {
            config: crate::global_config(),
        }
    }

    fn factory(&self) -> AdapterFactory {
        AdapterFactory::new()
            .with_events(Arc::new(ConsoleEventSink))
            .with_subject_source(self.config.platform_subject_token_source())
    }

    async fn selected_endpoints(&self, endpoint_id: Option<&str>) -> Result<Vec<ServiceEndpoint>> {
        match endpoint_id {
            Some(id) => {
                let endpoint = self
                    .config
                    .get_endpoint(id)
                    .await?
                    .with_context(|| format!("Endpoint '{id}' not found"))?;
                Ok(vec![endpoint])
            }
            None => self.config.list_endpoints().await,
        }
    }

    pub(crate) async fn build_authenticators(
        &self,
        endpoint_id: Option<&str>,
    ) -> Result<Vec<Authenticator>> {
        let endpoints = self.selected_endpoints(endpoint_id).await?;
        let store = self.config.session_store();
        Ok(self.factory().create_multiple_from(&endpoints, store))
    }

    async fn login(
        &self,
        endpoint_id: Option<String>,
        force_refresh: bool,
        revoke_existing: bool,
    ) -> Result<()> {
        let authenticators = self.build_authenticators(endpoint_id.as_deref()).await?;
        if authenticators.is_empty() {
            println!(
                "  {}",
                "No endpoints with a supported authentication method are configured.".yellow()
            );
            return Ok(());
        }

        let trace = TraceSpan::new();
        let mut failures = 0usize;

        for authenticator in &authenticators {
            let explicitly_targeted = endpoint_id
                .as_deref()
                .is_some_and(|id| authenticator.endpoint_id() == Some(id));
            if login_should_skip(&authenticator.auth().grant_type, explicitly_targeted) {
                println!(
                    "  {} Skipped {}: token exchange requires an externally provided subject token",
                    "·".dimmed(),
                    display_endpoint(&authenticator.endpoint_id().map(str::to_string)).cyan(),
                );
                continue;
            }

            if revoke_existing {
                authenticator.revoke().await?;
            }

            let outcome = if force_refresh {
                match authenticator.restore_session().await? {
                    Some(_) => authenticator.refresh(&trace).await.map(Some),
                    None => {
                        println!(
                            "  {} Skipped {}: no existing session to refresh",
                            "·".dimmed(),
                            display_endpoint(&authenticator.endpoint_id().map(str::to_string))
                                .cyan(),
                        );
                        Ok(None)
                    }
                }
            } else if revoke_existing {
                authenticator.authenticate(&trace).await.map(Some)
            } else {
                authenticator.ensure_ready(&trace).await.map(Some)
            };

            if let Err(error) = outcome {
                failures += 1;
                println!(
                    "  {} {}: {}",
                    "✗".bright_red(),
                    display_endpoint(&authenticator.endpoint_id().map(str::to_string)).cyan(),
                    error,
                );
            }
        }

        if failures > 0 {
            anyhow::bail!("Authentication failed for {failures} endpoint(s)");
        }
        Ok(())
    }

    async fn revoke(&self, endpoint_id: Option<String>, force: bool) -> Result<()> {
        if !force {
            if endpoint_id.is_none() {
                println!(
                    "  {}",
                    "WARNING: You are about to revoke the access to all endpoints."
                        .black()
                        .on_yellow()
                );
            }
            let confirmed = Confirm::new()
                .with_prompt("Do you want to proceed?")
                .default(false)
                .interact()
                .context("Failed to read the confirmation")?;
            if !confirmed {
                println!("  {}", "Aborted".dimmed());
                return Ok(());
            }
        }

        let authenticators = self.build_authenticators(endpoint_id.as_deref()).await?;
        let mut affected: Vec<String> = Vec::new();
        for authenticator in &authenticators {
            if authenticator.restore_session().await?.is_some() {
                authenticator.revoke().await?;
                affected.push(display_endpoint(
                    &authenticator.endpoint_id().map(str::to_string),
                ));
            }
        }

        println!();
        println!("  {}", "Summary".bright_white().bold());
        if affected.is_empty() {
            println!("  No changes");
        } else {
            println!("  The client is no longer authenticated to the following endpoints:");
            for id in affected {
                println!("    - {}", id.cyan());
            }
        }
        println!();
        Ok(())
    }

    pub(crate) async fn state_reports(
        &self,
        endpoint_id: Option<&str>,
    ) -> Result<Vec<crate::auth::authenticator::AuthStateReport>> {
        let authenticators = self.build_authenticators(endpoint_id).await?;
        let mut reports = Vec::with_capacity(authenticators.len());
        for authenticator in &authenticators {
            reports.push(authenticator.state_report().await?);
        }
        Ok(reports)
    }

    /// First configured client identity, for authenticating the exchange
    /// request itself.
    async fn client_credentials_from_endpoints(&self) -> Result<(Option<String>, Option<String>)> {
        for endpoint in self.config.list_endpoints().await? {
            for auth in endpoint.authentications() {
                if AuthConfig::has(&auth.client_id) {
                    return Ok((auth.client_id, auth.client_secret));
                }
            }
        }
        Ok((None, None))
    }

    async fn token_exchange(
        &self,
        token_endpoint: String,
        resource: String,
        subject_token: Option<String>,
        audience: Option<String>,
        scope: Option<String>,
    ) -> Result<()> {
        let (client_id, client_secret) = self.client_credentials_from_endpoints().await?;

        let auth = AuthConfig {
            grant_type: GrantType::TokenExchange,
            token_endpoint: Some(token_endpoint.clone()),
            device_code_endpoint: None,
            resource_url: resource.clone(),
            client_id: client_id.clone(),
            client_secret,
            scope,
            audience: audience.or_else(|| Some(resource.clone())),
            subject_token: subject_token.clone(),
            requested_token_type: None,
            cloud_platform: None,
        };

        println!("Performing token exchange...");
        println!("Token endpoint: {}", token_endpoint.cyan());
        println!("Resource: {}", resource.cyan());
        if let Some(client_id) = &client_id {
            println!("Client ID: {}", client_id.cyan());
        }
        if subject_token.is_some() {
            println!("Using provided subject token");
        } else {
            println!("Fetching ID token from cloud environment...");
        }

        let adapter = TokenExchangeAdapter::new(auth.clone())
            .with_subject_source(self.config.platform_subject_token_source());
        let trace = TraceSpan::new();
        let response = adapter.acquire(&trace).await?;

        let record = SessionRecord::from_token_response(&auth, &response);
        let fingerprint = auth.fingerprint();
        self.config
            .session_store()
            .save(&fingerprint, &record)
            .await?;

        println!();
        println!("{}", "Token exchange successful!".bright_green().bold());
        if let Some(preview) = record.token_preview() {
            println!("Access token: {preview}");
        }
        println!("Token type: {}", record.token_type);
        println!("Expires in: {} seconds", response.expires_in);
        println!("Session saved with ID: {}...", &fingerprint[..8]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_skips_untargeted_token_exchange() {
        assert!(login_should_skip(&GrantType::TokenExchange, false));
    }

    #[test]
    fn test_login_attempts_token_exchange_when_targeted() {
        assert!(!login_should_skip(&GrantType::TokenExchange, true));
    }

    #[test]
    fn test_login_attempts_interactive_grants() {
        assert!(!login_should_skip(&GrantType::DeviceCode, false));
        assert!(!login_should_skip(&GrantType::ClientCredentials, false));
    }
}
