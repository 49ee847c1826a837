use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use freebusy_companion::build_authorization_url;
use super::{Command, CommandContext};

/// Command to print the Google sign-in URL
pub struct AuthUrlCommand;

/// Command to show who a redirect signed in
pub struct WhoAmICommand {
    pub callback: String,
}

#[async_trait]
impl Command for AuthUrlCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        if context.config.oauth.client_id.is_empty() {
            println!("❌ Google OAuth client not configured!");
            println!("Set GOOGLE_CLIENT_ID or add it to the config file:");
            println!();
            println!("[oauth]");
            println!("client_id = \"your-client-id.apps.googleusercontent.com\"");
            println!("redirect_uri = \"{}\"", context.config.oauth.redirect_uri);
            return Ok(());
        }

        let url = build_authorization_url(&context.config.oauth)?;
        info!("Built authorization URL for redirect {}", context.config.oauth.redirect_uri);

        println!("📋 Open this URL in your browser and grant calendar access:");
        println!("   {}", url);
        println!();
        println!("💡 Copy the address you land on afterwards and pass it as --callback");
        Ok(())
    }
}

#[async_trait]
impl Command for WhoAmICommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let session = context.session_from_callback(&self.callback)?;
        let claims = session.claims();

        println!("👤 Signed in");
        println!("   Email:   {}", claims.email.as_deref().unwrap_or("(not shared)"));
        println!("   User ID: {}", claims.subject);
        if let Some(name) = &claims.name {
            println!("   Name:    {}", name);
        }
        if let Some(issuer) = &claims.issuer {
            println!("   Issuer:  {}", issuer);
        }

        if session.is_expired(Utc::now()) {
            println!("⚠️  Session expired at {}; sign in again", claims.expires_at);
        } else {
            println!("   Expires: {}", claims.expires_at);
        }
        Ok(())
    }
}
