use colored::Colorize;
use flotilla_client::FlotillaClient;

use crate::{args::AuthCommand, context};

use super::{prompt, prompt_secret, session};

pub async fn handle(
  command: &AuthCommand,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  match command {
    AuthCommand::Login { username } => {
      login(username.as_deref(), context_override).await
    }
    AuthCommand::Logout => logout(context_override).await,
    AuthCommand::Whoami => whoami(context_override).await,
  }
}

async fn login(
  username: Option<&str>,
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let mut config = context::load()?;
  let (name, entry) = config.entry(context_override)?;

  let username = match username {
    Some(username) => username.to_string(),
    None => prompt("Username")?,
  };
  let password = prompt_secret("Password")?;

  let (_, tokens) =
    FlotillaClient::login(&entry.address, &username, &password)
      .await?;
  config.store_tokens(
    &name,
    tokens.access_token,
    tokens.refresh_token,
  );
  context::save(&config)?;

  println!(
    "{} logged in to '{}' as {}",
    "✓".green(),
    name,
    username.bold()
  );
  Ok(())
}

async fn logout(
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let mut config = context::load()?;
  let (name, entry) = config.entry(context_override)?;

  if !entry.refresh_token.is_empty() {
    let client =
      FlotillaClient::new(&entry.address, &entry.access_token);
    if let Err(e) = client.logout(&entry.refresh_token).await {
      // Best effort: clear local tokens either way.
      eprintln!("warning: server-side logout failed | {e}");
    }
  }

  config.store_tokens(&name, String::new(), String::new());
  context::save(&config)?;
  println!("{} logged out of '{}'", "✓".green(), name);
  Ok(())
}

async fn whoami(
  context_override: Option<&str>,
) -> anyhow::Result<()> {
  let client = session(context_override).await?;
  let user = client.me().await?;
  println!(
    "{} ({}){}",
    user.username.bold(),
    user.role,
    if user.active { "" } else { " [deactivated]" }
  );
  Ok(())
}
