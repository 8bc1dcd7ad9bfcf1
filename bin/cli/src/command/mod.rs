use anyhow::Context;
use flotilla_client::{ClientError, FlotillaClient};

use crate::context;

pub mod auth;
pub mod config;
pub mod containers;
pub mod hosts;
pub mod resources;

/// Raised when there is no usable session; mapped to exit code 3.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AuthRequired(pub String);

/// Build an authenticated client for the selected context,
/// refreshing a stale access token once.
pub async fn session(
  context_override: Option<&str>,
) -> anyhow::Result<FlotillaClient> {
  let mut config = context::load()?;
  let (name, entry) = config.entry(context_override)?;
  if entry.access_token.is_empty() {
    return Err(
      AuthRequired(format!(
        "not logged in to context '{name}', run 'flo auth login'"
      ))
      .into(),
    );
  }

  let mut client =
    FlotillaClient::new(&entry.address, &entry.access_token);
  match client.me().await {
    Ok(_) => Ok(client),
    Err(e) if e.is_auth() && !entry.refresh_token.is_empty() => {
      let tokens = client
        .refresh(&entry.refresh_token)
        .await
        .map_err(|_| {
          AuthRequired(format!(
            "session for context '{name}' has expired, run 'flo auth login'"
          ))
        })?;
      config.store_tokens(
        &name,
        tokens.access_token.clone(),
        tokens.refresh_token.clone(),
      );
      context::save(&config)?;
      Ok(client)
    }
    Err(e) if e.is_auth() => Err(
      AuthRequired(format!(
        "session for context '{name}' is no longer valid, run 'flo auth login'"
      ))
      .into(),
    ),
    Err(e) => Err(e.into()),
  }
}

/// Read a line from stdin with a visible prompt.
pub fn prompt(label: &str) -> anyhow::Result<String> {
  use std::io::Write;
  print!("{label}: ");
  std::io::stdout().flush().ok();
  let mut line = String::new();
  std::io::stdin()
    .read_line(&mut line)
    .context("failed to read from stdin")?;
  Ok(line.trim().to_string())
}

/// Read a secret without echoing it back.
pub fn prompt_secret(label: &str) -> anyhow::Result<String> {
  use std::io::Write;
  print!("{label}: ");
  std::io::stdout().flush().ok();

  crossterm::terminal::enable_raw_mode()
    .context("failed to switch the terminal to raw mode")?;
  let mut secret = String::new();
  let result = loop {
    match crossterm::event::read() {
      Ok(crossterm::event::Event::Key(key)) => {
        use crossterm::event::{KeyCode, KeyModifiers};
        if key.kind != crossterm::event::KeyEventKind::Press {
          continue;
        }
        match key.code {
          KeyCode::Enter => break Ok(()),
          KeyCode::Backspace => {
            secret.pop();
          }
          KeyCode::Char('c')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
          {
            break Err(anyhow::anyhow!("interrupted"));
          }
          KeyCode::Char(c) => secret.push(c),
          _ => {}
        }
      }
      Ok(_) => {}
      Err(e) => {
        break Err(anyhow::Error::from(e)
          .context("failed to read from the terminal"));
      }
    }
  };
  crossterm::terminal::disable_raw_mode().ok();
  println!();
  result.map(|_| secret)
}

/// Map an API error to the documented exit codes.
pub fn exit_code(e: &anyhow::Error) -> i32 {
  if e.downcast_ref::<AuthRequired>().is_some() {
    return 3;
  }
  match e.downcast_ref::<ClientError>() {
    Some(ClientError::Api { status, .. }) => {
      if *status == 401 { 3 } else { 2 }
    }
    Some(ClientError::Other(_)) => 2,
    None => 1,
  }
}
