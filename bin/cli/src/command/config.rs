use colored::Colorize;

use crate::{
  args::ConfigCommand,
  context::{self, ContextEntry},
};

pub fn handle(command: &ConfigCommand) -> anyhow::Result<()> {
  match command {
    ConfigCommand::View => view(),
    ConfigCommand::AddContext { name, address } => {
      add_context(name, address)
    }
    ConfigCommand::UseContext { name } => use_context(name),
    ConfigCommand::RemoveContext { name } => remove_context(name),
    ConfigCommand::CurrentContext => {
      let config = context::load()?;
      if config.current_context.is_empty() {
        println!("(none)");
      } else {
        println!("{}", config.current_context);
      }
      Ok(())
    }
  }
}

fn view() -> anyhow::Result<()> {
  let config = context::load()?;
  if config.contexts.is_empty() {
    println!("no contexts configured");
    return Ok(());
  }
  for (name, entry) in &config.contexts {
    let marker = if *name == config.current_context {
      "*".green().to_string()
    } else {
      String::from(" ")
    };
    let session = if entry.access_token.is_empty() {
      "logged out"
    } else {
      "logged in"
    };
    println!("{marker} {name}  {}  ({session})", entry.address);
  }
  Ok(())
}

fn add_context(name: &str, address: &str) -> anyhow::Result<()> {
  let mut config = context::load()?;
  config.contexts.insert(
    name.to_string(),
    ContextEntry {
      address: address.trim_end_matches('/').to_string(),
      ..Default::default()
    },
  );
  if config.current_context.is_empty() {
    config.current_context = name.to_string();
  }
  context::save(&config)?;
  println!("{} added context '{name}'", "✓".green());
  Ok(())
}

fn use_context(name: &str) -> anyhow::Result<()> {
  let mut config = context::load()?;
  if !config.contexts.contains_key(name) {
    return Err(anyhow::anyhow!("no context named '{name}'"));
  }
  config.current_context = name.to_string();
  context::save(&config)?;
  println!("{} switched to context '{name}'", "✓".green());
  Ok(())
}

fn remove_context(name: &str) -> anyhow::Result<()> {
  let mut config = context::load()?;
  if config.contexts.remove(name).is_none() {
    return Err(anyhow::anyhow!("no context named '{name}'"));
  }
  if config.current_context == name {
    config.current_context = String::new();
  }
  context::save(&config)?;
  println!("{} removed context '{name}'", "✓".green());
  Ok(())
}
