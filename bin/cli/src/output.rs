use anyhow::Context;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;

use crate::args::OutputFormat;

/// Print a value in the requested format. The table shape comes
/// from the caller; json / yaml are straight serializations.
pub fn print<T: Serialize>(
  format: OutputFormat,
  value: &T,
  table: impl FnOnce(&T) -> Table,
) -> anyhow::Result<()> {
  match format {
    OutputFormat::Table => println!("{}", table(value)),
    OutputFormat::Json => println!(
      "{}",
      serde_json::to_string_pretty(value)
        .context("failed to render json output")?
    ),
    OutputFormat::Yaml => print!(
      "{}",
      serde_yaml_ng::to_string(value)
        .context("failed to render yaml output")?
    ),
  }
  Ok(())
}

pub fn table(header: &[&str]) -> Table {
  let mut table = Table::new();
  table.load_preset(UTF8_FULL_CONDENSED);
  table.set_header(header.to_vec());
  table
}

/// Render raw JSON payloads (inspects, system surfaces) where a
/// table adds nothing.
pub fn print_value(
  format: OutputFormat,
  value: &serde_json::Value,
) -> anyhow::Result<()> {
  match format {
    OutputFormat::Yaml => print!(
      "{}",
      serde_yaml_ng::to_string(value)
        .context("failed to render yaml output")?
    ),
    _ => println!(
      "{}",
      serde_json::to_string_pretty(value)
        .context("failed to render json output")?
    ),
  }
  Ok(())
}
