use std::collections::HashMap;

use crate::config::SelfMonitorConfig;

/// Guard against log amplification loops: when a log stream
/// targets one of the control plane's own containers, frames this
/// process emitted while serving streams are filtered back out.
/// Default-on; the matcher is configurable by label and name.
#[derive(Debug, Clone)]
pub struct SelfMonitor {
  disabled: bool,
  label: String,
  name_pattern: String,
  line_marker: String,
}

impl SelfMonitor {
  pub fn new(config: &SelfMonitorConfig) -> SelfMonitor {
    SelfMonitor {
      disabled: config.disabled,
      label: config.label.clone(),
      name_pattern: config.name_pattern.clone(),
      line_marker: config.line_marker.clone(),
    }
  }

  pub fn from_config() -> SelfMonitor {
    SelfMonitor::new(&crate::config::core_config().self_monitor)
  }

  /// Whether the container is the control plane itself, matched
  /// by label or name pattern.
  pub fn is_self_container(
    &self,
    name: &str,
    labels: &HashMap<String, String>,
  ) -> bool {
    if self.disabled {
      return false;
    }
    if labels.contains_key(&self.label) {
      return true;
    }
    match wildcard::Wildcard::new(self.name_pattern.as_bytes()) {
      Ok(pattern) => pattern.is_match(name.as_bytes()),
      Err(_) => false,
    }
  }

  /// Whether a log line from a self container should be kept.
  pub fn keep_line(&self, line: &str) -> bool {
    if self.disabled || self.line_marker.is_empty() {
      return true;
    }
    !line.contains(&self.line_marker)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn monitor(disabled: bool) -> SelfMonitor {
    SelfMonitor::new(&SelfMonitorConfig {
      disabled,
      label: String::from("io.flotilla.self"),
      name_pattern: String::from("flotilla*"),
      line_marker: String::from("flotilla_core"),
    })
  }

  #[test]
  fn matches_by_label_or_name() {
    let monitor = monitor(false);
    let mut labels = HashMap::new();
    assert!(!monitor.is_self_container("web", &labels));
    assert!(monitor.is_self_container("flotilla-core-1", &labels));
    labels
      .insert(String::from("io.flotilla.self"), String::new());
    assert!(monitor.is_self_container("web", &labels));
  }

  #[test]
  fn filters_own_log_lines() {
    let monitor = monitor(false);
    assert!(monitor.keep_line("GET /healthz 200"));
    assert!(
      !monitor.keep_line("INFO flotilla_core::ws: stream attached")
    );
  }

  #[test]
  fn disabled_keeps_everything() {
    let monitor = monitor(true);
    assert!(!monitor.is_self_container("flotilla-core-1", &HashMap::new()));
    assert!(monitor.keep_line("INFO flotilla_core: x"));
  }
}
