use std::fmt;

/// Lifecycle of one cache generation's worker.
///
/// `Registered → Installing → Waiting → Activating → Active`. A worker only
/// intercepts requests once it is `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Created, not installed yet
  Registered,
  Installing,
  /// Installed; a previous generation may still be in control
  Waiting,
  Activating,
  Active,
}

impl LifecycleState {
  pub fn is_active(&self) -> bool {
    matches!(self, LifecycleState::Active)
  }
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      LifecycleState::Registered => "registered",
      LifecycleState::Installing => "installing",
      LifecycleState::Waiting => "waiting",
      LifecycleState::Activating => "activating",
      LifecycleState::Active => "active",
    };
    f.write_str(name)
  }
}
