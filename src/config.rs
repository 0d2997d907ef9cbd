//! [`FsConfig`], the filesystem's construction-time tunables (§10.3).

/// Construction-time configuration for a [`Filesystem`](crate::Filesystem).
///
/// There is no ambient global configuration (no environment variables, no
/// config file) — every knob is passed explicitly, consistent with this
/// crate shipping no CLI or packaging surface.
#[derive(Clone, Debug)]
pub struct FsConfig {
    pub(crate) conflict_markers: [String; 3],
    pub(crate) initial_state: crate::state::FsState,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            conflict_markers: [
                "BASE".to_owned(),
                "OURS".to_owned(),
                "THEIRS".to_owned(),
            ],
            initial_state: crate::state::FsState::Normal,
        }
    }
}

impl FsConfig {
    /// Start building a config from defaults (markers `BASE`/`OURS`/`THEIRS`,
    /// initial state `Normal`).
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Override the three-way conflict marker labels (`[base, ours, theirs]`).
    #[must_use]
    pub fn with_conflict_markers(mut self, base: &str, ours: &str, theirs: &str) -> Self {
        self.conflict_markers = [base.to_owned(), ours.to_owned(), theirs.to_owned()];
        self
    }

    /// Override the initial [`FsState`](crate::state::FsState) tag.
    #[must_use]
    pub fn with_initial_state(mut self, state: crate::state::FsState) -> Self {
        self.initial_state = state;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers() {
        let cfg = FsConfig::builder();
        assert_eq!(cfg.conflict_markers, ["BASE", "OURS", "THEIRS"]);
    }

    #[test]
    fn overridden_markers() {
        let cfg = FsConfig::builder().with_conflict_markers("B", "O", "T");
        assert_eq!(cfg.conflict_markers, ["B", "O", "T"]);
    }
}
