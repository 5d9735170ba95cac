/// Presence state of the crossing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DetectorState {
    /// A train is in the field of view.
    Entry,
    /// A train has left.
    Exit,
    /// Nothing of interest.
    #[default]
    Nothing,
}

impl DetectorState {
    /// Whether a transition from `self` to `next` is permitted.
    pub fn allows(self, next: DetectorState) -> bool {
        use DetectorState::*;
        match (self, next) {
            (Entry, Entry) | (Entry, Exit) => true,
            (Entry, Nothing) => false,
            (Exit, _) => true,
            (Nothing, Entry) | (Nothing, Nothing) => true,
            (Nothing, Exit) => false,
        }
    }

    /// State after requesting `next`: `next` if allowed, otherwise unchanged.
    pub fn transition(self, next: DetectorState) -> DetectorState {
        if self.allows(next) {
            next
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorState::Entry => "entry",
            DetectorState::Exit => "exit",
            DetectorState::Nothing => "nothing",
        }
    }
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
