//! Stage vocabulary translation
//!
//! Each provider supplies a lookup table from internal pipeline stages to its
//! own stage values plus a default. Unknown stages translate to the default.

/// Internal stage that starts the hire handoff.
pub const HIRED_STAGE: &str = "hired";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMapping {
    table: &'static [(&'static str, &'static str)],
    default: &'static str,
}

impl StageMapping {
    pub const fn new(table: &'static [(&'static str, &'static str)], default: &'static str) -> Self {
        Self { table, default }
    }

    /// Provider stage for `internal`, matched case-insensitively.
    pub fn translate(&self, internal: &str) -> &'static str {
        let wanted = normalize(internal);
        self.table
            .iter()
            .find(|(from, _)| normalize(from) == wanted)
            .map(|(_, to)| *to)
            .unwrap_or(self.default)
    }

    pub fn default_stage(&self) -> &'static str {
        self.default
    }

    #[cfg(test)]
    fn contains(&self, internal: &str) -> bool {
        let wanted = normalize(internal);
        self.table.iter().any(|(from, _)| normalize(from) == wanted)
    }
}

pub fn is_hired(stage: &str) -> bool {
    normalize(stage) == HIRED_STAGE
}

fn normalize(stage: &str) -> String {
    stage.trim().to_lowercase().replace([' ', '-'], "_")
}
