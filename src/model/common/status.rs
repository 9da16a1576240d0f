use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the election lifecycle.
///
/// The transition is one-way: an election opens on creation and can only move
/// to `Closed`, either explicitly or when its deadline passes. Whether the
/// results are published is an orthogonal flag on the election, not a state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Accepting ballots.
    Open,
    /// No longer accepting ballots.
    Closed,
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_as_lowercase_string() {
        assert_eq!(Bson::from(ElectionStatus::Open), Bson::String("open".into()));
        assert_eq!(
            Bson::from(ElectionStatus::Closed),
            Bson::String("closed".into())
        );
    }
}
