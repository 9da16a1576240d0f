mod base;
mod closer;

pub use base::{Candidate, Election, ElectionCore, NewElection};
pub use closer::{ElectionCloserFairing, ElectionClosers};
