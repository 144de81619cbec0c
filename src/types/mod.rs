// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod hash;
pub mod coordinate;
pub mod challenge;

pub use challenge::{ChallengeId, ChallengeView, LayerCursor, Role};
pub use coordinate::{Coordinate, FINAL_STEP};
pub use hash::Hash32;
