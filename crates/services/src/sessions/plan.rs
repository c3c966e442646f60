use chrono::{DateTime, Utc};
use rand::rng;
use rand::seq::SliceRandom;

use practice_core::assembly::{AssembledSession, AssemblyRequest};
use practice_core::model::Problem;

/// Builds a session plan from storage-provided candidate lists.
pub struct SessionBuilder<'a> {
    request: &'a AssemblyRequest,
    shuffle_new: bool,
}

impl<'a> SessionBuilder<'a> {
    #[must_use]
    pub fn new(request: &'a AssemblyRequest) -> Self {
        Self {
            request,
            shuffle_new: false,
        }
    }

    /// Shuffle new problems that tie on focus and difficulty instead of taking them by id.
    #[must_use]
    pub fn with_shuffle_new(mut self, shuffle: bool) -> Self {
        self.shuffle_new = shuffle;
        self
    }

    /// - `due` problems are filtered to those due at `now` and ordered most overdue first.
    /// - `new` problems are ordered by id, or shuffled, before focus and difficulty ordering.
    /// - Selection never exceeds the request's length or difficulty cap.
    pub fn build(
        self,
        now: DateTime<Utc>,
        due: impl IntoIterator<Item = Problem>,
        new: impl IntoIterator<Item = Problem>,
    ) -> AssembledSession {
        let mut new: Vec<Problem> = new.into_iter().collect();
        if self.shuffle_new {
            let mut rng = rng();
            new.as_mut_slice().shuffle(&mut rng);
        } else {
            new.sort_by_key(|p| p.id);
        }
        self.request.assemble(now, due, new)
    }
}
