// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, NaiveDate, Utc};

/// Counts operations submitted during the current UTC calendar day.
///
/// The count resets the first time it is touched after 00:00 UTC. Submissions
/// are counted whatever their admission outcome.
#[derive(Debug, Clone, Default)]
pub struct DailyOperationCounter {
    day: Option<NaiveDate>,
    count: usize,
}

impl DailyOperationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        let day = at.date_naive();
        if self.day != Some(day) {
            self.day = Some(day);
            self.count = 0;
        }
        self.count += 1;
    }

    pub fn count_on(&self, now: DateTime<Utc>) -> usize {
        if self.day == Some(now.date_naive()) {
            self.count
        } else {
            0
        }
    }
}
