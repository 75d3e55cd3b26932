//! Course validation.
//!
//! An inline course requires its controls in order: the punched codes are
//! aligned with the expected ones through a Levenshtein matrix whose trace
//! decides, control by control, between a match and a missing punch. A score
//! course only requires every control to be punched somewhere.

use crate::error::Error;
use crate::punch::{CardRecord, Punch};
use crate::time::NO_TIME;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Course {
    pub name: String,
    pub controls: Vec<u16>,
    /// Controls must be visited in the listed order.
    pub inline: bool,
    /// Take the start time from the card's start punch instead of
    /// `fixed_start`.
    pub use_box_start: bool,
    /// Mass-start time for courses without a start box.
    pub fixed_start: Option<i64>,
}

impl Course {
    pub fn inline(name: impl Into<String>, controls: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            controls,
            inline: true,
            use_box_start: true,
            fixed_start: None,
        }
    }

    pub fn score(name: impl Into<String>, controls: Vec<u16>) -> Self {
        Self {
            inline: false,
            ..Self::inline(name, controls)
        }
    }

    /// The start time a runner on this course is timed from.
    pub fn start_time(&self, record: &CardRecord) -> i64 {
        if self.use_box_start {
            record.start
        } else {
            self.fixed_start.unwrap_or(NO_TIME)
        }
    }

    pub fn validate<'a>(&'a self, punches: &[Punch]) -> ValidationResult<'a> {
        let control_statuses = if self.inline {
            self.trace_inline(punches)
        } else {
            self.match_score(punches)
        };
        let extra_controls = punches
            .iter()
            .map(|punch| punch.code)
            .filter(|code| !self.controls.contains(code))
            .collect();
        ValidationResult {
            course: self,
            control_statuses,
            extra_controls,
        }
    }

    /// Matches each expected control to the first unused punch of its code.
    fn match_score(&self, punches: &[Punch]) -> Vec<ControlStatus> {
        let mut used = vec![false; punches.len()];
        let mut statuses = Vec::with_capacity(self.controls.len());
        for &code in &self.controls {
            let hit = punches
                .iter()
                .enumerate()
                .find(|&(i, punch)| !used[i] && punch.code == code);
            statuses.push(match hit {
                Some((i, punch)) => {
                    used[i] = true;
                    ControlStatus::found(code, punch.time)
                }
                None => ControlStatus::missed(code),
            });
        }
        statuses
    }

    /// Aligns the punches with the expected controls.
    ///
    /// The trace walks the edit-distance matrix from the origin: a step along
    /// the diagonal at no cost is a match; otherwise the control is missed
    /// when its code cannot match any later punch, or when skipping the
    /// current punch would already cost more than the best alignment; any
    /// other punch is skipped as noise.
    fn trace_inline(&self, punches: &[Punch]) -> Vec<ControlStatus> {
        let filtered: Vec<&Punch> = punches
            .iter()
            .filter(|punch| self.controls.contains(&punch.code))
            .collect();
        let expected = &self.controls;
        let m = expected.len();
        let n = filtered.len();

        // Levenshtein matrix with free substitution on a code match.
        let mut d = vec![vec![0usize; n + 1]; m + 1];
        for (i, row) in d.iter_mut().enumerate() {
            row[0] = i;
        }
        for j in 0..=n {
            d[0][j] = j;
        }
        for i in 0..m {
            for j in 0..n {
                let substituted = d[i][j] + usize::from(expected[i] != filtered[j].code);
                d[i + 1][j + 1] = substituted.min(d[i][j + 1] + 1).min(d[i + 1][j] + 1);
            }
        }
        let total_cost = d[m][n];

        let mut statuses = Vec::with_capacity(m);
        let mut i = 0;
        let mut j = 0;
        while i < m && j < n {
            if d[i + 1][j + 1] == d[i][j] {
                statuses.push(ControlStatus::found(expected[i], filtered[j].time));
                i += 1;
                j += 1;
            } else if !filtered[j + 1..].iter().any(|punch| punch.code == expected[i]) {
                statuses.push(ControlStatus::missed(expected[i]));
                i += 1;
            } else if d[i][j + 1] > total_cost {
                statuses.push(ControlStatus::missed(expected[i]));
                i += 1;
            } else {
                j += 1;
            }
        }
        for &code in &expected[i..] {
            statuses.push(ControlStatus::missed(code));
        }
        statuses
    }
}

/// The outcome for one expected control.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControlStatus {
    pub code: u16,
    pub found: bool,
    pub time: i64,
}

impl ControlStatus {
    fn found(code: u16, time: i64) -> Self {
        Self { code, found: true, time }
    }

    fn missed(code: u16) -> Self {
        Self { code, found: false, time: NO_TIME }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidationResult<'a> {
    pub course: &'a Course,
    /// One entry per expected control, in course order.
    pub control_statuses: Vec<ControlStatus>,
    /// Codes punched but not part of the course, in punching order.
    pub extra_controls: Vec<u16>,
}

impl ValidationResult<'_> {
    pub fn missing_count(&self) -> usize {
        self.control_statuses.iter().filter(|status| !status.found).count()
    }

    pub fn all_correct(&self) -> bool {
        self.missing_count() == 0
    }
}

/// Validates against every course and picks the best fit: fewest missing
/// controls, a longer course winning ties since a short course is more
/// likely an accidental subset.
pub fn auto_detect<'a>(courses: &'a [Course], punches: &[Punch]) -> crate::Result<ValidationResult<'a>> {
    let mut best: Option<ValidationResult<'a>> = None;
    for course in courses {
        let result = course.validate(punches);
        let better = match &best {
            None => true,
            Some(leader) => {
                let (missing, leading) = (result.missing_count(), leader.missing_count());
                missing < leading
                    || (missing == leading && course.controls.len() > leader.course.controls.len())
            }
        };
        if better {
            best = Some(result);
        }
    }
    best.ok_or(Error::NoCourses)
}
