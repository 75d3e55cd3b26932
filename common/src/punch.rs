//! The decoded card data model.

use core::fmt;

use crate::time::format_time_of_day;

/// A single control record read from a card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Punch {
    /// The control code of the station that wrote the record.
    pub code: u16,
    /// Milliseconds since the zero hour, [`crate::time::NO_TIME`] when the
    /// control wrote no time.
    pub time: i64,
}

impl Punch {
    pub fn new(code: u16, time: i64) -> Self {
        Self { code, time }
    }
}

impl fmt::Display for Punch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.code, format_time_of_day(self.time))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CardSeries {
    Card5,
    Card6,
    Card8,
    Card9,
    PCard,
    Card10,
}

impl fmt::Display for CardSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardSeries::Card5 => "SiCard 5",
            CardSeries::Card6 => "SiCard 6",
            CardSeries::Card8 => "SiCard 8",
            CardSeries::Card9 => "SiCard 9",
            CardSeries::PCard => "pCard",
            CardSeries::Card10 => "SiCard 10/11/SIAC",
        };
        write!(f, "{name}")
    }
}

/// One full card readout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CardRecord {
    pub card_number: String,
    pub series: CardSeries,
    pub start: i64,
    pub finish: i64,
    pub check: i64,
    /// Punches in the order they were made.
    pub punches: Vec<Punch>,
}

impl CardRecord {
    pub fn punch_count(&self) -> usize {
        self.punches.len()
    }
}

impl fmt::Display for CardRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} punches, start {}, finish {}",
            self.series,
            self.card_number,
            self.punch_count(),
            format_time_of_day(self.start),
            format_time_of_day(self.finish),
        )
    }
}

#[cfg(test)]
mod test_punch {
    use super::*;
    use crate::time::NO_TIME;

    #[test]
    fn test_display() {
        let record = CardRecord {
            card_number: "1715004".to_string(),
            series: CardSeries::Card9,
            start: 36_000_000,
            finish: 38_100_000,
            check: NO_TIME,
            punches: vec![Punch::new(47, 36_900_000)],
        };
        assert_eq!(
            record.to_string(),
            "SiCard 9 1715004: 1 punches, start 10:00:00, finish 10:35:00"
        );
        assert_eq!(record.punches[0].to_string(), "47 at 10:15:00");
    }
}
