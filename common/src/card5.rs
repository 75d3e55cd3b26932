//! Decoder for the single 128-byte memory block of a SiCard 5.
//!
//! The card stores seconds-only times modulo twelve hours; the decoder keeps
//! a running reference to recover the AM/PM half of each one. The first 30
//! punches are timed, any further punches record the control code only.

use crate::error::Error;
use crate::punch::{CardRecord, CardSeries, Punch};
use crate::time::{NO_TIME, TWELVE_HOURS, advance_time_past};

pub const BLOCK_LEN: usize = 128;

const CARD_NUMBER: usize = 0x04;
const CARD_SERIES: usize = 0x06;
const START: usize = 0x13;
const FINISH: usize = 0x15;
const PUNCH_COUNT: usize = 0x17;
const CHECK: usize = 0x19;
/// Punches live in 16-byte pages of five three-byte slots each; the first
/// byte of every page holds the code of a punch past the timed ones.
const PUNCH_PAGES: usize = 0x20;
const FIRST_SLOT: usize = 0x21;
const PAGE_SIZE: usize = 0x10;
const TIMED_PUNCHES: usize = 30;
const MAX_PUNCHES: usize = 36;

/// A view over the raw SiCard 5 block.
#[derive(Debug)]
pub struct Card5View<'a> {
    data: &'a [u8],
}

impl<'a> Card5View<'a> {
    pub fn new(data: &'a [u8]) -> crate::Result<Self> {
        if data.len() < BLOCK_LEN {
            return Err(Error::TruncatedData);
        }
        Ok(Self { data })
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Raw time words count seconds; 0xEEEE marks a missing time.
    fn time_at(&self, offset: usize) -> i64 {
        i64::from(self.word(offset)) * 1000
    }

    pub fn card_number(&self) -> String {
        let number = u32::from(self.word(CARD_NUMBER));
        let series = u32::from(self.data[CARD_SERIES]);
        if series > 1 {
            (number + series * 100_000).to_string()
        } else {
            number.to_string()
        }
    }

    pub fn punch_count(&self) -> usize {
        usize::from(self.data[PUNCH_COUNT]).saturating_sub(1).min(MAX_PUNCHES)
    }

    pub fn decode(&self, zero_hour: i64) -> CardRecord {
        let start = advance_time_past(self.time_at(START), zero_hour, TWELVE_HOURS);
        let check = advance_time_past(self.time_at(CHECK), zero_hour, TWELVE_HOURS);
        let count = self.punch_count();
        let mut punches = Vec::with_capacity(count);
        let mut reference = start.max(zero_hour);
        for i in 0..count.min(TIMED_PUNCHES) {
            let slot = FIRST_SLOT + i / 5 * PAGE_SIZE + i % 5 * 3;
            let code = u16::from(self.data[slot]);
            let raw = i64::from(u16::from_be_bytes([self.data[slot + 1], self.data[slot + 2]])) * 1000;
            let time = advance_time_past(raw, reference, TWELVE_HOURS);
            if time != NO_TIME {
                reference = time;
            }
            punches.push(Punch::new(code, time));
        }
        for i in TIMED_PUNCHES..count {
            let page = PUNCH_PAGES + (i - TIMED_PUNCHES) * PAGE_SIZE;
            punches.push(Punch::new(u16::from(self.data[page]), NO_TIME));
        }
        let finish = advance_time_past(self.time_at(FINISH), reference, TWELVE_HOURS);
        CardRecord {
            card_number: self.card_number(),
            series: CardSeries::Card5,
            start,
            finish,
            check,
            punches,
        }
    }
}

#[cfg(test)]
mod test_card5 {
    use super::*;
    use crate::time::NO_SI_TIME;

    fn empty_block() -> [u8; BLOCK_LEN] {
        let mut data = [0; BLOCK_LEN];
        for offset in [START, FINISH, CHECK] {
            data[offset..offset + 2].copy_from_slice(&0xEEEEu16.to_be_bytes());
        }
        data[PUNCH_COUNT] = 1;
        data
    }

    fn set_word(data: &mut [u8], offset: usize, secs: u16) {
        data[offset..offset + 2].copy_from_slice(&secs.to_be_bytes());
    }

    fn set_punch(data: &mut [u8], index: usize, code: u8, secs: u16) {
        let slot = FIRST_SLOT + index / 5 * PAGE_SIZE + index % 5 * 3;
        data[slot] = code;
        data[slot + 1..slot + 3].copy_from_slice(&secs.to_be_bytes());
    }

    #[test]
    fn test_card_number() {
        let mut data = empty_block();
        set_word(&mut data, CARD_NUMBER, 12345);
        data[CARD_SERIES] = 1;
        assert_eq!(Card5View::new(&data).unwrap().card_number(), "12345");
        data[CARD_SERIES] = 4;
        assert_eq!(Card5View::new(&data).unwrap().card_number(), "412345");
    }

    #[test]
    fn test_decode_morning_run() {
        let mut data = empty_block();
        set_word(&mut data, CARD_NUMBER, 1234);
        set_word(&mut data, START, 9 * 3600);
        set_word(&mut data, CHECK, 9 * 3600 - 120);
        set_word(&mut data, FINISH, 9 * 3600 + 1500);
        data[PUNCH_COUNT] = 3;
        set_punch(&mut data, 0, 31, 9 * 3600 + 600);
        set_punch(&mut data, 1, 32, 9 * 3600 + 1200);

        let record = Card5View::new(&data).unwrap().decode(8 * 3600 * 1000);
        assert_eq!(record.card_number, "1234");
        assert_eq!(record.series, CardSeries::Card5);
        assert_eq!(record.start, 9 * 3600 * 1000);
        assert_eq!(record.check, (9 * 3600 - 120) * 1000);
        assert_eq!(record.finish, (9 * 3600 + 1500) * 1000);
        assert_eq!(record.punches.len(), record.punch_count());
        assert_eq!(record.punches[0], Punch::new(31, (9 * 3600 + 600) * 1000));
        assert_eq!(record.punches[1], Punch::new(32, (9 * 3600 + 1200) * 1000));
    }

    #[test]
    fn test_noon_wraparound() {
        // The run starts at 11:30 and crosses noon; raw times repeat from 0.
        let mut data = empty_block();
        set_word(&mut data, START, 11 * 3600 + 1800);
        set_word(&mut data, FINISH, 3600);
        data[PUNCH_COUNT] = 2;
        set_punch(&mut data, 0, 31, 600);

        let record = Card5View::new(&data).unwrap().decode(0);
        assert_eq!(record.start, (11 * 3600 + 1800) * 1000);
        assert_eq!(record.punches[0].time, (12 * 3600 + 600) * 1000);
        assert_eq!(record.finish, (13 * 3600) * 1000);
    }

    #[test]
    fn test_missing_times() {
        let mut data = empty_block();
        data[PUNCH_COUNT] = 2;
        set_punch(&mut data, 0, 31, 0xEEEE);

        let record = Card5View::new(&data).unwrap().decode(0);
        assert_eq!(record.start, NO_TIME);
        assert_eq!(record.finish, NO_TIME);
        assert_eq!(record.check, NO_TIME);
        assert_eq!(record.punches[0].time, NO_TIME);
        assert_ne!(record.punches[0].time, NO_SI_TIME);
    }

    #[test]
    fn test_punches_past_thirty_are_code_only() {
        let mut data = empty_block();
        data[PUNCH_COUNT] = 33;
        for i in 0..30 {
            set_punch(&mut data, i, 100 + i as u8, 3600 + 60 * i as u16);
        }
        data[PUNCH_PAGES] = 201;
        data[PUNCH_PAGES + PAGE_SIZE] = 202;

        let record = Card5View::new(&data).unwrap().decode(0);
        assert_eq!(record.punch_count(), 32);
        assert_eq!(record.punches[29], Punch::new(129, (3600 + 60 * 29) * 1000));
        assert_eq!(record.punches[30], Punch::new(201, NO_TIME));
        assert_eq!(record.punches[31], Punch::new(202, NO_TIME));
    }

    #[test]
    fn test_short_block_is_rejected() {
        assert_eq!(Card5View::new(&[0; 100]).unwrap_err(), Error::TruncatedData);
    }
}
