use chrono::{DateTime, Days, Months, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::CoreError;

const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

/// Prefix table mapping unit words ("минут", "hours", ...) to a [`TimeUnit`].
#[derive(Debug, Clone, Default)]
pub struct UnitStems {
    entries: Vec<(String, TimeUnit)>,
}

impl UnitStems {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Russian stems as rendered by the comment widget, plus English ones.
    pub fn russian_and_english() -> Self {
        let table: [(TimeUnit, &[&str]); 6] = [
            (TimeUnit::Minutes, &["мин", "min"]),
            (TimeUnit::Hours, &["час", "hour", "hr"]),
            (TimeUnit::Days, &["дн", "ден", "day"]),
            (TimeUnit::Weeks, &["нед", "week"]),
            (TimeUnit::Months, &["мес", "month"]),
            (TimeUnit::Years, &["год", "лет", "year"]),
        ];
        let mut stems = Self::empty();
        for (unit, words) in table {
            for word in words {
                stems.entries.push((word.to_string(), unit));
            }
        }
        stems
    }

    pub fn with(mut self, unit: TimeUnit, stems: &[&str]) -> Result<Self, CoreError> {
        for stem in stems {
            let stem = stem.trim().to_lowercase();
            if stem.is_empty() || stem.chars().any(|ch| !ch.is_alphabetic()) {
                return Err(CoreError::InvalidUnitStem(stem));
            }
            self.entries.push((stem, unit));
        }
        Ok(self)
    }

    /// Longest matching stem wins, so "мес" and "мин" never shadow each other.
    pub fn lookup(&self, word: &str) -> Option<TimeUnit> {
        let word = word.to_lowercase();
        self.entries
            .iter()
            .filter(|(stem, _)| word.starts_with(stem.as_str()))
            .max_by_key(|(stem, _)| stem.chars().count())
            .map(|(_, unit)| *unit)
    }
}

/// Turns the free-form time labels of the comment widget into instants in
/// one reference zone.
#[derive(Debug, Clone)]
pub struct TimeNormalizer {
    zone: Tz,
    just_now: Vec<String>,
    units: UnitStems,
    epoch: Regex,
    absolute: Regex,
    relative: Regex,
}

impl TimeNormalizer {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            just_now: vec!["только что".to_string(), "just now".to_string()],
            units: UnitStems::russian_and_english(),
            epoch: Regex::new(r"^\d{10,16}$").expect("epoch regex"),
            absolute: Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{4})[,\s]+(\d{1,2}:\d{2})")
                .expect("absolute regex"),
            relative: Regex::new(r"^(\d+)\s*(\p{L}+)").expect("relative regex"),
        }
    }

    pub fn with_units(mut self, units: UnitStems) -> Self {
        self.units = units;
        self
    }

    pub fn with_just_now_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.just_now = markers
            .into_iter()
            .map(|marker| marker.as_ref().trim().to_lowercase())
            .filter(|marker| !marker.is_empty())
            .collect();
        self
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Returns `None` when the text matches none of the known shapes; callers
    /// skip such items.
    pub fn normalize(&self, text: &str, reference: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let reference = reference.with_timezone(&self.zone);
        let lowered = text.to_lowercase();
        if self
            .just_now
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
        {
            return Some(reference);
        }
        if self.epoch.is_match(text) {
            return self.from_epoch(text);
        }
        if let Some(caps) = self.absolute.captures(text) {
            return self.from_wall_clock(&caps[1], &caps[2]);
        }
        if let Some(caps) = self.relative.captures(&lowered) {
            let amount = caps[1].parse::<u32>().ok()?;
            let unit = self.units.lookup(&caps[2])?;
            return subtract(reference, amount, unit);
        }
        None
    }

    fn from_epoch(&self, digits: &str) -> Option<DateTime<Tz>> {
        let raw = digits.parse::<i64>().ok()?;
        let utc = if raw > EPOCH_MILLIS_THRESHOLD {
            DateTime::<Utc>::from_timestamp_millis(raw)?
        } else {
            DateTime::<Utc>::from_timestamp(raw, 0)?
        };
        Some(utc.with_timezone(&self.zone))
    }

    fn from_wall_clock(&self, date: &str, time: &str) -> Option<DateTime<Tz>> {
        let naive =
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%d.%m.%Y %H:%M").ok()?;
        self.zone.from_local_datetime(&naive).earliest()
    }
}

fn subtract(reference: DateTime<Tz>, amount: u32, unit: TimeUnit) -> Option<DateTime<Tz>> {
    match unit {
        TimeUnit::Minutes => {
            reference.checked_sub_signed(TimeDelta::try_minutes(i64::from(amount))?)
        }
        TimeUnit::Hours => reference.checked_sub_signed(TimeDelta::try_hours(i64::from(amount))?),
        TimeUnit::Days => reference.checked_sub_days(Days::new(u64::from(amount))),
        TimeUnit::Weeks => reference.checked_sub_days(Days::new(u64::from(amount) * 7)),
        TimeUnit::Months => reference.checked_sub_months(Months::new(amount)),
        TimeUnit::Years => reference.checked_sub_months(Months::new(amount.checked_mul(12)?)),
    }
}
