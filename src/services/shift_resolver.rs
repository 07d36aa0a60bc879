//! Resolución del turno de trabajo
//!
//! Los turnos se configuran como ventanas de hora local de la estación, por
//! ejemplo `S1=06:00-14:00,S2=14:00-22:00,S3=22:00-06:00`. Una ventana cuyo
//! fin es anterior a su inicio cruza la medianoche.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};

/// Decide a qué turno pertenece un instante
pub trait ShiftResolver: Send + Sync {
    fn resolve(&self, at: DateTime<Utc>) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShiftWindow {
    pub shift_id: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ShiftWindow {
    fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeOfDayShiftResolver {
    windows: Vec<ShiftWindow>,
    offset: FixedOffset,
}

impl TimeOfDayShiftResolver {
    pub fn new(windows: Vec<ShiftWindow>, utc_offset_minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("invalid UTC offset: {} minutes", utc_offset_minutes))?;
        Ok(Self { windows, offset })
    }

    /// Construir desde el formato `ID=HH:MM-HH:MM` separado por comas
    pub fn from_schedule(schedule: &str, utc_offset_minutes: i32) -> Result<Self> {
        let windows = parse_schedule(schedule)?;
        Self::new(windows, utc_offset_minutes)
    }

    pub fn windows(&self) -> &[ShiftWindow] {
        &self.windows
    }
}

impl ShiftResolver for TimeOfDayShiftResolver {
    fn resolve(&self, at: DateTime<Utc>) -> Option<String> {
        let local = at.with_timezone(&self.offset).time();
        self.windows
            .iter()
            .find(|window| window.contains(local))
            .map(|window| window.shift_id.clone())
    }
}

/// Sin turnos configurados: nunca asigna uno
#[derive(Debug, Clone, Default)]
pub struct NoShiftResolver;

impl ShiftResolver for NoShiftResolver {
    fn resolve(&self, _at: DateTime<Utc>) -> Option<String> {
        None
    }
}

pub fn parse_schedule(schedule: &str) -> Result<Vec<ShiftWindow>> {
    schedule
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (shift_id, range) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("shift entry '{}' must look like ID=HH:MM-HH:MM", entry))?;
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| anyhow!("shift range '{}' must look like HH:MM-HH:MM", range))?;

            Ok(ShiftWindow {
                shift_id: shift_id.trim().to_string(),
                start: parse_time(start)?,
                end: parse_time(end)?,
            })
        })
        .collect()
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("invalid shift time '{}'", value.trim()))
}
