//! Tick time base and `bar:beat:tick` conversion.
//!
//! All time arithmetic is integer-only. Bars and beats are 0-indexed in the
//! display syntax, so `1:0` is the first beat of the second bar.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest time unit. One quarter note is [`PPQ`] ticks.
pub type Tick = i64;

/// Pulses per quarter note, fixed for the lifetime of a project.
pub const PPQ: u32 = 480;

/// Errors raised while parsing time text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSyntaxError {
    #[error("empty time value")]
    Empty,
    #[error("invalid time '{text}': component '{component}' is not a non-negative integer")]
    NotNumeric { text: String, component: String },
    #[error("invalid time '{text}': expected ticks, bar:beat or bar:beat:tick")]
    TooManyComponents { text: String },
    #[error("invalid time '{text}': beat {beat} must be < {beats_per_bar}")]
    BeatOutOfRange {
        text: String,
        beat: i64,
        beats_per_bar: u32,
    },
    #[error("invalid time '{text}': tick {tick} must be < {ppq}")]
    TickOutOfRange { text: String, tick: i64, ppq: u32 },
    #[error("invalid time '{text}': negative time")]
    Negative { text: String },
    #[error("invalid time '{text}': value overflows the tick range")]
    Overflow { text: String },
}

/// Time signature. Only the numerator matters for bar arithmetic; the
/// beat unit is always a quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats_per_bar: 4 }
    }
}

/// PPQ plus time signature: everything needed to convert musical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub ppq: u32,
    pub ts: TimeSignature,
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(PPQ, TimeSignature::default())
    }
}

impl TimeBase {
    pub fn new(ppq: u32, ts: TimeSignature) -> Self {
        Self { ppq, ts }
    }

    pub fn ticks_per_beat(&self) -> Tick {
        Tick::from(self.ppq)
    }

    pub fn ticks_per_bar(&self) -> Tick {
        Tick::from(self.ppq) * Tick::from(self.ts.beats_per_bar)
    }

    /// Length of one sixteenth-note step.
    pub fn ticks_per_step(&self) -> Tick {
        Tick::from(self.ppq / 4)
    }

    /// Tick position of the start of `bar`.
    pub fn bars(&self, bar: i64) -> Tick {
        bar.saturating_mul(self.ticks_per_bar())
    }

    /// Parses an absolute time. See [`parse_time`].
    pub fn parse(&self, text: &str) -> Result<Tick, TimeSyntaxError> {
        parse_time(text, self.ppq, self.ts)
    }

    /// Parses a relative offset, which may be negative (`-120`, `-0:1`).
    pub fn parse_delta(&self, text: &str) -> Result<Tick, TimeSyntaxError> {
        let s = text.trim();
        match s.strip_prefix('-') {
            Some(rest) => Ok(-parse_time(rest, self.ppq, self.ts)?),
            None => parse_time(s, self.ppq, self.ts),
        }
    }

    /// Formats a tick as `bar:beat:tick`. See [`format_time`].
    pub fn format(&self, tick: Tick) -> String {
        format_time(tick, self.ppq, self.ts)
    }
}

fn parse_component(text: &str, component: &str) -> Result<i64, TimeSyntaxError> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        if component.starts_with('-') && component[1..].bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimeSyntaxError::Negative {
                text: text.to_string(),
            });
        }
        return Err(TimeSyntaxError::NotNumeric {
            text: text.to_string(),
            component: component.to_string(),
        });
    }
    component.parse::<i64>().map_err(|_| TimeSyntaxError::Overflow {
        text: text.to_string(),
    })
}

/// Parses a raw tick count (`"960"`) or `bar:beat[:tick]` (`"2:1:120"`).
///
/// Beats must be below the bar's beat count and ticks below `ppq`; nothing
/// wraps into the next unit.
pub fn parse_time(text: &str, ppq: u32, ts: TimeSignature) -> Result<Tick, TimeSyntaxError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(TimeSyntaxError::Empty);
    }

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() == 1 {
        return parse_component(s, s);
    }
    if parts.len() > 3 {
        return Err(TimeSyntaxError::TooManyComponents {
            text: s.to_string(),
        });
    }

    let bar = parse_component(s, parts[0])?;
    let beat = parse_component(s, parts[1])?;
    let tick = match parts.get(2) {
        Some(p) => parse_component(s, p)?,
        None => 0,
    };

    if beat >= i64::from(ts.beats_per_bar) {
        return Err(TimeSyntaxError::BeatOutOfRange {
            text: s.to_string(),
            beat,
            beats_per_bar: ts.beats_per_bar,
        });
    }
    if tick >= i64::from(ppq) {
        return Err(TimeSyntaxError::TickOutOfRange {
            text: s.to_string(),
            tick,
            ppq,
        });
    }

    let base = TimeBase::new(ppq, ts);
    bar.checked_mul(base.ticks_per_bar())
        .and_then(|t| t.checked_add(beat * base.ticks_per_beat()))
        .and_then(|t| t.checked_add(tick))
        .ok_or_else(|| TimeSyntaxError::Overflow {
            text: s.to_string(),
        })
}

/// Formats a tick as `bar:beat:tick`.
///
/// Negative ticks have no musical position and are printed as raw integers.
pub fn format_time(tick: Tick, ppq: u32, ts: TimeSignature) -> String {
    if tick < 0 || ppq == 0 || ts.beats_per_bar == 0 {
        return tick.to_string();
    }
    let base = TimeBase::new(ppq, ts);
    let bar = tick / base.ticks_per_bar();
    let rem = tick % base.ticks_per_bar();
    let beat = rem / base.ticks_per_beat();
    let sub = rem % base.ticks_per_beat();
    format!("{}:{}:{}", bar, beat, sub)
}

/// Delays odd sixteenth steps by `swing` percent of a step.
///
/// Swing is a render-time effect; note data is never rewritten with it.
pub fn apply_swing(tick: Tick, ppq: u32, swing: u8) -> Tick {
    if swing == 0 || tick < 0 {
        return tick;
    }
    let step = Tick::from(ppq / 4);
    if step <= 0 {
        return tick;
    }
    if (tick / step) % 2 == 1 {
        tick + step * Tick::from(swing) / 100
    } else {
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tb() -> TimeBase {
        TimeBase::default()
    }

    #[test]
    fn parses_raw_ticks_and_bar_beat_forms() {
        assert_eq!(tb().parse("960").unwrap(), 960);
        assert_eq!(tb().parse("0:0").unwrap(), 0);
        assert_eq!(tb().parse("1:0").unwrap(), 1920);
        assert_eq!(tb().parse("2:1:120").unwrap(), 2 * 1920 + 480 + 120);
        assert_eq!(tb().parse(" 0:3:479 ").unwrap(), 3 * 480 + 479);
    }

    #[test]
    fn rejects_malformed_time() {
        assert_eq!(tb().parse(""), Err(TimeSyntaxError::Empty));
        assert!(matches!(
            tb().parse("1:x"),
            Err(TimeSyntaxError::NotNumeric { .. })
        ));
        assert!(matches!(
            tb().parse("1:4"),
            Err(TimeSyntaxError::BeatOutOfRange { beat: 4, .. })
        ));
        assert!(matches!(
            tb().parse("1:0:480"),
            Err(TimeSyntaxError::TickOutOfRange { tick: 480, .. })
        ));
        assert!(matches!(
            tb().parse("-5"),
            Err(TimeSyntaxError::Negative { .. })
        ));
        assert!(matches!(
            tb().parse("1:2:3:4"),
            Err(TimeSyntaxError::TooManyComponents { .. })
        ));
        assert!(matches!(
            tb().parse("+5"),
            Err(TimeSyntaxError::NotNumeric { .. })
        ));
        assert!(matches!(
            tb().parse("99999999999999999999"),
            Err(TimeSyntaxError::Overflow { .. })
        ));
    }

    #[test]
    fn three_four_time_uses_three_beats() {
        let waltz = TimeBase::new(PPQ, TimeSignature { beats_per_bar: 3 });
        assert_eq!(waltz.parse("1:0").unwrap(), 1440);
        assert!(waltz.parse("0:3").is_err());
        assert_eq!(waltz.format(1440 + 480), "1:1:0");
    }

    #[test]
    fn delta_accepts_negative_offsets() {
        assert_eq!(tb().parse_delta("-120").unwrap(), -120);
        assert_eq!(tb().parse_delta("-0:1").unwrap(), -480);
        assert_eq!(tb().parse_delta("0:2").unwrap(), 960);
    }

    #[test]
    fn formats_bar_beat_tick() {
        assert_eq!(tb().format(0), "0:0:0");
        assert_eq!(tb().format(1920 + 960 + 7), "1:2:7");
        assert_eq!(tb().format(-3), "-3");
    }

    #[test]
    fn swing_delays_odd_sixteenths_only() {
        assert_eq!(apply_swing(0, PPQ, 50), 0);
        assert_eq!(apply_swing(120, PPQ, 50), 180);
        assert_eq!(apply_swing(240, PPQ, 50), 240);
        assert_eq!(apply_swing(120, PPQ, 0), 120);
        assert_eq!(apply_swing(360, PPQ, 75), 450);
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(bar in 0i64..10_000, beat in 0i64..4, tick in 0i64..480) {
            let t = bar * 1920 + beat * 480 + tick;
            prop_assert_eq!(tb().parse(&tb().format(t)).unwrap(), t);
        }
    }
}
