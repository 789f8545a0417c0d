//! Standard MIDI File writer - assembles an event stream into a format 1 file.
//!
//! Track chunk 0 carries the song name, tempo and time signature; every
//! expanded track gets its own chunk with its name, program, mixer
//! controllers and notes.

use std::io::{self, Write};

use crate::error::{MusicError, MusicResult};
use crate::expand::{EventStream, TrackEvents};

const CC_VOLUME: u8 = 7;
const CC_PAN: u8 = 10;
const CC_REVERB: u8 = 91;
const CC_CHORUS: u8 = 93;

/// Writes `value` as a MIDI variable-length quantity.
pub fn write_vlq<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    let mut buffer = [0u8; 5];
    let mut len = 0;
    let mut v = value;
    loop {
        buffer[len] = (v & 0x7F) as u8;
        len += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        writer.write_all(&[buffer[i] | continuation])?;
    }
    Ok(())
}

/// A timed message before delta encoding. `order` breaks ties at equal
/// ticks: note-offs sort before note-ons so a repeated pitch retriggers.
struct Message {
    tick: u32,
    order: u8,
    bytes: Vec<u8>,
}

fn meta(kind: u8, data: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, kind];
    // Meta payloads here are short; lengths stay single-byte VLQs.
    bytes.push(data.len().min(0x7F) as u8);
    bytes.extend_from_slice(&data[..data.len().min(0x7F)]);
    bytes
}

fn tick(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

fn write_chunk<W: Write>(writer: &mut W, messages: &mut [Message]) -> io::Result<()> {
    messages.sort_by_key(|m| (m.tick, m.order));
    let mut body = Vec::new();
    let mut last = 0u32;
    for message in messages.iter() {
        write_vlq(&mut body, message.tick - last)?;
        body.extend_from_slice(&message.bytes);
        last = message.tick;
    }
    write_vlq(&mut body, 0)?;
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    writer.write_all(b"MTrk")?;
    writer.write_all(&(body.len() as u32).to_be_bytes())?;
    writer.write_all(&body)
}

fn conductor(stream: &EventStream) -> MusicResult<Vec<Message>> {
    if !(stream.bpm.is_finite() && stream.bpm > 0.0) {
        return Err(MusicError::Tempo { bpm: stream.bpm });
    }
    let micros = (60_000_000.0 / stream.bpm).round();
    if micros > f64::from(0x00FF_FFFF) || micros < 1.0 {
        return Err(MusicError::Tempo { bpm: stream.bpm });
    }
    let micros = micros as u32;
    let numerator = stream.beats_per_bar.clamp(1, 255) as u8;

    Ok(vec![
        Message {
            tick: 0,
            order: 0,
            bytes: meta(0x03, stream.name.as_bytes()),
        },
        Message {
            tick: 0,
            order: 1,
            bytes: meta(0x51, &micros.to_be_bytes()[1..]),
        },
        Message {
            tick: 0,
            order: 2,
            bytes: meta(0x58, &[numerator, 2, 24, 8]),
        },
    ])
}

fn track_messages(track: &TrackEvents) -> Vec<Message> {
    let ch = track.channel & 0x0F;
    let mut messages = vec![Message {
        tick: 0,
        order: 0,
        bytes: meta(0x03, track.name.as_bytes()),
    }];
    if let Some(program) = track.program() {
        messages.push(Message {
            tick: 0,
            order: 1,
            bytes: vec![0xC0 | ch, program & 0x7F],
        });
    }
    for (cc, value) in [
        (CC_VOLUME, track.mixer.volume),
        (CC_PAN, track.mixer.pan),
        (CC_REVERB, track.mixer.reverb),
        (CC_CHORUS, track.mixer.chorus),
    ] {
        messages.push(Message {
            tick: 0,
            order: 2,
            bytes: vec![0xB0 | ch, cc, value & 0x7F],
        });
    }
    for event in &track.events {
        let pitch = event.pitch & 0x7F;
        messages.push(Message {
            tick: tick(event.end_tick),
            order: 3,
            bytes: vec![0x80 | ch, pitch, 0],
        });
        messages.push(Message {
            tick: tick(event.start_tick),
            order: 4,
            bytes: vec![0x90 | ch, pitch, event.velocity.clamp(1, 127)],
        });
    }
    messages
}

/// Writes the stream as a format 1 Standard MIDI File.
pub fn write_smf<W: Write>(stream: &EventStream, writer: &mut W) -> MusicResult<()> {
    let division = u16::try_from(stream.ppq)
        .ok()
        .filter(|d| *d > 0 && *d <= 0x7FFF)
        .ok_or(MusicError::Division { ppq: stream.ppq })?;
    let chunks = u16::try_from(stream.tracks.len() + 1).unwrap_or(u16::MAX);

    writer.write_all(b"MThd")?;
    writer.write_all(&6u32.to_be_bytes())?;
    writer.write_all(&1u16.to_be_bytes())?;
    writer.write_all(&chunks.to_be_bytes())?;
    writer.write_all(&division.to_be_bytes())?;

    write_chunk(writer, &mut conductor(stream)?)?;
    for track in &stream.tracks {
        write_chunk(writer, &mut track_messages(track))?;
    }
    Ok(())
}

/// Writes the stream to a byte vector.
pub fn to_smf_bytes(stream: &EventStream) -> MusicResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_smf(stream, &mut buffer)?;
    Ok(buffer)
}

/// BLAKE3 hash of the MIDI bytes.
pub fn compute_hash(stream: &EventStream) -> MusicResult<String> {
    let bytes = to_smf_bytes(stream)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::{expand_project, ExpandOptions};
    use clawdaw_spec::{Note, NoteKey, Project, TrackMode};
    use pretty_assertions::assert_eq;

    fn vlq(value: u32) -> Vec<u8> {
        let mut out = Vec::new();
        write_vlq(&mut out, value).unwrap();
        out
    }

    #[test]
    fn vlq_encoding() {
        assert_eq!(vlq(0), vec![0x00]);
        assert_eq!(vlq(0x40), vec![0x40]);
        assert_eq!(vlq(0x7F), vec![0x7F]);
        assert_eq!(vlq(0x80), vec![0x81, 0x00]);
        assert_eq!(vlq(0x2000), vec![0xC0, 0x00]);
        assert_eq!(vlq(0x3FFF), vec![0xFF, 0x7F]);
        assert_eq!(vlq(0x0FFF_FFFF), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    fn stream() -> EventStream {
        let mut p = Project::new("song", 120.0);
        let t = p.add_track("bass", TrackMode::GmInstrument { program: 33 }).unwrap();
        p.new_pattern(t, "main", 480).unwrap();
        p.add_note_to_pattern(t, "main", Note::new(NoteKey::Pitch(40), 0, 240, 100))
            .unwrap();
        p.place_clip(t, "main", 0, 2).unwrap();
        expand_project(&p, &ExpandOptions::default()).unwrap()
    }

    #[test]
    fn header_and_chunks() {
        let bytes = to_smf_bytes(&stream()).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[4..8], &[0, 0, 0, 6]);
        assert_eq!(&bytes[8..10], &[0, 1]);
        assert_eq!(&bytes[10..12], &[0, 2]);
        assert_eq!(&bytes[12..14], &480u16.to_be_bytes());
        assert_eq!(bytes.windows(4).filter(|w| w == b"MTrk").count(), 2);
        assert!(bytes.ends_with(&[0x00, 0xFF, 0x2F, 0x00]));
    }

    #[test]
    fn tempo_and_notes_are_encoded() {
        let bytes = to_smf_bytes(&stream()).unwrap();
        // 120 BPM is 500000 microseconds per beat.
        assert!(bytes.windows(6).any(|w| w == [0xFFu8, 0x51, 0x03, 0x07, 0xA1, 0x20]));
        assert!(bytes.windows(2).any(|w| w == [0xC0u8, 33]));
        // Second note-on is 240 ticks after the first note-off.
        assert!(bytes.windows(5).any(|w| w == [0x81u8, 0x70, 0x90, 40, 100]));
    }

    #[test]
    fn note_off_precedes_note_on_at_the_same_tick() {
        let mut p = Project::new("song", 120.0);
        let t = p.add_track("keys", TrackMode::default()).unwrap();
        p.new_pattern(t, "main", 480).unwrap();
        p.add_note_to_pattern(t, "main", Note::new(NoteKey::Pitch(60), 0, 480, 90))
            .unwrap();
        p.place_clip(t, "main", 0, 2).unwrap();
        let bytes = to_smf_bytes(&expand_project(&p, &ExpandOptions::default()).unwrap()).unwrap();
        // At tick 480: off (delta 480) then on (delta 0).
        assert!(bytes
            .windows(7)
            .any(|w| w == [0x83u8, 0x60, 0x80, 60, 0, 0x00, 0x90]));
    }

    #[test]
    fn output_is_deterministic() {
        assert_eq!(compute_hash(&stream()).unwrap(), compute_hash(&stream()).unwrap());
    }

    #[test]
    fn rejects_unencodable_division() {
        let mut s = stream();
        s.ppq = 40_000;
        assert!(matches!(write_smf(&s, &mut Vec::new()), Err(MusicError::Division { .. })));
    }
}
