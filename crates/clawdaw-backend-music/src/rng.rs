//! Deterministic RNG using PCG32 with BLAKE3 seed derivation.
//!
//! All randomness in event expansion flows through this module. A track's
//! seed comes from its humanize seed and index; chance rolls get their own
//! seed per note occurrence so editing one note never changes whether
//! another one sounds.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use clawdaw_spec::hash::{derive_stream_seed, derive_track_seed};
use clawdaw_spec::{NoteKey, Tick};

/// Creates a PCG32 RNG from a 64-bit seed.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

/// Base seed for all random streams of one track.
pub fn track_seed(humanize_seed: u64, track_index: usize) -> u64 {
    derive_track_seed(humanize_seed, track_index as u32)
}

/// RNG for a named stream of a track (e.g. `"humanize"`).
pub fn stream_rng(track_seed: u64, stream: &str) -> Pcg32 {
    create_rng(derive_stream_seed(track_seed, stream))
}

/// Seed for a single note occurrence at absolute `tick`.
pub fn derive_note_seed(track_seed: u64, tick: Tick, key: &NoteKey) -> u64 {
    let mut input = Vec::with_capacity(32);
    input.extend_from_slice(&track_seed.to_le_bytes());
    input.extend_from_slice(&tick.to_le_bytes());
    match key {
        NoteKey::Pitch(p) => {
            input.push(0);
            input.push(*p);
        }
        NoteKey::Role(role) => {
            input.push(1);
            input.extend_from_slice(role.as_str().as_bytes());
        }
    }
    let hash = blake3::hash(&input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Rolls a note's `chance`; a chance of 1 or more always passes.
pub fn chance_passes(track_seed: u64, tick: Tick, key: &NoteKey, chance: f64) -> bool {
    if chance >= 1.0 {
        return true;
    }
    if chance <= 0.0 {
        return false;
    }
    let roll: f64 = create_rng(derive_note_seed(track_seed, tick, key)).gen();
    roll < chance
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdaw_spec::DrumRole;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = stream_rng(7, "humanize");
        let mut b = stream_rng(7, "humanize");
        for _ in 0..16 {
            assert_eq!(a.gen::<u32>(), b.gen::<u32>());
        }
    }

    #[test]
    fn note_seeds_separate_tick_and_key() {
        let base = track_seed(0, 0);
        let kick = NoteKey::Role(DrumRole::Kick);
        assert_ne!(
            derive_note_seed(base, 0, &kick),
            derive_note_seed(base, 1, &kick)
        );
        assert_ne!(
            derive_note_seed(base, 0, &kick),
            derive_note_seed(base, 0, &NoteKey::Pitch(36))
        );
        assert_ne!(track_seed(0, 0), track_seed(0, 1));
    }

    #[test]
    fn chance_bounds_are_exact() {
        let key = NoteKey::Pitch(60);
        assert!((0..100).all(|t| chance_passes(1, t, &key, 1.0)));
        assert!((0..100).all(|t| !chance_passes(1, t, &key, 0.0)));
    }

    #[test]
    fn half_chance_drops_some_and_keeps_some() {
        let key = NoteKey::Pitch(60);
        let kept = (0..1000).filter(|t| chance_passes(3, *t, &key, 0.5)).count();
        assert!(kept > 350 && kept < 650, "kept {}", kept);
    }
}
