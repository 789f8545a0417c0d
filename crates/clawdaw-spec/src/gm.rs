//! General MIDI program names.

/// 0-based GM program numbers for common instrument names.
const GM_PROGRAMS: &[(&str, u8)] = &[
    ("piano", 0),
    ("acoustic_grand_piano", 0),
    ("bright_piano", 1),
    ("electric_piano", 4),
    ("electric_piano_1", 4),
    ("electric_piano_2", 5),
    ("harpsichord", 6),
    ("clav", 7),
    ("celesta", 8),
    ("glockenspiel", 9),
    ("music_box", 10),
    ("vibraphone", 11),
    ("marimba", 12),
    ("xylophone", 13),
    ("organ", 16),
    ("drawbar_organ", 16),
    ("church_organ", 19),
    ("accordion", 21),
    ("guitar", 24),
    ("acoustic_guitar", 24),
    ("electric_guitar", 27),
    ("bass", 32),
    ("acoustic_bass", 32),
    ("electric_bass", 33),
    ("fingered_bass", 33),
    ("picked_bass", 34),
    ("fretless_bass", 35),
    ("slap_bass_1", 36),
    ("slap_bass_2", 37),
    ("synth_bass_1", 38),
    ("synth_bass_2", 39),
    ("violin", 40),
    ("strings", 48),
    ("string_ensemble", 48),
    ("string_ensemble_1", 48),
    ("string_ensemble_2", 49),
    ("synth_strings", 50),
    ("choir", 52),
    ("trumpet", 56),
    ("trombone", 57),
    ("tuba", 58),
    ("sax", 64),
    ("alto_sax", 65),
    ("tenor_sax", 66),
    ("oboe", 68),
    ("clarinet", 71),
    ("flute", 73),
    ("lead", 80),
    ("synth_lead", 80),
    ("square_lead", 80),
    ("saw_lead", 81),
    ("pad", 88),
    ("synth_pad", 88),
    ("warm_pad", 89),
    ("fx", 96),
];

/// Parses a program token: a 0-based number `0..=127` or a GM name.
///
/// Returns `None` for anything else, including numbers above 127.
pub fn parse_program(token: &str) -> Option<u8> {
    let t = token.trim().to_lowercase().replace(' ', "_");
    if let Some((_, program)) = GM_PROGRAMS.iter().find(|(name, _)| *name == t) {
        return Some(*program);
    }
    t.parse::<u8>().ok().filter(|p| *p <= 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_numbers() {
        assert_eq!(parse_program("piano"), Some(0));
        assert_eq!(parse_program("Synth Bass 1"), Some(38));
        assert_eq!(parse_program("strings"), Some(48));
        assert_eq!(parse_program("81"), Some(81));
        assert_eq!(parse_program("128"), None);
        assert_eq!(parse_program("kazoo"), None);
    }
}
