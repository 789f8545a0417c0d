//! Reading arrangement specs from JSON or YAML.

use std::path::Path;

use clawdaw_spec::{ArrangeSpec, CueKind, ARRANGE_SPEC_VERSION};

use crate::error::ArrangeError;

/// Document syntax of an arrangement spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Json,
    Yaml,
}

impl SpecFormat {
    /// `.json` is JSON; everything else is read as YAML, which also
    /// accepts JSON text.
    pub fn from_path(path: &Path) -> SpecFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SpecFormat::Json,
            _ => SpecFormat::Yaml,
        }
    }
}

/// Parses and checks an arrangement spec from text.
pub fn parse_arrange_spec(text: &str, format: SpecFormat) -> Result<ArrangeSpec, ArrangeError> {
    let spec: ArrangeSpec = match format {
        SpecFormat::Json => serde_json::from_str(text).map_err(|e| ArrangeError::Parse {
            message: e.to_string(),
        })?,
        SpecFormat::Yaml => serde_yaml::from_str(text).map_err(|e| ArrangeError::Parse {
            message: e.to_string(),
        })?,
    };
    check_arrange_spec(&spec)?;
    Ok(spec)
}

/// Reads an arrangement spec file, choosing the syntax by extension.
pub fn load_arrange_spec(path: &Path) -> Result<ArrangeSpec, ArrangeError> {
    let text = std::fs::read_to_string(path).map_err(|e| ArrangeError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_arrange_spec(&text, SpecFormat::from_path(path))
}

/// Structural checks that do not need a project.
pub fn check_arrange_spec(spec: &ArrangeSpec) -> Result<(), ArrangeError> {
    if spec.version != ARRANGE_SPEC_VERSION {
        return Err(ArrangeError::UnsupportedVersion {
            version: spec.version,
        });
    }
    if spec.sections.is_empty() {
        return Err(ArrangeError::NoSections);
    }
    for section in &spec.sections {
        if section.bars == 0 {
            return Err(ArrangeError::EmptySection {
                section: section.name.clone(),
            });
        }
        for (ci, cue) in section.cues.iter().enumerate() {
            let invalid = |message: &str| ArrangeError::InvalidCue {
                section: section.name.clone(),
                cue: ci,
                message: message.to_string(),
            };
            if cue.bars == 0 {
                return Err(invalid("bars must be > 0"));
            }
            if cue.tracks.is_empty() {
                return Err(invalid("tracks must list at least one track index"));
            }
            if cue.kind == CueKind::Fill && cue.pattern.as_deref().map_or(true, str::is_empty) {
                return Err(invalid("fill cues need a pattern"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = "
version: 1
base_patterns:
  0: main
sections:
  - name: intro
    bars: 4
    cues:
      - type: fill
        tracks: [0]
        pattern: fill
";

    #[test]
    fn loads_yaml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let spec = load_arrange_spec(file.path()).unwrap();
        assert_eq!(spec.base_patterns.get(&0).map(String::as_str), Some("main"));
        assert_eq!(spec.sections[0].cues[0].pattern.as_deref(), Some("fill"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = load_arrange_spec(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ArrangeError::Read { .. }));
    }

    #[test]
    fn rejects_bad_documents() {
        let cases = [
            (r#"{"version": 2, "sections": [{"name": "a", "bars": 1}]}"#, "ARRANGE_003"),
            (r#"{"version": 1, "sections": []}"#, "ARRANGE_004"),
            (r#"{"sections": [{"name": "a", "bars": 0}]}"#, "ARRANGE_005"),
            (
                r#"{"sections": [{"name": "a", "bars": 2, "cues": [{"type": "fill", "tracks": [0]}]}]}"#,
                "ARRANGE_006",
            ),
            (r#"{"sections": "nope"}"#, "ARRANGE_002"),
        ];
        for (text, code) in cases {
            let err = parse_arrange_spec(text, SpecFormat::Json).unwrap_err();
            assert_eq!(
                clawdaw_spec::BackendError::code(&err),
                code,
                "for {}",
                text
            );
        }
    }
}
