#![no_main]

use clawdaw_spec::validation::{load_project_str, to_json_pretty, validate_project};
use libfuzzer_sys::fuzz_target;

// Loading never panics, and whatever loads is valid and stable on reload.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok((project, _)) = load_project_str(text) else {
        return;
    };
    assert!(validate_project(&project).is_ok());
    let saved = to_json_pretty(&project).unwrap();
    let (again, report) = load_project_str(&saved).unwrap();
    assert!(report.is_clean());
    assert_eq!(
        serde_json::to_value(&again).unwrap(),
        serde_json::to_value(&project).unwrap()
    );
});
