use std::ffi::OsString;
use std::path::PathBuf;

use pretty_assertions::assert_eq;

use super::GenConfig;

fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
    move |name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| OsString::from(v))
    }
}

#[test]
fn absent_variables_disable_everything() {
    assert_eq!(GenConfig::from_lookup(lookup(&[])), GenConfig::default());
}

#[test]
fn variables_enable_the_sink_and_stress_mode() {
    let config = GenConfig::from_lookup(lookup(&[
        ("KILN_DEBUG_LOCATION", "/tmp/kiln"),
        ("KILN_DEBUG_DISASM", "1"),
        ("KILN_STRESS_HASH", "yes"),
    ]));
    assert_eq!(
        config,
        GenConfig {
            debug_location: Some(PathBuf::from("/tmp/kiln")),
            debug_disasm: true,
            stress_hash: true,
        }
    );
}

#[test]
fn builders_override_fields() {
    let config = GenConfig::default()
        .with_debug_location("out")
        .with_debug_disasm(true)
        .with_stress_hash(true);
    assert_eq!(config.debug_location, Some(PathBuf::from("out")));
    assert!(config.debug_disasm);
    assert!(config.stress_hash);
}
