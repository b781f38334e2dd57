//! Reading and writing the `midiMappings` section of the shared JSON config.
//!
//! The file is shared with other subsystems (ArtNet settings, etc.), so only the
//! `midiMappings` key is ever touched on write.

use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::{DmxChannel, MappingTable, MidiTrigger};
use crate::error::{Error, Result};

/// Top-level key holding the mapping table
pub const MAPPINGS_KEY: &str = "midiMappings";

/// Load the mapping table from `path`.
///
/// A missing file yields an empty table. Anything unparsable is `ConfigCorrupt`.
pub async fn load_table(path: impl AsRef<Path>) -> Result<MappingTable> {
    let path = path.as_ref();
    match fs::read_to_string(path).await {
        Ok(text) => {
            let table = parse_document(path, &text)?;
            info!("Loaded {} MIDI mappings from {}", table.len(), path.display());
            Ok(table)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No mapping file at {}, starting empty", path.display());
            Ok(MappingTable::new())
        }
        Err(e) => Err(Error::ConfigCorrupt {
            path: path.to_path_buf(),
            reason: format!("unreadable: {}", e),
        }),
    }
}

/// Parse a config document and extract its mapping table
pub fn parse_document(path: &Path, text: &str) -> Result<MappingTable> {
    let corrupt = |reason: String| Error::ConfigCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let root: Value = serde_json::from_str(text).map_err(|e| corrupt(format!("invalid JSON: {}", e)))?;
    let Value::Object(root) = root else {
        return Err(corrupt("top level is not a JSON object".to_string()));
    };

    let mut table = MappingTable::new();
    let Some(section) = root.get(MAPPINGS_KEY) else {
        debug!("No '{}' section in {}", MAPPINGS_KEY, path.display());
        return Ok(table);
    };

    let Value::Object(entries) = section else {
        return Err(corrupt(format!("'{}' is not an object", MAPPINGS_KEY)));
    };

    for (key, value) in entries {
        let index: u16 = key
            .trim()
            .parse()
            .map_err(|_| corrupt(format!("DMX channel key '{}' is not an integer", key)))?;
        let channel = DmxChannel::new(index).map_err(|e| corrupt(e.to_string()))?;
        let trigger: MidiTrigger = serde_json::from_value(value.clone())
            .map_err(|e| corrupt(format!("mapping for channel {}: {}", key, e)))?;
        table.insert_unchecked(channel, trigger);
    }

    Ok(table)
}

/// The `midiMappings` object for `table`, keyed by string-encoded DMX index.
///
/// Fails on a trigger that would not load back.
pub fn mappings_value(table: &MappingTable) -> Result<Value> {
    let entries = table
        .iter()
        .map(|m| {
            let trigger = m.trigger.validate().map_err(|e| {
                Error::Persistence(format!("mapping for channel {}: {}", m.channel, e))
            })?;
            let value = serde_json::to_value(trigger).map_err(|e| {
                Error::Persistence(format!("failed to serialize mapping for channel {}: {}", m.channel, e))
            })?;
            Ok((m.channel.to_string(), value))
        })
        .collect::<Result<Map<String, Value>>>()?;
    Ok(Value::Object(entries))
}

/// Replace the mapping section of `existing` (if any), keeping every other key
pub fn merge_into_document(existing: Option<&str>, table: &MappingTable) -> Result<String> {
    let mut root = match existing {
        Some(text) if !text.trim().is_empty() => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(Error::Persistence(
                    "existing config is not a JSON object, refusing to overwrite".to_string(),
                ))
            }
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "existing config is not valid JSON ({}), refusing to overwrite",
                    e
                )))
            }
        },
        _ => Map::new(),
    };

    root.insert(MAPPINGS_KEY.to_string(), mappings_value(table)?);

    serde_json::to_string_pretty(&Value::Object(root))
        .map_err(|e| Error::Persistence(format!("failed to serialize config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn ch(i: u16) -> DmxChannel {
        DmxChannel::new(i).unwrap()
    }

    #[test]
    fn test_parse_legacy_shape() {
        let text = r#"{
            "artNetConfig": { "ip": "192.168.1.199", "universe": 0 },
            "midiMappings": {
                "5": { "channel": 1, "controller": 7 },
                "12": { "channel": 0, "note": 60 }
            }
        }"#;

        let table = parse_document(Path::new("config.json"), text).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.trigger_for(ch(5)), MidiTrigger::controller(1, 7).ok());
        assert_eq!(table.trigger_for(ch(12)), MidiTrigger::note(0, 60).ok());
    }

    #[test]
    fn test_missing_section_is_empty() {
        let table = parse_document(Path::new("c.json"), r#"{"artNetConfig": {}}"#).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_corrupt_documents() {
        let cases = [
            "{not json",
            "[1, 2, 3]",
            r#"{"midiMappings": [1]}"#,
            r#"{"midiMappings": {"abc": {"channel": 0, "note": 1}}}"#,
            r#"{"midiMappings": {"900": {"channel": 0, "note": 1}}}"#,
            r#"{"midiMappings": {"1": {"channel": 0}}}"#,
        ];

        for text in cases {
            let err = parse_document(Path::new("c.json"), text).unwrap_err();
            assert!(
                matches!(err, Error::ConfigCorrupt { .. }),
                "expected ConfigCorrupt for {text}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_hand_edited_duplicates_survive_load() {
        let text = r#"{"midiMappings": {
            "1": {"channel": 0, "controller": 1},
            "2": {"channel": 0, "controller": 1}
        }}"#;
        let table = parse_document(Path::new("c.json"), text).unwrap();
        let trigger = MidiTrigger::controller(0, 1).unwrap();
        assert_eq!(table.lookup_by_trigger(&trigger), vec![ch(1), ch(2)]);
    }

    #[test]
    fn test_merge_preserves_foreign_keys() {
        let existing = json!({
            "artNetConfig": { "ip": "10.0.0.5", "port": 6454 },
            "midiMappings": { "1": { "channel": 0, "note": 1 } }
        })
        .to_string();

        let mut table = MappingTable::new();
        table.set(ch(7), MidiTrigger::controller(2, 3).unwrap());

        let merged: Value = serde_json::from_str(&merge_into_document(Some(&existing), &table).unwrap()).unwrap();
        assert_eq!(merged["artNetConfig"]["ip"], "10.0.0.5");
        assert_eq!(merged["midiMappings"], json!({ "7": { "channel": 2, "controller": 3 } }));
    }

    #[test]
    fn test_merge_refuses_to_clobber_garbage() {
        let table = MappingTable::new();
        assert!(matches!(
            merge_into_document(Some("garbage"), &table),
            Err(Error::Persistence(_))
        ));
        assert!(merge_into_document(None, &table).is_ok());
        assert!(merge_into_document(Some("  "), &table).is_ok());
    }

    #[test]
    fn test_merge_rejects_out_of_range_trigger() {
        let mut table = MappingTable::new();
        table.insert_unchecked(ch(1), MidiTrigger::Controller { channel: 20, controller: 200 });

        let err = merge_into_document(None, &table).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)), "got {err:?}");
    }

    fn any_trigger() -> impl Strategy<Value = MidiTrigger> {
        prop_oneof![
            (0u8..16, 0u8..128).prop_map(|(channel, note)| MidiTrigger::Note { channel, note }),
            (0u8..16, 0u8..128)
                .prop_map(|(channel, controller)| MidiTrigger::Controller { channel, controller }),
        ]
    }

    proptest! {
        #[test]
        fn written_mapping_loads_back(index in 0u16..512, trigger in any_trigger()) {
            let mut table = MappingTable::new();
            table.set(ch(index), trigger);

            let text = merge_into_document(None, &table).unwrap();
            let loaded = parse_document(Path::new("config.json"), &text).unwrap();
            prop_assert!(loaded.lookup_by_trigger(&trigger).contains(&ch(index)));
            prop_assert_eq!(loaded.trigger_for(ch(index)), Some(trigger));
        }
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let table = load_table(dir.path().join("absent.json")).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ \"midiMappings\": ").unwrap();

        let err = load_table(&path).await.unwrap_err();
        assert!(matches!(err, Error::ConfigCorrupt { .. }));
    }
}
