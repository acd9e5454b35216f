use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::anonymizer::{Anonymizer, MappingTable};

/// Name patterns (prefix, suffix) the upstream generator produces, in the
/// order their matches are processed.
pub const INPUT_PATTERNS: &[(&str, &str)] = &[
    ("data_", ".jsonl"),
    ("failed_treatments_", ".json"),
    ("failed_patients_", ".json"),
];

pub const MAPPING_FILE_NAME: &str = "anonymization_mapping.json";

/// Collects generator output files in `dir`: all data files, then
/// failed-treatment files, then failed-patient files, sorted by name within
/// each group.
pub fn discover_input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut names: Vec<String> = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list directory: {}", dir.display()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }

    let mut matched = Vec::new();
    for (prefix, suffix) in INPUT_PATTERNS {
        let mut group: Vec<&String> = names
            .iter()
            .filter(|name| {
                name.len() >= prefix.len() + suffix.len()
                    && name.starts_with(prefix)
                    && name.ends_with(suffix)
            })
            .collect();
        group.sort();
        matched.extend(group.into_iter().map(|name| dir.join(name)));
    }
    Ok(matched)
}

/// Anonymizes a JSONL file in place, one JSON document per non-blank line.
/// Returns the number of records processed. A malformed line fails the file.
pub fn process_jsonl_file(
    path: &Path,
    anonymizer: &Anonymizer,
    mapping: &mut MappingTable,
) -> Result<usize> {
    let infile =
        fs::File::open(path).with_context(|| format!("failed to open: {}", path.display()))?;
    let temp_path = temp_sibling(path);
    let outfile = fs::File::create(&temp_path)
        .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
    let mut writer = BufWriter::new(outfile);

    let mut count = 0;
    for (index, line) in BufReader::new(infile).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read: {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON at {}:{}", path.display(), index + 1))?;
        let anonymized = anonymizer.anonymize(&record, mapping);
        serde_json::to_writer(&mut writer, &anonymized)
            .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;
        writer
            .write_all(b"\n")
            .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;
        count += 1;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;
    drop(writer);

    replace_original(&temp_path, path)?;
    Ok(count)
}

/// Anonymizes a JSON file in place. Returns false (leaving the file
/// untouched) when the top-level value is neither an object nor an array.
pub fn process_json_file(
    path: &Path,
    anonymizer: &Anonymizer,
    mapping: &mut MappingTable,
) -> Result<bool> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read: {}", path.display()))?;
    let document: Value = serde_json::from_str(&raw)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;

    if !document.is_object() && !document.is_array() {
        return Ok(false);
    }
    let anonymized = anonymizer.anonymize(&document, mapping);

    let temp_path = temp_sibling(path);
    write_pretty(&temp_path, &anonymized)?;
    replace_original(&temp_path, path)?;
    Ok(true)
}

/// Writes the mapping table (both directions plus the entry count) to `path`.
pub fn save_mapping(mapping: &MappingTable, path: &Path) -> Result<()> {
    write_pretty(path, &mapping.to_document())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn replace_original(temp_path: &Path, path: &Path) -> Result<()> {
    fs::rename(temp_path, path).with_context(|| {
        format!(
            "failed to replace {} with {}",
            path.display(),
            temp_path.display()
        )
    })
}

// serde_json pretty-prints with 2-space indentation and leaves non-ASCII
// characters unescaped, matching the upstream generator's output style.
fn write_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut rendered = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize: {}", path.display()))?;
    rendered.push('\n');
    fs::write(path, rendered).with_context(|| format!("failed to write: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnonymizerConfig;
    use serde_json::json;
    use tempfile::tempdir;

    fn anonymizer() -> Anonymizer {
        Anonymizer::new(AnonymizerConfig::default())
    }

    #[test]
    fn discovery_groups_and_sorts_matches() {
        let dir = tempdir().expect("tempdir");
        for name in [
            "failed_patients_2.json",
            "data_b.jsonl",
            "failed_treatments_1.json",
            "data_a.jsonl",
            "notes.txt",
            "data_c.json",
            "failed_patients_1.json",
        ] {
            fs::write(dir.path().join(name), "{}").expect("write fixture");
        }
        fs::create_dir(dir.path().join("data_sub.jsonl")).expect("decoy dir");

        let found = discover_input_files(dir.path()).expect("discover");
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "data_a.jsonl",
                "data_b.jsonl",
                "failed_treatments_1.json",
                "failed_patients_1.json",
                "failed_patients_2.json",
            ]
        );
    }

    #[test]
    fn discovery_of_empty_dir_is_ok() {
        let dir = tempdir().expect("tempdir");
        assert!(discover_input_files(dir.path()).expect("discover").is_empty());
    }

    #[test]
    fn jsonl_is_rewritten_line_by_line() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data_1.jsonl");
        fs::write(
            &path,
            "{\"FirstName\": \"Alice\", \"Age\": 5}\n\n{\"Note\": \"stable\"}\n",
        )
        .expect("write fixture");

        let mut mapping = MappingTable::new();
        let count = process_jsonl_file(&path, &anonymizer(), &mut mapping).expect("process");
        assert_eq!(count, 2);
        assert_eq!(mapping.len(), 1);

        let rewritten = fs::read_to_string(&path).expect("read back");
        let mut lines = rewritten.lines();
        let first: Value = serde_json::from_str(lines.next().expect("line 1")).expect("json");
        assert_eq!(
            first["FirstName"],
            "3bc51062973c458d5a6f2d8d64a023246354ad7e064b1e4e009ec8a0699a3043"
        );
        assert_eq!(first["Age"], 5);
        assert_eq!(lines.next(), Some("{\"Note\":\"stable\"}"));
        assert_eq!(lines.next(), None);
        assert!(!dir.path().join("data_1.jsonl.tmp").exists());
    }

    #[test]
    fn malformed_jsonl_line_fails_the_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data_bad.jsonl");
        let original = "{\"FirstName\": \"Alice\"}\nnot json\n";
        fs::write(&path, original).expect("write fixture");

        let mut mapping = MappingTable::new();
        let err = process_jsonl_file(&path, &anonymizer(), &mut mapping)
            .expect_err("parse error expected");
        assert!(err.to_string().contains("data_bad.jsonl:2"));
        // The original stays in place; only the temp file was written.
        assert_eq!(fs::read_to_string(&path).expect("read back"), original);
    }

    #[test]
    fn json_array_file_is_rewritten_pretty() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("failed_treatments_1.json");
        fs::write(
            &path,
            "[{\"TreatmentName\": \"Chemo-α\"}, \"marker\", {\"TreatmentName\": null}]",
        )
        .expect("write fixture");

        let mut mapping = MappingTable::new();
        let processed = process_json_file(&path, &anonymizer(), &mut mapping).expect("process");
        assert!(processed);
        assert_eq!(mapping.len(), 1);

        let rewritten = fs::read_to_string(&path).expect("read back");
        // 2-space indentation, non-ASCII left verbatim in the digest source.
        assert!(rewritten.starts_with("[\n  {\n"));
        let value: Value = serde_json::from_str(&rewritten).expect("json");
        assert_eq!(
            value[0]["TreatmentName"],
            "be1c4988fceb2fad814cefab5eea441104865bcc219f80c89651e1242559031b"
        );
        assert_eq!(value[1], "marker");
        assert_eq!(value[2]["TreatmentName"], Value::Null);
        assert_eq!(mapping.get(value[0]["TreatmentName"].as_str().unwrap()), Some("Chemo-α"));
    }

    #[test]
    fn scalar_top_level_json_is_skipped_untouched() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("failed_patients_1.json");
        fs::write(&path, "42").expect("write fixture");

        let mut mapping = MappingTable::new();
        let processed = process_json_file(&path, &anonymizer(), &mut mapping).expect("process");
        assert!(!processed);
        assert!(mapping.is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read back"), "42");
    }

    #[test]
    fn malformed_json_file_propagates_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("failed_patients_1.json");
        fs::write(&path, "{broken").expect("write fixture");

        let mut mapping = MappingTable::new();
        let err = process_json_file(&path, &anonymizer(), &mut mapping)
            .expect_err("parse error expected");
        assert!(err.to_string().contains("failed_patients_1.json"));
    }

    #[test]
    fn saved_mapping_contains_both_directions() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(MAPPING_FILE_NAME);
        let mut mapping = MappingTable::new();
        mapping.record(crate::anonymizer::hash_value("José"), "José".to_string());
        mapping.record(crate::anonymizer::hash_value("Smith"), "Smith".to_string());
        save_mapping(&mapping, &path).expect("save");

        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.contains("José"), "non-ASCII must not be escaped");
        let doc: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(doc["total_mappings"], 2);
        for (hash, original) in doc["hash_to_original"].as_object().expect("forward") {
            assert_eq!(doc["original_to_hash"][original.as_str().unwrap()], *hash);
        }
    }
}
