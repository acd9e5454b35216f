use serde::Deserialize;

/// Options that control which fields get anonymized. Values are merged with the default field set.
#[derive(Debug, Default, Deserialize)]
pub struct AnonymizerConfig {
    /// Additional field names to anonymize (exact key match, case-sensitive).
    #[serde(default)]
    pub fields: Vec<String>,
}
