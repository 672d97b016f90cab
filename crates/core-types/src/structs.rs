use crate::enums::{ApiStatus, Dialect};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage format for every timestamp kept in the control-plane database.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A registered data origin (a tenant database).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique identifier. Left empty by callers that want one generated at registration.
    #[serde(default)]
    pub id: String,
    /// The broad kind of source, e.g. "sql".
    pub category: String,
    pub dialect: Dialect,
    pub name: String,
    /// The connection string actually used to open the pool.
    pub real_dsn: String,
    /// A display-safe connection string, if the operator registered one.
    #[serde(default)]
    pub fake_dsn: Option<String>,
}

impl Source {
    /// Describes the control-plane database itself, which is opened like any other source.
    pub fn control_plane(dialect: Dialect, dsn: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            category: "sql".to_string(),
            dialect,
            name: "main_database".to_string(),
            real_dsn: dsn.into(),
            fake_dsn: None,
        }
    }
}

// The real DSN carries credentials, so it never reaches the logs.
impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("dialect", &self.dialect)
            .field("name", &self.name)
            .field("fake_dsn", &self.fake_dsn)
            .finish_non_exhaustive()
    }
}

/// The query an API executes against its source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContent {
    /// The query text with bind placeholders.
    pub syntax: String,
    /// Required parameter keys, in bind order.
    #[serde(default)]
    pub param_keys: Vec<String>,
    /// The raw de-identification payload exactly as registered.
    #[serde(default)]
    pub did_options: Option<String>,
}

impl QueryContent {
    /// Deserializes the de-identification payload, if one is attached.
    pub fn parsed_did_options(&self) -> Result<Option<DidOptions>, serde_json::Error> {
        match self.did_options.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map(Some),
            _ => Ok(None),
        }
    }
}

/// A resolved API definition as stored in the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub id: i64,
    pub source_id: String,
    pub name: String,
    pub alias: String,
    pub api_type: String,
    pub query: QueryContent,
    pub reg_date: DateTime<Utc>,
    pub exp_date: DateTime<Utc>,
    pub status: ApiStatus,
}

/// The input for registering an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApiDefinition {
    pub source_id: String,
    pub name: String,
    pub alias: String,
    pub api_type: String,
    pub query: QueryContent,
    /// Lifetime in hours as supplied by the caller. `-1` means unlimited.
    pub expires_in_hours: String,
}

/// A per-field de-identification directive. Opaque to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnoParamOption(pub serde_json::Value);

/// De-identification options keyed by column or field name.
pub type DidOptions = BTreeMap<String, AnoParamOption>;

/// A typed request parameter value, bound in place of a query placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl ParamValue {
    /// Classifies a raw transport value. Anything that is not a number or an
    /// ISO date is kept as text.
    ///
    /// A value is only typed if it prints back to exactly the same string, so
    /// codes like `007` or `+5` and exponent forms stay text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            if value.to_string() == raw {
                return ParamValue::Integer(value);
            }
        }
        if let Ok(value) = raw.parse::<f64>() {
            if value.is_finite() && value.to_string() == raw {
                return ParamValue::Float(value);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if date.format("%Y-%m-%d").to_string() == raw {
                return ParamValue::Date(date);
            }
        }
        ParamValue::Text(raw.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_values_are_tagged_by_shape() {
        assert_eq!(ParamValue::parse("10"), ParamValue::Integer(10));
        assert_eq!(ParamValue::parse("2.5"), ParamValue::Float(2.5));
        assert_eq!(
            ParamValue::parse("2024-02-29"),
            ParamValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(ParamValue::parse("seoul"), ParamValue::Text("seoul".into()));
        assert_eq!(ParamValue::parse("NaN"), ParamValue::Text("NaN".into()));
    }

    #[test]
    fn numeric_looking_codes_keep_their_text() {
        for raw in ["007", "01012345678", "+5", "1e3", "2.50", " 10", "2024-2-9"] {
            let value = ParamValue::parse(raw);
            assert_eq!(value, ParamValue::Text(raw.into()));
            assert_eq!(value.to_string(), raw);
        }
        assert_eq!(ParamValue::parse("-42"), ParamValue::Integer(-42));
        assert_eq!(ParamValue::parse("0"), ParamValue::Integer(0));
    }

    #[test]
    fn did_options_payload_deserializes_to_mapping() {
        let content = QueryContent {
            syntax: "SELECT name, age FROM users".into(),
            param_keys: vec![],
            did_options: Some(r#"{"age":{"method":"rounding","level":10},"name":"masking"}"#.into()),
        };
        let options = content.parsed_did_options().unwrap().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options["name"], AnoParamOption(serde_json::json!("masking")));

        let blank = QueryContent { did_options: Some("  ".into()), ..content };
        assert!(blank.parsed_did_options().unwrap().is_none());
    }

    #[test]
    fn source_debug_output_hides_the_real_dsn() {
        let source = Source::control_plane(Dialect::MySql, "root:hunter2@tcp(db:3306)/cp");
        let rendered = format!("{:?}", source);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("main_database"));
    }
}
