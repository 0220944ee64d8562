use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
    Indicator,
}

impl ChartType {
    pub fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bar" | "column" | "grouped_bar" => Some(Self::Bar),
            "line" => Some(Self::Line),
            "pie" | "donut" => Some(Self::Pie),
            "scatter" => Some(Self::Scatter),
            "histogram" => Some(Self::Histogram),
            "indicator" | "kpi" | "number" => Some(Self::Indicator),
            _ => None,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
            Self::Histogram => "histogram",
            Self::Indicator => "indicator",
        };
        f.write_str(label)
    }
}

/// Declarative chart description handed to the client for rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ChartSpec {
    pub fn encoded_columns(&self) -> impl Iterator<Item = &str> {
        [self.x.as_deref(), self.y.as_deref(), self.color.as_deref()].into_iter().flatten()
    }
}

/// Outcome of the optional chart step. A failed chart never invalidates the table it
/// accompanies.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ChartWire")]
pub enum ChartDescriptor {
    Rendered(ChartSpec),
    Failed { error_message: String },
}

impl ChartDescriptor {
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self::Failed { error_message: error_message.into() }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Rendered(_))
    }

    pub fn payload(&self) -> Option<&ChartSpec> {
        match self {
            Self::Rendered(spec) => Some(spec),
            Self::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Rendered(_) => None,
            Self::Failed { error_message } => Some(error_message),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ChartWire {
    succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<ChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl Serialize for ChartDescriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = match self {
            Self::Rendered(spec) => {
                ChartWire { succeeded: true, payload: Some(spec.clone()), error_message: None }
            }
            Self::Failed { error_message } => ChartWire {
                succeeded: false,
                payload: None,
                error_message: Some(error_message.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl TryFrom<ChartWire> for ChartDescriptor {
    type Error = String;

    fn try_from(wire: ChartWire) -> Result<Self, Self::Error> {
        match (wire.succeeded, wire.payload, wire.error_message) {
            (true, Some(spec), None) => Ok(Self::Rendered(spec)),
            (false, None, Some(error_message)) => Ok(Self::Failed { error_message }),
            (succeeded, _, _) => Err(format!(
                "chart with succeeded={succeeded} must carry exactly one of payload or error_message"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChartDescriptor, ChartSpec, ChartType};

    fn bar_spec() -> ChartSpec {
        ChartSpec {
            chart_type: ChartType::Bar,
            title: "Attrition rate by department".to_owned(),
            x: Some("department".to_owned()),
            y: Some("attrition_rate".to_owned()),
            color: None,
        }
    }

    #[test]
    fn rendered_chart_serializes_payload_only() {
        let encoded = serde_json::to_value(ChartDescriptor::Rendered(bar_spec())).expect("json");
        assert_eq!(encoded["succeeded"], true);
        assert_eq!(encoded["payload"]["chart_type"], "bar");
        assert!(encoded.get("error_message").is_none());
    }

    #[test]
    fn failed_chart_serializes_error_only() {
        let encoded =
            serde_json::to_value(ChartDescriptor::failed("no numeric column")).expect("json");
        assert_eq!(encoded["succeeded"], false);
        assert_eq!(encoded["error_message"], "no numeric column");
        assert!(encoded.get("payload").is_none());
    }

    #[test]
    fn inconsistent_wire_chart_is_rejected() {
        let payload = serde_json::json!({"succeeded": true, "error_message": "boom"});
        assert!(serde_json::from_value::<ChartDescriptor>(payload).is_err());

        let payload = serde_json::json!({"succeeded": false});
        assert!(serde_json::from_value::<ChartDescriptor>(payload).is_err());
    }

    #[test]
    fn chart_type_labels_are_lenient() {
        assert_eq!(ChartType::parse_label(" Bar "), Some(ChartType::Bar));
        assert_eq!(ChartType::parse_label("kpi"), Some(ChartType::Indicator));
        assert_eq!(ChartType::parse_label("sunburst"), None);
    }

    #[test]
    fn encoded_columns_skip_unset_channels() {
        assert_eq!(bar_spec().encoded_columns().collect::<Vec<_>>(), vec!["department", "attrition_rate"]);
    }
}
