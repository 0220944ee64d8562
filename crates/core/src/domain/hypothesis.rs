use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    Categorical,
    #[serde(alias = "numerical", alias = "continuous")]
    Numeric,
}

impl VariableType {
    pub fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "categorical" | "category" | "nominal" | "ordinal" | "binary" => Some(Self::Categorical),
            "numeric" | "numerical" | "continuous" | "integer" | "float" => Some(Self::Numeric),
            _ => None,
        }
    }
}

/// The closed set of significance tests the causal path can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    #[serde(rename = "chi-square")]
    ChiSquare,
    #[serde(rename = "t-test")]
    TTest,
    #[serde(rename = "anova")]
    Anova,
    #[serde(rename = "correlation")]
    Correlation,
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChiSquare => "chi-square",
            Self::TTest => "t-test",
            Self::Anova => "anova",
            Self::Correlation => "correlation",
        }
    }

    /// Accepts the spellings language models commonly produce.
    pub fn parse_label(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>();
        match normalized.as_str() {
            "chisquare" | "chisquared" | "chi2" | "chisq" => Some(Self::ChiSquare),
            "ttest" | "studentst" | "independentttest" | "twosamplettest" => Some(Self::TTest),
            "anova" | "onewayanova" | "ftest" => Some(Self::Anova),
            "correlation" | "pearson" | "pearsoncorrelation" | "spearman" => {
                Some(Self::Correlation)
            }
            _ => None,
        }
    }

    /// Test implied by the declared variable types when the level count of the
    /// categorical side is known.
    pub fn for_variables(
        variable_a: VariableType,
        variable_b: VariableType,
        categorical_levels: Option<usize>,
    ) -> Self {
        use VariableType::{Categorical, Numeric};

        match (variable_a, variable_b) {
            (Categorical, Categorical) => Self::ChiSquare,
            (Numeric, Numeric) => Self::Correlation,
            (Categorical, Numeric) | (Numeric, Categorical) => match categorical_levels {
                Some(levels) if levels >= 3 => Self::Anova,
                _ => Self::TTest,
            },
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A generated null/alternative pair relating two dataset variables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: u32,
    pub null_statement: String,
    pub alternative_statement: String,
    pub variable_a: String,
    pub variable_b: String,
    pub variable_a_type: VariableType,
    pub variable_b_type: VariableType,
    pub recommended_test: TestKind,
    #[serde(default)]
    pub rationale: String,
}
