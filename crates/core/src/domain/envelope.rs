use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::chart::ChartDescriptor;
use crate::domain::hypothesis::Hypothesis;
use crate::domain::question::QuestionKind;
use crate::domain::stat_test::StatTestResult;
use crate::domain::table::TabularResult;
use crate::errors::{AnalysisError, ErrorKind};

/// The single output of an analysis request. The `question_type` tag is the only
/// discriminant a client needs to inspect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type")]
pub enum ResponseEnvelope {
    #[serde(rename = "WHAT")]
    Descriptive(DescriptiveAnswer),
    #[serde(rename = "WHY")]
    Causal(CausalAnswer),
    #[serde(rename = "ERROR")]
    Error { error: ErrorDetail },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveAnswer {
    pub query: String,
    pub table: TabularResult,
    pub chart: Option<ChartDescriptor>,
}

impl DescriptiveAnswer {
    pub fn new(table: TabularResult, chart: Option<ChartDescriptor>) -> Self {
        Self { query: table.generating_query().to_owned(), table, chart }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("causal answer needs at least one hypothesis")]
    Empty,
    #[error("{hypotheses} hypotheses but {results} test results")]
    LengthMismatch { hypotheses: usize, results: usize },
    #[error("test result {index} references hypothesis {found}, expected {expected}")]
    IdMismatch { index: usize, expected: u32, found: u32 },
}

/// Hypotheses and their test results, positionally aligned: result `i` always
/// belongs to hypothesis `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CausalWire")]
pub struct CausalAnswer {
    hypotheses: Vec<Hypothesis>,
    test_results: Vec<StatTestResult>,
}

impl CausalAnswer {
    pub fn new(
        hypotheses: Vec<Hypothesis>,
        test_results: Vec<StatTestResult>,
    ) -> Result<Self, CorrespondenceError> {
        if hypotheses.is_empty() {
            return Err(CorrespondenceError::Empty);
        }
        if hypotheses.len() != test_results.len() {
            return Err(CorrespondenceError::LengthMismatch {
                hypotheses: hypotheses.len(),
                results: test_results.len(),
            });
        }
        for (index, (hypothesis, result)) in hypotheses.iter().zip(&test_results).enumerate() {
            if hypothesis.id != result.hypothesis_id() {
                return Err(CorrespondenceError::IdMismatch {
                    index,
                    expected: hypothesis.id,
                    found: result.hypothesis_id(),
                });
            }
        }
        Ok(Self { hypotheses, test_results })
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn test_results(&self) -> &[StatTestResult] {
        &self.test_results
    }

    pub fn significant_count(&self) -> usize {
        self.test_results.iter().filter(|result| result.is_significant()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.test_results.iter().filter(|result| result.is_failed()).count()
    }
}

#[derive(Deserialize)]
struct CausalWire {
    hypotheses: Vec<Hypothesis>,
    test_results: Vec<StatTestResult>,
}

impl TryFrom<CausalWire> for CausalAnswer {
    type Error = CorrespondenceError;

    fn try_from(wire: CausalWire) -> Result<Self, Self::Error> {
        Self::new(wire.hypotheses, wire.test_results)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ResponseEnvelope {
    pub fn question_kind(&self) -> Option<QuestionKind> {
        match self {
            Self::Descriptive(_) => Some(QuestionKind::Descriptive),
            Self::Causal(_) => Some(QuestionKind::Causal),
            Self::Error { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Error { error } => Some(error),
            Self::Descriptive(_) | Self::Causal(_) => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(|error| error.kind)
    }

    pub fn discriminant(&self) -> &'static str {
        match self {
            Self::Descriptive(_) => "WHAT",
            Self::Causal(_) => "WHY",
            Self::Error { .. } => "ERROR",
        }
    }
}

impl From<AnalysisError> for ResponseEnvelope {
    fn from(error: AnalysisError) -> Self {
        Self::Error { error: ErrorDetail { kind: error.kind, message: error.message } }
    }
}

impl From<DescriptiveAnswer> for ResponseEnvelope {
    fn from(answer: DescriptiveAnswer) -> Self {
        Self::Descriptive(answer)
    }
}

impl From<CausalAnswer> for ResponseEnvelope {
    fn from(answer: CausalAnswer) -> Self {
        Self::Causal(answer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{CausalAnswer, CorrespondenceError, DescriptiveAnswer, ResponseEnvelope};
    use crate::domain::chart::ChartDescriptor;
    use crate::domain::hypothesis::{Hypothesis, TestKind, VariableType};
    use crate::domain::stat_test::StatTestResult;
    use crate::domain::table::{Scalar, TabularResult};
    use crate::errors::{AnalysisError, ErrorKind};

    fn hypothesis(id: u32) -> Hypothesis {
        Hypothesis {
            id,
            null_statement: "no difference".to_owned(),
            alternative_statement: "a difference".to_owned(),
            variable_a: "attrition".to_owned(),
            variable_b: "monthlyincome".to_owned(),
            variable_a_type: VariableType::Categorical,
            variable_b_type: VariableType::Numeric,
            recommended_test: TestKind::TTest,
            rationale: String::new(),
        }
    }

    fn result(id: u32, p_value: f64) -> StatTestResult {
        StatTestResult::completed(id, TestKind::TTest, p_value, 1.0, None, "")
    }

    fn table() -> TabularResult {
        TabularResult::from_records(
            "SELECT department FROM hr_employee_attrition",
            vec!["department".to_owned()],
            vec![vec![Scalar::from("Sales")]],
        )
        .expect("valid table")
    }

    fn payload_keys(value: &Value) -> Vec<&str> {
        ["table", "hypotheses", "error"]
            .into_iter()
            .filter(|key| value.get(*key).is_some())
            .collect()
    }

    #[test]
    fn each_variant_serializes_one_discriminant_and_one_payload() {
        let envelopes = vec![
            ResponseEnvelope::from(DescriptiveAnswer::new(table(), None)),
            ResponseEnvelope::from(
                CausalAnswer::new(vec![hypothesis(1)], vec![result(1, 0.2)]).expect("aligned"),
            ),
            ResponseEnvelope::from(AnalysisError::new(ErrorKind::UnsafeQuery, "DROP detected")),
        ];

        for envelope in envelopes {
            let encoded = serde_json::to_value(&envelope).expect("json");
            assert_eq!(encoded["question_type"], envelope.discriminant());
            assert_eq!(payload_keys(&encoded).len(), 1, "exactly one payload in {encoded}");
        }
    }

    #[test]
    fn descriptive_query_mirrors_table_generating_query() {
        let answer = DescriptiveAnswer::new(table(), Some(ChartDescriptor::failed("no chart")));
        assert_eq!(answer.query, answer.table.generating_query());
    }

    #[test]
    fn error_envelope_carries_kind_and_message() {
        let envelope =
            ResponseEnvelope::from(AnalysisError::new(ErrorKind::InvalidInput, "empty question"));
        let encoded = serde_json::to_value(&envelope).expect("json");

        assert_eq!(encoded["question_type"], "ERROR");
        assert_eq!(encoded["error"]["kind"], "invalid_input");
        assert_eq!(encoded["error"]["message"], "empty question");
        assert!(!envelope.is_success());
        assert_eq!(envelope.error_kind(), Some(ErrorKind::InvalidInput));
    }

    #[test]
    fn causal_answer_requires_positional_id_correspondence() {
        assert_eq!(CausalAnswer::new(vec![], vec![]), Err(CorrespondenceError::Empty));
        assert!(matches!(
            CausalAnswer::new(vec![hypothesis(1), hypothesis(2)], vec![result(1, 0.1)]),
            Err(CorrespondenceError::LengthMismatch { hypotheses: 2, results: 1 })
        ));
        assert!(matches!(
            CausalAnswer::new(
                vec![hypothesis(1), hypothesis(2)],
                vec![result(2, 0.1), result(1, 0.1)]
            ),
            Err(CorrespondenceError::IdMismatch { index: 0, expected: 1, found: 2 })
        ));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = ResponseEnvelope::from(
            CausalAnswer::new(
                vec![hypothesis(1), hypothesis(2)],
                vec![result(1, 0.01), result(2, 0.4)],
            )
            .expect("aligned"),
        );

        let encoded = serde_json::to_string(&envelope).expect("json");
        let decoded: ResponseEnvelope = serde_json::from_str(&encoded).expect("decode");

        let ResponseEnvelope::Causal(answer) = decoded else {
            panic!("expected causal envelope");
        };
        assert_eq!(answer.significant_count(), 1);
        assert_eq!(answer.hypotheses().len(), answer.test_results().len());
    }
}
