pub mod audit;
pub mod capabilities;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use capabilities::{
    ChartRenderer, ClassifierCapability, DataSource, HypothesisGenerator, QueryGenerator,
    StatTester,
};
pub use domain::chart::{ChartDescriptor, ChartSpec, ChartType};
pub use domain::dataset::{Contingency, Dataset};
pub use domain::envelope::{CausalAnswer, DescriptiveAnswer, ErrorDetail, ResponseEnvelope};
pub use domain::hypothesis::{Hypothesis, TestKind, VariableType};
pub use domain::question::{Classification, Question, QuestionKind};
pub use domain::stat_test::{EffectSizeKind, StatTestResult, SIGNIFICANCE_LEVEL};
pub use domain::table::{Row, Scalar, TableShapeError, TabularResult};
pub use errors::{AnalysisError, CapabilityError, ErrorKind, InterfaceError};
