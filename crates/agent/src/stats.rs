//! Significance tests over the in-memory analysis dataset.
//!
//! The test is chosen from the data: a column declared numeric is only treated as
//! numeric when its values parse as numbers, and the level count of the categorical
//! side decides between the two-group and many-group mean comparisons. The model's
//! recommended test is advisory.

use std::sync::Arc;

use async_trait::async_trait;
use insight_core::{
    CapabilityError, Contingency, Dataset, Hypothesis, StatTestResult, StatTester, TestKind,
    VariableType, SIGNIFICANCE_LEVEL,
};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};

const CAPABILITY: &str = "stat_tester";

pub struct DatasetStatTester {
    dataset: Arc<Dataset>,
}

impl DatasetStatTester {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}

#[async_trait]
impl StatTester for DatasetStatTester {
    async fn run_test(&self, hypothesis: &Hypothesis) -> Result<StatTestResult, CapabilityError> {
        run_hypothesis_test(&self.dataset, hypothesis)
    }
}

/// Picks and runs the test for `hypothesis` against `dataset`.
pub fn run_hypothesis_test(
    dataset: &Dataset,
    hypothesis: &Hypothesis,
) -> Result<StatTestResult, CapabilityError> {
    let a = hypothesis.variable_a.as_str();
    let b = hypothesis.variable_b.as_str();
    for column in [a, b] {
        if !dataset.has_column(column) {
            return Err(rejected(format!("column `{column}` is not in the dataset")));
        }
    }

    let type_a = effective_type(dataset, a, hypothesis.variable_a_type);
    let type_b = effective_type(dataset, b, hypothesis.variable_b_type);

    let outcome = match (type_a, type_b) {
        (VariableType::Categorical, VariableType::Categorical) => chi_square(dataset, a, b)?,
        (VariableType::Numeric, VariableType::Numeric) => correlation(dataset, a, b)?,
        (VariableType::Categorical, VariableType::Numeric) => compare_means(dataset, a, b)?,
        (VariableType::Numeric, VariableType::Categorical) => compare_means(dataset, b, a)?,
    };

    Ok(StatTestResult::completed(
        hypothesis.id,
        outcome.kind,
        outcome.p_value,
        outcome.statistic,
        Some(outcome.effect_size),
        interpret(&outcome),
    ))
}

fn rejected(message: impl Into<String>) -> CapabilityError {
    CapabilityError::rejected(CAPABILITY, message)
}

fn effective_type(dataset: &Dataset, column: &str, declared: VariableType) -> VariableType {
    if declared == VariableType::Categorical {
        return VariableType::Categorical;
    }
    let Some(values) = dataset.column(column) else {
        return declared;
    };
    let mut present = values.iter().filter(|value| !value.is_null()).peekable();
    if present.peek().is_some() && present.all(|value| value.as_f64().is_some()) {
        VariableType::Numeric
    } else {
        VariableType::Categorical
    }
}

#[derive(Clone, Debug, PartialEq)]
struct TestOutcome {
    kind: TestKind,
    p_value: f64,
    statistic: f64,
    effect_size: f64,
    detail: String,
}

fn chi_square(dataset: &Dataset, a: &str, b: &str) -> Result<TestOutcome, CapabilityError> {
    let table = dataset
        .crosstab(a, b)
        .ok_or_else(|| rejected(format!("cannot cross-tabulate `{a}` and `{b}`")))?;
    let rows = table.row_levels.len();
    let columns = table.column_levels.len();
    if rows < 2 || columns < 2 {
        return Err(rejected(format!(
            "chi-square needs at least two levels per variable; `{a}` has {rows}, `{b}` has {columns}"
        )));
    }

    let (statistic, dof) = chi_square_statistic(&table);
    let total = table.total();
    let p_value = ChiSquared::new(dof)
        .map_err(|error| rejected(error.to_string()))?
        .sf(statistic);
    let min_dim = rows.min(columns) as f64;
    let cramers_v = (statistic / (total * (min_dim - 1.0))).sqrt();

    Ok(TestOutcome {
        kind: TestKind::ChiSquare,
        p_value,
        statistic,
        effect_size: cramers_v,
        detail: format!("{rows}x{columns} contingency table over {total} observations"),
    })
}

/// Pearson statistic and degrees of freedom; applies Yates' correction on 2x2 tables.
fn chi_square_statistic(table: &Contingency) -> (f64, f64) {
    let total = table.total();
    let row_totals = table.counts.iter().map(|row| row.iter().sum::<f64>()).collect::<Vec<_>>();
    let column_totals = (0..table.column_levels.len())
        .map(|column| table.counts.iter().map(|row| row[column]).sum::<f64>())
        .collect::<Vec<_>>();
    let dof = ((table.row_levels.len() - 1) * (table.column_levels.len() - 1)) as f64;
    let yates = dof == 1.0;

    let mut statistic = 0.0;
    for (row_index, row) in table.counts.iter().enumerate() {
        for (column_index, observed) in row.iter().enumerate() {
            let expected = row_totals[row_index] * column_totals[column_index] / total;
            if expected <= 0.0 {
                continue;
            }
            let mut deviation = (observed - expected).abs();
            if yates {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }

    (statistic, dof)
}

fn compare_means(
    dataset: &Dataset,
    categorical: &str,
    numeric: &str,
) -> Result<TestOutcome, CapabilityError> {
    let groups = dataset
        .grouped_numeric(categorical, numeric)
        .ok_or_else(|| rejected(format!("cannot group `{numeric}` by `{categorical}`")))?
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect::<Vec<_>>();

    match groups.len() {
        0 | 1 => Err(rejected(format!(
            "`{categorical}` needs at least two groups with `{numeric}` values, found {}",
            groups.len()
        ))),
        2 => t_test(&groups, numeric),
        _ => anova(&groups, numeric),
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_variance(values: &[f64]) -> f64 {
    let center = mean(values);
    values.iter().map(|value| (value - center).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

fn t_test(groups: &[(String, Vec<f64>)], numeric: &str) -> Result<TestOutcome, CapabilityError> {
    let (label_1, first) = &groups[0];
    let (label_2, second) = &groups[1];
    if first.len() < 2 || second.len() < 2 {
        return Err(rejected("t-test needs at least two observations per group"));
    }

    let n1 = first.len() as f64;
    let n2 = second.len() as f64;
    let mean_1 = mean(first);
    let mean_2 = mean(second);
    let pooled_variance =
        ((n1 - 1.0) * sample_variance(first) + (n2 - 1.0) * sample_variance(second)) / (n1 + n2 - 2.0);
    if pooled_variance <= 0.0 || !pooled_variance.is_finite() {
        return Err(rejected(format!("`{numeric}` has no variance within groups")));
    }

    let pooled_sd = pooled_variance.sqrt();
    let statistic = (mean_1 - mean_2) / (pooled_sd * (1.0 / n1 + 1.0 / n2).sqrt());
    let dof = n1 + n2 - 2.0;
    let p_value = two_sided_t(statistic, dof)?;
    let cohens_d = (mean_1 - mean_2) / pooled_sd;

    let (higher, lower) = if mean_1 >= mean_2 { (label_1, label_2) } else { (label_2, label_1) };
    Ok(TestOutcome {
        kind: TestKind::TTest,
        p_value,
        statistic,
        effect_size: cohens_d,
        detail: format!(
            "mean {numeric} is {:.2} for {label_1} and {:.2} for {label_2}; {higher} is higher than {lower}",
            mean_1, mean_2
        ),
    })
}

fn anova(groups: &[(String, Vec<f64>)], numeric: &str) -> Result<TestOutcome, CapabilityError> {
    let all = groups.iter().flat_map(|(_, values)| values.iter().copied()).collect::<Vec<_>>();
    let k = groups.len() as f64;
    let n = all.len() as f64;
    if n <= k {
        return Err(rejected("anova needs more observations than groups"));
    }

    let grand_mean = mean(&all);
    let ss_between = groups
        .iter()
        .map(|(_, values)| values.len() as f64 * (mean(values) - grand_mean).powi(2))
        .sum::<f64>();
    let ss_within = groups
        .iter()
        .map(|(_, values)| {
            let center = mean(values);
            values.iter().map(|value| (value - center).powi(2)).sum::<f64>()
        })
        .sum::<f64>();
    if ss_within <= 0.0 {
        return Err(rejected(format!("`{numeric}` has no variance within groups")));
    }

    let df_between = k - 1.0;
    let df_within = n - k;
    let statistic = (ss_between / df_between) / (ss_within / df_within);
    let p_value = FisherSnedecor::new(df_between, df_within)
        .map_err(|error| rejected(error.to_string()))?
        .sf(statistic);
    let eta_squared = ss_between / (ss_between + ss_within);

    let (top_label, top_mean) = groups
        .iter()
        .map(|(label, values)| (label, mean(values)))
        .fold((&groups[0].0, f64::NEG_INFINITY), |best, current| {
            if current.1 > best.1 { current } else { best }
        });

    Ok(TestOutcome {
        kind: TestKind::Anova,
        p_value,
        statistic,
        effect_size: eta_squared,
        detail: format!(
            "{} groups compared; highest mean {numeric} is {top_mean:.2} for {top_label}",
            groups.len()
        ),
    })
}

fn correlation(dataset: &Dataset, a: &str, b: &str) -> Result<TestOutcome, CapabilityError> {
    let pairs = dataset
        .paired_numeric(a, b)
        .ok_or_else(|| rejected(format!("cannot pair `{a}` with `{b}`")))?;
    if pairs.len() < 3 {
        return Err(rejected("correlation needs at least three paired observations"));
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        covariance += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return Err(rejected(format!("`{a}` or `{b}` is constant")));
    }

    let r = (covariance / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0);
    let dof = n - 2.0;
    let p_value = if 1.0 - r.abs() < f64::EPSILON {
        0.0
    } else {
        two_sided_t(r * (dof / (1.0 - r * r)).sqrt(), dof)?
    };

    Ok(TestOutcome {
        kind: TestKind::Correlation,
        p_value,
        statistic: r,
        effect_size: r * r,
        detail: format!(
            "{} {} correlation (r = {r:.3}) over {} pairs",
            correlation_strength(r),
            if r >= 0.0 { "positive" } else { "negative" },
            pairs.len()
        ),
    })
}

fn two_sided_t(statistic: f64, dof: f64) -> Result<f64, CapabilityError> {
    let distribution = StudentsT::new(0.0, 1.0, dof).map_err(|error| rejected(error.to_string()))?;
    Ok((2.0 * distribution.sf(statistic.abs())).min(1.0))
}

fn significance_label(p_value: f64) -> &'static str {
    if p_value < 0.001 {
        "Highly significant"
    } else if p_value < 0.01 {
        "Very significant"
    } else if p_value < SIGNIFICANCE_LEVEL {
        "Significant"
    } else {
        "Not significant"
    }
}

fn cohens_d_label(d: f64) -> &'static str {
    match d.abs() {
        d if d < 0.2 => "negligible",
        d if d < 0.5 => "small",
        d if d < 0.8 => "medium",
        _ => "large",
    }
}

fn eta_squared_label(eta: f64) -> &'static str {
    match eta {
        eta if eta < 0.01 => "negligible",
        eta if eta < 0.06 => "small",
        eta if eta < 0.14 => "medium",
        _ => "large",
    }
}

fn cramers_v_label(v: f64) -> &'static str {
    match v {
        v if v < 0.1 => "negligible",
        v if v < 0.3 => "weak",
        v if v < 0.5 => "moderate",
        _ => "strong",
    }
}

fn correlation_strength(r: f64) -> &'static str {
    match r.abs() {
        r if r < 0.1 => "negligible",
        r if r < 0.3 => "weak",
        r if r < 0.5 => "moderate",
        r if r < 0.7 => "strong",
        _ => "very strong",
    }
}

fn interpret(outcome: &TestOutcome) -> String {
    let verdict = significance_label(outcome.p_value);
    let decision = if outcome.p_value < SIGNIFICANCE_LEVEL {
        "reject the null hypothesis"
    } else {
        "fail to reject the null hypothesis"
    };
    let effect = match outcome.kind {
        TestKind::TTest => {
            format!("{} effect (Cohen's d = {:.3})", cohens_d_label(outcome.effect_size), outcome.effect_size)
        }
        TestKind::Anova => {
            format!("{} effect (eta squared = {:.3})", eta_squared_label(outcome.effect_size), outcome.effect_size)
        }
        TestKind::ChiSquare => format!(
            "{} association (Cramer's V = {:.3})",
            cramers_v_label(outcome.effect_size),
            outcome.effect_size
        ),
        TestKind::Correlation => format!("R squared = {:.3}", outcome.effect_size),
    };

    format!(
        "{verdict} (p = {:.4}): {decision}. {}; {effect}.",
        outcome.p_value, outcome.detail
    )
}
