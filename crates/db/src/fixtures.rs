use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::connection::DbPool;
use crate::errors::DbError;
use crate::schema::HR_TABLE;

/// Number of employees in the demo dataset.
pub const DEMO_EMPLOYEE_COUNT: usize = 240;

const SEED: u64 = 0x5eed_1a7e_2024;

const COLUMNS: &[&str] = &[
    "employeenumber",
    "age",
    "attrition",
    "businesstravel",
    "department",
    "distancefromhome",
    "education",
    "educationfield",
    "environmentsatisfaction",
    "gender",
    "jobinvolvement",
    "joblevel",
    "jobrole",
    "jobsatisfaction",
    "maritalstatus",
    "monthlyincome",
    "overtime",
    "percentsalaryhike",
    "performancerating",
    "relationshipsatisfaction",
    "totalworkingyears",
    "worklifebalance",
    "yearsatcompany",
    "yearsincurrentrole",
    "yearssincelastpromotion",
    "yearswithcurrmanager",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmployeeRecord {
    pub employee_number: i64,
    pub age: i64,
    pub attrition: &'static str,
    pub business_travel: &'static str,
    pub department: &'static str,
    pub distance_from_home: i64,
    pub education: i64,
    pub education_field: &'static str,
    pub environment_satisfaction: i64,
    pub gender: &'static str,
    pub job_involvement: i64,
    pub job_level: i64,
    pub job_role: &'static str,
    pub job_satisfaction: i64,
    pub marital_status: &'static str,
    pub monthly_income: i64,
    pub overtime: &'static str,
    pub percent_salary_hike: i64,
    pub performance_rating: i64,
    pub relationship_satisfaction: i64,
    pub total_working_years: i64,
    pub work_life_balance: i64,
    pub years_at_company: i64,
    pub years_in_current_role: i64,
    pub years_since_last_promotion: i64,
    pub years_with_curr_manager: i64,
}

/// Deterministic pseudo-random source so every seed produces the same table.
struct SplitMix(u64);

impl SplitMix {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: i64) -> i64 {
        (self.next() % bound.max(1) as u64) as i64
    }

    fn between(&mut self, low: i64, high: i64) -> i64 {
        low + self.below(high - low + 1)
    }

    fn pick<T: Copy>(&mut self, choices: &[T]) -> T {
        choices[self.below(choices.len() as i64) as usize]
    }
}

/// Synthetic HR records with the relationships the demo questions look for:
/// overtime, low satisfaction, junior level and frequent travel raise attrition.
pub fn demo_employees() -> Vec<EmployeeRecord> {
    let mut rng = SplitMix(SEED);
    (0..DEMO_EMPLOYEE_COUNT).map(|index| employee(&mut rng, index as i64 + 1)).collect()
}

fn employee(rng: &mut SplitMix, employee_number: i64) -> EmployeeRecord {
    let department = match rng.below(20) {
        0..=12 => "Research & Development",
        13..=18 => "Sales",
        _ => "Human Resources",
    };
    let age = rng.between(18, 60);
    let seniority = ((age - 18) / 9).min(3);
    let job_level = (1 + rng.below(2) + seniority).min(5);
    let job_role = match (department, job_level) {
        (_, 5) => "Manager",
        ("Sales", 1) => "Sales Representative",
        ("Sales", _) => "Sales Executive",
        ("Human Resources", _) => "Human Resources",
        (_, 1) => rng.pick(&["Laboratory Technician", "Research Scientist"]),
        (_, 4) => rng.pick(&["Research Director", "Manufacturing Director"]),
        _ => rng.pick(&["Research Scientist", "Healthcare Representative", "Manufacturing Director"]),
    };
    let education_field = match department {
        "Sales" => rng.pick(&["Marketing", "Life Sciences", "Other"]),
        "Human Resources" => rng.pick(&["Human Resources", "Other"]),
        _ => rng.pick(&["Life Sciences", "Medical", "Technical Degree", "Other"]),
    };

    let monthly_income = 1_200 + job_level * 2_900 + rng.below(2_400)
        + if department == "Sales" { 350 } else { 0 };
    let overtime = if rng.below(100) < 28 { "Yes" } else { "No" };
    let business_travel = match rng.below(10) {
        0 | 1 => "Non-Travel",
        2..=7 => "Travel_Rarely",
        _ => "Travel_Frequently",
    };
    let marital_status = match rng.below(10) {
        0..=3 => "Single",
        4..=8 => "Married",
        _ => "Divorced",
    };
    let gender = if rng.below(5) < 3 { "Male" } else { "Female" };

    let job_satisfaction = rng.between(1, 4);
    let environment_satisfaction = rng.between(1, 4);
    let relationship_satisfaction = rng.between(1, 4);
    let work_life_balance = rng.between(1, 4);
    let job_involvement = rng.between(1, 4);

    let total_working_years = (age - 18 - rng.below(4)).max(0);
    let years_at_company = rng.below(total_working_years.min(30) + 1);
    let years_in_current_role = rng.below(years_at_company + 1).min(years_at_company);
    let years_since_last_promotion = rng.below(years_at_company.min(10) + 1);
    let years_with_curr_manager = rng.below(years_in_current_role + 1);
    let percent_salary_hike = rng.between(11, 25);
    let performance_rating = if percent_salary_hike >= 20 { 4 } else { 3 };

    let mut risk = 5;
    if overtime == "Yes" {
        risk += 25;
    }
    if job_satisfaction == 1 {
        risk += 12;
    }
    if environment_satisfaction == 1 {
        risk += 8;
    }
    if job_level == 1 {
        risk += 12;
    }
    if age < 28 {
        risk += 8;
    }
    if business_travel == "Travel_Frequently" {
        risk += 10;
    }
    if marital_status == "Single" {
        risk += 6;
    }
    if work_life_balance == 1 {
        risk += 8;
    }
    let attrition = if rng.below(100) < risk { "Yes" } else { "No" };

    EmployeeRecord {
        employee_number,
        age,
        attrition,
        business_travel,
        department,
        distance_from_home: rng.between(1, 29),
        education: rng.between(1, 5),
        education_field,
        environment_satisfaction,
        gender,
        job_involvement,
        job_level,
        job_role,
        job_satisfaction,
        marital_status,
        monthly_income,
        overtime,
        percent_salary_hike,
        performance_rating,
        relationship_satisfaction,
        total_working_years,
        work_life_balance,
        years_at_company,
        years_in_current_role,
        years_since_last_promotion,
        years_with_curr_manager,
    }
}

/// Demo dataset lifecycle used by `insight seed` and the tests.
pub struct HrSeedDataset;

impl HrSeedDataset {
    /// Replaces the table contents with [`demo_employees`].
    pub async fn load(pool: &DbPool) -> Result<SeedResult, DbError> {
        let employees = demo_employees();
        let mut tx = pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {HR_TABLE}")).execute(&mut *tx).await?;

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("INSERT INTO {HR_TABLE} ({}) ", COLUMNS.join(", ")));
        builder.push_values(&employees, |mut row, employee| {
            row.push_bind(employee.employee_number)
                .push_bind(employee.age)
                .push_bind(employee.attrition)
                .push_bind(employee.business_travel)
                .push_bind(employee.department)
                .push_bind(employee.distance_from_home)
                .push_bind(employee.education)
                .push_bind(employee.education_field)
                .push_bind(employee.environment_satisfaction)
                .push_bind(employee.gender)
                .push_bind(employee.job_involvement)
                .push_bind(employee.job_level)
                .push_bind(employee.job_role)
                .push_bind(employee.job_satisfaction)
                .push_bind(employee.marital_status)
                .push_bind(employee.monthly_income)
                .push_bind(employee.overtime)
                .push_bind(employee.percent_salary_hike)
                .push_bind(employee.performance_rating)
                .push_bind(employee.relationship_satisfaction)
                .push_bind(employee.total_working_years)
                .push_bind(employee.work_life_balance)
                .push_bind(employee.years_at_company)
                .push_bind(employee.years_in_current_role)
                .push_bind(employee.years_since_last_promotion)
                .push_bind(employee.years_with_curr_manager);
        });
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            employees_inserted: employees.len(),
            attrition_count: employees.iter().filter(|employee| employee.attrition == "Yes").count(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, DbError> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS employees,
                    SUM(CASE WHEN attrition = 'Yes' THEN 1 ELSE 0 END) AS leavers,
                    COUNT(DISTINCT department) AS departments
             FROM {HR_TABLE}"
        ))
        .fetch_one(pool)
        .await?;

        let employee_count = row.try_get::<i64, _>("employees")?;
        let attrition_count = row.try_get::<Option<i64>, _>("leavers")?.unwrap_or(0);
        let department_count = row.try_get::<i64, _>("departments")?;
        let expected = demo_employees();
        let expected_attrition =
            expected.iter().filter(|employee| employee.attrition == "Yes").count() as i64;

        Ok(VerificationResult {
            employee_count,
            attrition_count,
            department_count,
            matches_fixture: employee_count == expected.len() as i64
                && attrition_count == expected_attrition,
        })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), DbError> {
        sqlx::query(&format!("DELETE FROM {HR_TABLE}")).execute(pool).await?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub employees_inserted: usize,
    pub attrition_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub employee_count: i64,
    pub attrition_count: i64,
    pub department_count: i64,
    pub matches_fixture: bool,
}
