use insight_db::{HrSeedDataset, SeedResult, VerificationResult};

use crate::commands::{load_config, migrated_pool, runtime, CommandResult, Failure};

pub fn run() -> CommandResult {
    match execute() {
        Ok((seeded, verification)) => CommandResult::success("seed", summary(&seeded, &verification)),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn execute() -> Result<(SeedResult, VerificationResult), Failure> {
    let config = load_config()?;
    runtime()?.block_on(async {
        let pool = migrated_pool(&config).await?;

        let outcome = async {
            let seeded = HrSeedDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
            let verification = HrSeedDataset::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
            if !verification.matches_fixture {
                return Err((
                    "seed_verification",
                    verification_failure_message(&seeded, &verification),
                    6u8,
                ));
            }
            Ok::<_, Failure>((seeded, verification))
        }
        .await;

        pool.close().await;
        outcome
    })
}

fn summary(seeded: &SeedResult, verification: &VerificationResult) -> String {
    format!(
        "HR attrition dataset loaded: {} employees across {} departments, {} leavers",
        seeded.employees_inserted, verification.department_count, seeded.attrition_count
    )
}

fn verification_failure_message(seeded: &SeedResult, verification: &VerificationResult) -> String {
    format!(
        "seed verification failed: expected {} employees / {} leavers, found {} / {}",
        seeded.employees_inserted,
        seeded.attrition_count,
        verification.employee_count,
        verification.attrition_count
    )
}

#[cfg(test)]
mod tests {
    use insight_db::{SeedResult, VerificationResult};

    use super::{summary, verification_failure_message};

    #[test]
    fn summary_reports_counts() {
        let seeded = SeedResult { employees_inserted: 240, attrition_count: 51 };
        let verification = VerificationResult {
            employee_count: 240,
            attrition_count: 51,
            department_count: 3,
            matches_fixture: true,
        };

        assert_eq!(
            summary(&seeded, &verification),
            "HR attrition dataset loaded: 240 employees across 3 departments, 51 leavers"
        );
    }

    #[test]
    fn verification_message_names_expected_and_found_counts() {
        let seeded = SeedResult { employees_inserted: 240, attrition_count: 51 };
        let verification = VerificationResult {
            employee_count: 239,
            attrition_count: 50,
            department_count: 3,
            matches_fixture: false,
        };

        assert_eq!(
            verification_failure_message(&seeded, &verification),
            "seed verification failed: expected 240 employees / 51 leavers, found 239 / 50"
        );
    }
}
