use crate::commands::{load_config, migrated_pool, runtime, CommandResult, Failure};

pub fn run() -> CommandResult {
    match execute() {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}

fn execute() -> Result<(), Failure> {
    let config = load_config()?;
    runtime()?.block_on(async {
        let pool = migrated_pool(&config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    })
}
