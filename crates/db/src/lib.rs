pub mod connection;
pub mod data_source;
pub mod errors;
pub mod fixtures;
pub mod migrations;
pub mod schema;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use data_source::{load_dataset, SqlDataSource};
pub use errors::DbError;
pub use fixtures::{
    demo_employees, DEMO_EMPLOYEE_COUNT, EmployeeRecord, HrSeedDataset, SeedResult, VerificationResult,
};
pub use schema::{HR_SCHEMA_DESCRIPTION, HR_TABLE};
