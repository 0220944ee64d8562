pub mod chart;
pub mod dataset;
pub mod envelope;
pub mod hypothesis;
pub mod question;
pub mod table;
