//! Partition-to-server assignment

pub mod planner;

pub use planner::{AssignmentPlanner, PlanError};
