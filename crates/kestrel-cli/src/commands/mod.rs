//! Command implementations; each returns whether the run succeeded

pub mod check;
pub mod compile;
pub mod run;
