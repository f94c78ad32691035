// Pipeline composition, topic aggregation and reloading saved runs.

pub mod aggregate;
pub mod reload;
pub mod run;
