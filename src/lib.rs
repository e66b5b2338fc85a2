pub mod activity;
pub mod dataset;
pub mod elo;
pub mod feature_query;
pub mod form;
pub mod h2h;
pub mod level_exp;
pub mod match_store;
pub mod pipeline;
pub mod serve_stats;
pub mod snapshot;
pub mod state_store;
pub mod synthetic;
pub mod trackers;
