#![allow(
    clippy::needless_pass_by_value,
    clippy::large_enum_variant,
    clippy::match_like_matches_macro,
    clippy::redundant_closure,
    clippy::float_cmp,
    clippy::match_same_arms,
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions,
    clippy::similar_names
)]

pub mod config;
pub mod error;
pub mod executor;
pub mod parser;
pub mod storage;
pub mod tcop;
pub mod utils;
