//! Evidence re-derivation: chunk expansion, line grouping, scoring,
//! selection, and validation (C6/C7).

pub mod ranker;
pub mod validator;
