// src/analyze/mod.rs
//! Risk analysis of collected posts via an external language model.

pub mod ai_adapter;

pub use ai_adapter::{RiskAnalyzer, RiskAssessment, ScoreError};
