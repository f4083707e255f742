//! Core模块 - 包含所有核心业务逻辑

pub mod models;
pub mod error;
pub mod scanner;
pub mod extractor;
pub mod categorizer;
pub mod aggregator;
pub mod filter;
pub mod report;
