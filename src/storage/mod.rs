//! Storage模块 - 配置读写与输出文件

pub mod config;
pub mod output;
