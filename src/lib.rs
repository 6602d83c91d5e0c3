//! Briefing - 多分类 AI 晨报与提醒系统
//!
//! 模块划分：
//! - **agent**: 单分类生成包装（Prompt 拼接、限流重试状态机、降级标记）
//! - **alerts**: 从生成文本中提取 `/remind_*` 提醒指令
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、并发限流、编排器、关闭信号
//! - **data**: 外部采集器输出（分类原始数据）的加载
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **notify**: 通知投递（Telegram / 日志）
//! - **observability**: 日志初始化
//! - **pipeline**: 每日简报流水线
//! - **prompts**: 系统提示词加载
//! - **reminders**: 提醒存储、调度与投递 Worker

pub mod agent;
pub mod alerts;
pub mod config;
pub mod core;
pub mod data;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod reminders;

pub use pipeline::{build_orchestrator, DailyPipeline, PipelineSummary};
