//! 调和引擎运行配置

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 多候选匹配处理策略
///
/// 文件夹后缀匹配、全局按名匹配、同名快照匹配统一受此策略约束。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// 多候选即失败（默认）
    #[default]
    Fail,

    /// 取平台枚举顺序中的第一个候选
    First,
}

/// 调和引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 任务轮询间隔
    pub task_poll_interval: Duration,

    /// 任务轮询总时限（None 表示无限等待）
    pub task_timeout: Option<Duration>,

    /// 等待 Guest IP 上报的最大轮询次数
    pub ip_poll_count: u32,

    /// 等待 Guest IP 上报的轮询间隔
    pub ip_poll_interval: Duration,

    /// 多候选匹配处理策略
    pub ambiguity: AmbiguityPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_poll_interval: Duration::from_secs(1),
            task_timeout: None,
            ip_poll_count: 100,
            ip_poll_interval: Duration::from_secs(5),
            ambiguity: AmbiguityPolicy::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.task_poll_interval, Duration::from_secs(1));
        assert!(config.task_timeout.is_none());
        assert_eq!(config.ip_poll_count, 100);
        assert_eq!(config.ambiguity, AmbiguityPolicy::Fail);
    }
}
