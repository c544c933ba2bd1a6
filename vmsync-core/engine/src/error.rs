//! 调和引擎错误定义

use thiserror::Error;

use vmsync_platform::PlatformError;

/// 调和引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 对象解析出多个候选且策略要求失败
    #[error("对象不唯一: {0}")]
    Ambiguous(String),

    /// 期望状态引用的对象不存在
    #[error("对象不存在: {0}")]
    NotFound(String),

    /// 期望状态自身不合法
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 平台侧任务以失败终态结束
    #[error("平台任务失败: {0}")]
    RemoteTask(String),

    /// 任务轮询超出配置的时限
    #[error("任务超时: {0}")]
    Timeout(String),

    /// Guest 工具不可用，Guest 操作无法进行
    #[error("Guest 工具不可用: {0}")]
    ToolingUnavailable(String),

    /// Guest 内程序以非零退出码结束
    #[error("Guest 程序退出码非零: {0}")]
    GuestProgramFailed(String),

    /// 平台接入层错误
    #[error("平台错误: {0}")]
    Platform(#[from] PlatformError),

    /// 文件传输错误
    #[error("文件传输错误: {0}")]
    Transfer(String),
}

/// 调和引擎结果类型
pub type Result<T> = std::result::Result<T, EngineError>;
