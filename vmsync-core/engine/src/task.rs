//! 长任务编排
//!
//! 平台只接受轮询，不推送事件。提交后按固定间隔轮询任务状态，
//! 轮询间隙通过 `tokio::time::sleep` 挂起，不占用执行线程。

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use vmsync_platform::{Platform, TaskHandle, TaskInfo, TaskState};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// 任务编排器
pub struct TaskOrchestrator<'a> {
    platform: &'a dyn Platform,
    config: &'a EngineConfig,
}

impl<'a> TaskOrchestrator<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a EngineConfig) -> Self {
        Self { platform, config }
    }

    /// 轮询任务直到终态
    ///
    /// 成功终态返回任务信息；失败终态转为错误并带上平台上报的
    /// 消息；配置了总时限且超出时返回超时错误。
    pub async fn run(&self, handle: &TaskHandle) -> Result<TaskInfo> {
        let started = Instant::now();

        loop {
            let info = self.platform.get_task(&handle.id).await?;
            debug!("任务 {} 状态: {:?}", handle.id, info.state);

            match info.state {
                TaskState::Success => return Ok(info),
                TaskState::Error => {
                    let msg = info
                        .error_message
                        .unwrap_or_else(|| "平台未上报错误消息".to_string());
                    warn!("任务 {} 失败: {}", handle.id, msg);
                    return Err(EngineError::RemoteTask(msg));
                }
                TaskState::Queued | TaskState::Running => {}
            }

            if let Some(timeout) = self.config.task_timeout {
                if started.elapsed() >= timeout {
                    return Err(EngineError::Timeout(format!(
                        "任务 {} 超过 {:?} 未到终态",
                        handle.id, timeout
                    )));
                }
            }

            sleep(self.config.task_poll_interval).await;
        }
    }
}
