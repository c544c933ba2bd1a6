//! Guest 内操作
//!
//! 文件传输与程序执行都要求 Guest 工具在位。文件不走控制平面
//! 中转：平台只签发一次性 URL，内容直接与宿主机传输。程序执行
//! 是提交加轮询，直到进程表上报结束时间。

use std::path::Path;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use vmsync_platform::{GuestCredentials, GuestProgramSpec, Platform, VmSummary};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Guest 操作执行器
pub struct GuestOps<'a> {
    platform: &'a dyn Platform,
    config: &'a EngineConfig,
    http: reqwest::Client,
}

impl<'a> GuestOps<'a> {
    pub fn new(platform: &'a dyn Platform, config: &'a EngineConfig) -> Self {
        Self {
            platform,
            config,
            http: reqwest::Client::new(),
        }
    }

    fn require_tools(vm: &VmSummary) -> Result<()> {
        if vm.guest.tools_status.is_usable() {
            Ok(())
        } else {
            Err(EngineError::ToolingUnavailable(format!(
                "虚拟机 {} 的 Guest 工具状态为 {:?}",
                vm.name, vm.guest.tools_status
            )))
        }
    }

    /// 从 Guest 内取回文件到本地路径
    pub async fn fetch_file(
        &self,
        vm: &VmSummary,
        auth: &GuestCredentials,
        guest_path: &str,
        local_path: &Path,
    ) -> Result<u64> {
        Self::require_tools(vm)?;
        info!("取回 Guest 文件: {} {}", vm.name, guest_path);

        let transfer = self
            .platform
            .guest_file_download(&vm.id, auth, guest_path)
            .await?;

        let response = self
            .http
            .get(&transfer.url)
            .send()
            .await
            .map_err(|e| EngineError::Transfer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Transfer(format!(
                "下载失败: HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::Transfer(e.to_string()))?;

        tokio::fs::write(local_path, &bytes)
            .await
            .map_err(|e| EngineError::Transfer(format!("写入本地文件失败: {}", e)))?;

        debug!("取回完成: {} 字节", bytes.len());
        Ok(bytes.len() as u64)
    }

    /// 把本地文件推送到 Guest 内路径
    pub async fn push_file(
        &self,
        vm: &VmSummary,
        auth: &GuestCredentials,
        local_path: &Path,
        guest_path: &str,
        overwrite: bool,
    ) -> Result<u64> {
        Self::require_tools(vm)?;
        info!("推送 Guest 文件: {} -> {} {}", local_path.display(), vm.name, guest_path);

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|e| EngineError::Transfer(format!("读取本地文件失败: {}", e)))?;
        let size = content.len() as u64;

        let url = self
            .platform
            .guest_file_upload(&vm.id, auth, guest_path, size, overwrite)
            .await?;

        let response = self
            .http
            .put(&url)
            .body(content)
            .send()
            .await
            .map_err(|e| EngineError::Transfer(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngineError::Transfer(format!(
                "上传失败: HTTP {}",
                response.status()
            )));
        }

        Ok(size)
    }

    /// 在 Guest 内执行程序
    ///
    /// `wait` 为 false 时启动后立即返回 None；否则轮询进程表直到
    /// 上报结束时间，非零退出码视为失败。
    pub async fn run_command(
        &self,
        vm: &VmSummary,
        auth: &GuestCredentials,
        spec: &GuestProgramSpec,
        wait: bool,
    ) -> Result<Option<i32>> {
        Self::require_tools(vm)?;

        let pid = self.platform.guest_start_program(&vm.id, auth, spec).await?;
        info!("Guest 程序已启动: {} pid={}", spec.program_path, pid);
        if !wait {
            return Ok(None);
        }

        let started = Instant::now();
        loop {
            let processes = self
                .platform
                .guest_list_processes(&vm.id, auth, &[pid])
                .await?;
            let process = processes.iter().find(|p| p.pid == pid);

            if let Some(process) = process {
                if process.end_time.is_some() {
                    let exit_code = process.exit_code.unwrap_or(0);
                    debug!("Guest 程序结束: pid={} 退出码={}", pid, exit_code);
                    if exit_code != 0 {
                        return Err(EngineError::GuestProgramFailed(format!(
                            "{} 退出码 {}",
                            spec.program_path, exit_code
                        )));
                    }
                    return Ok(Some(exit_code));
                }
            } else {
                // 进程表已查不到且从未见到结束时间，按异常结束处理
                return Err(EngineError::GuestProgramFailed(format!(
                    "进程 {} 从进程表消失",
                    pid
                )));
            }

            if let Some(timeout) = self.config.task_timeout {
                if started.elapsed() >= timeout {
                    return Err(EngineError::Timeout(format!(
                        "Guest 程序 pid={} 超过 {:?} 未结束",
                        pid, timeout
                    )));
                }
            }

            sleep(self.config.task_poll_interval).await;
        }
    }
}
