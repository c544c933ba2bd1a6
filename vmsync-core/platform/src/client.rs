//! 控制平面 HTTP 客户端
//!
//! [`Platform`] trait 的 REST 实现：登录换取会话令牌，之后所有
//! 请求携带 Token 头。会话与认证细节对调和引擎完全不可见。

use std::sync::Arc;

use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::Platform;
use crate::error::{PlatformError, Result};
use crate::models::{
    ClusterInfo, Datacenter, DatastoreInfo, FileTransferInfo, FolderEntry, GuestCredentials,
    GuestProcessInfo, GuestProgramSpec, HostSystem, NetworkInfo, ResourcePool, TaskHandle,
    TaskInfo, VmSummary,
};
use crate::spec::{CloneSpec, ConfigSpec};

use async_trait::async_trait;

/// HTTP 客户端配置
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// 连接超时（秒）
    pub connect_timeout: u64,

    /// 请求超时（秒）
    pub request_timeout: u64,

    /// 是否验证 SSL 证书
    pub verify_ssl: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
            request_timeout: 30,
            verify_ssl: true,
        }
    }
}

/// 标准响应封装
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: i64,
    msg: Option<String>,
    data: Option<T>,
}

/// 任务提交响应
#[derive(Debug, Deserialize)]
struct TaskCreated {
    task_id: String,
}

/// URL 签发响应
#[derive(Debug, Deserialize)]
struct UrlIssued {
    url: String,
}

/// 进程启动响应
#[derive(Debug, Deserialize)]
struct ProcessStarted {
    pid: i64,
}

/// 控制平面 HTTP 客户端
pub struct HttpPlatform {
    /// API 基础 URL
    base_url: String,

    /// HTTP 客户端
    http_client: Client,

    /// 会话令牌
    access_token: Arc<RwLock<Option<String>>>,
}

impl HttpPlatform {
    /// 创建新的客户端
    pub fn new(base_url: &str, config: PlatformConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout))
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| PlatformError::HttpError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// 认证登录
    ///
    /// # Arguments
    /// * `username` - 用户名
    /// * `password` - 明文密码(发送前转换为MD5)
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        info!("控制平面登录: {}", username);

        let password_md5 = format!("{:x}", md5::compute(password.as_bytes()));

        let login_url = format!("{}/vmsync/v1/login", self.base_url);
        let login_data = serde_json::json!({
            "username": username,
            "password": password_md5,
        });

        let response = self
            .http_client
            .post(&login_url)
            .json(&login_data)
            .send()
            .await
            .map_err(|e| PlatformError::HttpError(e.to_string()))?;

        let login_result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        if login_result["status"].as_i64().unwrap_or(-1) != 0 {
            let msg = login_result["msg"].as_str().unwrap_or("未知错误");
            return Err(PlatformError::AuthError(format!("登录失败: {}", msg)));
        }

        let token = login_result["data"]["token"]
            .as_str()
            .ok_or_else(|| PlatformError::AuthError("未获取到 Token".to_string()))?
            .to_string();

        *self.access_token.write().await = Some(token);

        info!("控制平面登录成功");
        Ok(())
    }

    /// 注销登出
    pub async fn logout(&self) -> Result<()> {
        info!("控制平面登出");
        *self.access_token.write().await = None;
        Ok(())
    }

    /// 发送请求并解出 data 字段
    async fn request<T: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<T>,
    ) -> Result<R> {
        let envelope = self.send::<T, R>(method, path, body).await?;
        envelope
            .data
            .ok_or_else(|| PlatformError::ParseError(format!("响应缺少 data 字段: {}", path)))
    }

    async fn send<T: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<T>,
    ) -> Result<ApiEnvelope<R>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("控制平面请求: {} {}", method, url);

        let token = self.access_token.read().await;
        let token_str = token
            .as_ref()
            .ok_or_else(|| PlatformError::AuthError("未认证，请先登录".to_string()))?;

        let mut request = self
            .http_client
            .request(method, &url)
            .header("Token", token_str)
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误响应".to_string());
            warn!("API 请求失败: {} - {}", status, error_text);
            return Err(PlatformError::ApiError(status.as_u16(), error_text));
        }

        let envelope = response
            .json::<ApiEnvelope<R>>()
            .await
            .map_err(|e| PlatformError::ParseError(e.to_string()))?;

        if envelope.status != 0 {
            let msg = envelope.msg.unwrap_or_else(|| "未知错误".to_string());
            return Err(PlatformError::OperationFailed(msg));
        }

        Ok(envelope)
    }

    /// 按名称查询，取平台枚举顺序中的第一个匹配
    async fn find_one<R: DeserializeOwned>(&self, path: &str) -> Result<Option<R>> {
        let mut list: Vec<R> = self.request(Method::GET, path, None::<()>).await?;
        if list.is_empty() {
            Ok(None)
        } else {
            Ok(Some(list.remove(0)))
        }
    }

    /// 提交任务类请求
    async fn submit<T: Serialize>(&self, path: &str, body: Option<T>) -> Result<TaskHandle> {
        let created: TaskCreated = self.request(Method::POST, path, body).await?;
        Ok(TaskHandle {
            id: created.task_id,
        })
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    // ============================================
    // 清单查询
    // ============================================

    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VmSummary>> {
        debug!("按 UUID 查找虚拟机: {}", uuid);
        self.find_one(&format!("/vmsync/v1/vm?uuid={}", urlencoding::encode(uuid)))
            .await
    }

    async fn get_vm(&self, vm_id: &str) -> Result<VmSummary> {
        self.request(Method::GET, &format!("/vmsync/v1/vm/{}", vm_id), None::<()>)
            .await
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        self.request(Method::GET, "/vmsync/v1/vm", None::<()>).await
    }

    async fn find_datacenter(&self, name: &str) -> Result<Option<Datacenter>> {
        self.find_one(&format!(
            "/vmsync/v1/datacenter?name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    async fn list_folders(&self, datacenter_id: &str) -> Result<Vec<FolderEntry>> {
        self.request(
            Method::GET,
            &format!("/vmsync/v1/datacenter/{}/folder", datacenter_id),
            None::<()>,
        )
        .await
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>> {
        self.find_one(&format!(
            "/vmsync/v1/cluster?name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    async fn find_host(&self, name: &str) -> Result<Option<HostSystem>> {
        self.find_one(&format!(
            "/vmsync/v1/host?name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    async fn get_host(&self, host_id: &str) -> Result<HostSystem> {
        self.request(
            Method::GET,
            &format!("/vmsync/v1/host/{}", host_id),
            None::<()>,
        )
        .await
    }

    async fn list_resource_pools(&self) -> Result<Vec<ResourcePool>> {
        self.request(Method::GET, "/vmsync/v1/resource-pool", None::<()>)
            .await
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        self.find_one(&format!(
            "/vmsync/v1/network?name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreInfo>> {
        self.find_one(&format!(
            "/vmsync/v1/datastore?name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    async fn get_datastore(&self, datastore_id: &str) -> Result<DatastoreInfo> {
        self.request(
            Method::GET,
            &format!("/vmsync/v1/datastore/{}", datastore_id),
            None::<()>,
        )
        .await
    }

    async fn find_template(&self, name: &str) -> Result<Option<VmSummary>> {
        self.find_one(&format!(
            "/vmsync/v1/vm?template=true&name={}",
            urlencoding::encode(name)
        ))
        .await
    }

    // ============================================
    // 长任务提交
    // ============================================

    async fn power_on(&self, vm_id: &str) -> Result<TaskHandle> {
        info!("开机: {}", vm_id);
        self.submit(&format!("/vmsync/v1/vm/{}/power-on", vm_id), None::<()>)
            .await
    }

    async fn power_off(&self, vm_id: &str) -> Result<TaskHandle> {
        info!("关机: {}", vm_id);
        self.submit(&format!("/vmsync/v1/vm/{}/power-off", vm_id), None::<()>)
            .await
    }

    async fn reset(&self, vm_id: &str) -> Result<TaskHandle> {
        info!("复位: {}", vm_id);
        self.submit(&format!("/vmsync/v1/vm/{}/reset", vm_id), None::<()>)
            .await
    }

    async fn destroy(&self, vm_id: &str) -> Result<TaskHandle> {
        info!("销毁虚拟机: {}", vm_id);
        self.submit(&format!("/vmsync/v1/vm/{}/destroy", vm_id), None::<()>)
            .await
    }

    async fn clone_vm(
        &self,
        template_id: &str,
        folder_id: &str,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskHandle> {
        info!("克隆虚拟机: {} -> {}", template_id, name);
        self.submit(
            &format!("/vmsync/v1/vm/{}/clone", template_id),
            Some(serde_json::json!({
                "folder_id": folder_id,
                "name": name,
                "spec": spec,
            })),
        )
        .await
    }

    async fn create_vm(
        &self,
        folder_id: &str,
        pool_id: &str,
        spec: &ConfigSpec,
    ) -> Result<TaskHandle> {
        info!("创建虚拟机: {:?}", spec.name);
        self.submit(
            "/vmsync/v1/vm",
            Some(serde_json::json!({
                "folder_id": folder_id,
                "pool_id": pool_id,
                "spec": spec,
            })),
        )
        .await
    }

    async fn reconfigure_vm(&self, vm_id: &str, spec: &ConfigSpec) -> Result<TaskHandle> {
        info!("重配置虚拟机: {}", vm_id);
        self.submit(&format!("/vmsync/v1/vm/{}/reconfigure", vm_id), Some(spec))
            .await
    }

    async fn create_snapshot(
        &self,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<TaskHandle> {
        info!("创建快照: {} -> {}", vm_id, name);
        self.submit(
            &format!("/vmsync/v1/vm/{}/snapshot", vm_id),
            Some(serde_json::json!({
                "name": name,
                "description": description,
            })),
        )
        .await
    }

    async fn remove_snapshot(
        &self,
        vm_id: &str,
        snapshot_id: &str,
        remove_children: bool,
    ) -> Result<TaskHandle> {
        info!("删除快照: {} -> {}", vm_id, snapshot_id);
        self.submit(
            &format!("/vmsync/v1/vm/{}/snapshot/{}/remove", vm_id, snapshot_id),
            Some(serde_json::json!({ "remove_children": remove_children })),
        )
        .await
    }

    async fn revert_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<TaskHandle> {
        info!("恢复到快照: {} -> {}", vm_id, snapshot_id);
        self.submit(
            &format!("/vmsync/v1/vm/{}/snapshot/{}/revert", vm_id, snapshot_id),
            None::<()>,
        )
        .await
    }

    async fn remove_all_snapshots(&self, vm_id: &str) -> Result<TaskHandle> {
        info!("删除全部快照: {}", vm_id);
        self.submit(
            &format!("/vmsync/v1/vm/{}/snapshot/remove-all", vm_id),
            None::<()>,
        )
        .await
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskInfo> {
        self.request(
            Method::GET,
            &format!("/vmsync/v1/task/{}", task_id),
            None::<()>,
        )
        .await
    }

    // ============================================
    // Guest 操作
    // ============================================

    async fn guest_file_download(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        guest_path: &str,
    ) -> Result<FileTransferInfo> {
        info!("签发 Guest 文件下载 URL: {} {}", vm_id, guest_path);
        self.request(
            Method::POST,
            &format!("/vmsync/v1/vm/{}/guest/file-download", vm_id),
            Some(serde_json::json!({
                "auth": auth,
                "guest_path": guest_path,
            })),
        )
        .await
    }

    async fn guest_file_upload(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        guest_path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<String> {
        info!("签发 Guest 文件上传 URL: {} {}", vm_id, guest_path);
        let issued: UrlIssued = self
            .request(
                Method::POST,
                &format!("/vmsync/v1/vm/{}/guest/file-upload", vm_id),
                Some(serde_json::json!({
                    "auth": auth,
                    "guest_path": guest_path,
                    "size": size,
                    "overwrite": overwrite,
                })),
            )
            .await?;
        Ok(issued.url)
    }

    async fn guest_start_program(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        spec: &GuestProgramSpec,
    ) -> Result<i64> {
        info!("Guest 内启动程序: {} {}", vm_id, spec.program_path);
        let started: ProcessStarted = self
            .request(
                Method::POST,
                &format!("/vmsync/v1/vm/{}/guest/process", vm_id),
                Some(serde_json::json!({
                    "auth": auth,
                    "spec": spec,
                })),
            )
            .await?;
        Ok(started.pid)
    }

    async fn guest_list_processes(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        pids: &[i64],
    ) -> Result<Vec<GuestProcessInfo>> {
        let ids = pids
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.request(
            Method::POST,
            &format!("/vmsync/v1/vm/{}/guest/process/query?pids={}", vm_id, ids),
            Some(serde_json::json!({ "auth": auth })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpPlatform::new("http://192.168.1.11:8088/", PlatformConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HttpPlatform::new("http://cp.example.com:8088///", PlatformConfig::default()).unwrap();
        assert_eq!(client.base_url, "http://cp.example.com:8088");
    }

    #[test]
    fn test_envelope_parsing() {
        let raw = r#"{"status":0,"msg":null,"data":{"task_id":"task-7"}}"#;
        let envelope: ApiEnvelope<TaskCreated> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.status, 0);
        assert_eq!(envelope.data.unwrap().task_id, "task-7");
    }
}
