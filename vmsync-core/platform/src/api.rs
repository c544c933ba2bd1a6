//! 控制平面接口边界
//!
//! 调和引擎只依赖这里的 [`Platform`] trait：清单查询、长任务提交、
//! 任务轮询与 Guest 操作。HTTP 实现见 [`crate::client::HttpPlatform`]，
//! 测试使用内存假实现。
//!
//! 所有任务提交调用立即返回 [`TaskHandle`]，不等待完成；平台不会
//! 主动推送事件，调用方需要轮询 [`Platform::get_task`]。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ClusterInfo, Datacenter, DatastoreInfo, FileTransferInfo, FolderEntry, GuestCredentials,
    GuestProcessInfo, GuestProgramSpec, HostSystem, NetworkInfo, ResourcePool, TaskHandle,
    TaskInfo, VmSummary,
};
use crate::spec::{CloneSpec, ConfigSpec};

/// 虚拟化控制平面
#[async_trait]
pub trait Platform: Send + Sync {
    // ============================================
    // 清单查询
    // ============================================

    /// 按实例 UUID 精确查找虚拟机（全局唯一，最多一个结果）
    async fn find_vm_by_uuid(&self, uuid: &str) -> Result<Option<VmSummary>>;

    /// 按 ID 读取虚拟机（重新拉取最新状态）
    async fn get_vm(&self, vm_id: &str) -> Result<VmSummary>;

    /// 枚举全部虚拟机（平台枚举顺序）
    async fn list_vms(&self) -> Result<Vec<VmSummary>>;

    /// 按名称查找数据中心
    async fn find_datacenter(&self, name: &str) -> Result<Option<Datacenter>>;

    /// 枚举数据中心下的全部虚拟机文件夹（扁平记录）
    async fn list_folders(&self, datacenter_id: &str) -> Result<Vec<FolderEntry>>;

    /// 按名称查找集群
    async fn find_cluster(&self, name: &str) -> Result<Option<ClusterInfo>>;

    /// 按名称查找主机
    async fn find_host(&self, name: &str) -> Result<Option<HostSystem>>;

    /// 按 ID 读取主机
    async fn get_host(&self, host_id: &str) -> Result<HostSystem>;

    /// 枚举全部资源池
    async fn list_resource_pools(&self) -> Result<Vec<ResourcePool>>;

    /// 按名称查找网络（端口组）
    async fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>>;

    /// 按名称查找数据存储
    async fn find_datastore(&self, name: &str) -> Result<Option<DatastoreInfo>>;

    /// 按 ID 读取数据存储
    async fn get_datastore(&self, datastore_id: &str) -> Result<DatastoreInfo>;

    /// 按名称查找模板虚拟机
    async fn find_template(&self, name: &str) -> Result<Option<VmSummary>>;

    // ============================================
    // 长任务提交
    // ============================================

    /// 开机
    async fn power_on(&self, vm_id: &str) -> Result<TaskHandle>;

    /// 关机（硬关机）
    async fn power_off(&self, vm_id: &str) -> Result<TaskHandle>;

    /// 复位（重启）
    async fn reset(&self, vm_id: &str) -> Result<TaskHandle>;

    /// 销毁虚拟机
    async fn destroy(&self, vm_id: &str) -> Result<TaskHandle>;

    /// 从模板克隆
    async fn clone_vm(
        &self,
        template_id: &str,
        folder_id: &str,
        name: &str,
        spec: &CloneSpec,
    ) -> Result<TaskHandle>;

    /// 全新创建
    async fn create_vm(
        &self,
        folder_id: &str,
        pool_id: &str,
        spec: &ConfigSpec,
    ) -> Result<TaskHandle>;

    /// 重配置既有虚拟机
    async fn reconfigure_vm(&self, vm_id: &str, spec: &ConfigSpec) -> Result<TaskHandle>;

    /// 创建快照
    async fn create_snapshot(
        &self,
        vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<TaskHandle>;

    /// 删除单个快照
    async fn remove_snapshot(
        &self,
        vm_id: &str,
        snapshot_id: &str,
        remove_children: bool,
    ) -> Result<TaskHandle>;

    /// 恢复到快照
    async fn revert_snapshot(&self, vm_id: &str, snapshot_id: &str) -> Result<TaskHandle>;

    /// 删除全部快照
    async fn remove_all_snapshots(&self, vm_id: &str) -> Result<TaskHandle>;

    /// 查询任务状态
    async fn get_task(&self, task_id: &str) -> Result<TaskInfo>;

    // ============================================
    // Guest 操作
    // ============================================

    /// 签发 Guest 文件下载 URL
    async fn guest_file_download(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        guest_path: &str,
    ) -> Result<FileTransferInfo>;

    /// 签发 Guest 文件上传 URL
    async fn guest_file_upload(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        guest_path: &str,
        size: u64,
        overwrite: bool,
    ) -> Result<String>;

    /// 在 Guest 内启动程序，返回进程 ID
    async fn guest_start_program(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        spec: &GuestProgramSpec,
    ) -> Result<i64>;

    /// 查询 Guest 内进程
    async fn guest_list_processes(
        &self,
        vm_id: &str,
        auth: &GuestCredentials,
        pids: &[i64],
    ) -> Result<Vec<GuestProcessInfo>>;
}
