//! # VMSync 平台接入层
//!
//! 虚拟化控制平面的清单模型、配置文档与任务接口。
//!
//! ## 功能
//!
//! - **清单模型**: 虚拟机、数据中心、文件夹、集群、主机、资源池、
//!   网络、数据存储的只读快照
//! - **配置文档**: 一次性声明全部变更的不可变配置文档与构建器
//! - **接口边界**: [`Platform`] trait，调和引擎只依赖这一层
//! - **HTTP 客户端**: [`HttpPlatform`]，Token 会话认证的 REST 实现
//!
//! ## 示例
//!
//! ```ignore
//! use vmsync_platform::{HttpPlatform, Platform, PlatformConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HttpPlatform::new("http://192.168.1.11:8088", PlatformConfig::default())?;
//!     client.login("admin", "password").await?;
//!
//!     if let Some(vm) = client.find_vm_by_uuid("4200f9dc-...").await? {
//!         println!("虚拟机: {} ({})", vm.name, vm.power_state.normalized());
//!     }
//!
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod models;
pub mod spec;

pub use api::Platform;
pub use client::{HttpPlatform, PlatformConfig};
pub use error::{PlatformError, Result};
pub use models::{
    ClusterInfo, Datacenter, DatastoreInfo, DiskDevice, DistributedPortgroupInfo, FileTransferInfo,
    FolderEntry, GuestCredentials, GuestInfo, GuestNicInfo, GuestProcessInfo, GuestProgramSpec,
    HardwareInfo, HostSystem, NetworkInfo, NicDevice, PowerState, ResourcePool, SnapshotInfo,
    SnapshotNode, TaskHandle, TaskInfo, TaskState, ToolsStatus, VirtualDevice, VmSummary,
};
pub use spec::{
    AdapterMapping, CloneSpec, ConfigSpec, ConfigSpecBuilder, CustomizationSpec, DeviceChangeSpec,
    DeviceOperation, DeviceSpec, DiskSpec, FileInfo, FileOperation, GlobalIpSettings,
    LinuxIdentity, NicAdapterType, NicBacking, NicSpec, RelocateSpec, RemoveDeviceSpec,
    ScsiControllerSpec,
};
