//! 控制平面清单数据模型
//!
//! 这里的结构体是控制平面对象的只读投影：每次调和运行都从平台
//! 重新拉取（冷启动，不做跨次调用的缓存）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 虚拟机电源状态
///
/// 除稳定态外还包含平台可能上报的过渡态，调和引擎在过渡态下
/// 会拒绝未加 force 的电源操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    PoweringOn,
    PoweringOff,
    Resetting,
    Suspending,
}

impl PowerState {
    /// 归一化的小写名称，用于与期望状态比较
    pub fn normalized(&self) -> &'static str {
        match self {
            PowerState::PoweredOn => "poweredon",
            PowerState::PoweredOff => "poweredoff",
            PowerState::Suspended => "suspended",
            PowerState::PoweringOn => "poweringon",
            PowerState::PoweringOff => "poweringoff",
            PowerState::Resetting => "resetting",
            PowerState::Suspending => "suspending",
        }
    }

    /// 是否处于稳定的开/关机状态
    ///
    /// 挂起和各种进行中的状态都不算稳定，从这些状态出发的电源
    /// 变更需要额外确认。
    pub fn is_settled(&self) -> bool {
        matches!(self, PowerState::PoweredOn | PowerState::PoweredOff)
    }
}

/// Guest 工具运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolsStatus {
    ToolsOk,
    ToolsOld,
    ToolsNotInstalled,
    ToolsNotRunning,
}

impl ToolsStatus {
    /// Guest 操作是否可用
    pub fn is_usable(&self) -> bool {
        matches!(self, ToolsStatus::ToolsOk | ToolsStatus::ToolsOld)
    }
}

/// Guest 内部上报的网卡信息（MAC -> IP 列表）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestNicInfo {
    /// MAC 地址
    pub mac_address: String,

    /// 该网卡上报的 IP 地址列表
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

/// Guest 运行时信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestInfo {
    /// 操作系统完整名称
    #[serde(default)]
    pub full_name: String,

    /// 操作系统标识
    #[serde(default)]
    pub guest_id: String,

    /// Guest 工具状态
    pub tools_status: ToolsStatus,

    /// Guest 上报的网卡列表
    #[serde(default)]
    pub nics: Vec<GuestNicInfo>,
}

/// 虚拟网卡设备
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicDevice {
    /// 设备键值
    pub key: i32,

    /// 设备标签
    pub label: String,

    /// 设备摘要（通常为所连网络名称）
    pub summary: String,

    /// MAC 地址
    pub mac_address: String,

    /// MAC 分配方式 (assigned/generated/manual)
    pub address_type: String,
}

/// 虚拟磁盘设备
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskDevice {
    /// 设备键值
    pub key: i32,

    /// 设备标签
    pub label: String,

    /// 容量 (KB)
    pub capacity_kb: u64,

    /// 所在数据存储 ID
    pub datastore_id: Option<String>,

    /// 是否精简置备
    #[serde(default)]
    pub thin_provisioned: bool,
}

/// 虚拟机硬件设备
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VirtualDevice {
    Nic(NicDevice),
    Disk(DiskDevice),
}

/// 虚拟机硬件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInfo {
    /// CPU 核心数
    pub num_cpu: u32,

    /// 内存大小 (MB)
    pub memory_mb: u64,

    /// 设备列表（保持平台上报顺序）
    #[serde(default)]
    pub devices: Vec<VirtualDevice>,
}

/// 快照树节点
///
/// 子快照按创建顺序排列；树由平台上报，结构上无环。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// 快照 ID
    pub id: String,

    /// 快照名称
    pub name: String,

    /// 快照描述
    #[serde(default)]
    pub description: String,

    /// 创建时间
    pub create_time: DateTime<Utc>,

    /// 创建时的虚拟机电源状态
    pub state: PowerState,

    /// 子快照列表
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

/// 虚拟机快照信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// 当前快照指针
    pub current_snapshot_id: Option<String>,

    /// 根快照列表
    #[serde(default)]
    pub root_snapshots: Vec<SnapshotNode>,
}

/// 虚拟机摘要
///
/// 调和引擎工作所需的完整观测状态，一次查询取回。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    /// 虚拟机 ID
    pub id: String,

    /// 实例 UUID（平台内唯一）
    pub uuid: String,

    /// 显示名称
    pub name: String,

    /// 所在文件夹 ID
    pub folder_id: Option<String>,

    /// 所在主机 ID
    pub host_id: Option<String>,

    /// 是否为模板
    #[serde(default)]
    pub is_template: bool,

    /// 电源状态
    pub power_state: PowerState,

    /// Guest 运行时信息
    pub guest: GuestInfo,

    /// 硬件配置
    pub hardware: HardwareInfo,

    /// 快照树（无快照时为 None）
    pub snapshot: Option<SnapshotInfo>,
}

impl VmSummary {
    /// 取第一块虚拟磁盘
    pub fn first_disk(&self) -> Option<&DiskDevice> {
        self.hardware.devices.iter().find_map(|d| match d {
            VirtualDevice::Disk(disk) => Some(disk),
            _ => None,
        })
    }

    /// 取全部网卡设备
    pub fn nic_devices(&self) -> Vec<&NicDevice> {
        self.hardware
            .devices
            .iter()
            .filter_map(|d| match d {
                VirtualDevice::Nic(nic) => Some(nic),
                _ => None,
            })
            .collect()
    }
}

/// 数据中心
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    /// 数据中心 ID
    pub id: String,

    /// 数据中心名称
    pub name: String,

    /// 虚拟机根文件夹 ID
    pub vm_folder_id: String,
}

/// 文件夹条目（扁平记录，树结构由 parent_id 表达）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderEntry {
    /// 文件夹 ID
    pub id: String,

    /// 文件夹名称
    pub name: String,

    /// 父文件夹 ID（根文件夹为 None）
    pub parent_id: Option<String>,
}

/// 集群
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// 集群 ID
    pub id: String,

    /// 集群名称
    pub name: String,

    /// 集群内主机 ID 列表（保持平台上报顺序）
    #[serde(default)]
    pub host_ids: Vec<String>,
}

/// 宿主机
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSystem {
    /// 主机 ID
    pub id: String,

    /// 主机名称
    pub name: String,

    /// 父计算资源 ID（集群或独立计算资源）
    pub parent_id: Option<String>,
}

/// 资源池
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    /// 资源池 ID
    pub id: String,

    /// 资源池名称
    pub name: String,

    /// 父计算资源 ID
    pub parent_id: Option<String>,
}

/// 数据存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreInfo {
    /// 数据存储 ID
    pub id: String,

    /// 数据存储名称
    pub name: String,
}

/// 分布式端口组信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedPortgroupInfo {
    /// 端口组键值
    pub portgroup_key: String,

    /// 所属分布式交换机 UUID
    pub switch_uuid: String,
}

/// 虚拟网络（端口组）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// 网络 ID
    pub id: String,

    /// 网络名称
    pub name: String,

    /// 分布式端口组信息（标准虚拟交换机网络为 None）
    pub distributed: Option<DistributedPortgroupInfo>,
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    /// 是否已到达终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

/// 任务句柄
///
/// 由任务提交调用返回，仅在一次提交/轮询周期内有效。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    /// 任务 ID
    pub id: String,
}

/// 任务信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// 任务 ID
    pub id: String,

    /// 任务状态
    pub state: TaskState,

    /// 失败时平台上报的错误消息
    pub error_message: Option<String>,

    /// 成功时产生的虚拟机 ID（克隆/创建任务）
    pub result_vm_id: Option<String>,
}

/// Guest 认证信息
#[derive(Debug, Clone, Serialize)]
pub struct GuestCredentials {
    /// Guest 内用户名
    pub username: String,

    /// Guest 内密码
    pub password: String,
}

/// Guest 文件传输信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferInfo {
    /// 一次性传输 URL
    pub url: String,

    /// 文件大小（字节）
    pub size: u64,
}

/// Guest 内程序启动参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestProgramSpec {
    /// 程序路径
    pub program_path: String,

    /// 程序参数
    #[serde(default)]
    pub arguments: String,

    /// 工作目录
    pub working_directory: Option<String>,
}

/// Guest 内进程信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestProcessInfo {
    /// 进程 ID
    pub pid: i64,

    /// 进程属主
    #[serde(default)]
    pub owner: String,

    /// 启动时间
    pub start_time: DateTime<Utc>,

    /// 结束时间（仍在运行时为 None）
    pub end_time: Option<DateTime<Utc>>,

    /// 退出码（仍在运行时为 None）
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state_normalized() {
        assert_eq!(PowerState::PoweredOn.normalized(), "poweredon");
        assert_eq!(PowerState::PoweringOn.normalized(), "poweringon");
        assert!(PowerState::PoweredOff.is_settled());
        assert!(!PowerState::Suspended.is_settled());
        assert!(!PowerState::Resetting.is_settled());
    }

    #[test]
    fn test_power_state_wire_format() {
        let s = serde_json::to_string(&PowerState::PoweredOn).unwrap();
        assert_eq!(s, "\"poweredOn\"");
        let back: PowerState = serde_json::from_str("\"poweringOff\"").unwrap();
        assert_eq!(back, PowerState::PoweringOff);
    }

    #[test]
    fn test_tools_status_usable() {
        assert!(ToolsStatus::ToolsOk.is_usable());
        assert!(ToolsStatus::ToolsOld.is_usable());
        assert!(!ToolsStatus::ToolsNotRunning.is_usable());
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
    }
}
