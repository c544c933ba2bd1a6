//! 一次性配置文档
//!
//! 控制平面的变更接口是命令式的：一次克隆/创建/重配置调用必须
//! 携带一份预先声明全部变更的配置文档。这里把文档建模为不可变
//! 值，由 [`ConfigSpecBuilder`] 一次性冻结后整体提交，保持平台
//! 侧的原子性语义。

use serde::{Deserialize, Serialize};

/// 设备变更操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOperation {
    Add,
    Remove,
    Edit,
}

/// 设备变更的文件侧操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
}

/// 网卡适配器型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NicAdapterType {
    Vmxnet3,
    E1000,
}

/// 网卡后端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backing", rename_all = "snake_case")]
pub enum NicBacking {
    /// 标准虚拟交换机端口组
    Standard {
        /// 网络 ID
        network_id: String,
        /// 网络名称
        device_name: String,
    },
    /// 分布式交换机端口
    DistributedPort {
        /// 端口组键值
        portgroup_key: String,
        /// 交换机 UUID
        switch_uuid: String,
    },
}

/// 新增网卡描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicSpec {
    /// 适配器型号
    pub adapter_type: NicAdapterType,

    /// 设备标签
    pub label: String,

    /// 设备摘要（所连网络名称）
    pub summary: String,

    /// 网络唤醒
    pub wake_on_lan: bool,

    /// MAC 分配方式
    pub address_type: String,

    /// 启动时连接
    pub start_connected: bool,

    /// 允许 Guest 控制连接
    pub allow_guest_control: bool,

    /// 网卡后端
    pub backing: NicBacking,
}

/// SCSI 控制器描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScsiControllerSpec {
    /// 文档内临时键值，同一文档中的磁盘以此挂接
    pub key: i32,

    /// 总线号
    pub bus_number: i32,

    /// PCI 插槽号
    pub pci_slot_number: i32,

    /// 控制器所挂 PCI 控制器键值
    pub controller_key: i32,

    /// 控制器在 PCI 总线上的单元号
    pub unit_number: i32,

    /// 控制器自身占用的 SCSI 单元号
    pub scsi_ctlr_unit_number: i32,

    /// 是否支持热插拔
    pub hot_add_remove: bool,

    /// 总线共享模式
    pub shared_bus: String,
}

/// 磁盘描述（新增或编辑）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpec {
    /// 既有设备键值（编辑时必填，新增时为 None）
    pub key: Option<i32>,

    /// 所挂控制器键值
    pub controller_key: Option<i32>,

    /// 控制器上的单元号
    pub unit_number: Option<i32>,

    /// 目标容量 (KB)
    pub capacity_kb: Option<u64>,

    /// 磁盘模式
    pub disk_mode: String,

    /// 是否精简置备
    pub thin_provisioned: bool,
}

/// 移除既有设备
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveDeviceSpec {
    /// 既有设备键值
    pub key: i32,
}

/// 设备描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum DeviceSpec {
    ScsiController(ScsiControllerSpec),
    Disk(DiskSpec),
    Nic(NicSpec),
    Existing(RemoveDeviceSpec),
}

/// 单条设备变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceChangeSpec {
    /// 变更操作
    pub operation: DeviceOperation,

    /// 文件侧操作（新建磁盘时为 Create）
    pub file_operation: Option<FileOperation>,

    /// 设备描述
    pub device: DeviceSpec,
}

/// 虚拟机文件放置信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// 数据存储限定路径，如 `[datastore1] vm-name`
    pub vm_path_name: String,
}

/// 冻结后的一次性配置文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSpec {
    /// 虚拟机名称（全新创建时必填）
    pub name: Option<String>,

    /// CPU 核心数
    pub num_cpus: Option<u32>,

    /// 内存大小 (MB)
    pub memory_mb: Option<u64>,

    /// 备注
    pub annotation: Option<String>,

    /// CPU 热添加
    pub cpu_hot_add_enabled: bool,

    /// 内存热添加
    pub memory_hot_add_enabled: bool,

    /// 设备变更列表（按声明顺序应用）
    pub device_change: Vec<DeviceChangeSpec>,

    /// 文件放置信息（全新创建时必填）
    pub files: Option<FileInfo>,
}

impl ConfigSpec {
    pub fn builder() -> ConfigSpecBuilder {
        ConfigSpecBuilder::default()
    }
}

/// 配置文档构建器
///
/// 消耗式构建：`freeze` 之后文档不可再变。
#[derive(Debug, Default)]
pub struct ConfigSpecBuilder {
    name: Option<String>,
    num_cpus: Option<u32>,
    memory_mb: Option<u64>,
    annotation: Option<String>,
    cpu_hot_add_enabled: bool,
    memory_hot_add_enabled: bool,
    device_change: Vec<DeviceChangeSpec>,
    files: Option<FileInfo>,
}

impl ConfigSpecBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn num_cpus(mut self, n: u32) -> Self {
        self.num_cpus = Some(n);
        self
    }

    pub fn memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    pub fn annotation(mut self, text: impl Into<String>) -> Self {
        self.annotation = Some(text.into());
        self
    }

    pub fn hot_add(mut self, cpu: bool, memory: bool) -> Self {
        self.cpu_hot_add_enabled = cpu;
        self.memory_hot_add_enabled = memory;
        self
    }

    pub fn device_change(mut self, change: DeviceChangeSpec) -> Self {
        self.device_change.push(change);
        self
    }

    pub fn device_changes(mut self, changes: impl IntoIterator<Item = DeviceChangeSpec>) -> Self {
        self.device_change.extend(changes);
        self
    }

    pub fn files(mut self, vm_path_name: impl Into<String>) -> Self {
        self.files = Some(FileInfo {
            vm_path_name: vm_path_name.into(),
        });
        self
    }

    /// 冻结为不可变配置文档
    pub fn freeze(self) -> ConfigSpec {
        ConfigSpec {
            name: self.name,
            num_cpus: self.num_cpus,
            memory_mb: self.memory_mb,
            annotation: self.annotation,
            cpu_hot_add_enabled: self.cpu_hot_add_enabled,
            memory_hot_add_enabled: self.memory_hot_add_enabled,
            device_change: self.device_change,
            files: self.files,
        }
    }
}

/// 重定位信息（放置目标）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocateSpec {
    /// 目标主机 ID
    pub host_id: String,

    /// 目标数据存储 ID
    pub datastore_id: String,

    /// 目标资源池 ID
    pub pool_id: String,
}

/// 单网卡定制条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMapping {
    /// 静态 IP 地址（None 表示 DHCP）
    pub ip: Option<String>,

    /// 子网掩码（静态 IP 时必填）
    pub subnet_mask: Option<String>,

    /// 默认网关
    pub gateway: Option<String>,

    /// DNS 域
    pub dns_domain: Option<String>,
}

/// 全局 IP 定制
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalIpSettings {
    /// DNS 服务器列表（有序）
    pub dns_servers: Vec<String>,

    /// DNS 后缀列表
    pub dns_suffixes: Vec<String>,
}

/// Linux 风格主机身份定制
///
/// 不做按 Guest 系统分支，Windows 身份定制不在范围内。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinuxIdentity {
    /// 主机名
    pub host_name: String,

    /// 域名
    pub domain: String,
}

/// Guest 定制文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomizationSpec {
    /// 按网卡的静态 IP 设置（与设备变更中的网卡顺序对应）
    pub nic_settings: Vec<AdapterMapping>,

    /// 全局 IP 设置
    pub global_ip: GlobalIpSettings,

    /// 主机身份
    pub identity: LinuxIdentity,
}

/// 克隆文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneSpec {
    /// 克隆产物是否仍为模板
    pub template: bool,

    /// 放置目标
    pub location: RelocateSpec,

    /// 硬件配置变更
    pub config: Option<ConfigSpec>,

    /// Guest 定制
    pub customization: Option<CustomizationSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_freeze() {
        let spec = ConfigSpec::builder()
            .name("vm-01")
            .num_cpus(2)
            .memory_mb(4096)
            .hot_add(true, true)
            .files("[ds1] vm-01")
            .freeze();

        assert_eq!(spec.name.as_deref(), Some("vm-01"));
        assert_eq!(spec.num_cpus, Some(2));
        assert_eq!(spec.memory_mb, Some(4096));
        assert!(spec.cpu_hot_add_enabled);
        assert!(spec.device_change.is_empty());
        assert_eq!(spec.files.unwrap().vm_path_name, "[ds1] vm-01");
    }

    #[test]
    fn test_device_change_order_is_kept() {
        let remove = DeviceChangeSpec {
            operation: DeviceOperation::Remove,
            file_operation: None,
            device: DeviceSpec::Existing(RemoveDeviceSpec { key: 4000 }),
        };
        let add = DeviceChangeSpec {
            operation: DeviceOperation::Add,
            file_operation: None,
            device: DeviceSpec::Existing(RemoveDeviceSpec { key: 0 }),
        };
        let spec = ConfigSpec::builder()
            .device_changes([remove, add])
            .freeze();

        assert_eq!(spec.device_change[0].operation, DeviceOperation::Remove);
        assert_eq!(spec.device_change[1].operation, DeviceOperation::Add);
    }
}
