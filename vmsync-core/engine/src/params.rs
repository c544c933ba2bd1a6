//! 期望状态参数模型
//!
//! 一次调和运行的全部输入：虚拟机身份、期望电源状态、部署放置、
//! 硬件与设备期望。参数是声明式的，引擎负责把观测状态推向这里
//! 描述的期望状态。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// 期望状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestState {
    /// 存在即可，不改变电源状态
    #[default]
    Present,

    /// 不存在（销毁）
    Absent,

    /// 开机
    PoweredOn,

    /// 关机
    PoweredOff,

    /// 重启（仅允许从开机态出发）
    Restarted,

    /// 挂起（平台可上报，但不接受作为期望状态）
    Suspended,
}

/// 按名匹配到多个同名虚拟机时的选择方式
///
/// 未显式给出时，多候选交由引擎的多候选策略裁决。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatch {
    /// 取平台枚举顺序中的第一个
    First,

    /// 取平台枚举顺序中的最后一个
    Last,
}

/// 硬件期望
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareParam {
    /// CPU 核心数
    pub num_cpus: Option<u32>,

    /// 内存大小 (MB)
    pub memory_mb: Option<u64>,

    /// CPU 热添加
    #[serde(default)]
    pub hotadd_cpu: bool,

    /// 内存热添加
    #[serde(default)]
    pub hotadd_memory: bool,
}

/// 磁盘期望
///
/// 容量可用带单位后缀的字符串（`size = "40gb"`），或按单位拆分的
/// 数值字段，二者只取其一。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskParam {
    /// 带单位后缀的容量字符串，如 `40gb`
    pub size: Option<String>,

    /// 容量 (TB)
    pub size_tb: Option<u64>,

    /// 容量 (GB)
    pub size_gb: Option<u64>,

    /// 容量 (MB)
    pub size_mb: Option<u64>,

    /// 容量 (KB)
    pub size_kb: Option<u64>,

    /// 置备类型（thin 为精简置备）
    #[serde(rename = "type")]
    pub disk_type: Option<String>,

    /// 目标数据存储名称
    pub datastore: Option<String>,
}

/// 网卡期望
///
/// 在 [`GuestParams::networks`] 中以 CIDR 网段为键，静态 IP 必须
/// 落在键指定的网段内。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParam {
    /// 端口组名称
    pub network: String,

    /// 静态 IP（None 表示 DHCP / 不做 IP 定制）
    pub ip: Option<String>,

    /// 默认网关
    pub gateway: Option<String>,

    /// 适配器型号（默认 vmxnet3）
    pub device_type: Option<String>,
}

/// Guest 定制期望
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomizationParam {
    /// DNS 服务器列表（有序）
    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// DNS 后缀列表
    #[serde(default)]
    pub dns_suffixes: Vec<String>,

    /// 主机名（缺省取虚拟机名称）
    pub hostname: Option<String>,

    /// 域名
    pub domain: Option<String>,
}

/// 一次调和运行的期望状态参数
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuestParams {
    /// 虚拟机名称
    pub name: Option<String>,

    /// 实例 UUID（给出时优先于名称）
    pub uuid: Option<String>,

    /// 同名多匹配选择方式（未给出时按多候选策略裁决）
    pub name_match: Option<NameMatch>,

    /// 期望状态
    #[serde(default)]
    pub state: GuestState,

    /// 过渡电源态下是否强制执行电源操作
    #[serde(default)]
    pub force: bool,

    /// 数据中心名称
    pub datacenter: String,

    /// 文件夹路径（绝对或相对，用于限定查找与部署放置）
    pub folder: Option<String>,

    /// 克隆来源模板名称（None 表示全新创建）
    pub template: Option<String>,

    /// 克隆产物是否标记为模板
    #[serde(default)]
    pub is_template: bool,

    /// 目标集群名称（与 esxi_hostname 互斥）
    pub cluster: Option<String>,

    /// 目标主机名称（与 cluster 互斥）
    pub esxi_hostname: Option<String>,

    /// 目标数据存储名称
    pub datastore: Option<String>,

    /// 硬件期望
    pub hardware: Option<HardwareParam>,

    /// 磁盘期望列表
    #[serde(default)]
    pub disk: Vec<DiskParam>,

    /// 网卡期望：键为 CIDR 网段
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkParam>,

    /// Guest 定制期望
    pub customization: Option<CustomizationParam>,

    /// 备注
    pub annotation: Option<String>,

    /// 部署后是否等待 Guest 上报 IP
    #[serde(default)]
    pub wait_for_ip_address: bool,
}

impl GuestParams {
    /// 校验参数自身的合法性
    pub fn validate(&self) -> Result<()> {
        if self.name.is_none() && self.uuid.is_none() {
            return Err(EngineError::Validation(
                "name 与 uuid 至少需要提供一个".to_string(),
            ));
        }
        if self.cluster.is_some() && self.esxi_hostname.is_some() {
            return Err(EngineError::Validation(
                "cluster 与 esxi_hostname 互斥，只能提供一个".to_string(),
            ));
        }
        if self.state == GuestState::Suspended {
            return Err(EngineError::Validation(
                "不支持以 suspended 作为期望状态".to_string(),
            ));
        }
        Ok(())
    }

    /// 期望状态是否要求虚拟机存在
    pub fn wants_existing(&self) -> bool {
        self.state != GuestState::Absent
    }
}

/// 快照操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOpType {
    /// 创建快照
    Create,

    /// 删除指定名称的快照
    Remove,

    /// 恢复到指定名称的快照
    Revert,

    /// 列出全部快照
    ListAll,

    /// 列出当前快照
    ListCurrent,

    /// 删除全部快照
    RemoveAll,
}

/// 一次快照操作的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOp {
    /// 操作类型
    pub op: SnapshotOpType,

    /// 快照名称（create/remove/revert 必填）
    pub name: Option<String>,

    /// 快照描述（create 可选）
    pub description: Option<String>,

    /// 删除时是否级联删除子快照
    #[serde(default)]
    pub remove_children: bool,
}
